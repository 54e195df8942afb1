use anyhow::{Context, Result};

use super::context::CliContext;

pub fn cmd_validate_config(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    config
        .validate()
        .with_context(|| format!("{} is not usable", ctx.config_path().display()))?;

    println!("Configuration OK ({}):", ctx.config_path().display());
    println!("{}", config.to_redacted_yaml()?);
    Ok(())
}
