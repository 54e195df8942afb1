use anyhow::Result;

use super::context::CliContext;

pub fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();

    println!("AutoPOM System Information");
    println!("==========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {}", env!("GIT_HASH"));
    println!();

    println!("Configuration:");
    println!("- Config File: {}", ctx.config_path().display());
    println!("- Base URL: {}", config.crawl.base_url);
    println!("- Output Language: {}", config.crawl.language);
    println!("- Output Directory: {}", config.output_dir.display());
    println!(
        "- Budgets: depth {} / {} actions total / {} per state / {} revisits",
        config.crawl.max_depth,
        config.crawl.max_total_actions,
        config.crawl.max_actions_per_state,
        config.crawl.max_revisits
    );

    Ok(())
}
