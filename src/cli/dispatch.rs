use super::config::cmd_validate_config;
use super::crawl::cmd_crawl;
use super::env::CliArgs;
use super::info::cmd_info;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Crawl(args) => cmd_crawl(args, ctx).await,
        Commands::ValidateConfig => cmd_validate_config(ctx),
        Commands::Info => cmd_info(ctx),
    }
}
