use clap::Subcommand;

use super::crawl::CrawlArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Crawl a site fixture and write the schema, page models and report
    Crawl(CrawlArgs),

    /// Check the effective configuration and print it with credentials redacted
    ValidateConfig,

    /// Show version and build information
    Info,
}
