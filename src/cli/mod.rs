pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod crawl;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod output;
pub mod runtime;

pub use crawl::{cmd_crawl, CrawlArgs};
