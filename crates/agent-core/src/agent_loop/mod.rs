//! Crawl loop (observe-think-act) execution.
//!
//! # Architecture
//!
//! ```text
//! loop:
//!     Observe    compact the page, fingerprint it, register, verify new elements
//!     Think      budgets, then oracle.decide() under a timeout, then guardrails
//!     Act        execute under a timeout, record the attempt, retry or abandon
//!     Backtrack  navigate to the previous state on the path stack
//! until Done(end reason) or Aborted
//! ```
//!
//! # Key Components
//!
//! - [`AgentLoopConfig`]: timeouts, retry and rejection limits
//! - [`AgentLoopController`]: the state machine
//! - [`AgentLoopResult`]: index, history, counters and end reason of a run

pub mod config;
pub mod controller;
pub mod types;

pub use config::AgentLoopConfig;
pub use controller::{AgentLoopController, AgentLoopResult};
pub use types::{Backtrack, Entry, LoopPhase};
