//! Crawl decision loop.
//!
//! Drives the observe-think-act cycle over a browser backend, consults an
//! injectable reasoning oracle and enforces every guardrail itself.

pub mod agent_loop;
pub mod errors;
pub mod guardrails;
pub mod oracle;

pub use agent_loop::{AgentLoopConfig, AgentLoopController, AgentLoopResult, LoopPhase};
pub use errors::AgentError;
pub use guardrails::{normalize_domain, DecisionContext, Guardrails};
pub use oracle::{ExplorerOracle, HttpOracle, OracleRequest, ReasoningOracle, ScriptedOracle};
