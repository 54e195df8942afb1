//! Locator resilience and self-healing
//!
//! This crate turns observed interactive nodes into ranked, verified
//! locators:
//! - five synthesis strategies, from test ids down to absolute paths
//! - a total ranking order recomputed after every verification pass
//! - same-cycle verification with EMA scoring and promotion of passing
//!   candidates

pub mod errors;
pub mod healer;
pub mod ranking;
pub mod strategies;

pub use errors::LocatorError;
pub use healer::{CandidateCheck, SelfHealingVerifier, VerificationReport, VerifierConfig};
pub use ranking::rank;
pub use strategies::{
    length_penalty, AbsolutePathStrategy, AnchoredPathStrategy, LocatorEngine, RoleNameStrategy,
    Strategy, SynthesisContext, TestIdStrategy, TextStrategy,
};
