//! State identity for the crawl: fingerprint normalization and the arena
//! index of discovered page states.

pub mod fingerprint;
pub mod index;

pub use fingerprint::{
    fingerprint, fingerprint_parts, normalize_route, structural_signature, RoutePolicy,
    FINGERPRINT_LEN,
};
pub use index::{Arrival, FingerprintIndex, IndexError, PageState, Registration, StateId};
