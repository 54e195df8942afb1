//! Page perception for the crawl engine: the browser backend port, the raw
//! page model, semantic naming and context compaction.

pub mod compactor;
pub mod errors;
pub mod locate;
pub mod model;
pub mod naming;
pub mod ports;

pub use compactor::{
    compact, enclosing_section, hidden_in_tree, is_interactive, observe, section_kind,
    CompactElement, CompactObservation, CompactorOptions, Observed,
};
pub use errors::{BackendError, PerceiverError};
pub use model::{ActOutcome, Command, DomNode, NodeId, RawPage, ResolvedNode};
pub use naming::{
    accessible_name, dedupe_names, icon_intent, implicit_role, name_hints, page_name,
    semantic_name, NameHint, NameSource,
};
pub use ports::BrowserBackend;
