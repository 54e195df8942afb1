//! State machine types for the crawl loop.

use autopom_core_types::{ActionDecision, CrawlError, EndReason, Fingerprint};
use autopom_state_center::StateId;
use perceiver_structural::Observed;

/// Loop phase. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone)]
pub enum LoopPhase {
    Observe,
    Think,
    Act(ActionDecision),
    Backtrack(Backtrack),
    Done(EndReason),
    Aborted(CrawlError),
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Done(_) | LoopPhase::Aborted(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoopPhase::Observe => "observe",
            LoopPhase::Think => "think",
            LoopPhase::Act(_) => "act",
            LoopPhase::Backtrack(_) => "backtrack",
            LoopPhase::Done(_) => "done",
            LoopPhase::Aborted(_) => "aborted",
        }
    }
}

/// How far a backtrack goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backtrack {
    /// Leave the current state for the one below it on the path.
    Retreat,
    /// The page reached was not accepted; return to the top of the path.
    Return,
}

/// How the page about to be observed was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Start,
    /// After an action, failed oracle call or failed execution in `from`.
    After { from: StateId },
    /// After navigating back to `to`.
    Backtracked { to: StateId },
}

/// The state the loop is currently acting in.
#[derive(Debug, Clone)]
pub struct CurrentState {
    pub id: StateId,
    pub fingerprint: Fingerprint,
    pub observed: Observed,
}

/// An action waiting to be retried in its state.
#[derive(Debug, Clone)]
pub struct PendingRetry {
    pub state: StateId,
    pub decision: ActionDecision,
    pub failures: u32,
}
