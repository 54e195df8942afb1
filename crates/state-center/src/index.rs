//! Arena of discovered page states keyed by fingerprint.

use std::collections::{BTreeSet, HashMap};

use autopom_core_types::{ActionKey, Fingerprint, InteractiveElement, VerificationStatus};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub type StateId = usize;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("state {0} was already enriched")]
    AlreadyEnriched(Fingerprint),
    #[error("unknown state id {0}")]
    UnknownState(StateId),
}

/// Where and how a state was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub url: String,
    pub route: String,
    pub title: String,
    pub depth: u32,
}

/// One distinct application state.
#[derive(Debug, Clone, Serialize)]
pub struct PageState {
    pub id: StateId,
    pub fingerprint: Fingerprint,
    pub url: String,
    pub route: String,
    pub title: String,
    /// Depth at first discovery
    pub depth: u32,
    pub visits: u32,
    pub elements: Vec<InteractiveElement>,
    pub enriched: bool,
    /// Indices into the session history of actions issued from here
    pub edges: Vec<usize>,
    pub actions_executed: usize,
    pub abandoned: BTreeSet<ActionKey>,
}

impl PageState {
    pub fn verified_elements(&self) -> impl Iterator<Item = &InteractiveElement> {
        self.elements.iter().filter(|e| e.is_verified())
    }

    pub fn unverifiable_elements(&self) -> impl Iterator<Item = &InteractiveElement> {
        self.elements
            .iter()
            .filter(|e| e.status == VerificationStatus::Unverifiable)
    }

    pub fn is_abandoned(&self, key: &ActionKey) -> bool {
        self.abandoned.contains(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New(StateId),
    Seen { id: StateId, visits: u32 },
    RevisitBudgetExceeded { id: StateId, visits: u32 },
}

impl Registration {
    pub fn id(&self) -> StateId {
        match self {
            Registration::New(id)
            | Registration::Seen { id, .. }
            | Registration::RevisitBudgetExceeded { id, .. } => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Registration::New(_))
    }
}

/// Owned exclusively by one session; never shared.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    states: Vec<PageState>,
    by_fingerprint: HashMap<Fingerprint, StateId>,
    max_revisits: u32,
    enrichments: usize,
}

impl FingerprintIndex {
    pub fn new(max_revisits: u32) -> Self {
        Self {
            max_revisits,
            ..Self::default()
        }
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<StateId> {
        self.by_fingerprint.get(fingerprint).copied()
    }

    /// Count an arrival at `fingerprint`, creating the state on first sight.
    pub fn register(&mut self, fingerprint: Fingerprint, arrival: Arrival) -> Registration {
        if let Some(&id) = self.by_fingerprint.get(&fingerprint) {
            let state = &mut self.states[id];
            state.visits += 1;
            let visits = state.visits;
            debug!(fingerprint = %fingerprint, visits, "state revisited");
            if visits > self.max_revisits + 1 {
                return Registration::RevisitBudgetExceeded { id, visits };
            }
            return Registration::Seen { id, visits };
        }

        let id = self.states.len();
        info!(
            fingerprint = %fingerprint,
            route = %arrival.route,
            depth = arrival.depth,
            "state discovered"
        );
        self.states.push(PageState {
            id,
            fingerprint: fingerprint.clone(),
            url: arrival.url,
            route: arrival.route,
            title: arrival.title,
            depth: arrival.depth,
            visits: 1,
            elements: Vec::new(),
            enriched: false,
            edges: Vec::new(),
            actions_executed: 0,
            abandoned: BTreeSet::new(),
        });
        self.by_fingerprint.insert(fingerprint, id);
        Registration::New(id)
    }

    /// Store the verified elements of a state. Allowed once per state.
    pub fn enrich(&mut self, id: StateId, elements: Vec<InteractiveElement>) -> Result<(), IndexError> {
        let state = self.states.get_mut(id).ok_or(IndexError::UnknownState(id))?;
        if state.enriched {
            return Err(IndexError::AlreadyEnriched(state.fingerprint.clone()));
        }
        state.elements = elements;
        state.enriched = true;
        self.enrichments += 1;
        Ok(())
    }

    pub fn get(&self, id: StateId) -> Option<&PageState> {
        self.states.get(id)
    }

    pub fn get_mut(&mut self, id: StateId) -> Option<&mut PageState> {
        self.states.get_mut(id)
    }

    /// Record an executed action against its origin state.
    pub fn record_action(&mut self, id: StateId, history_index: usize) -> Result<(), IndexError> {
        let state = self.states.get_mut(id).ok_or(IndexError::UnknownState(id))?;
        state.actions_executed += 1;
        state.edges.push(history_index);
        Ok(())
    }

    pub fn abandon(&mut self, id: StateId, key: ActionKey) -> Result<(), IndexError> {
        let state = self.states.get_mut(id).ok_or(IndexError::UnknownState(id))?;
        state.abandoned.insert(key);
        Ok(())
    }

    pub fn states(&self) -> &[PageState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn enrichments(&self) -> usize {
        self.enrichments
    }

    pub fn max_revisits(&self) -> u32 {
        self.max_revisits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(depth: u32) -> Arrival {
        Arrival {
            url: "https://a.test/".into(),
            route: "https://a.test".into(),
            title: "A".into(),
            depth,
        }
    }

    fn fp(value: &str) -> Fingerprint {
        Fingerprint(value.into())
    }

    #[test]
    fn register_creates_once_and_counts_visits() {
        let mut index = FingerprintIndex::new(1);
        assert_eq!(index.register(fp("a"), arrival(0)), Registration::New(0));
        assert_eq!(
            index.register(fp("a"), arrival(2)),
            Registration::Seen { id: 0, visits: 2 }
        );
        assert_eq!(
            index.register(fp("a"), arrival(1)),
            Registration::RevisitBudgetExceeded { id: 0, visits: 3 }
        );
        assert_eq!(index.register(fp("b"), arrival(1)), Registration::New(1));
        assert_eq!(index.len(), 2);
        // depth of first discovery wins
        assert_eq!(index.get(0).unwrap().depth, 0);
    }

    #[test]
    fn enrichment_happens_at_most_once() {
        let mut index = FingerprintIndex::new(3);
        let id = index.register(fp("a"), arrival(0)).id();
        index.enrich(id, Vec::new()).unwrap();
        assert_eq!(
            index.enrich(id, Vec::new()),
            Err(IndexError::AlreadyEnriched(fp("a")))
        );
        assert_eq!(index.enrichments(), 1);
        assert_eq!(index.enrich(9, Vec::new()), Err(IndexError::UnknownState(9)));
    }

    #[test]
    fn actions_and_abandonment_are_tracked() {
        let mut index = FingerprintIndex::new(3);
        let id = index.register(fp("a"), arrival(0)).id();
        index.record_action(id, 0).unwrap();
        index.record_action(id, 3).unwrap();
        index.abandon(id, ActionKey("click#2".into())).unwrap();
        let state = index.get(id).unwrap();
        assert_eq!(state.actions_executed, 2);
        assert_eq!(state.edges, vec![0, 3]);
        assert!(state.is_abandoned(&ActionKey("click#2".into())));
    }
}
