use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::handlers::CandidateHandlerSet;
use crate::navigation::{PageTransition, TransitionKind};

pub type TabId = Uuid;

/// Handlers the resolver returned for one hop, plus the host that hop targeted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerObservation {
    pub host: Option<String>,
    pub handlers: CandidateHandlerSet,
}

/// Mutations one evaluation asks the owner of the chain to perform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEffects {
    pub veto_chain: bool,
    pub observed: Option<HandlerObservation>,
}

impl ChainEffects {
    pub fn is_empty(&self) -> bool {
        !self.veto_chain && self.observed.is_none()
    }
}

/// State for one logical navigation sequence: the trigger plus the redirects after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectChainState {
    id: Uuid,
    from_intent: bool,
    initial_intent_targets_host: bool,
    custom_tab: bool,
    user_typed: bool,
    vetoed: bool,
    started: bool,
    hops: u32,
    observed: Option<HandlerObservation>,
}

impl Default for RedirectChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectChainState {
    /// An empty chain; the first navigation that reaches it becomes its trigger.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            from_intent: false,
            initial_intent_targets_host: false,
            custom_tab: false,
            user_typed: false,
            vetoed: false,
            started: false,
            hops: 0,
            observed: None,
        }
    }

    pub fn from_user_navigation(transition: PageTransition) -> Self {
        let mut chain = Self::new();
        chain.start(transition);
        chain
    }

    /// Chain seeded by an intent another app sent to the host application.
    pub fn from_incoming_intent(
        custom_tab: bool,
        targets_host: bool,
        handlers: Option<CandidateHandlerSet>,
    ) -> Self {
        let mut chain = Self::new();
        chain.from_intent = true;
        chain.custom_tab = custom_tab;
        chain.initial_intent_targets_host = targets_host;
        chain.observed = handlers.map(|handlers| HandlerObservation {
            host: None,
            handlers,
        });
        chain
    }

    fn start(&mut self, transition: PageTransition) {
        self.started = true;
        self.hops = 0;
        self.user_typed = transition.kind == TransitionKind::Typed;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_custom_tab(&self) -> bool {
        self.custom_tab
    }

    pub fn is_user_typed(&self) -> bool {
        self.user_typed
    }

    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub fn observed(&self) -> Option<&HandlerObservation> {
        self.observed.as_ref()
    }

    /// The chain began with an incoming intent and has moved past its first load.
    pub fn is_on_effective_intent_redirect_chain(&self) -> bool {
        self.from_intent && self.hops > 0
    }

    /// The incoming intent addressed the host application, so web redirects keep it there.
    pub fn should_stay_in_app(&self, external_protocol: bool) -> bool {
        self.initial_intent_targets_host && !external_protocol
    }

    pub fn has_new_handlers(&self, handlers: &CandidateHandlerSet) -> bool {
        match &self.observed {
            Some(observed) => handlers.has_handler_not_in(&observed.handlers),
            None => true,
        }
    }

    pub fn veto(&mut self) {
        self.vetoed = true;
    }

    pub fn observe(&mut self, observation: HandlerObservation) {
        self.observed = Some(observation);
    }

    pub fn apply(&mut self, effects: &ChainEffects) {
        if effects.veto_chain {
            self.veto();
        }
        if let Some(observation) = &effects.observed {
            self.observe(observation.clone());
        }
    }

    /// Advance for a navigation about to be evaluated on this chain.
    fn advance(&mut self, transition: PageTransition) {
        if !self.started {
            self.start(transition);
        } else {
            self.hops = self.hops.saturating_add(1);
        }
    }
}

/// Owns one chain per tab; chains are replaced on each fresh user-initiated navigation.
#[derive(Debug, Default)]
pub struct ChainArena {
    chains: HashMap<TabId, RedirectChainState>,
}

impl ChainArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_tab(&mut self) -> TabId {
        let tab = Uuid::new_v4();
        self.chains.insert(tab, RedirectChainState::new());
        tab
    }

    pub fn close_tab(&mut self, tab: TabId) -> bool {
        self.chains.remove(&tab).is_some()
    }

    pub fn begin_incoming_intent(
        &mut self,
        tab: TabId,
        custom_tab: bool,
        targets_host: bool,
        handlers: Option<CandidateHandlerSet>,
    ) -> Uuid {
        let chain = RedirectChainState::from_incoming_intent(custom_tab, targets_host, handlers);
        let id = chain.id();
        debug!(tab = %tab, chain = %id, custom_tab, "incoming intent chain");
        self.chains.insert(tab, chain);
        id
    }

    /// Chain the next navigation on `tab` evaluates against.
    ///
    /// A non-redirect navigation with a user gesture, or a typed one, starts a new chain.
    /// Anything else continues the current chain as one more hop.
    pub fn prepare(
        &mut self,
        tab: TabId,
        transition: PageTransition,
        redirect: bool,
        gesture: bool,
    ) -> &RedirectChainState {
        let fresh = !redirect && (gesture || transition.kind == TransitionKind::Typed);
        let chain = self.chains.entry(tab).or_default();
        if fresh && chain.started {
            *chain = RedirectChainState::from_user_navigation(transition);
            debug!(tab = %tab, chain = %chain.id(), "new navigation chain");
        } else {
            chain.advance(transition);
        }
        chain
    }

    pub fn get(&self, tab: TabId) -> Option<&RedirectChainState> {
        self.chains.get(&tab)
    }

    /// Applies `effects` unless the tab has since moved on to another chain.
    pub fn apply(&mut self, tab: TabId, chain_id: Uuid, effects: &ChainEffects) -> bool {
        match self.chains.get_mut(&tab) {
            Some(chain) if chain.id() == chain_id => {
                chain.apply(effects);
                true
            }
            _ => {
                debug!(tab = %tab, chain = %chain_id, "discarding effects for stale chain");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::CandidateHandler;

    #[test]
    fn gesture_navigation_starts_new_chain_and_redirects_continue_it() {
        let mut arena = ChainArena::new();
        let tab = arena.open_tab();
        let first = arena.prepare(tab, PageTransition::link(), false, true).id();
        assert_eq!(arena.get(tab).unwrap().hops(), 0);

        let redirect = arena.prepare(tab, PageTransition::link(), true, false);
        assert_eq!(redirect.id(), first);
        assert_eq!(redirect.hops(), 1);

        let next = arena.prepare(tab, PageTransition::link(), false, true).id();
        assert_ne!(next, first);
    }

    #[test]
    fn incoming_intent_chain_becomes_effective_after_first_hop() {
        let mut arena = ChainArena::new();
        let tab = arena.open_tab();
        let id = arena.begin_incoming_intent(tab, false, true, None);

        let first = arena.prepare(tab, PageTransition::from_platform_api(), false, false);
        assert_eq!(first.id(), id);
        assert!(!first.is_on_effective_intent_redirect_chain());

        let hop = arena.prepare(tab, PageTransition::from_platform_api(), true, false);
        assert!(hop.is_on_effective_intent_redirect_chain());
        assert!(hop.should_stay_in_app(false));
        assert!(!hop.should_stay_in_app(true));
    }

    #[test]
    fn typed_chain_is_flagged() {
        let chain = RedirectChainState::from_user_navigation(PageTransition::typed());
        assert!(chain.is_user_typed());
        let link = RedirectChainState::from_user_navigation(PageTransition::link());
        assert!(!link.is_user_typed());
    }

    #[test]
    fn stale_effects_are_discarded() {
        let mut arena = ChainArena::new();
        let tab = arena.open_tab();
        let old = arena.prepare(tab, PageTransition::link(), false, true).id();
        arena.prepare(tab, PageTransition::link(), false, true);
        arena.prepare(tab, PageTransition::link(), false, true);

        let effects = ChainEffects {
            veto_chain: true,
            observed: None,
        };
        assert!(!arena.apply(tab, old, &effects));
        assert!(!arena.get(tab).unwrap().is_vetoed());

        let current = arena.get(tab).unwrap().id();
        assert!(arena.apply(tab, current, &effects));
        assert!(arena.get(tab).unwrap().is_vetoed());
    }

    #[test]
    fn new_handlers_are_relative_to_last_observation() {
        let mut chain = RedirectChainState::new();
        let maps = CandidateHandlerSet::new(vec![CandidateHandler::specialized("com.maps")]);
        assert!(chain.has_new_handlers(&maps));

        chain.apply(&ChainEffects {
            veto_chain: false,
            observed: Some(HandlerObservation {
                host: Some("maps.example.com".into()),
                handlers: maps.clone(),
            }),
        });
        assert!(!chain.has_new_handlers(&maps));
        let more = CandidateHandlerSet::new(vec![
            CandidateHandler::specialized("com.maps"),
            CandidateHandler::specialized("com.other"),
        ]);
        assert!(chain.has_new_handlers(&more));
    }

    #[test]
    fn close_tab_drops_chain() {
        let mut arena = ChainArena::new();
        let tab = arena.open_tab();
        assert_eq!(arena.len(), 1);
        assert!(arena.close_tab(tab));
        assert!(arena.is_empty());
        assert!(!arena.close_tab(tab));
    }
}
