pub mod audit;
pub mod chain;
pub mod config;
pub mod decision;
pub mod descriptor;
pub mod engine;
pub mod fallback;
pub mod handlers;
pub mod navigation;
pub mod telemetry;
pub mod urls;

#[cfg(test)]
mod testing;

use std::{path::Path, sync::Arc};

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{DecisionLog, DecisionRecord};
use crate::chain::{ChainArena, TabId};
use crate::config::{InterceptSettings, default_config_path};
use crate::decision::{AsyncAction, Evaluation};
use crate::engine::{DecisionEngine, NavigationDelegate};
use crate::handlers::{CandidateHandlerSet, CandidateResolver, ExternalLauncher};
use crate::navigation::NavigationRequest;
use crate::urls::DenyList;

/// Owns the per-tab redirect chains and runs each navigation through the decision engine.
pub struct Interceptor {
    settings: Arc<InterceptSettings>,
    denylist: DenyList,
    resolver: Box<dyn CandidateResolver>,
    launcher: Box<dyn ExternalLauncher>,
    delegate: Box<dyn NavigationDelegate>,
    chains: ChainArena,
    audit: Option<DecisionLog>,
}

impl Interceptor {
    pub fn new(
        settings: InterceptSettings,
        resolver: Box<dyn CandidateResolver>,
        launcher: Box<dyn ExternalLauncher>,
        delegate: Box<dyn NavigationDelegate>,
    ) -> Self {
        let denylist = DenyList::new(&settings.denylist_patterns);
        let audit = open_audit_log(&settings);
        Self {
            settings: Arc::new(settings),
            denylist,
            resolver,
            launcher,
            delegate,
            chains: ChainArena::new(),
            audit,
        }
    }

    /// Construct from the settings file at `path`, or the platform default location.
    pub fn load(
        path: Option<&Path>,
        resolver: Box<dyn CandidateResolver>,
        launcher: Box<dyn ExternalLauncher>,
        delegate: Box<dyn NavigationDelegate>,
    ) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        let settings = InterceptSettings::load_or_default(&path)?;
        info!(config = %path.display(), "loaded intercept settings");
        Ok(Self::new(settings, resolver, launcher, delegate))
    }

    pub fn settings(&self) -> &InterceptSettings {
        &self.settings
    }

    /// Replace the settings snapshot; evaluations already returned are unaffected.
    pub fn update_settings(&mut self, settings: InterceptSettings) {
        self.denylist = DenyList::new(&settings.denylist_patterns);
        self.audit = open_audit_log(&settings);
        self.settings = Arc::new(settings);
    }

    pub fn with_audit_log(mut self, log: DecisionLog) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn open_tab(&mut self) -> TabId {
        self.chains.open_tab()
    }

    pub fn close_tab(&mut self, tab: TabId) -> bool {
        self.chains.close_tab(tab)
    }

    /// The host application was started by another app's intent that will load in `tab`.
    pub fn receive_intent(
        &mut self,
        tab: TabId,
        custom_tab: bool,
        targets_host: bool,
        handlers: Option<CandidateHandlerSet>,
    ) -> Uuid {
        self.chains
            .begin_incoming_intent(tab, custom_tab, targets_host, handlers)
    }

    /// Evaluate a navigation on `tab` against its redirect chain and record the outcome.
    pub fn navigate(&mut self, tab: TabId, request: NavigationRequest<'_>) -> Evaluation {
        let settings = Arc::clone(&self.settings);
        let chain = self.chains.prepare(
            tab,
            request.transition(),
            request.is_redirect(),
            request.has_user_gesture(),
        );
        let chain_id = chain.id();
        let request = request.with_chain(Some(chain));

        let engine = DecisionEngine::new(
            &settings,
            &self.denylist,
            self.resolver.as_ref(),
            self.launcher.as_ref(),
            self.delegate.as_ref(),
        );
        let evaluation = engine.evaluate(&request);
        let record = self
            .audit
            .as_ref()
            .map(|_| DecisionRecord::new(Some(tab), &request, &evaluation));

        self.chains.apply(tab, chain_id, &evaluation.effects);
        if let (Some(log), Some(record)) = (&self.audit, record) {
            if let Err(err) = log.append_record(&record) {
                warn!(error = %err, path = %log.path().display(), "failed to append decision record");
            }
        }
        evaluation
    }

    /// Evaluate a navigation that belongs to no tab; no chain state is read or kept.
    pub fn evaluate_detached(&self, request: &NavigationRequest<'_>) -> Evaluation {
        DecisionEngine::new(
            &self.settings,
            &self.denylist,
            self.resolver.as_ref(),
            self.launcher.as_ref(),
            self.delegate.as_ref(),
        )
        .evaluate(request)
    }

    /// Whether a continuation for `action` still applies to `tab`.
    ///
    /// A later navigation that started a new chain makes earlier actions stale.
    pub fn is_current(&self, tab: TabId, action: &AsyncAction) -> bool {
        match (self.chains.get(tab), action.chain) {
            (Some(chain), Some(issued)) => chain.id() == issued,
            _ => false,
        }
    }
}

fn open_audit_log(settings: &InterceptSettings) -> Option<DecisionLog> {
    if !settings.audit_active() {
        return None;
    }
    match settings.resolve_audit_log() {
        Ok(path) => Some(DecisionLog::new(path)),
        Err(err) => {
            warn!(error = %err, "decision audit disabled");
            None
        }
    }
}
