//! Recording collaborators shared by the unit tests.

use std::cell::{Cell, RefCell};

use crate::descriptor::{LaunchDescriptor, SanitizedDescriptor};
use crate::engine::NavigationDelegate;
use crate::handlers::{CandidateHandler, CandidateResolver, ExternalLauncher, LaunchError};
use crate::navigation::NavigationRequest;

/// Answers by data-URI prefix and records every descriptor it was asked about.
#[derive(Default)]
pub struct StubResolver {
    routes: Vec<(String, Vec<CandidateHandler>)>,
    default_sms: Option<String>,
    queries: RefCell<Vec<SanitizedDescriptor>>,
}

impl StubResolver {
    pub fn with_route(prefix: &str, handlers: Vec<CandidateHandler>) -> Self {
        Self::default().route(prefix, handlers)
    }

    pub fn route(mut self, prefix: &str, handlers: Vec<CandidateHandler>) -> Self {
        self.routes.push((prefix.to_string(), handlers));
        self
    }

    pub fn with_default_sms(mut self, package: &str) -> Self {
        self.default_sms = Some(package.to_string());
        self
    }

    pub fn queries(&self) -> Vec<SanitizedDescriptor> {
        self.queries.borrow().clone()
    }
}

impl CandidateResolver for StubResolver {
    fn resolve(&self, descriptor: &SanitizedDescriptor) -> Vec<CandidateHandler> {
        self.queries.borrow_mut().push(descriptor.clone());
        let data = descriptor.data.as_deref().unwrap_or_default();
        self.routes
            .iter()
            .find(|(prefix, _)| data.starts_with(prefix.as_str()))
            .map(|(_, handlers)| handlers.clone())
            .unwrap_or_default()
    }

    fn default_sms_package(&self) -> Option<String> {
        self.default_sms.clone()
    }
}

#[derive(Default)]
pub struct StubLauncher {
    failure: Option<LaunchError>,
    launched: RefCell<Vec<LaunchDescriptor>>,
}

impl StubLauncher {
    pub fn failing(error: LaunchError) -> Self {
        Self {
            failure: Some(error),
            launched: RefCell::new(Vec::new()),
        }
    }

    pub fn launched(&self) -> Vec<LaunchDescriptor> {
        self.launched.borrow().clone()
    }
}

impl ExternalLauncher for StubLauncher {
    fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), LaunchError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.launched.borrow_mut().push(descriptor.clone());
        Ok(())
    }
}

pub struct StubDelegate {
    pub foreground: Cell<bool>,
    pub claims: Cell<bool>,
    pub file_grant_needed: Cell<bool>,
    pub disable_external: Cell<bool>,
    pub instant_app: RefCell<Option<LaunchDescriptor>>,
    pub handoff_requests: Cell<usize>,
}

impl Default for StubDelegate {
    fn default() -> Self {
        Self {
            foreground: Cell::new(true),
            claims: Cell::new(false),
            file_grant_needed: Cell::new(false),
            disable_external: Cell::new(false),
            instant_app: RefCell::new(None),
            handoff_requests: Cell::new(0),
        }
    }
}

impl NavigationDelegate for StubDelegate {
    fn is_app_in_foreground(&self) -> bool {
        self.foreground.get()
    }

    fn claims_navigation(&self, _request: &NavigationRequest<'_>) -> bool {
        self.claims.get()
    }

    fn needs_file_access_grant(&self, _url: &str) -> bool {
        self.file_grant_needed.get()
    }

    fn should_disable_external_intents(&self, _url: &str) -> bool {
        self.disable_external.get()
    }

    fn instant_app_handoff(
        &self,
        _request: &NavigationRequest<'_>,
        _from_search: bool,
    ) -> Option<LaunchDescriptor> {
        self.handoff_requests.set(self.handoff_requests.get() + 1);
        self.instant_app.borrow().clone()
    }
}
