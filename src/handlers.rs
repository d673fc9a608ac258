use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::descriptor::{LaunchDescriptor, SanitizedDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// A web browser, possibly the host application itself.
    Browser,
    /// A native app claiming the target with a specific filter.
    Specialized,
    /// Native wrapper around a single web app.
    WebApk,
    /// Ephemeral app launched without full installation.
    InstantApp,
}

/// One installed handler that can receive a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateHandler {
    pub package: String,
    #[serde(default)]
    pub activity: String,
    pub kind: HandlerKind,
}

impl CandidateHandler {
    pub fn new(package: impl Into<String>, activity: impl Into<String>, kind: HandlerKind) -> Self {
        Self {
            package: package.into(),
            activity: activity.into(),
            kind,
        }
    }

    pub fn specialized(package: impl Into<String>) -> Self {
        Self::new(package, "", HandlerKind::Specialized)
    }

    pub fn browser(package: impl Into<String>) -> Self {
        Self::new(package, "", HandlerKind::Browser)
    }

    pub fn webapk(package: impl Into<String>) -> Self {
        Self::new(package, "", HandlerKind::WebApk)
    }

    pub fn instant_app(package: impl Into<String>) -> Self {
        Self::new(package, "", HandlerKind::InstantApp)
    }

    /// Non-browser handlers; instant-app installers do not count.
    pub fn is_specialized(&self) -> bool {
        matches!(self.kind, HandlerKind::Specialized | HandlerKind::WebApk)
    }

    fn same_target(&self, other: &CandidateHandler) -> bool {
        self.package == other.package && self.activity == other.activity
    }
}

/// Resolver answer for one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateHandlerSet {
    handlers: Vec<CandidateHandler>,
}

impl CandidateHandlerSet {
    pub fn new(handlers: Vec<CandidateHandler>) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &[CandidateHandler] {
        &self.handlers
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn specialized_count(&self) -> usize {
        self.handlers
            .iter()
            .filter(|handler| handler.is_specialized())
            .count()
    }

    pub fn first_webapk(&self) -> Option<&str> {
        self.handlers
            .iter()
            .find(|handler| handler.kind == HandlerKind::WebApk)
            .map(|handler| handler.package.as_str())
    }

    pub fn instant_app(&self) -> Option<&str> {
        self.handlers
            .iter()
            .find(|handler| handler.kind == HandlerKind::InstantApp)
            .map(|handler| handler.package.as_str())
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.handlers.iter().any(|handler| handler.package == package)
    }

    /// Every candidate belongs to `package`.
    pub fn only_package(&self, package: &str) -> bool {
        !self.handlers.is_empty() && self.handlers.iter().all(|handler| handler.package == package)
    }

    pub fn is_subset_of(&self, other: &CandidateHandlerSet) -> bool {
        self.handlers
            .iter()
            .all(|handler| other.handlers.iter().any(|known| known.same_target(handler)))
    }

    pub fn has_handler_not_in(&self, other: &CandidateHandlerSet) -> bool {
        !self.is_subset_of(other)
    }
}

impl From<Vec<CandidateHandler>> for CandidateHandlerSet {
    fn from(handlers: Vec<CandidateHandler>) -> Self {
        Self::new(handlers)
    }
}

/// Platform gateway that lists installed handlers for a descriptor.
///
/// Calls may be costly (package manager queries); the engine makes at most a few per
/// evaluation and never caches across evaluations.
pub trait CandidateResolver {
    fn resolve(&self, descriptor: &SanitizedDescriptor) -> Vec<CandidateHandler>;

    /// Package of the user's default SMS app, if the platform exposes one.
    fn default_sms_package(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("no handler found for {0}")]
    HandlerNotFound(String),
    #[error("platform launch failed: {0}")]
    Platform(String),
}

/// Starts the external handler for a prepared descriptor.
pub trait ExternalLauncher {
    fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), LaunchError>;
}

/// Static handler table entry matched against descriptor data and package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverEntry {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    pub handler: CandidateHandler,
}

impl ResolverEntry {
    fn matches(&self, descriptor: &LaunchDescriptor) -> bool {
        if let Some(package) = &descriptor.package {
            if package != &self.handler.package {
                return false;
            }
        }
        let data_scheme = descriptor.data_scheme();
        if let Some(scheme) = &self.scheme {
            if data_scheme.as_deref() != Some(scheme.to_ascii_lowercase().as_str()) {
                return false;
            }
        }
        if let Some(host) = &self.host {
            let data_host = descriptor
                .data_url()
                .and_then(|url| url.host_str().map(|value| value.to_ascii_lowercase()));
            if data_host.as_deref() != Some(host.to_ascii_lowercase().as_str()) {
                return false;
            }
        }
        true
    }
}

/// Resolver backed by a fixed handler table, used for dry runs and benchmarks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticResolver {
    #[serde(default)]
    pub entries: Vec<ResolverEntry>,
    #[serde(default)]
    pub default_sms_package: Option<String>,
}

impl StaticResolver {
    pub fn new(entries: Vec<ResolverEntry>) -> Self {
        Self {
            entries,
            default_sms_package: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Unable to read handler table at {}", path.display()))?;
        let parsed = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed handler table at {}", path.display()))?;
        Ok(parsed)
    }
}

impl CandidateResolver for StaticResolver {
    fn resolve(&self, descriptor: &SanitizedDescriptor) -> Vec<CandidateHandler> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(descriptor))
            .map(|entry| entry.handler.clone())
            .collect()
    }

    fn default_sms_package(&self) -> Option<String> {
        self.default_sms_package.clone()
    }
}

/// Launcher that only logs; nothing is started.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunLauncher;

impl ExternalLauncher for DryRunLauncher {
    fn launch(&self, descriptor: &LaunchDescriptor) -> Result<(), LaunchError> {
        info!(
            descriptor = %descriptor,
            package = descriptor.package.as_deref().unwrap_or("(chooser)"),
            "dry-run launch"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor;
    use tempfile::tempdir;

    #[test]
    fn specialized_count_ignores_browsers_and_instant_apps() {
        let set = CandidateHandlerSet::new(vec![
            CandidateHandler::browser("org.browser"),
            CandidateHandler::specialized("com.maps"),
            CandidateHandler::webapk("org.webapk.news"),
            CandidateHandler::instant_app("com.instant"),
        ]);
        assert_eq!(set.specialized_count(), 2);
        assert_eq!(set.first_webapk(), Some("org.webapk.news"));
        assert_eq!(set.instant_app(), Some("com.instant"));
    }

    #[test]
    fn subset_compares_package_and_activity() {
        let previous = CandidateHandlerSet::new(vec![
            CandidateHandler::new("com.maps", "Main", HandlerKind::Specialized),
            CandidateHandler::browser("org.browser"),
        ]);
        let same = CandidateHandlerSet::new(vec![CandidateHandler::new(
            "com.maps",
            "Main",
            HandlerKind::Specialized,
        )]);
        let other_activity = CandidateHandlerSet::new(vec![CandidateHandler::new(
            "com.maps",
            "Alt",
            HandlerKind::Specialized,
        )]);
        assert!(same.is_subset_of(&previous));
        assert!(other_activity.has_handler_not_in(&previous));
        assert!(CandidateHandlerSet::default().is_subset_of(&previous));
    }

    #[test]
    fn static_resolver_honours_package_and_host() {
        let resolver = StaticResolver::new(vec![
            ResolverEntry {
                scheme: Some("https".into()),
                host: Some("maps.example.com".into()),
                handler: CandidateHandler::specialized("com.maps"),
            },
            ResolverEntry {
                scheme: Some("foo".into()),
                host: None,
                handler: CandidateHandler::specialized("com.example"),
            },
        ]);
        let maps = parse_descriptor("https://maps.example.com/place").unwrap();
        assert_eq!(resolver.resolve(&maps.sanitize()).len(), 1);

        let pinned = parse_descriptor("intent://x#Intent;scheme=foo;package=com.other;end").unwrap();
        assert!(resolver.resolve(&pinned.sanitize()).is_empty());

        let foo = parse_descriptor("intent://x#Intent;scheme=foo;package=com.example;end").unwrap();
        assert_eq!(
            resolver.resolve(&foo.sanitize()),
            vec![CandidateHandler::specialized("com.example")]
        );
    }

    #[test]
    fn static_resolver_loads_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("handlers.json");
        fs::write(
            &path,
            r#"{"entries":[{"scheme":"tel","handler":{"package":"com.dialer","kind":"specialized"}}],"default_sms_package":"com.sms"}"#,
        )
        .unwrap();
        let resolver = StaticResolver::load(&path).unwrap();
        assert_eq!(resolver.entries.len(), 1);
        assert_eq!(resolver.default_sms_package().as_deref(), Some("com.sms"));
        assert!(StaticResolver::load(&dir.path().join("missing.json")).is_err());
    }
}
