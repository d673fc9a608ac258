use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::ChainEffects;
use crate::descriptor::LaunchDescriptor;

/// Outcome of evaluating one navigation. Exactly one is produced per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum Decision {
    LaunchExternal { descriptor: LaunchDescriptor },
    ClobberCurrentPage { url: String },
    AsyncAction(AsyncAction),
    NoOverride,
}

impl Decision {
    pub fn launch(descriptor: LaunchDescriptor) -> Self {
        Decision::LaunchExternal { descriptor }
    }

    pub fn clobber(url: impl Into<String>) -> Self {
        Decision::ClobberCurrentPage { url: url.into() }
    }

    pub fn is_no_override(&self) -> bool {
        matches!(self, Decision::NoOverride)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::LaunchExternal { .. } => "launch-external",
            Decision::ClobberCurrentPage { .. } => "clobber-current-page",
            Decision::AsyncAction(_) => "async-action",
            Decision::NoOverride => "no-override",
        }
    }

    /// Short human-readable target for logs: descriptor URI, clobber URL or action kind.
    pub fn target(&self) -> Option<String> {
        match self {
            Decision::LaunchExternal { descriptor } => Some(descriptor.to_intent_uri()),
            Decision::ClobberCurrentPage { url } => Some(url.clone()),
            Decision::AsyncAction(action) => Some(action.kind.label().to_string()),
            Decision::NoOverride => None,
        }
    }
}

/// A user-facing step has started; its result arrives later through the embedder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncAction {
    pub token: Uuid,
    /// Chain the action was issued under, used to drop stale continuations.
    pub chain: Option<Uuid>,
    pub kind: AsyncActionKind,
}

impl AsyncAction {
    pub fn new(chain: Option<Uuid>, kind: AsyncActionKind) -> Self {
        Self {
            token: Uuid::new_v4(),
            chain,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AsyncActionKind {
    /// One-time grant needed before a local file can be read.
    RequestFileAccess { url: String },
    /// Warn before a private session hands a descriptor to another app.
    ConfirmPrivateLaunch {
        descriptor: LaunchDescriptor,
        fallback_url: Option<String>,
    },
}

impl AsyncActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            AsyncActionKind::RequestFileAccess { .. } => "request-file-access",
            AsyncActionKind::ConfirmPrivateLaunch { .. } => "confirm-private-launch",
        }
    }
}

/// The rule that terminated an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionRule {
    BackgroundVeto,
    DelegatedFlow,
    InternalDownload,
    FileAccessGate,
    ExternalIntentsDisabled,
    IneligibleTransition,
    FormSubmitWithoutGesture,
    UserTypedChain,
    SubframeWithoutGesture,
    InternalReferrer,
    WtaiMakeCall,
    UnsupportedWtai,
    InternalScheme,
    ContentScheme,
    Denylisted,
    IncognitoContainment,
    MalformedDescriptor,
    NoHandlers,
    NoSpecializedHandler,
    InstantAppHandoff,
    SameHostStable,
    DirectInstantAppVeto,
    ChainVetoed,
    StayInApp,
    CustomTabNoNewHandlers,
    IntentRedirectNoNewHandlers,
    WebApkAlreadyDisplayed,
    PrivateLaunchConfirmation,
    HandlerVanished,
    LaunchFailed,
    Launched,
    FallbackClobber,
    FallbackWebApk,
    FallbackConsumed,
    FallbackSubframe,
    StoreLookup,
    StoreUnavailable,
    WebStoreListing,
}

impl DecisionRule {
    /// Whether a `NoOverride` from this rule may still be turned into a fallback clobber.
    ///
    /// Vetoes that run before the descriptor is even considered, and delegated flows,
    /// end evaluation for good.
    pub fn permits_fallback(self) -> bool {
        !matches!(
            self,
            DecisionRule::BackgroundVeto
                | DecisionRule::DelegatedFlow
                | DecisionRule::InternalDownload
                | DecisionRule::ExternalIntentsDisabled
                | DecisionRule::MalformedDescriptor
                | DecisionRule::FallbackConsumed
                | DecisionRule::FallbackSubframe
                | DecisionRule::StoreUnavailable
                | DecisionRule::NoHandlers
        )
    }
}

pub(crate) type Verdict = (Decision, DecisionRule);

/// Full result of one evaluation: the decision, why, and what the chain should record.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub rule: DecisionRule,
    pub effects: ChainEffects,
}

impl Evaluation {
    pub fn new(decision: Decision, rule: DecisionRule) -> Self {
        Self {
            decision,
            rule,
            effects: ChainEffects::default(),
        }
    }

    pub fn with_effects(mut self, effects: ChainEffects) -> Self {
        self.effects = effects;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_serialise_with_tag() {
        let json = serde_json::to_value(Decision::clobber("https://example.com/ok")).unwrap();
        assert_eq!(json["decision"], "clobber-current-page");
        assert_eq!(json["url"], "https://example.com/ok");

        let none = serde_json::to_value(Decision::NoOverride).unwrap();
        assert_eq!(none["decision"], "no-override");
    }

    #[test]
    fn async_actions_get_unique_tokens() {
        let kind = AsyncActionKind::RequestFileAccess {
            url: "file:///sdcard/a.html".into(),
        };
        let first = AsyncAction::new(None, kind.clone());
        let second = AsyncAction::new(None, kind);
        assert_ne!(first.token, second.token);
        assert_eq!(
            Decision::AsyncAction(first).target().as_deref(),
            Some("request-file-access")
        );
    }

    #[test]
    fn early_vetoes_block_fallback() {
        assert!(!DecisionRule::BackgroundVeto.permits_fallback());
        assert!(!DecisionRule::MalformedDescriptor.permits_fallback());
        assert!(DecisionRule::IncognitoContainment.permits_fallback());
        assert!(DecisionRule::HandlerVanished.permits_fallback());
    }
}
