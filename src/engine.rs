use tracing::{debug, info_span, warn};

use crate::chain::{ChainEffects, HandlerObservation};
use crate::config::InterceptSettings;
use crate::decision::{AsyncAction, AsyncActionKind, Decision, DecisionRule, Evaluation, Verdict};
use crate::descriptor::{
    EXTRA_APPLICATION_ID, EXTRA_CREATE_NEW_TAB, EXTRA_REFERRER, ExtraValue, LaunchDescriptor,
    parse_descriptor,
};
use crate::fallback::FallbackResolver;
use crate::handlers::{CandidateHandlerSet, CandidateResolver, ExternalLauncher, LaunchError};
use crate::navigation::{NavigationRequest, TransitionKind};
use crate::urls::{self, DenyList};

/// Embedder hooks consulted while evaluating a navigation.
pub trait NavigationDelegate {
    fn is_app_in_foreground(&self) -> bool {
        true
    }

    /// An in-browser flow (e.g. assisted fill) wants to handle this navigation itself.
    fn claims_navigation(&self, _request: &NavigationRequest<'_>) -> bool {
        false
    }

    fn needs_file_access_grant(&self, _url: &str) -> bool {
        false
    }

    fn should_disable_external_intents(&self, _url: &str) -> bool {
        false
    }

    /// Descriptor for an instant app that can serve `request`, if one exists.
    fn instant_app_handoff(
        &self,
        _request: &NavigationRequest<'_>,
        _from_search: bool,
    ) -> Option<LaunchDescriptor> {
        None
    }
}

/// Delegate for embedders without any of the optional flows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDelegate;

impl NavigationDelegate for DefaultDelegate {}

/// The ordered rule chain. Stateless; every input arrives through the request or the
/// collaborators it was built with.
pub struct DecisionEngine<'a> {
    settings: &'a InterceptSettings,
    denylist: &'a DenyList,
    resolver: &'a dyn CandidateResolver,
    launcher: &'a dyn ExternalLauncher,
    delegate: &'a dyn NavigationDelegate,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(
        settings: &'a InterceptSettings,
        denylist: &'a DenyList,
        resolver: &'a dyn CandidateResolver,
        launcher: &'a dyn ExternalLauncher,
        delegate: &'a dyn NavigationDelegate,
    ) -> Self {
        Self {
            settings,
            denylist,
            resolver,
            launcher,
            delegate,
        }
    }

    fn fallback(&self) -> FallbackResolver<'a> {
        FallbackResolver::new(self.settings, self.resolver, self.launcher)
    }

    pub fn evaluate(&self, request: &NavigationRequest<'_>) -> Evaluation {
        let span = info_span!(
            "intercept.evaluate",
            url = %request.url(),
            transition = %request.transition().kind,
            redirect = request.is_redirect(),
            chain = ?request.chain().map(|chain| chain.id()),
        );
        let _guard = span.enter();

        let mut effects = ChainEffects::default();
        let (mut decision, mut rule) = self.run_rules(request, &mut effects);

        if decision.is_no_override() && rule.permits_fallback() {
            if let Ok(descriptor) = parse_descriptor(request.url()) {
                if let Some(fallback) = descriptor.browser_fallback_url() {
                    (decision, rule) =
                        self.fallback()
                            .clobber(request, &descriptor, &fallback, &mut effects);
                }
            }
        }

        debug!(rule = ?rule, decision = decision.label(), "navigation evaluated");
        Evaluation::new(decision, rule).with_effects(effects)
    }

    fn run_rules(&self, request: &NavigationRequest<'_>, effects: &mut ChainEffects) -> Verdict {
        let url = request.url();
        let external = request.is_external_protocol();
        let transition = request.transition();
        let chain = request.chain();
        let gesture = request.has_user_gesture();
        let redirect = request.is_redirect();

        if (request.must_be_foreground() && !self.delegate.is_app_in_foreground())
            || request.is_background_tab()
            || transition.forward_back
        {
            return no_override(DecisionRule::BackgroundVeto);
        }

        if self.delegate.claims_navigation(request) {
            return no_override(DecisionRule::DelegatedFlow);
        }

        if !external && urls::has_download_extension(url, &self.settings.internal_download_extensions)
        {
            return no_override(DecisionRule::InternalDownload);
        }

        if urls::is_file_url(url) && self.delegate.needs_file_access_grant(url) {
            let action = AsyncAction::new(
                chain.map(|chain| chain.id()),
                AsyncActionKind::RequestFileAccess {
                    url: url.to_string(),
                },
            );
            return (Decision::AsyncAction(action), DecisionRule::FileAccessGate);
        }

        if !self.settings.external_intents_enabled
            || self.delegate.should_disable_external_intents(url)
        {
            return no_override(DecisionRule::ExternalIntentsDisabled);
        }

        let link = transition.kind == TransitionKind::Link;
        let link_not_from_intent = link && !transition.from_api;
        let incoming_intent_redirect = (link && transition.from_api && redirect)
            || chain.is_some_and(|chain| chain.is_on_effective_intent_redirect_chain());
        let typed_redirect_to_external =
            transition.kind == TransitionKind::Typed && redirect && external;
        let form_redirect = transition.kind == TransitionKind::FormSubmit && redirect;

        if form_redirect
            && !incoming_intent_redirect
            && !gesture
            && self.settings.block_form_submit_without_gesture
        {
            return no_override(DecisionRule::FormSubmitWithoutGesture);
        }
        if !typed_redirect_to_external {
            if !link_not_from_intent && !incoming_intent_redirect && !form_redirect {
                return no_override(DecisionRule::IneligibleTransition);
            }
            if chain.is_some_and(|chain| chain.is_user_typed()) {
                return no_override(DecisionRule::UserTypedChain);
            }
        }
        if !request.is_main_frame() && external && !gesture {
            return no_override(DecisionRule::SubframeWithoutGesture);
        }

        if request.referrer().is_some_and(urls::is_internal_scheme) && urls::is_web_url(url) {
            return no_override(DecisionRule::InternalReferrer);
        }
        if urls::is_wtai_make_call(url) {
            return match parse_descriptor(url) {
                Ok(mut dial) => {
                    dial.flags.new_task = true;
                    dispatch(self.launcher, dial, DecisionRule::WtaiMakeCall)
                }
                Err(_) => no_override(DecisionRule::MalformedDescriptor),
            };
        }
        if urls::is_wtai(url) {
            return no_override(DecisionRule::UnsupportedWtai);
        }
        if urls::is_internal_scheme(url) {
            return no_override(DecisionRule::InternalScheme);
        }
        if urls::is_content_scheme(url) {
            return no_override(DecisionRule::ContentScheme);
        }
        if self.denylist.matches(url) {
            return no_override(DecisionRule::Denylisted);
        }

        if request.is_incognito() && !external {
            return no_override(DecisionRule::IncognitoContainment);
        }

        let descriptor = match parse_descriptor(url) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                debug!(error = %err, "descriptor did not parse");
                return no_override(DecisionRule::MalformedDescriptor);
            }
        };
        let wrapped: Vec<&str> = std::iter::once(&descriptor)
            .chain(descriptor.selector.as_deref())
            .filter_map(|target| target.data.as_deref())
            .collect();
        if wrapped.iter().any(|data| urls::is_internal_scheme(data)) {
            return no_override(DecisionRule::InternalScheme);
        }
        if wrapped
            .iter()
            .any(|data| urls::is_content_scheme(data) || urls::is_file_url(data))
        {
            return no_override(DecisionRule::ContentScheme);
        }
        let sanitized = descriptor.sanitize();
        let handlers = CandidateHandlerSet::new(self.resolver.resolve(&sanitized));
        let target_host = descriptor
            .data_url()
            .and_then(|data| data.host_str().map(|host| host.to_ascii_lowercase()));
        effects.observed = Some(HandlerObservation {
            host: target_host.clone(),
            handlers: handlers.clone(),
        });

        if handlers.is_empty() {
            return self.fallback().without_handlers(request, &descriptor, effects);
        }

        let from_search =
            urls::is_search_referrer(request.referrer(), &self.settings.search_referrer_hosts);

        if !external && handlers.specialized_count() == 0 {
            if self.settings.instant_apps_enabled {
                if let Some(instant) = self.delegate.instant_app_handoff(request, from_search) {
                    return dispatch(self.launcher, instant, DecisionRule::InstantAppHandoff);
                }
            }
            return no_override(DecisionRule::NoSpecializedHandler);
        }

        if !external && self.same_host_as_previous(request, target_host.as_deref(), &handlers) {
            return no_override(DecisionRule::SameHostStable);
        }

        if descriptor.package.as_deref()
            == Some(self.settings.instant_apps_supervisor_package.as_str())
            && !from_search
        {
            return no_override(DecisionRule::DirectInstantAppVeto);
        }

        if let Some(chain) = chain {
            if chain.is_vetoed() {
                return no_override(DecisionRule::ChainVetoed);
            }
            if redirect && chain.should_stay_in_app(external) {
                return no_override(DecisionRule::StayInApp);
            }
            if redirect && chain.is_custom_tab() && !chain.has_new_handlers(&handlers) {
                return no_override(DecisionRule::CustomTabNoNewHandlers);
            }
            if incoming_intent_redirect && !chain.has_new_handlers(&handlers) {
                return no_override(DecisionRule::IntentRedirectNoNewHandlers);
            }
        }

        let mut target = sanitized.into_inner();
        if handlers.specialized_count() == 1 {
            if let Some(webapk) = handlers.first_webapk() {
                if request.native_client_package() == Some(webapk) {
                    return no_override(DecisionRule::WebApkAlreadyDisplayed);
                }
                if self.settings.webapk_launch_enabled {
                    target.package = Some(webapk.to_string());
                }
            }
        }

        self.prepare_dispatch(request, &mut target, &handlers, from_search);

        if request.is_incognito() && !self.host_handles(&target, &handlers) {
            let action = AsyncAction::new(
                chain.map(|chain| chain.id()),
                AsyncActionKind::ConfirmPrivateLaunch {
                    descriptor: target,
                    fallback_url: descriptor.browser_fallback_url().map(|url| url.to_string()),
                },
            );
            return (Decision::AsyncAction(action), DecisionRule::PrivateLaunchConfirmation);
        }

        let verdict = dispatch(self.launcher, target, DecisionRule::Launched);
        if matches!(verdict.0, Decision::LaunchExternal { .. }) {
            effects.veto_chain = true;
        }
        verdict
    }

    fn same_host_as_previous(
        &self,
        request: &NavigationRequest<'_>,
        host: Option<&str>,
        handlers: &CandidateHandlerSet,
    ) -> bool {
        let observed = request
            .chain()
            .and_then(|chain| chain.observed())
            .filter(|observed| observed.host.is_some());
        if let Some(observed) = observed {
            if urls::same_host(observed.host.as_deref(), host)
                && handlers.is_subset_of(&observed.handlers)
            {
                return true;
            }
        }

        let Some(referrer) = request.referrer().filter(|referrer| urls::is_web_url(referrer))
        else {
            return false;
        };
        if !urls::same_host(urls::host_of(referrer).as_deref(), host) {
            return false;
        }
        let previous = LaunchDescriptor::view(referrer).sanitize();
        let previous = CandidateHandlerSet::new(self.resolver.resolve(&previous));
        handlers.is_subset_of(&previous)
    }

    fn prepare_dispatch(
        &self,
        request: &NavigationRequest<'_>,
        target: &mut LaunchDescriptor,
        handlers: &CandidateHandlerSet,
        from_search: bool,
    ) {
        target.flags.new_task = true;
        target.put_extra(
            EXTRA_APPLICATION_ID,
            ExtraValue::String(self.settings.host_package.clone()),
        );
        if let Some(referrer) = request.referrer().filter(|referrer| urls::is_web_url(referrer)) {
            target.put_extra(EXTRA_REFERRER, ExtraValue::String(referrer.to_string()));
        }
        target.flags.user_gesture = request.has_user_gesture();
        target.flags.incognito = request.is_incognito();
        if request.open_in_new_tab() {
            target.put_extra(EXTRA_CREATE_NEW_TAB, ExtraValue::Bool(true));
        }
        target.flags.proxy_for_instant_apps = from_search && handlers.instant_app().is_some();

        if target.package.is_none() && target.is_sms_send() {
            if let Some(sms) = self
                .resolver
                .default_sms_package()
                .filter(|sms| handlers.contains_package(sms))
            {
                target.package = Some(sms);
            }
        }
    }

    fn host_handles(&self, target: &LaunchDescriptor, handlers: &CandidateHandlerSet) -> bool {
        let host = self.settings.host_package.as_str();
        target.package.as_deref() == Some(host) || handlers.only_package(host)
    }
}

fn no_override(rule: DecisionRule) -> Verdict {
    (Decision::NoOverride, rule)
}

/// Hand `descriptor` to the launcher, degrading failures to `NoOverride`.
pub(crate) fn dispatch(
    launcher: &dyn ExternalLauncher,
    descriptor: LaunchDescriptor,
    success: DecisionRule,
) -> Verdict {
    match launcher.launch(&descriptor) {
        Ok(()) => (Decision::launch(descriptor), success),
        Err(LaunchError::HandlerNotFound(reason)) => {
            debug!(reason = %reason, "handler vanished before launch");
            no_override(DecisionRule::HandlerVanished)
        }
        Err(err) => {
            warn!(error = %err, descriptor = %descriptor, "external launch failed");
            no_override(DecisionRule::LaunchFailed)
        }
    }
}
