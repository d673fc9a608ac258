use tracing::debug;
use url::Url;

use crate::chain::ChainEffects;
use crate::config::InterceptSettings;
use crate::decision::{Decision, DecisionRule, Verdict};
use crate::descriptor::LaunchDescriptor;
use crate::engine::dispatch;
use crate::handlers::{CandidateHandlerSet, CandidateResolver, ExternalLauncher};
use crate::navigation::NavigationRequest;
use crate::urls;

/// Handles navigations whose descriptor cannot, or will not, be dispatched as-is.
pub struct FallbackResolver<'a> {
    settings: &'a InterceptSettings,
    resolver: &'a dyn CandidateResolver,
    launcher: &'a dyn ExternalLauncher,
}

impl<'a> FallbackResolver<'a> {
    pub fn new(
        settings: &'a InterceptSettings,
        resolver: &'a dyn CandidateResolver,
        launcher: &'a dyn ExternalLauncher,
    ) -> Self {
        Self {
            settings,
            resolver,
            launcher,
        }
    }

    /// No installed handler accepted the descriptor.
    pub fn without_handlers(
        &self,
        request: &NavigationRequest<'_>,
        descriptor: &LaunchDescriptor,
        effects: &mut ChainEffects,
    ) -> Verdict {
        if chain_vetoed(request, effects) {
            return (Decision::NoOverride, DecisionRule::FallbackConsumed);
        }
        if let Some(fallback) = descriptor.browser_fallback_url() {
            return self.clobber(request, descriptor, &fallback, effects);
        }
        if let Some(package) = descriptor.package.as_deref().filter(|p| !p.is_empty()) {
            let referrer = descriptor.market_referrer(&self.settings.host_package);
            return self.store_lookup(package, &referrer);
        }
        if self.settings.web_store_fallback && request.is_main_frame() {
            if let Some(listing) = descriptor
                .store_listing_package()
                .and_then(|package| urls::web_store_listing(&package))
            {
                effects.veto_chain = true;
                return (Decision::clobber(listing.as_str()), DecisionRule::WebStoreListing);
            }
        }
        (Decision::NoOverride, DecisionRule::NoHandlers)
    }

    /// Resolve the browser fallback URL, replacing the current page when nothing better applies.
    ///
    /// Issuing a clobber vetoes the rest of the chain so redirects from the fallback page
    /// cannot probe for installed apps again.
    pub fn clobber(
        &self,
        request: &NavigationRequest<'_>,
        descriptor: &LaunchDescriptor,
        fallback: &Url,
        effects: &mut ChainEffects,
    ) -> Verdict {
        if !request.is_main_frame() {
            return (Decision::NoOverride, DecisionRule::FallbackSubframe);
        }
        if chain_vetoed(request, effects) {
            return (Decision::NoOverride, DecisionRule::FallbackConsumed);
        }

        if let Some(package) = urls::store_listing_package(fallback) {
            let referrer = descriptor.market_referrer(&self.settings.host_package);
            return self.store_lookup(&package, &referrer);
        }

        if let Some(verdict) = self.launch_fallback_webapk(request, fallback) {
            return verdict;
        }

        debug!(fallback = %fallback, "clobbering current page with fallback url");
        effects.veto_chain = true;
        (Decision::clobber(fallback.as_str()), DecisionRule::FallbackClobber)
    }

    /// Open the store listing for `package` in the store app.
    pub fn store_lookup(&self, package: &str, referrer: &str) -> Verdict {
        let listing =
            LaunchDescriptor::market_details(package, referrer, &self.settings.store_package);
        match dispatch(self.launcher, listing, DecisionRule::StoreLookup) {
            (Decision::NoOverride, _) => (Decision::NoOverride, DecisionRule::StoreUnavailable),
            verdict => verdict,
        }
    }

    fn launch_fallback_webapk(
        &self,
        request: &NavigationRequest<'_>,
        fallback: &Url,
    ) -> Option<Verdict> {
        if !self.settings.webapk_launch_enabled {
            return None;
        }
        let view = LaunchDescriptor::view(fallback.as_str());
        let handlers = CandidateHandlerSet::new(self.resolver.resolve(&view.sanitize()));
        if handlers.specialized_count() != 1 {
            return None;
        }
        let webapk = handlers.first_webapk()?;
        if request.native_client_package() == Some(webapk) {
            return None;
        }
        let mut target = view.sanitize().into_inner().with_package(webapk);
        target.flags.new_task = true;
        match dispatch(self.launcher, target, DecisionRule::FallbackWebApk) {
            (Decision::NoOverride, _) => None,
            verdict => Some(verdict),
        }
    }
}

fn chain_vetoed(request: &NavigationRequest<'_>, effects: &ChainEffects) -> bool {
    effects.veto_chain || request.chain().is_some_and(|chain| chain.is_vetoed())
}
