use launchgate::decision::DecisionRule;
use launchgate::handlers::{CandidateHandler, HandlerKind, ResolverEntry, StaticResolver};
use launchgate::navigation::{NavigationRequest, PageTransition};

#[derive(Debug, Clone, Copy)]
pub struct HandlerRoute {
    pub scheme: &'static str,
    pub host: Option<&'static str>,
    pub package: &'static str,
    pub kind: HandlerKind,
}

#[derive(Debug, Clone)]
pub struct InterceptScenario {
    pub name: &'static str,
    pub description: &'static str,
    pub url: &'static str,
    pub referrer: Option<&'static str>,
    pub transition: PageTransition,
    pub redirect: bool,
    pub gesture: bool,
    pub incognito: bool,
    pub handlers: &'static [HandlerRoute],
    pub expected: DecisionRule,
}

impl InterceptScenario {
    pub fn request(&self) -> NavigationRequest<'static> {
        let mut request = NavigationRequest::new(self.url)
            .with_transition(self.transition)
            .with_redirect(self.redirect)
            .with_user_gesture(self.gesture)
            .with_incognito(self.incognito);
        if let Some(referrer) = self.referrer {
            request = request.with_referrer(referrer);
        }
        request
    }

    pub fn resolver(&self) -> StaticResolver {
        StaticResolver::new(
            self.handlers
                .iter()
                .map(|route| ResolverEntry {
                    scheme: Some(route.scheme.to_string()),
                    host: route.host.map(str::to_string),
                    handler: CandidateHandler::new(route.package, "", route.kind),
                })
                .collect(),
        )
    }
}

const FOO_APP: &[HandlerRoute] = &[HandlerRoute {
    scheme: "foo",
    host: None,
    package: "com.example",
    kind: HandlerKind::Specialized,
}];

const MAPS_AND_BROWSER: &[HandlerRoute] = &[
    HandlerRoute {
        scheme: "https",
        host: Some("maps.example.com"),
        package: "com.maps",
        kind: HandlerKind::Specialized,
    },
    HandlerRoute {
        scheme: "https",
        host: None,
        package: "org.launchgate.browser",
        kind: HandlerKind::Browser,
    },
];

const SCENARIOS: &[InterceptScenario] = &[
    InterceptScenario {
        name: "direct-intent",
        description: "Link to an intent URI with one specialized handler installed.",
        url: "intent://host/path#Intent;scheme=foo;package=com.example;end",
        referrer: None,
        transition: PageTransition::link(),
        redirect: false,
        gesture: true,
        incognito: false,
        handlers: FOO_APP,
        expected: DecisionRule::Launched,
    },
    InterceptScenario {
        name: "fallback-clobber",
        description: "Intent URI without handlers carrying a browser fallback URL.",
        url: "intent://scan/#Intent;scheme=zxing;S.browser_fallback_url=https%3A%2F%2Fexample.com%2Fok;end",
        referrer: None,
        transition: PageTransition::link(),
        redirect: false,
        gesture: true,
        incognito: false,
        handlers: &[],
        expected: DecisionRule::FallbackClobber,
    },
    InterceptScenario {
        name: "typed-external",
        description: "Typed navigation to a custom scheme that is not a redirect.",
        url: "foo://bar",
        referrer: None,
        transition: PageTransition::typed(),
        redirect: false,
        gesture: false,
        incognito: false,
        handlers: FOO_APP,
        expected: DecisionRule::IneligibleTransition,
    },
    InterceptScenario {
        name: "form-redirect",
        description: "Form submission redirecting to an intent without a user gesture.",
        url: "intent://host/path#Intent;scheme=foo;package=com.example;end",
        referrer: None,
        transition: PageTransition::form_submit(),
        redirect: true,
        gesture: false,
        incognito: false,
        handlers: FOO_APP,
        expected: DecisionRule::FormSubmitWithoutGesture,
    },
    InterceptScenario {
        name: "web-deeplink",
        description: "Web link claimed by a native maps app.",
        url: "https://maps.example.com/place/1",
        referrer: Some("https://www.google.com/search?q=maps"),
        transition: PageTransition::link(),
        redirect: false,
        gesture: true,
        incognito: false,
        handlers: MAPS_AND_BROWSER,
        expected: DecisionRule::Launched,
    },
    InterceptScenario {
        name: "incognito-web",
        description: "Private session web link that must stay in the browser.",
        url: "https://maps.example.com/place/1",
        referrer: None,
        transition: PageTransition::link(),
        redirect: false,
        gesture: true,
        incognito: true,
        handlers: MAPS_AND_BROWSER,
        expected: DecisionRule::IncognitoContainment,
    },
];

pub fn scenarios() -> &'static [InterceptScenario] {
    SCENARIOS
}

pub fn find_scenario(name: &str) -> Option<&'static InterceptScenario> {
    let needle = name.trim();
    if needle.is_empty() {
        return None;
    }
    SCENARIOS
        .iter()
        .find(|scenario| scenario.name.eq_ignore_ascii_case(needle))
}
