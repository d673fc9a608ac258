use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::chain::RedirectChainState;
use crate::urls;

/// Core classification of how a navigation was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    Link,
    Typed,
    FormSubmit,
    Reload,
    AutoToplevel,
    Other,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Link => write!(f, "link"),
            TransitionKind::Typed => write!(f, "typed"),
            TransitionKind::FormSubmit => write!(f, "form-submit"),
            TransitionKind::Reload => write!(f, "reload"),
            TransitionKind::AutoToplevel => write!(f, "auto-toplevel"),
            TransitionKind::Other => write!(f, "other"),
        }
    }
}

/// Transition kind plus the qualifiers the rule chain cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageTransition {
    pub kind: TransitionKind,
    /// Navigation was started through the platform API, i.e. by another app's intent.
    #[serde(default)]
    pub from_api: bool,
    #[serde(default)]
    pub forward_back: bool,
}

impl PageTransition {
    pub const fn new(kind: TransitionKind) -> Self {
        Self {
            kind,
            from_api: false,
            forward_back: false,
        }
    }

    pub const fn link() -> Self {
        Self::new(TransitionKind::Link)
    }

    pub const fn typed() -> Self {
        Self::new(TransitionKind::Typed)
    }

    pub const fn form_submit() -> Self {
        Self::new(TransitionKind::FormSubmit)
    }

    /// A link navigation delivered by another application.
    pub const fn from_platform_api() -> Self {
        Self {
            kind: TransitionKind::Link,
            from_api: true,
            forward_back: false,
        }
    }

    pub const fn forward_back(mut self) -> Self {
        self.forward_back = true;
        self
    }

    pub const fn with_from_api(mut self) -> Self {
        self.from_api = true;
        self
    }
}

impl Default for PageTransition {
    fn default() -> Self {
        Self::link()
    }
}

/// A single navigation the browser is about to perform.
///
/// Built once by the embedder and never mutated during evaluation.
#[derive(Debug, Clone)]
pub struct NavigationRequest<'a> {
    url: String,
    referrer: Option<String>,
    transition: PageTransition,
    redirect: bool,
    user_gesture: bool,
    main_frame: bool,
    incognito: bool,
    must_be_foreground: bool,
    background_tab: bool,
    open_in_new_tab: bool,
    native_client_package: Option<String>,
    chain: Option<&'a RedirectChainState>,
}

impl<'a> NavigationRequest<'a> {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referrer: None,
            transition: PageTransition::default(),
            redirect: false,
            user_gesture: false,
            main_frame: true,
            incognito: false,
            must_be_foreground: false,
            background_tab: false,
            open_in_new_tab: false,
            native_client_package: None,
            chain: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_transition(mut self, transition: PageTransition) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn with_user_gesture(mut self, gesture: bool) -> Self {
        self.user_gesture = gesture;
        self
    }

    pub fn with_main_frame(mut self, main_frame: bool) -> Self {
        self.main_frame = main_frame;
        self
    }

    pub fn with_incognito(mut self, incognito: bool) -> Self {
        self.incognito = incognito;
        self
    }

    pub fn with_foreground_required(mut self, required: bool) -> Self {
        self.must_be_foreground = required;
        self
    }

    pub fn with_background_tab(mut self, background: bool) -> Self {
        self.background_tab = background;
        self
    }

    pub fn with_new_tab(mut self, new_tab: bool) -> Self {
        self.open_in_new_tab = new_tab;
        self
    }

    /// Package of the native wrapper (e.g. a WebAPK) currently displaying this page.
    pub fn with_native_client(mut self, package: impl Into<String>) -> Self {
        self.native_client_package = Some(package.into());
        self
    }

    pub fn with_chain<'b>(self, chain: Option<&'b RedirectChainState>) -> NavigationRequest<'b>
    where
        'a: 'b,
    {
        let request: NavigationRequest<'b> = self;
        NavigationRequest { chain, ..request }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    pub fn transition(&self) -> PageTransition {
        self.transition
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect
    }

    pub fn has_user_gesture(&self) -> bool {
        self.user_gesture
    }

    pub fn is_main_frame(&self) -> bool {
        self.main_frame
    }

    pub fn is_incognito(&self) -> bool {
        self.incognito
    }

    pub fn must_be_foreground(&self) -> bool {
        self.must_be_foreground
    }

    pub fn is_background_tab(&self) -> bool {
        self.background_tab
    }

    pub fn open_in_new_tab(&self) -> bool {
        self.open_in_new_tab
    }

    pub fn native_client_package(&self) -> Option<&str> {
        self.native_client_package.as_deref()
    }

    pub fn chain(&self) -> Option<&'a RedirectChainState> {
        self.chain
    }

    pub fn is_external_protocol(&self) -> bool {
        urls::is_external_protocol(&self.url)
    }
}
