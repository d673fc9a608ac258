use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::urls;

pub const CATEGORY_BROWSABLE: &str = "android.intent.category.BROWSABLE";

pub const EXTRA_BROWSER_FALLBACK_URL: &str = "browser_fallback_url";
pub const EXTRA_MARKET_REFERRER: &str = "market_referrer";
pub const EXTRA_APPLICATION_ID: &str = "com.android.browser.application_id";
pub const EXTRA_CREATE_NEW_TAB: &str = "create_new_tab";
pub const EXTRA_REFERRER: &str = "android.intent.extra.REFERRER";

const INTENT_FRAGMENT: &str = "#Intent;";
const INTENT_PREFIX: &str = "intent:";
const ANDROID_APP_PREFIX: &str = "android-app://";

/// Characters escaped when a descriptor is written back as an intent URI.
const INTENT_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'#')
    .add(b'%')
    .add(b';')
    .add(b'=')
    .add(b'&');

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("url has no scheme")]
    MissingScheme,
    #[error("intent uri is missing the `end` terminator")]
    MissingTerminator,
    #[error("malformed intent segment `{0}`")]
    MalformedSegment(String),
    #[error("invalid value for `{key}`: {value}")]
    InvalidValue { key: String, value: String },
    #[error("value is not valid percent-encoded utf-8: {0}")]
    InvalidEncoding(String),
    #[error("android-app uri does not name a package")]
    MissingPackage,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptorAction {
    View,
    Dial,
    Send,
    SendTo,
    Other(String),
}

impl DescriptorAction {
    pub fn from_platform(name: &str) -> Self {
        match name {
            "android.intent.action.VIEW" => DescriptorAction::View,
            "android.intent.action.DIAL" => DescriptorAction::Dial,
            "android.intent.action.SEND" => DescriptorAction::Send,
            "android.intent.action.SENDTO" => DescriptorAction::SendTo,
            other => DescriptorAction::Other(other.to_string()),
        }
    }

    pub fn as_platform(&self) -> &str {
        match self {
            DescriptorAction::View => "android.intent.action.VIEW",
            DescriptorAction::Dial => "android.intent.action.DIAL",
            DescriptorAction::Send => "android.intent.action.SEND",
            DescriptorAction::SendTo => "android.intent.action.SENDTO",
            DescriptorAction::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ExtraValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
}

impl ExtraValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtraValue::String(value) => Some(value),
            _ => None,
        }
    }

    fn encode(&self, key: &str) -> String {
        let key = utf8_percent_encode(key, INTENT_VALUE);
        match self {
            ExtraValue::String(value) => format!("S.{key}={}", utf8_percent_encode(value, INTENT_VALUE)),
            ExtraValue::Bool(value) => format!("B.{key}={value}"),
            ExtraValue::Int(value) => format!("l.{key}={value}"),
            ExtraValue::Float(value) => format!("d.{key}={value}"),
            ExtraValue::Char(value) => format!(
                "c.{key}={}",
                utf8_percent_encode(&value.to_string(), INTENT_VALUE)
            ),
        }
    }
}

/// Dispatch metadata attached while preparing a launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchFlags {
    /// Raw launch flags requested by the page; always cleared by sanitization.
    pub page_flags: u32,
    pub new_task: bool,
    pub user_gesture: bool,
    pub incognito: bool,
    pub proxy_for_instant_apps: bool,
}

/// Structured request to hand a navigation to a handler outside the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    pub action: DescriptorAction,
    pub data: Option<String>,
    pub package: Option<String>,
    pub component: Option<String>,
    pub mime_type: Option<String>,
    pub categories: BTreeSet<String>,
    pub extras: BTreeMap<String, ExtraValue>,
    pub selector: Option<Box<LaunchDescriptor>>,
    #[serde(default)]
    pub flags: LaunchFlags,
}

impl LaunchDescriptor {
    pub fn new(action: DescriptorAction, data: Option<String>) -> Self {
        Self {
            action,
            data,
            package: None,
            component: None,
            mime_type: None,
            categories: BTreeSet::new(),
            extras: BTreeMap::new(),
            selector: None,
            flags: LaunchFlags::default(),
        }
    }

    pub fn view(data: impl Into<String>) -> Self {
        Self::new(DescriptorAction::View, Some(data.into()))
    }

    /// Store listing for `package`, addressed to the store app itself.
    pub fn market_details(package: &str, referrer: &str, store_package: &str) -> Self {
        let mut data = format!("market://details?id={}", utf8_percent_encode(package, INTENT_VALUE));
        if !referrer.is_empty() {
            data.push_str("&referrer=");
            data.push_str(&utf8_percent_encode(referrer, INTENT_VALUE).to_string());
        }
        let mut descriptor = Self::view(data);
        descriptor.package = Some(store_package.to_string());
        descriptor.flags.new_task = true;
        descriptor
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn data_url(&self) -> Option<Url> {
        self.data.as_deref().and_then(|data| Url::parse(data).ok())
    }

    pub fn data_scheme(&self) -> Option<String> {
        self.data.as_deref().and_then(urls::scheme_of)
    }

    pub fn string_extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(ExtraValue::as_str)
    }

    pub fn put_extra(&mut self, key: impl Into<String>, value: ExtraValue) {
        self.extras.insert(key.into(), value);
    }

    /// The browser fallback extra, dropped when it is not a safely navigable URL.
    pub fn browser_fallback_url(&self) -> Option<Url> {
        self.string_extra(EXTRA_BROWSER_FALLBACK_URL)
            .and_then(urls::parse_safe_fallback)
    }

    pub fn market_referrer(&self, default_referrer: &str) -> String {
        self.string_extra(EXTRA_MARKET_REFERRER)
            .filter(|value| !value.is_empty())
            .unwrap_or(default_referrer)
            .to_string()
    }

    pub fn store_listing_package(&self) -> Option<String> {
        self.data_url().as_ref().and_then(urls::store_listing_package)
    }

    pub fn is_sms_send(&self) -> bool {
        matches!(self.action, DescriptorAction::SendTo | DescriptorAction::View)
            && matches!(
                self.data_scheme().as_deref(),
                Some("sms" | "smsto" | "mms" | "mmsto")
            )
    }

    /// Strips component targeting and page-chosen flags and forces the browsable category.
    pub fn sanitize(&self) -> SanitizedDescriptor {
        SanitizedDescriptor(self.sanitized_inner())
    }

    fn sanitized_inner(&self) -> LaunchDescriptor {
        let mut clean = self.clone();
        clean.component = None;
        clean.flags.page_flags = 0;
        clean.categories.insert(CATEGORY_BROWSABLE.to_string());
        clean.selector = self
            .selector
            .as_ref()
            .map(|selector| Box::new(selector.sanitized_inner()));
        clean
    }

    /// Serialise back into `intent:` URI form.
    pub fn to_intent_uri(&self) -> String {
        let mut out = String::from(INTENT_PREFIX);
        let mut scheme = None;
        if let Some(data) = &self.data {
            match data.split_once(':') {
                Some((data_scheme, rest)) => {
                    scheme = Some(data_scheme.to_string());
                    out.push_str(rest);
                }
                None => out.push_str(data),
            }
        }
        out.push_str(INTENT_FRAGMENT);
        self.encode_params(&mut out, scheme.as_deref());
        out.push_str("end");
        out
    }

    fn encode_params(&self, out: &mut String, scheme: Option<&str>) {
        if let Some(scheme) = scheme {
            out.push_str(&format!("scheme={scheme};"));
        }
        if self.action != DescriptorAction::View {
            out.push_str(&format!(
                "action={};",
                utf8_percent_encode(self.action.as_platform(), INTENT_VALUE)
            ));
        }
        for category in &self.categories {
            out.push_str(&format!(
                "category={};",
                utf8_percent_encode(category, INTENT_VALUE)
            ));
        }
        if let Some(mime) = &self.mime_type {
            out.push_str(&format!("type={};", utf8_percent_encode(mime, INTENT_VALUE)));
        }
        if self.flags.page_flags != 0 {
            out.push_str(&format!("launchFlags=0x{:x};", self.flags.page_flags));
        }
        if let Some(package) = &self.package {
            out.push_str(&format!(
                "package={};",
                utf8_percent_encode(package, INTENT_VALUE)
            ));
        }
        if let Some(component) = &self.component {
            out.push_str(&format!(
                "component={};",
                utf8_percent_encode(component, INTENT_VALUE)
            ));
        }
        for (key, value) in &self.extras {
            out.push_str(&value.encode(key));
            out.push(';');
        }
        if let Some(selector) = &self.selector {
            out.push_str("SEL;");
            let selector_scheme = selector.data_scheme();
            selector.encode_params(out, selector_scheme.as_deref());
        }
    }
}

impl fmt::Display for LaunchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_intent_uri())
    }
}

/// A descriptor that has been through [`LaunchDescriptor::sanitize`].
///
/// Handler resolution only accepts this type, so page content can never address a
/// component directly or reach a non-browsable handler.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedDescriptor(LaunchDescriptor);

impl SanitizedDescriptor {
    pub fn into_inner(self) -> LaunchDescriptor {
        self.0
    }
}

impl std::ops::Deref for SanitizedDescriptor {
    type Target = LaunchDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Parse a navigation URL into a launch descriptor.
pub fn parse_descriptor(raw: &str) -> Result<LaunchDescriptor, DescriptorError> {
    let raw = raw.trim();
    let scheme = urls::scheme_of(raw).ok_or(DescriptorError::MissingScheme)?;
    match scheme.as_str() {
        "intent" => parse_intent_uri(raw),
        "android-app" => parse_android_app_uri(raw),
        "wtai" if urls::is_wtai_make_call(raw) => {
            let number = &raw[urls::WTAI_MAKE_CALL_PREFIX.len()..];
            Ok(LaunchDescriptor::new(
                DescriptorAction::Dial,
                Some(format!("tel:{number}")),
            ))
        }
        "tel" => Ok(LaunchDescriptor::new(
            DescriptorAction::Dial,
            Some(raw.to_string()),
        )),
        "sms" | "smsto" | "mms" | "mmsto" | "mailto" => Ok(LaunchDescriptor::new(
            DescriptorAction::SendTo,
            Some(raw.to_string()),
        )),
        _ => Ok(LaunchDescriptor::view(raw)),
    }
}

fn parse_intent_uri(raw: &str) -> Result<LaunchDescriptor, DescriptorError> {
    let Some(fragment_at) = raw.find(INTENT_FRAGMENT) else {
        return Ok(LaunchDescriptor::view(raw));
    };
    let head = &raw[INTENT_PREFIX.len()..fragment_at];
    let body = &raw[fragment_at + INTENT_FRAGMENT.len()..];

    let mut descriptor = LaunchDescriptor::new(DescriptorAction::View, None);
    let scheme = parse_params(body, &mut descriptor)?;

    if !head.is_empty() {
        descriptor.data = Some(match scheme {
            Some(scheme) => format!("{scheme}:{head}"),
            None => head.to_string(),
        });
    }
    Ok(descriptor)
}

fn parse_android_app_uri(raw: &str) -> Result<LaunchDescriptor, DescriptorError> {
    let rest = raw
        .get(..ANDROID_APP_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(ANDROID_APP_PREFIX))
        .map(|_| &raw[ANDROID_APP_PREFIX.len()..])
        .ok_or(DescriptorError::MissingPackage)?;

    let (location, body) = match rest.find(INTENT_FRAGMENT) {
        Some(at) => (&rest[..at], Some(&rest[at + INTENT_FRAGMENT.len()..])),
        None => (rest, None),
    };
    let (path_part, query) = match location.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (location, None),
    };

    let mut segments = path_part.split('/');
    let package = segments
        .next()
        .filter(|package| !package.is_empty())
        .ok_or(DescriptorError::MissingPackage)?;

    let mut descriptor = LaunchDescriptor::new(DescriptorAction::View, None);
    if let Some(body) = body {
        parse_params(body, &mut descriptor)?;
    }
    descriptor.package = Some(decode(package)?);

    if let Some(scheme) = segments.next().filter(|scheme| !scheme.is_empty()) {
        let mut data = format!("{scheme}:");
        if let Some(host) = segments.next() {
            data.push_str("//");
            data.push_str(host);
            for segment in segments {
                data.push('/');
                data.push_str(segment);
            }
        }
        if let Some(query) = query {
            data.push('?');
            data.push_str(query);
        }
        descriptor.data = Some(data);
    }
    Ok(descriptor)
}

/// Parses `k=v;...;end` into `target`, returning the declared data scheme.
fn parse_params(
    body: &str,
    target: &mut LaunchDescriptor,
) -> Result<Option<String>, DescriptorError> {
    let mut scheme = None;
    let mut selector: Option<LaunchDescriptor> = None;
    let mut terminated = false;

    for segment in body.split(';') {
        if segment == "end" {
            terminated = true;
            break;
        }
        if segment.is_empty() {
            continue;
        }
        if segment == "SEL" {
            selector = Some(LaunchDescriptor::new(DescriptorAction::View, None));
            continue;
        }
        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| DescriptorError::MalformedSegment(segment.to_string()))?;
        let value = decode(value)?;
        if key == "scheme" {
            match selector.as_mut() {
                Some(selector) => selector.data = Some(format!("{value}:")),
                None => scheme = Some(value),
            }
            continue;
        }
        let current = match selector.as_mut() {
            Some(selector) => selector,
            None => &mut *target,
        };

        match key {
            "action" => current.action = DescriptorAction::from_platform(&value),
            "category" => {
                current.categories.insert(value);
            }
            "type" => current.mime_type = Some(value),
            "package" => current.package = Some(value),
            "component" => current.component = Some(value),
            "launchFlags" => current.flags.page_flags = parse_flags(&value)?,
            _ => {
                if let Some((prefix, name)) = key.split_once('.') {
                    let name = decode(name)?;
                    if let Some(extra) = parse_extra(prefix, &name, &value)? {
                        current.extras.insert(name, extra);
                    }
                }
            }
        }
    }

    if !terminated {
        return Err(DescriptorError::MissingTerminator);
    }
    if let Some(selector) = selector {
        target.selector = Some(Box::new(selector));
    }
    Ok(scheme)
}

fn parse_extra(prefix: &str, key: &str, value: &str) -> Result<Option<ExtraValue>, DescriptorError> {
    let invalid = || DescriptorError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let extra = match prefix {
        "S" => ExtraValue::String(value.to_string()),
        "B" => ExtraValue::Bool(value.eq_ignore_ascii_case("true")),
        "b" | "s" | "i" | "l" => ExtraValue::Int(value.parse().map_err(|_| invalid())?),
        "f" | "d" => ExtraValue::Float(value.parse().map_err(|_| invalid())?),
        "c" => ExtraValue::Char(value.chars().next().ok_or_else(invalid)?),
        _ => return Ok(None),
    };
    Ok(Some(extra))
}

fn parse_flags(value: &str) -> Result<u32, DescriptorError> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    };
    parsed.map_err(|_| DescriptorError::InvalidValue {
        key: "launchFlags".into(),
        value: value.to_string(),
    })
}

fn decode(value: &str) -> Result<String, DescriptorError> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DescriptorError::InvalidEncoding(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_intent_with_scheme_and_package() {
        let descriptor =
            parse_descriptor("intent://host/path#Intent;scheme=foo;package=com.example;end")
                .unwrap();
        assert_eq!(descriptor.action, DescriptorAction::View);
        assert_eq!(descriptor.data.as_deref(), Some("foo://host/path"));
        assert_eq!(descriptor.package.as_deref(), Some("com.example"));
    }

    #[test]
    fn parses_typed_extras_and_fallback() {
        let descriptor = parse_descriptor(
            "intent://scan/#Intent;scheme=zxing;S.browser_fallback_url=https%3A%2F%2Fexample.com%2Fok;B.flag=true;i.count=3;S.market_referrer=utm%3Dx;end",
        )
        .unwrap();
        assert_eq!(
            descriptor.browser_fallback_url().map(|url| url.to_string()),
            Some("https://example.com/ok".to_string())
        );
        assert_eq!(descriptor.extras.get("flag"), Some(&ExtraValue::Bool(true)));
        assert_eq!(descriptor.extras.get("count"), Some(&ExtraValue::Int(3)));
        assert_eq!(descriptor.market_referrer("org.host"), "utm=x");
    }

    #[test]
    fn unsafe_fallback_is_dropped() {
        let descriptor = parse_descriptor(
            "intent://scan/#Intent;scheme=zxing;S.browser_fallback_url=javascript%3Aalert(1);end",
        )
        .unwrap();
        assert!(descriptor.browser_fallback_url().is_none());
        assert_eq!(descriptor.market_referrer("org.host"), "org.host");
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let err = parse_descriptor("intent://x#Intent;scheme=foo").unwrap_err();
        assert_eq!(err, DescriptorError::MissingTerminator);
    }

    #[test]
    fn segment_without_value_is_an_error() {
        let err = parse_descriptor("intent://x#Intent;garbage;end").unwrap_err();
        assert!(matches!(err, DescriptorError::MalformedSegment(_)));
    }

    #[test]
    fn bad_launch_flags_are_rejected() {
        let err = parse_descriptor("intent:#Intent;launchFlags=zz;end").unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidValue { .. }));
        let ok = parse_descriptor("intent:#Intent;launchFlags=0x10000000;end").unwrap();
        assert_eq!(ok.flags.page_flags, 0x1000_0000);
        assert!(ok.data.is_none());
    }

    #[test]
    fn decimal_launch_flags_must_fit() {
        let ok = parse_descriptor("intent:#Intent;launchFlags=268435456;end").unwrap();
        assert_eq!(ok.flags.page_flags, 0x1000_0000);
        for raw in ["4294967296", "-1"] {
            let err = parse_descriptor(&format!("intent:#Intent;launchFlags={raw};end"))
                .unwrap_err();
            assert!(matches!(err, DescriptorError::InvalidValue { .. }));
        }
    }

    #[test]
    fn intent_without_fragment_is_plain_view() {
        let descriptor = parse_descriptor("intent://example").unwrap();
        assert_eq!(descriptor.data.as_deref(), Some("intent://example"));
    }

    #[test]
    fn sanitize_clears_component_and_adds_browsable() {
        let descriptor = parse_descriptor(
            "intent://x#Intent;scheme=foo;component=com.evil/.Secret;launchFlags=0x1;SEL;component=com.evil/.Other;end",
        )
        .unwrap();
        assert!(descriptor.component.is_some());
        let clean = descriptor.sanitize();
        assert!(clean.component.is_none());
        assert_eq!(clean.flags.page_flags, 0);
        assert!(clean.categories.contains(CATEGORY_BROWSABLE));
        let selector = clean.selector.as_ref().unwrap();
        assert!(selector.component.is_none());
        assert!(selector.categories.contains(CATEGORY_BROWSABLE));
    }

    #[test]
    fn android_app_uri_builds_data() {
        let descriptor =
            parse_descriptor("android-app://com.example.app/https/example.com/a/b?x=1").unwrap();
        assert_eq!(descriptor.package.as_deref(), Some("com.example.app"));
        assert_eq!(descriptor.data.as_deref(), Some("https://example.com/a/b?x=1"));

        let bare = parse_descriptor("android-app://com.example.app").unwrap();
        assert!(bare.data.is_none());
        assert_eq!(
            parse_descriptor("android-app:///https/x").unwrap_err(),
            DescriptorError::MissingPackage
        );
    }

    #[test]
    fn well_known_schemes_map_to_actions() {
        assert_eq!(
            parse_descriptor("tel:5551234").unwrap().action,
            DescriptorAction::Dial
        );
        let dial = parse_descriptor("wtai://wp/mc;5551234").unwrap();
        assert_eq!(dial.action, DescriptorAction::Dial);
        assert_eq!(dial.data.as_deref(), Some("tel:5551234"));
        let sms = parse_descriptor("sms:5551234").unwrap();
        assert_eq!(sms.action, DescriptorAction::SendTo);
        assert!(sms.is_sms_send());
        let market = parse_descriptor("market://details?id=com.example").unwrap();
        assert_eq!(market.store_listing_package().as_deref(), Some("com.example"));
    }

    #[test]
    fn intent_uri_serialisation_reparses() {
        let original = parse_descriptor(
            "intent://host/p#Intent;scheme=foo;package=com.example;S.note=a%3Bb;end",
        )
        .unwrap();
        let reparsed = parse_descriptor(&original.to_intent_uri()).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn market_details_targets_store() {
        let descriptor = LaunchDescriptor::market_details("com.example", "ref", "com.android.vending");
        assert_eq!(descriptor.package.as_deref(), Some("com.android.vending"));
        assert_eq!(
            descriptor.data.as_deref(),
            Some("market://details?id=com.example&referrer=ref")
        );
        assert_eq!(descriptor.store_listing_package().as_deref(), Some("com.example"));
    }
}
