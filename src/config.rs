use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::urls::PAIRING_CODE_PATTERN;

/// Settings snapshot consumed by the decision engine.
///
/// The interceptor hands the engine one clone per evaluation; changes made while an
/// evaluation runs only apply to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptSettings {
    /// Package identity of the browser embedding the engine.
    #[serde(default = "InterceptSettings::default_host_package")]
    pub host_package: String,
    #[serde(default = "InterceptSettings::default_store_package")]
    pub store_package: String,
    #[serde(default = "InterceptSettings::default_supervisor_package")]
    pub instant_apps_supervisor_package: String,
    /// Global kill switch for handing navigations to other apps.
    #[serde(default = "bool_true")]
    pub external_intents_enabled: bool,
    #[serde(default = "bool_true")]
    pub block_form_submit_without_gesture: bool,
    #[serde(default = "bool_true")]
    pub instant_apps_enabled: bool,
    #[serde(default = "bool_true")]
    pub webapk_launch_enabled: bool,
    /// Clobber with the web store page when a store link has no handler.
    #[serde(default = "bool_true")]
    pub web_store_fallback: bool,
    #[serde(default = "InterceptSettings::default_search_hosts")]
    pub search_referrer_hosts: Vec<String>,
    #[serde(default = "InterceptSettings::default_download_extensions")]
    pub internal_download_extensions: Vec<String>,
    #[serde(default = "InterceptSettings::default_denylist")]
    pub denylist_patterns: Vec<String>,
    /// Record every decision to the JSON-L audit log.
    #[serde(default)]
    pub audit_enabled: bool,
    /// Audit log location; setting it also enables auditing.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
    #[serde(default)]
    pub traces: TraceSettings,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            host_package: Self::default_host_package(),
            store_package: Self::default_store_package(),
            instant_apps_supervisor_package: Self::default_supervisor_package(),
            external_intents_enabled: true,
            block_form_submit_without_gesture: true,
            instant_apps_enabled: true,
            webapk_launch_enabled: true,
            web_store_fallback: true,
            search_referrer_hosts: Self::default_search_hosts(),
            internal_download_extensions: Self::default_download_extensions(),
            denylist_patterns: Self::default_denylist(),
            audit_enabled: false,
            audit_log: None,
            traces: TraceSettings::default(),
        }
    }
}

impl InterceptSettings {
    fn default_host_package() -> String {
        "org.launchgate.browser".into()
    }

    fn default_store_package() -> String {
        "com.android.vending".into()
    }

    fn default_supervisor_package() -> String {
        "com.google.android.instantapps.supervisor".into()
    }

    fn default_search_hosts() -> Vec<String> {
        vec!["google.com".into()]
    }

    fn default_download_extensions() -> Vec<String> {
        vec!["pdf".into()]
    }

    fn default_denylist() -> Vec<String> {
        vec![PAIRING_CODE_PATTERN.into()]
    }

    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            settings.save(path)?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }

    pub fn audit_active(&self) -> bool {
        self.audit_enabled || self.audit_log.is_some()
    }

    /// Resolve path to the JSON-L decision log.
    pub fn resolve_audit_log(&self) -> Result<PathBuf> {
        if let Some(path) = &self.audit_log {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("audit").join("decisions.jsonl"))
    }
}

/// Controls structured tracing export to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "TraceSettings::default_max_files")]
    pub max_files: usize,
}

impl TraceSettings {
    const fn default_max_files() -> usize {
        10
    }

    pub fn resolve_directory(&self) -> Result<PathBuf> {
        if let Some(path) = &self.directory {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("traces"))
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_files: Self::default_max_files(),
        }
    }
}

fn bool_true() -> bool {
    true
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "launchgate", "Launchgate")
        .context("Unable to resolve platform directories")
}

/// Compute the default path to the settings file.
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = project_dirs()?;
    Ok(dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_default_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = InterceptSettings::load_or_default(&path).unwrap();
        assert_eq!(settings, InterceptSettings::default());
        assert!(path.exists());

        let reread = InterceptSettings::load_or_default(&path).unwrap();
        assert_eq!(reread, settings);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"external_intents_enabled": false, "search_referrer_hosts": []}"#)
            .unwrap();
        let settings = InterceptSettings::load_or_default(&path).unwrap();
        assert!(!settings.external_intents_enabled);
        assert!(settings.search_referrer_hosts.is_empty());
        assert!(settings.block_form_submit_without_gesture);
        assert_eq!(settings.store_package, "com.android.vending");
        assert_eq!(settings.denylist_patterns, vec![PAIRING_CODE_PATTERN.to_string()]);
        assert_eq!(settings.traces.max_files, 10);
    }

    #[test]
    fn malformed_config_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let err = InterceptSettings::load_or_default(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Malformed config"));
    }

    #[test]
    fn default_paths_share_project_dirs() {
        let dirs = project_dirs().unwrap();
        assert_eq!(
            default_config_path().unwrap(),
            dirs.config_dir().join("config.json")
        );
        assert_eq!(
            InterceptSettings::default().resolve_audit_log().unwrap(),
            dirs.data_dir().join("audit").join("decisions.jsonl")
        );
    }

    #[test]
    fn explicit_audit_path_wins() {
        let settings = InterceptSettings {
            audit_log: Some(PathBuf::from("/tmp/decisions.jsonl")),
            ..InterceptSettings::default()
        };
        assert_eq!(
            settings.resolve_audit_log().unwrap(),
            PathBuf::from("/tmp/decisions.jsonl")
        );
    }
}
