//! Plugin manifest parsing and validation.
//!
//! Parses the `plugin.toml` that declares the plugin's metadata, the oldest
//! host it supports and the icon shown in the host's plugin list.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// The manifest shipped with this crate.
pub const BUNDLED_MANIFEST: &str = include_str!("../plugin.toml");

/// Icon used when the manifest does not name one.
pub const DEFAULT_ICON: &str = "clipboard-check";

/// Plugin manifest parsed from `plugin.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub plugin: PluginMeta,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Plugin metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMeta {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub min_host_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub icon: Option<String>,
}

// ─── Validation helpers ─────────────────────────────────────────────

/// Validate a plugin name against `^[a-z][a-z0-9-]{1,63}$`.
fn validate_plugin_name(name: &str) -> Result<(), PluginError> {
    let len = name.len();
    if !(2..=64).contains(&len) {
        return Err(PluginError::InvalidManifest(format!(
            "plugin name must be 2-64 characters, got {len}"
        )));
    }

    let mut chars = name.chars();

    if let Some(first) = chars.next() {
        if !first.is_ascii_lowercase() {
            return Err(PluginError::InvalidManifest(format!(
                "plugin name must start with a lowercase letter, got '{first}'"
            )));
        }
    }

    for ch in chars {
        if !ch.is_ascii_lowercase() && !ch.is_ascii_digit() && ch != '-' {
            return Err(PluginError::InvalidManifest(format!(
                "plugin name contains invalid character '{ch}'"
            )));
        }
    }

    Ok(())
}

fn validate_semver(value: &str, field_name: &str) -> Result<(), PluginError> {
    semver::Version::parse(value).map_err(|_| {
        PluginError::InvalidManifest(format!("{field_name} is not valid semver: '{value}'"))
    })?;
    Ok(())
}

fn validate_length(value: &str, field_name: &str, max: usize) -> Result<(), PluginError> {
    let len = value.len();
    if len == 0 || len > max {
        return Err(PluginError::InvalidManifest(format!(
            "{field_name} must be 1-{max} characters, got {len}"
        )));
    }
    Ok(())
}

impl PluginManifest {
    /// Parse a plugin manifest from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, PluginError> {
        let manifest: PluginManifest = toml::from_str(toml_str)?;
        Ok(manifest)
    }

    /// Validate all fields of a parsed manifest.
    pub fn validate(&self) -> Result<(), PluginError> {
        validate_plugin_name(&self.plugin.name)?;
        validate_semver(&self.plugin.version, "plugin.version")?;
        validate_length(&self.plugin.description, "plugin.description", 500)?;

        if let Some(ref author) = self.plugin.author {
            validate_length(author, "plugin.author", 255)?;
        }
        if let Some(ref license) = self.plugin.license {
            validate_length(license, "plugin.license", 50)?;
        }
        if let Some(ref min_ver) = self.plugin.min_host_version {
            validate_semver(min_ver, "plugin.min_host_version")?;
        }

        if let Some(ref icon) = self.ui.icon {
            validate_length(icon, "ui.icon", 64)?;
            if icon.contains(char::is_whitespace) {
                return Err(PluginError::InvalidManifest(format!(
                    "ui.icon must not contain whitespace: '{icon}'"
                )));
            }
        }

        Ok(())
    }

    /// Parse and validate a plugin manifest from a TOML string.
    pub fn parse_and_validate(toml_str: &str) -> Result<Self, PluginError> {
        let manifest = Self::parse(toml_str)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read, parse and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse_and_validate(&raw)
    }

    /// The manifest compiled into this crate.
    pub fn bundled() -> Result<Self, PluginError> {
        Self::parse_and_validate(BUNDLED_MANIFEST)
    }

    /// Reject hosts older than `plugin.min_host_version`.
    pub fn check_host(&self, host_version: &str) -> Result<(), PluginError> {
        let Some(ref required) = self.plugin.min_host_version else {
            return Ok(());
        };
        let actual = semver::Version::parse(host_version)?;
        let minimum = semver::Version::parse(required)?;
        if actual < minimum {
            return Err(PluginError::IncompatibleHost {
                required: required.clone(),
                actual: host_version.to_string(),
            });
        }
        Ok(())
    }

    pub fn icon(&self) -> &str {
        self.ui.icon.as_deref().unwrap_or(DEFAULT_ICON)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_VALID_TOML: &str = r#"
[plugin]
name = "emuchievements"
version = "1.2.3"
description = "Achievements for emulated games"
author = "Jane Doe"
license = "GPL-3.0"
min_host_version = "3.0.0"

[ui]
icon = "trophy"
"#;

    const MINIMAL_VALID_TOML: &str = r#"
[plugin]
name = "ab"
version = "0.1.0"
description = "Minimal plugin"
"#;

    fn with_plugin(body: &str) -> PluginManifest {
        PluginManifest::parse(&format!("[plugin]\n{body}")).unwrap()
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn test_parse_valid_manifest() {
        let manifest = PluginManifest::parse_and_validate(FULL_VALID_TOML).unwrap();
        assert_eq!(manifest.plugin.name, "emuchievements");
        assert_eq!(manifest.plugin.version, "1.2.3");
        assert_eq!(manifest.plugin.author.as_deref(), Some("Jane Doe"));
        assert_eq!(manifest.plugin.min_host_version.as_deref(), Some("3.0.0"));
        assert_eq!(manifest.icon(), "trophy");
    }

    #[test]
    fn test_parse_minimal_manifest() {
        let manifest = PluginManifest::parse_and_validate(MINIMAL_VALID_TOML).unwrap();
        assert!(manifest.plugin.author.is_none());
        assert!(manifest.plugin.min_host_version.is_none());
        assert_eq!(manifest.icon(), DEFAULT_ICON);
    }

    #[test]
    fn test_bundled_manifest_is_valid() {
        let manifest = PluginManifest::bundled().unwrap();
        assert_eq!(manifest.plugin.name, "emuchievements");
    }

    #[test]
    fn test_parse_missing_description_fails() {
        let err = PluginManifest::parse("[plugin]\nname = \"ab\"\nversion = \"1.0.0\"\n")
            .unwrap_err();
        assert!(matches!(err, PluginError::TomlParse(_)));
    }

    // ── Field validation ────────────────────────────────────────────

    #[test]
    fn test_validate_invalid_name() {
        for name in ["a", "", "MyPlugin", "9lives", "emu_chievements"] {
            let manifest = with_plugin(&format!(
                "name = \"{name}\"\nversion = \"1.0.0\"\ndescription = \"d\""
            ));
            let err = manifest.validate().unwrap_err();
            assert!(matches!(err, PluginError::InvalidManifest(_)), "{name}");
        }
    }

    #[test]
    fn test_validate_name_max_length() {
        let name = format!("a{}", "b".repeat(63));
        let manifest = with_plugin(&format!(
            "name = \"{name}\"\nversion = \"1.0.0\"\ndescription = \"d\""
        ));
        assert!(manifest.validate().is_ok());

        let name = format!("a{}", "b".repeat(64));
        let manifest = with_plugin(&format!(
            "name = \"{name}\"\nversion = \"1.0.0\"\ndescription = \"d\""
        ));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_bad_versions() {
        let manifest = with_plugin("name = \"ab\"\nversion = \"1.0\"\ndescription = \"d\"");
        assert!(manifest.validate().unwrap_err().to_string().contains("plugin.version"));

        let manifest = with_plugin(
            "name = \"ab\"\nversion = \"1.0.0\"\ndescription = \"d\"\nmin_host_version = \"latest\"",
        );
        assert!(manifest
            .validate()
            .unwrap_err()
            .to_string()
            .contains("min_host_version"));
    }

    #[test]
    fn test_validate_empty_description() {
        let manifest = with_plugin("name = \"ab\"\nversion = \"1.0.0\"\ndescription = \"\"");
        assert!(manifest.validate().unwrap_err().to_string().contains("1-500"));
    }

    #[test]
    fn test_validate_icon_whitespace() {
        let manifest = PluginManifest::parse(
            "[plugin]\nname = \"ab\"\nversion = \"1.0.0\"\ndescription = \"d\"\n[ui]\nicon = \"two words\"",
        )
        .unwrap();
        assert!(manifest.validate().is_err());
    }

    // ── Host compatibility ──────────────────────────────────────────

    #[test]
    fn test_check_host() {
        let manifest = PluginManifest::parse(FULL_VALID_TOML).unwrap();
        assert!(manifest.check_host("3.0.0").is_ok());
        assert!(manifest.check_host("3.4.1").is_ok());
        assert!(matches!(
            manifest.check_host("2.9.9").unwrap_err(),
            PluginError::IncompatibleHost { .. }
        ));
        assert!(matches!(
            manifest.check_host("three").unwrap_err(),
            PluginError::Semver(_)
        ));

        let minimal = PluginManifest::parse(MINIMAL_VALID_TOML).unwrap();
        assert!(minimal.check_host("0.0.1").is_ok());
    }
}
