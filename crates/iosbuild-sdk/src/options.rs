//! CMake cache options passed at the configure step.
//!
//! Options come in two scopes: global options apply to every platform and
//! platform options apply to a single [`Platform`]. Both are rendered as
//! `-DKEY=VALUE` flags, global options first. A key present in both scopes
//! produces two flags and CMake's own last-flag-wins rule decides.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::{BuildError, Platform, Result};

/// Keys iosbuild sets itself at the configure step.
pub const RESERVED_OPTIONS: [&str; 3] = ["CMAKE_TOOLCHAIN_FILE", "PLATFORM", "CMAKE_INSTALL_PREFIX"];

/// Which scope an option was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    Global,
    Platform(Platform),
}

impl fmt::Display for OptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionScope::Global => f.write_str("all platforms"),
            OptionScope::Platform(platform) => write!(f, "platform {platform}"),
        }
    }
}

/// Splits `KEY=VALUE` into its trimmed parts.
///
/// Exactly one `=` is allowed and neither side may be empty.
pub fn parse_option(text: &str) -> Result<(String, String)> {
    let invalid = || BuildError::InvalidOption {
        text: text.to_string(),
    };
    let mut parts = text.split('=');
    let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return Err(invalid());
    }
    Ok((key.to_string(), value.to_string()))
}

/// An ordered set of options for one scope, with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    entries: Vec<(String, String)>,
}

impl OptionSet {
    /// Adds an option, rejecting reserved and repeated keys.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        scope: OptionScope,
    ) -> Result<()> {
        let key = key.into();
        if RESERVED_OPTIONS.contains(&key.as_str()) {
            return Err(BuildError::ReservedOption { key });
        }
        if self.get(&key).is_some() {
            return Err(BuildError::DuplicateOption { key, scope });
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    /// Adds an option, replacing the value of an existing key in place.
    ///
    /// Used when layering command-line options over a config file.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if RESERVED_OPTIONS.contains(&key.as_str()) {
            return Err(BuildError::ReservedOption { key });
        }
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders the options as `-DKEY=VALUE` flags in insertion order.
    pub fn defines(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|(k, v)| format!("-D{k}={v}"))
    }
}

/// Global and per-platform CMake options.
///
/// # Example
///
/// ```
/// use iosbuild_sdk::{BuildOptions, Platform};
///
/// let mut options = BuildOptions::parse_global(&["BUILD_TESTING=OFF".to_string()]).unwrap();
/// options.insert_platform(Platform::Os64, "ENABLE_BITCODE", "ON").unwrap();
///
/// assert_eq!(
///     options.defines_for(Platform::Os64),
///     vec!["-DBUILD_TESTING=OFF", "-DENABLE_BITCODE=ON"]
/// );
/// assert_eq!(options.defines_for(Platform::MacArm64), vec!["-DBUILD_TESTING=OFF"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    global: OptionSet,
    platforms: BTreeMap<Platform, OptionSet>,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds global options from `KEY=VALUE` strings, as given to `-D`.
    pub fn parse_global(specs: &[String]) -> Result<Self> {
        let mut options = Self::new();
        for spec in specs {
            let (key, value) = parse_option(spec)?;
            options.insert_global(key, value)?;
        }
        Ok(options)
    }

    pub fn insert_global(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.global.insert(key, value, OptionScope::Global)
    }

    pub fn insert_platform(
        &mut self,
        platform: Platform,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.platforms
            .entry(platform)
            .or_default()
            .insert(key, value, OptionScope::Platform(platform))
    }

    /// Sets a global option, overriding any earlier value for the key.
    pub fn override_global(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.global.set(key, value)
    }

    /// Drops every platform-specific option.
    pub fn clear_platform_options(&mut self) {
        self.platforms.clear();
    }

    pub fn global(&self) -> &OptionSet {
        &self.global
    }

    pub fn platform(&self, platform: Platform) -> Option<&OptionSet> {
        self.platforms.get(&platform)
    }

    /// Platforms that have at least one specific option.
    pub fn configured_platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.platforms
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(platform, _)| *platform)
    }

    /// The `-D` flags for one platform: global options, then that platform's.
    pub fn defines_for(&self, platform: Platform) -> Vec<String> {
        let mut defines: Vec<String> = self.global.defines().collect();
        if let Some(specific) = self.platforms.get(&platform) {
            defines.extend(specific.defines());
        }
        defines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_option_accepts_key_value() {
        assert_eq!(
            parse_option("VALUE1=value1").unwrap(),
            ("VALUE1".to_string(), "value1".to_string())
        );
        assert_eq!(
            parse_option(" NAME = ME ").unwrap(),
            ("NAME".to_string(), "ME".to_string())
        );
    }

    #[test]
    fn parse_option_rejects_malformed_text() {
        for text in ["=", "NAME=", "", "=ME", "NAME-ME", "NAME=ME=YOU"] {
            let err = parse_option(text).unwrap_err();
            assert!(
                matches!(err, BuildError::InvalidOption { text: ref t } if t == text),
                "expected InvalidOption for {text:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn reserved_keys_are_rejected_in_both_scopes() {
        for key in RESERVED_OPTIONS {
            let err = BuildOptions::parse_global(&[format!("{key}=x")]).unwrap_err();
            assert!(matches!(err, BuildError::ReservedOption { key: ref k } if k == key));

            let mut options = BuildOptions::new();
            let err = options.insert_platform(Platform::Os64, key, "x").unwrap_err();
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn duplicate_keys_in_one_scope_are_rejected() {
        let err = BuildOptions::parse_global(&["OPTION1=value1".into(), "OPTION1=value2".into()])
            .unwrap_err();
        assert_eq!(err.to_string(), "CMake option OPTION1 already specified for all platforms");

        let mut options = BuildOptions::new();
        options.insert_platform(Platform::TvOs, "A", "1").unwrap();
        let err = options.insert_platform(Platform::TvOs, "A", "2").unwrap_err();
        assert!(matches!(
            err,
            BuildError::DuplicateOption { scope: OptionScope::Platform(Platform::TvOs), .. }
        ));
    }

    #[test]
    fn same_key_in_both_scopes_emits_both_flags() {
        let mut options = BuildOptions::parse_global(&["FOO=global".into()]).unwrap();
        options.insert_platform(Platform::Os64, "FOO", "specific").unwrap();
        assert_eq!(
            options.defines_for(Platform::Os64),
            vec!["-DFOO=global", "-DFOO=specific"]
        );
    }

    #[test]
    fn defines_preserve_insertion_order() {
        let options = BuildOptions::parse_global(&[
            "ZETA=1".into(),
            "ALPHA=2".into(),
            "MID=3".into(),
        ])
        .unwrap();
        assert_eq!(
            options.defines_for(Platform::Mac),
            vec!["-DZETA=1", "-DALPHA=2", "-DMID=3"]
        );
    }

    #[test]
    fn override_global_replaces_in_place() {
        let mut options = BuildOptions::parse_global(&["A=1".into(), "B=2".into()]).unwrap();
        options.override_global("A", "3").unwrap();
        options.override_global("C", "4").unwrap();
        assert_eq!(options.defines_for(Platform::Os), vec!["-DA=3", "-DB=2", "-DC=4"]);
        assert!(options.override_global("PLATFORM", "OS").is_err());
    }
}
