//! Configuration file support for iosbuild.
//!
//! This module provides support for `iosbuild.toml` configuration files that
//! allow users to persist project settings and avoid passing CLI flags
//! repeatedly.
//!
//! ## Configuration File Location
//!
//! Unless `--config` names a file, the configuration file is searched for in
//! the following order:
//! 1. Current working directory (`./iosbuild.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths in the file are relative to the directory containing it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! source = "."
//! build_dir = "build"
//! install_dir = "install"
//! output_dir = "frameworks"
//!
//! [build]
//! platforms = ["OS64", "SIMULATORARM64", "MAC_ARM64"]
//! config = "Release"
//! clean_up = true
//!
//! [options]
//! BUILD_SHARED_LIBS = false
//! CMAKE_CXX_STANDARD = 17
//!
//! [platform_options.MAC_ARM64]
//! DEPLOYMENT_TARGET = "13.0"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use iosbuild_sdk::{BuildOptions, Platform, ToolchainSource};
use serde::{Deserialize, Serialize};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "iosbuild.toml";

/// Root configuration structure for `iosbuild.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IosbuildConfig {
    /// Locations of the project and the work directories.
    pub project: ProjectConfig,

    /// How the project is built.
    pub build: BuildConfig,

    /// CMake cache options passed to every platform.
    pub options: toml::Table,

    /// CMake cache options for a single platform, keyed by platform name.
    pub platform_options: BTreeMap<Platform, toml::Table>,
}

/// Project locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Directory containing `CMakeLists.txt`.
    pub source: Option<PathBuf>,

    /// Parent directory of the per-platform build trees.
    ///
    /// Defaults to `build` in the working directory.
    pub build_dir: Option<PathBuf>,

    /// Parent directory of the per-platform install trees.
    ///
    /// Defaults to `install` in the working directory.
    pub install_dir: Option<PathBuf>,

    /// Where the XCFrameworks are written.
    ///
    /// Defaults to the working directory.
    pub output_dir: Option<PathBuf>,

    /// Path or URL of the ios-cmake toolchain file.
    pub toolchain: Option<String>,

    /// Where a downloaded toolchain file is saved.
    ///
    /// Defaults to the system temp directory.
    pub toolchain_dir: Option<PathBuf>,
}

/// Build behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Platforms to build, in order.
    pub platforms: Option<Vec<Platform>>,

    /// CMake generator (default: Xcode).
    pub generator: Option<String>,

    /// Build configuration passed to `--build` and `--install` (default: Release).
    pub config: Option<String>,

    /// CMake executable.
    pub cmake_command: Option<String>,

    /// xcodebuild executable.
    pub xcodebuild_command: Option<String>,

    /// Recreate the build and install directories before building.
    pub clean: Option<bool>,

    /// Remove the build and install directories after a successful run.
    pub clean_up: Option<bool>,

    /// Replace XCFrameworks that already exist.
    pub overwrite: Option<bool>,
}

/// Renders a TOML value as a CMake cache value.
///
/// Booleans become `ON`/`OFF`; strings and numbers are used as written.
pub fn cmake_value(value: &toml::Value) -> Result<String> {
    Ok(match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(true) => "ON".to_string(),
        toml::Value::Boolean(false) => "OFF".to_string(),
        other => bail!(
            "unsupported CMake option value {other}, use a string, number or boolean"
        ),
    })
}

impl IosbuildConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the specified file path.
    ///
    /// Relative paths in the file are resolved against the file's directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: IosbuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if let Some(base) = path.parent() {
            config.anchor(base);
        }
        Ok(config)
    }

    /// Attempts to find and load configuration from the current directory
    /// or any parent directory.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Attempts to find and load configuration starting from the specified
    /// directory, stopping at a repository root.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    fn anchor(&mut self, base: &Path) {
        let project = &mut self.project;
        for path in [
            &mut project.source,
            &mut project.build_dir,
            &mut project.install_dir,
            &mut project.output_dir,
            &mut project.toolchain_dir,
        ]
        .into_iter()
        .flatten()
        {
            *path = base.join(&*path);
        }

        if let Some(toolchain) = &mut project.toolchain
            && let ToolchainSource::Path(path) = ToolchainSource::parse(toolchain)
            && path.is_relative()
        {
            *toolchain = base.join(path).display().to_string();
        }
    }

    /// The `[options]` and `[platform_options]` tables as build options.
    pub fn build_options(&self) -> Result<BuildOptions> {
        let mut options = BuildOptions::new();
        for (key, value) in &self.options {
            options
                .insert_global(key.as_str(), cmake_value(value)?)
                .with_context(|| format!("invalid entry in [options]: {key}"))?;
        }
        for (platform, table) in &self.platform_options {
            for (key, value) in table {
                options
                    .insert_platform(*platform, key.as_str(), cmake_value(value)?)
                    .with_context(|| {
                        format!("invalid entry in [platform_options.{platform}]: {key}")
                    })?;
            }
        }
        Ok(options)
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// This includes helpful comments explaining each configuration option.
    pub fn generate_starter_toml() -> String {
        let platforms = Platform::DEFAULTS
            .iter()
            .map(|p| format!("\"{p}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let all = Platform::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"# iosbuild configuration file
# CLI flags override these settings when provided.
# Relative paths are relative to this file.

[project]
# Directory containing CMakeLists.txt
source = "."

# Parent directories for the per-platform build and install trees
# build_dir = "build"
# install_dir = "install"

# Where the XCFrameworks are written (default: working directory)
# output_dir = "frameworks"

# Path or URL of the ios-cmake toolchain file
# toolchain = "{toolchain}"

# Where a downloaded toolchain is saved (default: system temp directory)
# toolchain_dir = ".toolchain"

[build]
# Platforms to build, one of: {all}
platforms = [{platforms}]

# CMake generator and build configuration
# generator = "Xcode"
# config = "Release"

# Executables, if not the ones on PATH
# cmake_command = "cmake"
# xcodebuild_command = "xcodebuild"

# Recreate the build and install directories before building
# clean = false

# Remove the build and install directories after a successful run
# clean_up = false

# Replace XCFrameworks that already exist
# overwrite = false

# CMake options for every platform (booleans become ON/OFF)
[options]
# BUILD_SHARED_LIBS = false

# CMake options for a single platform
# [platform_options.MAC_ARM64]
# DEPLOYMENT_TARGET = "13.0"
"#,
            toolchain = iosbuild_sdk::DEFAULT_TOOLCHAIN_URL,
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<IosbuildConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a new resolver by discovering and loading configuration.
    ///
    /// If no config file is found, the resolver will use default values
    /// which can be overridden by CLI arguments.
    pub fn new() -> Result<Self> {
        match IosbuildConfig::discover()? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Creates a resolver from an explicitly named config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = IosbuildConfig::load_from_file(path)?;
        Ok(Self {
            config: Some(config),
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Build options from the config file, or none.
    pub fn options(&self) -> Result<BuildOptions> {
        match &self.config {
            Some(config) => config.build_options(),
            None => Ok(BuildOptions::new()),
        }
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Arguments
    ///
    /// * `cli_value` - Value from CLI argument (None if not provided)
    /// * `config_getter` - Function to get value from config
    /// * `default` - Default value if neither CLI nor config provides a value
    ///
    /// # Returns
    ///
    /// The resolved value, preferring CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&IosbuildConfig) -> Option<T>,
    {
        self.resolve_optional(cli_value, config_getter)
            .unwrap_or(default)
    }

    /// Like [`ConfigResolver::resolve`] for settings without a default.
    pub fn resolve_optional<T, F>(&self, cli_value: Option<T>, config_getter: F) -> Option<T>
    where
        F: FnOnce(&IosbuildConfig) -> Option<T>,
    {
        cli_value.or_else(|| self.config.as_ref().and_then(config_getter))
    }
}
