//! Core types for iosbuild-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BuildError`] - Error types for every stage of the pipeline
//! - [`Platform`] - The Apple platforms understood by the iOS CMake toolchain
//! - [`BuildStage`] - The CMake step a platform build was in
//! - [`Verbosity`] - How much output the pipeline produces

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::options::OptionScope;

/// Convenience alias used throughout the SDK.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// Error types for iosbuild-sdk operations.
///
/// Variants fall into the categories the pipeline distinguishes:
///
/// - configuration errors (see [`BuildError::is_configuration`]), detected
///   before any subprocess runs or any directory is touched
/// - precondition errors, where expected filesystem state is missing
/// - missing tools
/// - external tool failures, wrapped per tool with the platform or library
///   that was being processed
///
/// # Example
///
/// ```
/// use iosbuild_sdk::{BuildError, BuildOptions};
///
/// let err = BuildOptions::parse_global(&["PLATFORM=custom".to_string()]).unwrap_err();
/// assert!(matches!(err, BuildError::ReservedOption { .. }));
/// assert!(err.is_configuration());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Invalid or inconsistent settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The platform list was empty.
    #[error("no platforms specified. Pass at least one platform with --platforms")]
    NoPlatformsSpecified,

    /// A platform name outside the supported set.
    #[error("unknown platform '{0}'. Run `iosbuild platforms` to list the supported names")]
    UnknownPlatform(String),

    /// A CMake option that is not of the form `KEY=VALUE`.
    #[error("invalid CMake option '{text}', specify CMake cache options as `-D OPTION=VALUE`")]
    InvalidOption {
        /// The text as supplied.
        text: String,
    },

    /// A CMake option that iosbuild sets itself.
    #[error("CMake option {key} is set by iosbuild and cannot be specified")]
    ReservedOption {
        /// The reserved key.
        key: String,
    },

    /// The same CMake option was given twice in one scope.
    #[error("CMake option {key} already specified for {scope}")]
    DuplicateOption {
        /// The repeated key.
        key: String,
        /// Global or the platform the option belongs to.
        scope: OptionScope,
    },

    /// The source path is not a CMake project.
    #[error("invalid CMake project, no such file: {}", .path.display())]
    InvalidProject {
        /// Path of the missing project file (or the missing directory).
        path: PathBuf,
    },

    /// A platform's install directory is missing after the build step.
    #[error("install directory for platform {platform} does not exist: {}", .path.display())]
    MissingPlatformDirectory {
        /// The platform being scanned.
        platform: Platform,
        /// The expected directory.
        path: PathBuf,
    },

    /// The executable could not be located.
    #[error("{tool} not found. Ensure it is installed and available on PATH")]
    ToolNotFound {
        /// Name or path of the executable.
        tool: String,
    },

    /// An external process exited unsuccessfully.
    #[error("`{command}` {}{}", describe_status(.status), describe_output(.stdout, .stderr))]
    ToolExecution {
        /// Name or path of the executable.
        tool: String,
        /// Full command line.
        command: String,
        /// Exit code, or `None` when the process was killed by a signal.
        status: Option<i32>,
        /// Captured standard output (empty when output was streamed).
        stdout: String,
        /// Captured standard error (empty when output was streamed).
        stderr: String,
    },

    /// A CMake step failed for one platform.
    #[error("CMake {stage} failed for platform {platform}")]
    CMake {
        /// Platform being built.
        platform: Platform,
        /// Step that failed.
        stage: BuildStage,
        /// Underlying runner error.
        #[source]
        source: Box<BuildError>,
    },

    /// xcodebuild failed to create the bundle for one library.
    #[error("xcodebuild failed to create the XCFramework for {library}")]
    Xcodebuild {
        /// Library being packaged.
        library: String,
        /// Underlying runner error.
        #[source]
        source: Box<BuildError>,
    },

    /// The bundle already exists and overwriting was not requested.
    #[error("output already exists: {}. Remove it or pass --overwrite", .path.display())]
    OutputAlreadyExists {
        /// The existing output path.
        path: PathBuf,
    },

    /// The toolchain file could not be found or downloaded.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// A filesystem operation failed.
    #[error("{context}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Wraps an I/O error with a description of the operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BuildError::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` for errors caused by invalid user input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BuildError::Config(_)
                | BuildError::NoPlatformsSpecified
                | BuildError::UnknownPlatform(_)
                | BuildError::InvalidOption { .. }
                | BuildError::ReservedOption { .. }
                | BuildError::DuplicateOption { .. }
        )
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn describe_output(stdout: &str, stderr: &str) -> String {
    let mut text = String::new();
    if !stdout.trim().is_empty() {
        text.push_str("\n\nStdout:\n");
        text.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        text.push_str("\n\nStderr:\n");
        text.push_str(stderr.trim_end());
    }
    text
}

/// Target platform, as understood by the `PLATFORM` variable of the
/// ios-cmake toolchain file.
///
/// The string form is the toolchain's upper-case name and doubles as the
/// name of the per-platform build and install subdirectories.
///
/// # Example
///
/// ```
/// use iosbuild_sdk::Platform;
///
/// let platform: Platform = "SIMULATORARM64".parse().unwrap();
/// assert_eq!(platform, Platform::SimulatorArm64);
/// assert_eq!(platform.as_str(), "SIMULATORARM64");
/// assert!("IPHONE".parse::<Platform>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    Os,
    Os64,
    Simulator,
    Simulator64,
    SimulatorArm64,
    VisionOs,
    SimulatorVisionOs,
    TvOs,
    SimulatorTvOs,
    SimulatorArm64TvOs,
    WatchOs,
    SimulatorWatchOs,
    SimulatorArm64WatchOs,
    Mac,
    MacArm64,
    MacUniversal,
    MacCatalyst,
    MacCatalystArm64,
    MacCatalystUniversal,
}

impl Platform {
    /// Every supported platform, in the toolchain's documentation order.
    pub const ALL: [Platform; 19] = [
        Platform::Os,
        Platform::Os64,
        Platform::Simulator,
        Platform::Simulator64,
        Platform::SimulatorArm64,
        Platform::VisionOs,
        Platform::SimulatorVisionOs,
        Platform::TvOs,
        Platform::SimulatorTvOs,
        Platform::SimulatorArm64TvOs,
        Platform::WatchOs,
        Platform::SimulatorWatchOs,
        Platform::SimulatorArm64WatchOs,
        Platform::Mac,
        Platform::MacArm64,
        Platform::MacUniversal,
        Platform::MacCatalyst,
        Platform::MacCatalystArm64,
        Platform::MacCatalystUniversal,
    ];

    /// Platforms built when none are requested: arm64 device, arm64
    /// simulator and Apple silicon macOS.
    pub const DEFAULTS: [Platform; 3] = [Platform::Os64, Platform::SimulatorArm64, Platform::MacArm64];

    /// Returns the toolchain name of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Os => "OS",
            Platform::Os64 => "OS64",
            Platform::Simulator => "SIMULATOR",
            Platform::Simulator64 => "SIMULATOR64",
            Platform::SimulatorArm64 => "SIMULATORARM64",
            Platform::VisionOs => "VISIONOS",
            Platform::SimulatorVisionOs => "SIMULATOR_VISIONOS",
            Platform::TvOs => "TVOS",
            Platform::SimulatorTvOs => "SIMULATOR_TVOS",
            Platform::SimulatorArm64TvOs => "SIMULATORARM64_TVOS",
            Platform::WatchOs => "WATCHOS",
            Platform::SimulatorWatchOs => "SIMULATOR_WATCHOS",
            Platform::SimulatorArm64WatchOs => "SIMULATORARM64_WATCHOS",
            Platform::Mac => "MAC",
            Platform::MacArm64 => "MAC_ARM64",
            Platform::MacUniversal => "MAC_UNIVERSAL",
            Platform::MacCatalyst => "MAC_CATALYST",
            Platform::MacCatalystArm64 => "MAC_CATALYST_ARM64",
            Platform::MacCatalystUniversal => "MAC_CATALYST_UNIVERSAL",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        Platform::ALL
            .iter()
            .copied()
            .find(|platform| platform.as_str() == s)
            .ok_or_else(|| BuildError::UnknownPlatform(s.to_string()))
    }
}

impl TryFrom<String> for Platform {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

/// The CMake step a platform build is in.
///
/// A platform moves through `Configure`, `Build` and `Install` in order; a
/// failure carries the step it happened in (see [`BuildError::CMake`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Configure,
    Build,
    Install,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Configure => "configure",
            BuildStage::Build => "build",
            BuildStage::Install => "install",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much output the pipeline produces.
///
/// At [`Verbosity::Verbose`] and above the output of CMake and xcodebuild is
/// streamed to the terminal; below that it is captured and only shown when
/// the tool fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    /// Maps a `-v` count to a verbosity level; `quiet` wins.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Verbose,
            (false, _) => Verbosity::Debug,
        }
    }

    /// Whether tool output should be streamed live.
    pub fn streams_tool_output(&self) -> bool {
        *self >= Verbosity::Verbose
    }
}
