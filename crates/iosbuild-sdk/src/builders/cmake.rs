//! CMake build automation
//!
//! This module configures, builds and installs a CMake project once per
//! Apple platform using the ios-cmake toolchain file. Each platform gets its
//! own build tree under the build root and installs into
//! `install_root/<PLATFORM>`.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::directory::ensure_directory;
use crate::options::BuildOptions;
use crate::runner::{CommandRunner, OutputPolicy};
use crate::types::{BuildError, BuildStage, Platform, Result};

/// File that marks a directory as a CMake project.
pub const CMAKE_PROJECT_FILE: &str = "CMakeLists.txt";

/// Default CMake generator; the toolchain needs Xcode to sign and lipo.
pub const DEFAULT_GENERATOR: &str = "Xcode";

/// Default build configuration.
pub const DEFAULT_CONFIG: &str = "Release";

/// Validates that `source` is a directory containing a `CMakeLists.txt`.
///
/// Whether the project file itself is valid is left to CMake.
pub fn validate_project_root(source: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(BuildError::InvalidProject {
            path: source.to_path_buf(),
        });
    }
    let project_file = source.join(CMAKE_PROJECT_FILE);
    if !project_file.is_file() {
        return Err(BuildError::InvalidProject { path: project_file });
    }
    Ok(())
}

/// Drives CMake for one or more platforms.
///
/// # Example
///
/// ```ignore
/// use iosbuild_sdk::builders::CMakeBuilder;
/// use iosbuild_sdk::{BuildOptions, Platform, ProcessRunner};
///
/// let runner = ProcessRunner::new();
/// let cmake = CMakeBuilder::new(&runner).config("Debug");
/// cmake.build_all(
///     Path::new("my-lib"),
///     &[Platform::Os64, Platform::SimulatorArm64],
///     Path::new("/tmp/build"),
///     Path::new("/tmp/install"),
///     Path::new("/tmp/ios.toolchain.cmake"),
///     &BuildOptions::new(),
/// )?;
/// ```
pub struct CMakeBuilder<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    command: String,
    generator: String,
    config: String,
    output: OutputPolicy,
    clean: bool,
}

impl<'a, R: CommandRunner + ?Sized> CMakeBuilder<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            command: "cmake".to_string(),
            generator: DEFAULT_GENERATOR.to_string(),
            config: DEFAULT_CONFIG.to_string(),
            output: OutputPolicy::Capture,
            clean: false,
        }
    }

    /// Sets the CMake executable (name on PATH or a path).
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = generator.into();
        self
    }

    /// Sets the configuration passed to `--build` and `--install`.
    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = config.into();
        self
    }

    pub fn output(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }

    /// Removes existing per-platform build trees before configuring.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn command_name(&self) -> &str {
        &self.command
    }

    /// Checks that CMake can be run, using `cmake --version`.
    pub fn check(&self) -> Result<()> {
        self.runner
            .run(&self.command, &["--version".to_string()], OutputPolicy::Capture)
    }

    /// Arguments for the configure step of one platform.
    ///
    /// Global options come first, then platform options, then the settings
    /// iosbuild controls.
    pub fn configure_args(
        &self,
        source: &Path,
        toolchain: &Path,
        platform: Platform,
        platform_dir: &Path,
        install_root: &Path,
        options: &BuildOptions,
    ) -> Vec<String> {
        let mut args = options.defines_for(platform);
        args.extend([
            format!("-G{}", self.generator),
            format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain.display()),
            format!("-DPLATFORM={platform}"),
            format!(
                "-DCMAKE_INSTALL_PREFIX={}",
                install_root.join(platform.as_str()).display()
            ),
            "-S".to_string(),
            path_arg(source),
            "-B".to_string(),
            path_arg(platform_dir),
        ]);
        args
    }

    pub fn build_args(&self, platform_dir: &Path) -> Vec<String> {
        vec![
            "--build".to_string(),
            path_arg(platform_dir),
            "--config".to_string(),
            self.config.clone(),
        ]
    }

    pub fn install_args(&self, platform_dir: &Path) -> Vec<String> {
        vec![
            "--install".to_string(),
            path_arg(platform_dir),
            "--config".to_string(),
            self.config.clone(),
        ]
    }

    /// Configures, builds and installs one platform.
    ///
    /// Returns the install prefix, `install_root/<PLATFORM>`.
    pub fn build_platform(
        &self,
        source: &Path,
        platform: Platform,
        build_root: &Path,
        install_root: &Path,
        toolchain: &Path,
        options: &BuildOptions,
    ) -> Result<PathBuf> {
        let platform_dir = ensure_directory(Path::new(platform.as_str()), Some(build_root), self.clean)?;

        let configure =
            self.configure_args(source, toolchain, platform, &platform_dir, install_root, options);
        self.step(platform, BuildStage::Configure, &configure)?;
        self.step(platform, BuildStage::Build, &self.build_args(&platform_dir))?;
        self.step(platform, BuildStage::Install, &self.install_args(&platform_dir))?;

        info!(%platform, "platform installed");
        Ok(install_root.join(platform.as_str()))
    }

    /// Builds every platform in order, stopping at the first failure.
    ///
    /// Platforms after a failing one are never started; output of platforms
    /// that already finished stays on disk. Returns the install prefixes in
    /// platform order.
    pub fn build_all(
        &self,
        source: &Path,
        platforms: &[Platform],
        build_root: &Path,
        install_root: &Path,
        toolchain: &Path,
        options: &BuildOptions,
    ) -> Result<Vec<PathBuf>> {
        if platforms.is_empty() {
            return Err(BuildError::NoPlatformsSpecified);
        }

        platforms
            .iter()
            .map(|&platform| {
                info!(%platform, "building platform");
                self.build_platform(source, platform, build_root, install_root, toolchain, options)
            })
            .collect()
    }

    fn step(&self, platform: Platform, stage: BuildStage, args: &[String]) -> Result<()> {
        info!(%platform, %stage, "running CMake");
        self.runner
            .run(&self.command, args, self.output)
            .map_err(|source| match source {
                // a missing executable is not a per-platform failure
                not_found @ BuildError::ToolNotFound { .. } => not_found,
                source => BuildError::CMake {
                    platform,
                    stage,
                    source: Box::new(source),
                },
            })
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
