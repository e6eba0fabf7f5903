//! End-to-end build orchestration.
//!
//! A [`Pipeline`] takes a validated [`BuildSettings`] through:
//!
//! 1. settings validation
//! 2. CMake and xcodebuild availability checks
//! 3. source project check
//! 4. toolchain acquisition
//! 5. build and install root setup
//! 6. per-platform CMake builds (fail-fast)
//! 7. library discovery and XCFramework packaging (per-library failures are
//!    collected, not fatal)
//! 8. optional removal of the build and install roots
//!
//! ## Example
//!
//! ```ignore
//! use iosbuild_sdk::{BuildSettings, Pipeline, ProcessRunner};
//!
//! let settings = BuildSettings::new("path/to/project");
//! let report = Pipeline::new(&settings, &ProcessRunner::new()).run()?;
//! for bundle in &report.packaging.created {
//!     println!("created {}", bundle.display());
//! }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::builders::cmake::{CMakeBuilder, DEFAULT_CONFIG, DEFAULT_GENERATOR, validate_project_root};
use crate::builders::xcodebuild::{PackagingReport, XcframeworkPackager};
use crate::directory::{
    DirectoryHandle, ensure_directory, remove_directory, resolve_directory, same_location,
};
use crate::options::BuildOptions;
use crate::runner::{CommandRunner, OutputPolicy, render_command};
use crate::search::{Collision, find_libraries};
use crate::toolchain::{TOOLCHAIN_FILE_NAME, ToolchainSource};
use crate::types::{BuildError, Platform, Result, Verbosity};

/// Default build root, relative to the working directory.
pub const DEFAULT_BUILD_DIR: &str = "build";
/// Default install root, relative to the working directory.
pub const DEFAULT_INSTALL_DIR: &str = "install";

/// Everything a pipeline run needs.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Directory containing `CMakeLists.txt`.
    pub source: PathBuf,
    /// Platforms to build, in order.
    pub platforms: Vec<Platform>,
    pub options: BuildOptions,
    pub toolchain: ToolchainSource,
    /// Where a downloaded toolchain is stored. Defaults to the system temp
    /// directory.
    pub toolchain_dir: Option<PathBuf>,
    pub build_dir: PathBuf,
    pub install_dir: PathBuf,
    /// Where bundles are written. Defaults to the working directory.
    pub output_dir: Option<PathBuf>,
    /// Prefix for relative build, install and output directories. Defaults to
    /// the current directory.
    pub working_dir: Option<PathBuf>,
    pub cmake_command: String,
    pub xcodebuild_command: String,
    pub generator: String,
    pub config: String,
    /// Recreate the build and install directories empty.
    pub clean: bool,
    /// Delete the build and install roots after a successful run.
    pub clean_up: bool,
    /// Replace existing bundles.
    pub overwrite: bool,
    pub verbosity: Verbosity,
}

impl BuildSettings {
    /// Settings with every default applied for the project at `source`.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            platforms: Platform::DEFAULTS.to_vec(),
            options: BuildOptions::new(),
            toolchain: ToolchainSource::default(),
            toolchain_dir: None,
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            output_dir: None,
            working_dir: None,
            cmake_command: "cmake".to_string(),
            xcodebuild_command: "xcodebuild".to_string(),
            generator: DEFAULT_GENERATOR.to_string(),
            config: DEFAULT_CONFIG.to_string(),
            clean: false,
            clean_up: false,
            overwrite: false,
            verbosity: Verbosity::default(),
        }
    }

    /// Checks the settings for configuration errors without touching the
    /// filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.platforms.is_empty() {
            return Err(BuildError::NoPlatformsSpecified);
        }
        let mut seen = BTreeSet::new();
        for platform in &self.platforms {
            if !seen.insert(*platform) {
                return Err(BuildError::Config(format!(
                    "platform {platform} is listed more than once"
                )));
            }
        }

        for platform in self.options.configured_platforms() {
            if !self.platforms.contains(&platform) {
                warn!(%platform, "options given for a platform that is not being built");
            }
        }

        for (what, value) in [
            ("CMake command", &self.cmake_command),
            ("xcodebuild command", &self.xcodebuild_command),
            ("CMake generator", &self.generator),
            ("build configuration", &self.config),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::Config(format!("{what} must not be empty")));
            }
        }
        Ok(())
    }

    /// How tool output is handled at the configured verbosity.
    pub fn output_policy(&self) -> OutputPolicy {
        if self.verbosity.streams_tool_output() {
            OutputPolicy::Stream
        } else {
            OutputPolicy::Capture
        }
    }

    fn prefix(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn build_root(&self) -> Result<PathBuf> {
        resolve_directory(&self.build_dir, self.prefix())
    }

    fn install_root(&self) -> Result<PathBuf> {
        resolve_directory(&self.install_dir, self.prefix())
    }

    fn output_root(&self) -> Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => resolve_directory(dir, self.prefix()),
            None => resolve_directory(self.prefix().unwrap_or(Path::new(".")), None),
        }
    }

    fn toolchain_download_dir(&self) -> PathBuf {
        self.toolchain_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn roots(&self) -> Result<(PathBuf, PathBuf)> {
        let build_root = self.build_root()?;
        let install_root = self.install_root()?;
        if same_location(&build_root, &install_root) {
            return Err(BuildError::Config(format!(
                "build directory and install directory are the same: {}",
                build_root.display()
            )));
        }
        Ok((build_root, install_root))
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct PipelineReport {
    pub platforms: Vec<Platform>,
    pub toolchain: PathBuf,
    pub build_root: PathBuf,
    pub install_root: PathBuf,
    pub output_dir: PathBuf,
    pub packaging: PackagingReport,
    /// Libraries found more than once within one platform tree.
    pub collisions: Vec<Collision>,
    /// Whether the build and install roots were removed.
    pub cleaned_up: bool,
}

/// The commands a run would execute, for `--dry-run`.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub build_root: PathBuf,
    pub install_root: PathBuf,
    pub output_dir: PathBuf,
    /// The toolchain source and where it would end up locally.
    pub toolchain: String,
    /// Rendered command lines in execution order.
    pub commands: Vec<String>,
}

/// Runs the full build for one set of settings.
pub struct Pipeline<'a, R: CommandRunner + ?Sized> {
    settings: &'a BuildSettings,
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> Pipeline<'a, R> {
    pub fn new(settings: &'a BuildSettings, runner: &'a R) -> Self {
        Self { settings, runner }
    }

    fn cmake(&self) -> CMakeBuilder<'a, R> {
        CMakeBuilder::new(self.runner)
            .command(&self.settings.cmake_command)
            .generator(&self.settings.generator)
            .config(&self.settings.config)
            .output(self.settings.output_policy())
            .clean(self.settings.clean)
    }

    fn packager(&self) -> XcframeworkPackager<'a, R> {
        XcframeworkPackager::new(self.runner)
            .command(&self.settings.xcodebuild_command)
            .output(self.settings.output_policy())
            .overwrite(self.settings.overwrite)
    }

    /// Runs every phase in order.
    ///
    /// Any error before packaging aborts the run. Packaging failures are
    /// returned in [`PipelineReport::packaging`].
    pub fn run(&self) -> Result<PipelineReport> {
        let settings = self.settings;
        settings.validate()?;

        let cmake = self.cmake();
        let packager = self.packager();
        cmake.check()?;
        packager.check()?;

        let source = resolve_directory(&settings.source, None)?;
        validate_project_root(&source)?;

        info!(toolchain = %settings.toolchain, "acquiring toolchain");
        let toolchain = settings.toolchain.acquire(&settings.toolchain_download_dir())?;

        let (build_root, install_root) = settings.roots()?;
        let build_dir = DirectoryHandle::acquire("build root", &build_root, None, settings.clean)?;
        let install_dir =
            DirectoryHandle::acquire("install root", &install_root, None, settings.clean)?;

        info!(platforms = settings.platforms.len(), "building platforms");
        cmake.build_all(
            &source,
            &settings.platforms,
            build_dir.path(),
            install_dir.path(),
            &toolchain,
            &settings.options,
        )?;

        let index = find_libraries(install_dir.path(), &settings.platforms)?;
        let output_dir = ensure_directory(&settings.output_root()?, None, false)?;
        info!(libraries = index.len(), output_dir = %output_dir.display(), "packaging");
        let packaging = packager.package_all(&index, &output_dir);

        let mut cleaned_up = false;
        if settings.clean_up {
            if packaging.is_success() {
                info!("removing build and install directories");
                remove_directory(build_dir.path())?;
                remove_directory(install_dir.path())?;
                cleaned_up = true;
            } else {
                warn!("packaging failed, keeping build and install directories");
            }
        }

        Ok(PipelineReport {
            platforms: settings.platforms.clone(),
            toolchain,
            build_root: build_dir.path().to_path_buf(),
            install_root: install_dir.path().to_path_buf(),
            output_dir,
            packaging,
            collisions: index.collisions().to_vec(),
            cleaned_up,
        })
    }

    /// Resolves directories and renders the CMake commands without running
    /// or creating anything.
    ///
    /// Packaging commands depend on what the builds install, so only the
    /// CMake steps are listed.
    pub fn plan(&self) -> Result<BuildPlan> {
        let settings = self.settings;
        settings.validate()?;

        let source = resolve_directory(&settings.source, None)?;
        let (build_root, install_root) = settings.roots()?;
        let output_dir = settings.output_root()?;

        let (toolchain, toolchain_path) = match &settings.toolchain {
            ToolchainSource::Path(path) => (path.display().to_string(), path.clone()),
            ToolchainSource::Url(url) => {
                let local = settings.toolchain_download_dir().join(TOOLCHAIN_FILE_NAME);
                (format!("{url} -> {}", local.display()), local)
            }
        };

        let cmake = self.cmake();
        let mut commands = Vec::new();
        for &platform in &settings.platforms {
            let platform_dir = build_root.join(platform.as_str());
            let steps = [
                cmake.configure_args(
                    &source,
                    &toolchain_path,
                    platform,
                    &platform_dir,
                    &install_root,
                    &settings.options,
                ),
                cmake.build_args(&platform_dir),
                cmake.install_args(&platform_dir),
            ];
            commands.extend(
                steps
                    .iter()
                    .map(|args| render_command(cmake.command_name(), args)),
            );
        }

        Ok(BuildPlan {
            build_root,
            install_root,
            output_dir,
            toolchain,
            commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    struct Workspace {
        temp: TempDir,
        settings: BuildSettings,
    }

    impl Workspace {
        fn path(&self, relative: &str) -> PathBuf {
            self.temp.path().join(relative)
        }
    }

    fn workspace(platforms: &[Platform]) -> Workspace {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("project");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("CMakeLists.txt"), "project(foo C)\n").unwrap();
        let toolchain = temp.path().join("ios.toolchain.cmake");
        fs::write(&toolchain, "").unwrap();

        let mut settings = BuildSettings::new(&source);
        settings.platforms = platforms.to_vec();
        settings.toolchain = ToolchainSource::Path(toolchain);
        settings.working_dir = Some(temp.path().to_path_buf());
        settings.output_dir = Some(PathBuf::from("out"));
        Workspace { temp, settings }
    }

    #[test]
    fn two_platforms_produce_one_bundle_and_clean_up() {
        let mut ws = workspace(&[Platform::Os64, Platform::SimulatorArm64]);
        ws.settings.clean_up = true;
        let runner = FakeRunner::new().installing(&["lib/libfoo.a"]);

        let report = Pipeline::new(&ws.settings, &runner).run().unwrap();

        let xcodebuild: Vec<_> = runner
            .calls_to("xcodebuild")
            .into_iter()
            .filter(|c| c.has_arg("-create-xcframework"))
            .collect();
        assert_eq!(xcodebuild.len(), 1);
        let call = &xcodebuild[0];
        let libraries: Vec<&str> = call
            .args
            .windows(2)
            .filter(|pair| pair[0] == "-library")
            .map(|pair| pair[1].as_str())
            .collect();
        assert_eq!(libraries.len(), 2);
        assert!(libraries[0].ends_with("OS64/lib/libfoo.a"));
        assert!(libraries[1].ends_with("SIMULATORARM64/lib/libfoo.a"));
        assert_eq!(
            call.value_after("-output"),
            Some(ws.path("out/libfoo.xcframework").to_str().unwrap())
        );

        assert_eq!(report.packaging.created, vec![ws.path("out/libfoo.xcframework")]);
        assert!(report.cleaned_up);
        assert!(!ws.path("build").exists());
        assert!(!ws.path("install").exists());
        assert!(ws.path("out/libfoo.xcframework").is_dir());
    }

    #[test]
    fn reserved_option_cannot_enter_settings() {
        let mut ws = workspace(&[Platform::Os64]);

        let err = ws.settings.options.insert_global("PLATFORM", "custom").unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, BuildError::ReservedOption { ref key } if key == "PLATFORM"));
        let err = ws
            .settings
            .options
            .insert_platform(Platform::Os64, "CMAKE_TOOLCHAIN_FILE", "x")
            .unwrap_err();
        assert!(matches!(err, BuildError::ReservedOption { .. }));
        assert!(ws.settings.options.defines_for(Platform::Os64).is_empty());
    }

    #[test]
    fn empty_platform_list_fails_before_tool_checks() {
        let ws = workspace(&[]);
        let runner = FakeRunner::new();

        let err = Pipeline::new(&ws.settings, &runner).run().unwrap_err();

        assert!(matches!(err, BuildError::NoPlatformsSpecified));
        assert!(runner.calls().is_empty());
        assert!(!ws.path("build").exists());
    }

    #[test]
    fn duplicate_platform_is_a_configuration_error() {
        let ws = workspace(&[Platform::Os64, Platform::Os64]);
        let err = ws.settings.validate().unwrap_err();
        assert!(matches!(err, BuildError::Config(ref msg) if msg.contains("OS64")));
    }

    #[test]
    fn identical_build_and_install_roots_are_rejected() {
        let mut ws = workspace(&[Platform::Os64]);
        ws.settings.build_dir = PathBuf::from("shared");
        ws.settings.install_dir = ws.path("shared");
        let runner = FakeRunner::new();

        let err = Pipeline::new(&ws.settings, &runner).run().unwrap_err();

        assert!(err.is_configuration());
        assert!(!runner.calls().iter().any(|c| c.has_arg("-B")));
        assert!(!ws.path("shared").exists());
    }

    #[test]
    fn roots_equal_after_parent_segments_are_rejected() {
        let mut ws = workspace(&[Platform::Os64]);
        ws.settings.build_dir = PathBuf::from("x/../shared");
        ws.settings.install_dir = PathBuf::from("shared");
        ws.settings.clean_up = true;
        let runner = FakeRunner::new().installing(&["lib/libfoo.a"]);

        let err = Pipeline::new(&ws.settings, &runner).run().unwrap_err();

        assert!(matches!(err, BuildError::Config(ref msg) if msg.contains("same")));
        assert!(!runner.calls().iter().any(|c| c.has_arg("-B")));
        assert!(!ws.path("shared").exists());
        assert!(!ws.path("x").exists());
    }

    #[test]
    fn existing_bundle_fails_one_library_and_keeps_directories() {
        let mut ws = workspace(&[Platform::Os64]);
        ws.settings.clean_up = true;
        fs::create_dir_all(ws.path("out/libbar.xcframework")).unwrap();
        let runner = FakeRunner::new().installing(&["lib/libbar.a", "lib/libfoo.a"]);

        let report = Pipeline::new(&ws.settings, &runner).run().unwrap();

        assert_eq!(report.packaging.created, vec![ws.path("out/libfoo.xcframework")]);
        assert_eq!(report.packaging.failures.len(), 1);
        assert_eq!(report.packaging.failures[0].library, "libbar");
        assert!(matches!(
            report.packaging.failures[0].error,
            BuildError::OutputAlreadyExists { .. }
        ));
        // cleanup is skipped when packaging failed
        assert!(!report.cleaned_up);
        assert!(ws.path("install/OS64/lib/libbar.a").is_file());
    }

    #[test]
    fn missing_tool_surfaces_before_directories_are_created() {
        let ws = workspace(&[Platform::Os64]);
        let runner = FakeRunner::new().missing("xcodebuild");

        let err = Pipeline::new(&ws.settings, &runner).run().unwrap_err();

        assert!(matches!(err, BuildError::ToolNotFound { ref tool } if tool == "xcodebuild"));
        assert!(!ws.path("build").exists());
        assert!(!ws.path("install").exists());
    }

    #[test]
    fn invalid_project_is_rejected_before_building() {
        let mut ws = workspace(&[Platform::Os64]);
        ws.settings.source = ws.path("not-a-project");
        let runner = FakeRunner::new();

        let err = Pipeline::new(&ws.settings, &runner).run().unwrap_err();

        assert!(matches!(err, BuildError::InvalidProject { .. }));
        assert!(!ws.path("build").exists());
    }

    #[test]
    fn build_failure_aborts_before_packaging() {
        let ws = workspace(&[Platform::Os64, Platform::MacArm64]);
        let runner = FakeRunner::new()
            .installing(&["libfoo.a"])
            .failing("cmake", "--build");

        let err = Pipeline::new(&ws.settings, &runner).run().unwrap_err();

        assert!(matches!(
            err,
            BuildError::CMake { platform: Platform::Os64, .. }
        ));
        assert!(
            !runner
                .calls_to("xcodebuild")
                .iter()
                .any(|c| c.has_arg("-create-xcframework"))
        );
        assert!(!ws.path("build/MAC_ARM64").exists());
    }

    #[test]
    fn global_and_platform_options_reach_configure() {
        let mut ws = workspace(&[Platform::Os64, Platform::MacArm64]);
        ws.settings.options = BuildOptions::parse_global(&["BUILD_TESTING=OFF".into()]).unwrap();
        ws.settings
            .options
            .insert_platform(Platform::MacArm64, "DEPLOYMENT_TARGET", "13.0")
            .unwrap();
        let runner = FakeRunner::new().installing(&["libfoo.a"]);

        Pipeline::new(&ws.settings, &runner).run().unwrap();

        let configures: Vec<_> = runner
            .calls_to("cmake")
            .into_iter()
            .filter(|c| c.has_arg("-B"))
            .collect();
        assert_eq!(configures.len(), 2);
        assert!(configures[0].has_arg("-DBUILD_TESTING=OFF"));
        assert!(!configures[0].has_arg("-DDEPLOYMENT_TARGET=13.0"));
        assert!(configures[1].has_arg("-DBUILD_TESTING=OFF"));
        assert!(configures[1].has_arg("-DDEPLOYMENT_TARGET=13.0"));
    }

    #[test]
    fn plan_lists_commands_without_side_effects() {
        let ws = workspace(&[Platform::Os64, Platform::SimulatorArm64]);
        let runner = FakeRunner::new();

        let plan = Pipeline::new(&ws.settings, &runner).plan().unwrap();

        assert_eq!(plan.commands.len(), 6);
        assert!(plan.commands[0].starts_with("cmake -GXcode"));
        assert!(plan.commands[0].contains("-DPLATFORM=OS64"));
        assert!(plan.commands[5].starts_with("cmake --install"));
        assert_eq!(plan.build_root, ws.path("build"));
        assert_eq!(plan.output_dir, ws.path("out"));
        assert!(runner.calls().is_empty());
        assert!(!ws.path("build").exists());
    }

    #[test]
    fn output_defaults_to_working_directory() {
        let mut ws = workspace(&[Platform::Os64]);
        ws.settings.output_dir = None;
        let runner = FakeRunner::new().installing(&["libfoo.a"]);

        let report = Pipeline::new(&ws.settings, &runner).run().unwrap();

        assert_eq!(report.output_dir, ws.temp.path());
        assert!(report.output_dir.join("libfoo.xcframework").is_dir());
    }

    #[test]
    fn verbose_runs_stream_tool_output() {
        let mut settings = BuildSettings::new("project");
        assert_eq!(settings.output_policy(), OutputPolicy::Capture);
        settings.verbosity = Verbosity::Verbose;
        assert_eq!(settings.output_policy(), OutputPolicy::Stream);
    }
}
