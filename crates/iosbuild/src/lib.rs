//! # iosbuild
//!
//! Command-line tool that builds a CMake project for Apple platforms and
//! packages the resulting static libraries as XCFrameworks.
//!
//! ## Overview
//!
//! For every requested platform `iosbuild` configures, builds and installs the
//! project with the [ios-cmake](https://github.com/leetal/ios-cmake)
//! toolchain. It then collects the `.a` files installed for each platform and
//! runs `xcodebuild -create-xcframework` once per library name.
//!
//! ## Quick Start
//!
//! ```bash
//! # Build the default platforms (OS64, SIMULATORARM64, MAC_ARM64)
//! iosbuild build path/to/project
//!
//! # Pick platforms, pass CMake options and remove intermediate files
//! iosbuild build path/to/project --platforms OS64 SIMULATORARM64 \
//!     -D BUILD_TESTING=OFF --clean-up
//!
//! # Platform specific options
//! iosbuild build . --platform-options '{"MAC_ARM64": {"DEPLOYMENT_TARGET": "13.0"}}'
//!
//! # Preview the CMake commands
//! iosbuild build . --dry-run
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `build` | Build every platform and create the XCFrameworks |
//! | `init` | Write a starter `iosbuild.toml` |
//! | `platforms` | List the supported platform names |
//!
//! ## Directories
//!
//! ```text
//! <working dir>/
//! ├── build/<PLATFORM>/      # CMake build trees
//! ├── install/<PLATFORM>/    # CMake install prefixes
//! └── <library>.xcframework  # one bundle per library (see --output-dir)
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `iosbuild.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use iosbuild_sdk::pipeline::{DEFAULT_BUILD_DIR, DEFAULT_INSTALL_DIR};
use iosbuild_sdk::{
    BuildOptions, BuildPlan, BuildSettings, DEFAULT_TOOLCHAIN_URL, Pipeline, PipelineReport,
    Platform, ProcessRunner, ToolchainSource, Verbosity,
};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use config::ConfigResolver;

pub mod config;
mod logging;
mod platform_options;
mod report;

/// Builds CMake projects for Apple platforms and packages them as XCFrameworks.
#[derive(Parser, Debug)]
#[command(name = "iosbuild", author, version, about = "Build CMake projects into XCFrameworks", long_about = None)]
struct Cli {
    /// Print more output (-v streams tool output, -vv adds debug logs)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    /// Print errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every platform and create one XCFramework per library.
    Build(BuildArgs),
    /// Write a starter iosbuild.toml.
    Init {
        #[arg(long, default_value = config::CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, help = "Replace an existing file")]
        force: bool,
    },
    /// List the supported platform names.
    Platforms,
}

#[derive(Args, Debug, Default)]
struct BuildArgs {
    #[arg(help = "Path to the CMake project (default: `source` from iosbuild.toml)")]
    path: Option<PathBuf>,
    #[arg(long = "cmake", short = 'C', help = "CMake executable (default: cmake)")]
    cmake: Option<String>,
    #[arg(long, help = "xcodebuild executable (default: xcodebuild)")]
    xcodebuild: Option<String>,
    #[arg(long, short = 'c', help = "Recreate the build and install directories before building")]
    clean: bool,
    #[arg(long, short = 't', help = "Path or URL of the ios-cmake toolchain file")]
    toolchain: Option<String>,
    #[arg(long, help = "Where a downloaded toolchain is saved (default: system temp directory)")]
    toolchain_dir: Option<PathBuf>,
    #[arg(long, short = 'w', help = "Working directory for relative build, install and output paths (default: current directory)")]
    working_dir: Option<PathBuf>,
    #[arg(long, short = 'b', help = "Build directory (default: build)")]
    build_dir: Option<PathBuf>,
    #[arg(long, short = 'i', help = "Install directory (default: install)")]
    install_dir: Option<PathBuf>,
    #[arg(long, short = 'o', help = "Where XCFrameworks are written (default: working directory)")]
    output_dir: Option<PathBuf>,
    #[arg(long, help = "Remove the build and install directories after a successful run")]
    clean_up: bool,
    #[arg(long, help = "Replace XCFrameworks that already exist")]
    overwrite: bool,
    #[arg(long, num_args = 1.., help = "Platforms to build (default: OS64 SIMULATORARM64 MAC_ARM64)")]
    platforms: Option<Vec<Platform>>,
    #[arg(short = 'D', value_name = "KEY=VALUE", help = "CMake option for every platform")]
    defines: Vec<String>,
    #[arg(long, conflicts_with = "platform_options", help = "JSON file with platform specific CMake options")]
    platform_json: Option<PathBuf>,
    #[arg(long, help = "Platform specific CMake options as inline JSON")]
    platform_options: Option<String>,
    #[arg(long, help = "CMake generator (default: Xcode)")]
    generator: Option<String>,
    #[arg(long = "build-config", help = "Build configuration (default: Release)")]
    build_config: Option<String>,
    #[arg(long, help = "Config file (default: iosbuild.toml in this or a parent directory)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Write a JSON summary to this path")]
    summary: Option<PathBuf>,
    #[arg(long, help = "Print what would be done without doing it")]
    dry_run: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    logging::init(verbosity);

    match cli.command {
        Command::Build(args) => cmd_build(args, verbosity),
        Command::Init { output, force } => cmd_init(output, force),
        Command::Platforms => cmd_platforms(),
    }
}

fn cmd_build(args: BuildArgs, verbosity: Verbosity) -> Result<()> {
    let quiet = verbosity == Verbosity::Quiet;

    let resolver = match &args.config {
        Some(path) => ConfigResolver::from_file(path)?,
        None => ConfigResolver::new()?,
    };
    if let Some(config_path) = &resolver.config_path
        && !quiet
    {
        println!("Using config file: {:?}", config_path);
    }

    let settings = resolve_settings(&args, verbosity, &resolver)?;
    debug!(?settings, "resolved settings");

    let runner = ProcessRunner::new();
    let pipeline = Pipeline::new(&settings, &runner);

    if args.dry_run {
        let plan = pipeline.plan()?;
        print_plan(&settings, &plan);
        return Ok(());
    }

    if !quiet {
        println!("Building {:?}", settings.source);
        println!("  Platforms: {}", join_platforms(&settings.platforms));
        println!("  Configuration: {}", settings.config);
    }

    let report = pipeline.run().context("iosbuild failed")?;

    if !quiet {
        print_report(&report);
    }
    for failure in &report.packaging.failures {
        eprintln!(
            "Failed to package {}: {}",
            failure.library,
            report::error_chain(&failure.error)
        );
    }

    if let Some(path) = &args.summary {
        let summary = report::BuildSummary::from_report(&report)?;
        report::write_summary(path, &summary)?;
        if !quiet {
            println!("Wrote build summary to {:?}", path);
        }
    }

    if !report.packaging.is_success() {
        bail!(
            "{} of {} libraries failed to package",
            report.packaging.failures.len(),
            report.packaging.failures.len() + report.packaging.created.len()
        );
    }
    Ok(())
}

fn resolve_settings(
    args: &BuildArgs,
    verbosity: Verbosity,
    resolver: &ConfigResolver,
) -> Result<BuildSettings> {
    let source = resolver
        .resolve_optional(args.path.clone(), |c| c.project.source.clone())
        .context("No project path given. Pass PATH or set `source` under [project] in iosbuild.toml")?;

    let mut settings = BuildSettings::new(source);
    settings.platforms = resolver.resolve(
        args.platforms.clone(),
        |c| c.build.platforms.clone(),
        Platform::DEFAULTS.to_vec(),
    );
    settings.options = resolve_options(args, resolver)?;

    let toolchain = resolver.resolve(
        args.toolchain.clone(),
        |c| c.project.toolchain.clone(),
        DEFAULT_TOOLCHAIN_URL.to_string(),
    );
    settings.toolchain = ToolchainSource::parse(&toolchain);
    settings.toolchain_dir =
        resolver.resolve_optional(args.toolchain_dir.clone(), |c| c.project.toolchain_dir.clone());

    settings.working_dir = args.working_dir.clone();
    settings.build_dir = resolver.resolve(
        args.build_dir.clone(),
        |c| c.project.build_dir.clone(),
        PathBuf::from(DEFAULT_BUILD_DIR),
    );
    settings.install_dir = resolver.resolve(
        args.install_dir.clone(),
        |c| c.project.install_dir.clone(),
        PathBuf::from(DEFAULT_INSTALL_DIR),
    );
    settings.output_dir =
        resolver.resolve_optional(args.output_dir.clone(), |c| c.project.output_dir.clone());

    settings.cmake_command = resolver.resolve(
        args.cmake.clone(),
        |c| c.build.cmake_command.clone(),
        settings.cmake_command.clone(),
    );
    settings.xcodebuild_command = resolver.resolve(
        args.xcodebuild.clone(),
        |c| c.build.xcodebuild_command.clone(),
        settings.xcodebuild_command.clone(),
    );
    settings.generator = resolver.resolve(
        args.generator.clone(),
        |c| c.build.generator.clone(),
        settings.generator.clone(),
    );
    settings.config = resolver.resolve(
        args.build_config.clone(),
        |c| c.build.config.clone(),
        settings.config.clone(),
    );

    settings.clean = resolver.resolve(args.clean.then_some(true), |c| c.build.clean, false);
    settings.clean_up = resolver.resolve(args.clean_up.then_some(true), |c| c.build.clean_up, false);
    settings.overwrite =
        resolver.resolve(args.overwrite.then_some(true), |c| c.build.overwrite, false);
    settings.verbosity = verbosity;

    settings.validate()?;
    Ok(settings)
}

/// Config file options, overridden by `-D`; JSON platform options replace
/// the config file's platform tables.
fn resolve_options(args: &BuildArgs, resolver: &ConfigResolver) -> Result<BuildOptions> {
    let mut options = resolver.options()?;

    let cli = BuildOptions::parse_global(&args.defines)?;
    for (key, value) in cli.global().iter() {
        options.override_global(key, value)?;
    }

    if let Some(path) = &args.platform_json {
        options.clear_platform_options();
        platform_options::load_file(path, &mut options)?;
    } else if let Some(json) = &args.platform_options {
        options.clear_platform_options();
        platform_options::apply(json, &mut options).context("Invalid --platform-options")?;
    }
    Ok(options)
}

fn join_platforms(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_plan(settings: &BuildSettings, plan: &BuildPlan) {
    println!("Dry run, nothing will be executed");
    println!("  Source: {:?}", settings.source);
    println!("  Platforms: {}", join_platforms(&settings.platforms));
    println!("  Toolchain: {}", plan.toolchain);
    println!("  Build directory: {:?}", plan.build_root);
    println!("  Install directory: {:?}", plan.install_root);
    println!("  Output directory: {:?}", plan.output_dir);
    println!("\nCommands:");
    for command in &plan.commands {
        println!("  {command}");
    }
    println!(
        "\nThen one `{} -create-xcframework` per library found under {:?}",
        settings.xcodebuild_command, plan.install_root
    );
}

fn print_report(report: &PipelineReport) {
    for collision in &report.collisions {
        println!(
            "Warning: {} found twice for {}, using {:?}",
            collision.library, collision.platform, collision.kept
        );
    }
    if report.packaging.created.is_empty() && report.packaging.failures.is_empty() {
        println!("No static libraries found, no XCFrameworks created");
    }
    for bundle in &report.packaging.created {
        println!("Created XCFramework {:?}", bundle);
    }
    if report.cleaned_up {
        println!("Removed {:?} and {:?}", report.build_root, report.install_root);
    }
}

fn cmd_init(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{:?} already exists, pass --force to replace it", output);
    }
    fs::write(&output, config::IosbuildConfig::generate_starter_toml())
        .with_context(|| format!("Failed to write {:?}", output))?;
    println!("Wrote {:?}", output);
    println!("\nNext steps:");
    println!("  1. Set `source` and `platforms` in {:?}", output);
    println!("  2. Run 'iosbuild build'");
    Ok(())
}

fn cmd_platforms() -> Result<()> {
    for platform in Platform::ALL {
        if Platform::DEFAULTS.contains(&platform) {
            println!("{platform} (default)");
        } else {
            println!("{platform}");
        }
    }
    Ok(())
}
