//! Build CMake projects for Apple platforms and package them as XCFrameworks.
//!
//! `iosbuild-sdk` configures, builds and installs a CMake project once per
//! Apple platform using the [ios-cmake](https://github.com/leetal/ios-cmake)
//! toolchain, collects the static libraries each platform installed, and
//! combines every library into a single `.xcframework` with
//! `xcodebuild -create-xcframework`.
//!
//! # Architecture
//!
//! - **Runner** ([`runner`]): runs external tools behind the [`CommandRunner`] trait
//! - **Directories** ([`directory`]): idempotent creation and cleaning of work directories
//! - **Builders** ([`builders`]): the CMake build driver and the xcodebuild packager
//! - **Search** ([`search`]): groups installed `.a` files by library name
//! - **Toolchain** ([`toolchain`]): local or downloaded toolchain file
//! - **Pipeline** ([`pipeline`]): runs all of the above in order
//!
//! # Example
//!
//! ```ignore
//! use iosbuild_sdk::{BuildOptions, BuildSettings, Pipeline, Platform, ProcessRunner};
//!
//! fn main() -> Result<(), iosbuild_sdk::BuildError> {
//!     let mut settings = BuildSettings::new("my-library");
//!     settings.platforms = vec![Platform::Os64, Platform::SimulatorArm64];
//!     settings.options = BuildOptions::parse_global(&["BUILD_SHARED_LIBS=OFF".to_string()])?;
//!     settings.clean_up = true;
//!
//!     let report = Pipeline::new(&settings, &ProcessRunner::new()).run()?;
//!     for bundle in &report.packaging.created {
//!         println!("{}", bundle.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod builders;
pub mod directory;
pub mod options;
pub mod pipeline;
pub mod runner;
pub mod search;
pub mod toolchain;
pub mod types;

#[cfg(test)]
mod testing;

pub use builders::{cmake, xcodebuild};
pub use builders::{CMakeBuilder, PackagingFailure, PackagingReport, XcframeworkPackager};
pub use directory::{DirectoryHandle, ensure_directory};
pub use options::{BuildOptions, OptionScope, OptionSet, RESERVED_OPTIONS, parse_option};
pub use pipeline::{BuildPlan, BuildSettings, Pipeline, PipelineReport};
pub use runner::{CommandRunner, OutputPolicy, ProcessRunner};
pub use search::{ArtifactIndex, Collision, LibraryArtifacts, find_libraries};
pub use toolchain::{DEFAULT_TOOLCHAIN_URL, ToolchainSource};
pub use types::{BuildError, BuildStage, Platform, Result, Verbosity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
