//! Drivers for the two external tools.
//!
//! | Builder | Tool | Output |
//! |---------|------|--------|
//! | [`CMakeBuilder`] | `cmake` | per-platform install trees under the install root |
//! | [`XcframeworkPackager`] | `xcodebuild` | one `<library>.xcframework` per library name |
//!
//! Both run their tool through a [`CommandRunner`](crate::runner::CommandRunner)
//! and are configured with the builder pattern:
//!
//! ```ignore
//! use iosbuild_sdk::builders::{CMakeBuilder, XcframeworkPackager};
//! use iosbuild_sdk::{OutputPolicy, ProcessRunner};
//!
//! let runner = ProcessRunner::new();
//! let cmake = CMakeBuilder::new(&runner)
//!     .generator("Xcode")
//!     .config("Release")
//!     .output(OutputPolicy::Stream);
//! let packager = XcframeworkPackager::new(&runner).overwrite(true);
//! cmake.check()?;
//! packager.check()?;
//! # Ok::<(), iosbuild_sdk::BuildError>(())
//! ```

pub mod cmake;
pub mod xcodebuild;

pub use cmake::{CMakeBuilder, validate_project_root};
pub use xcodebuild::{PackagingFailure, PackagingReport, XcframeworkPackager};
