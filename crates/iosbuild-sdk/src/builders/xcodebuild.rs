//! XCFramework packaging with `xcodebuild -create-xcframework`.
//!
//! Every library in an [`ArtifactIndex`] becomes one
//! `<output_dir>/<name>.xcframework` bundle containing the static library of
//! every platform that produced it. Libraries are packaged independently: a
//! failure is recorded in the [`PackagingReport`] and the next library is
//! still attempted.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::builders::cmake::path_arg;
use crate::directory::remove_directory;
use crate::runner::{CommandRunner, OutputPolicy};
use crate::search::{ArtifactIndex, LibraryArtifacts};
use crate::types::{BuildError, Result};

/// Extension of the bundles produced by xcodebuild.
pub const XCFRAMEWORK_EXTENSION: &str = "xcframework";

/// `<output_dir>/<library>.xcframework`
pub fn output_path(output_dir: &Path, library: &str) -> PathBuf {
    output_dir.join(format!("{library}.{XCFRAMEWORK_EXTENSION}"))
}

/// A library that could not be packaged.
#[derive(Debug)]
pub struct PackagingFailure {
    pub library: String,
    pub error: BuildError,
}

/// Outcome of packaging every library in an index.
#[derive(Debug, Default)]
pub struct PackagingReport {
    /// Bundles written, in library name order.
    pub created: Vec<PathBuf>,
    pub failures: Vec<PackagingFailure>,
}

impl PackagingReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Creates XCFrameworks from installed static libraries.
pub struct XcframeworkPackager<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    command: String,
    output: OutputPolicy,
    overwrite: bool,
}

impl<'a, R: CommandRunner + ?Sized> XcframeworkPackager<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self {
            runner,
            command: "xcodebuild".to_string(),
            output: OutputPolicy::Capture,
            overwrite: false,
        }
    }

    /// Sets the xcodebuild executable (name on PATH or a path).
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn output(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }

    /// Replace bundles that already exist instead of failing. Also takes over
    /// a lock file left behind by an interrupted run.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn command_name(&self) -> &str {
        &self.command
    }

    /// Checks that xcodebuild can be run, using `xcodebuild -version`.
    pub fn check(&self) -> Result<()> {
        self.runner
            .run(&self.command, &["-version".to_string()], OutputPolicy::Capture)
    }

    /// Arguments for one bundle, with `-library` flags in platform order.
    pub fn create_xcframework_args(&self, artifacts: &LibraryArtifacts, output: &Path) -> Vec<String> {
        let mut args = vec!["-create-xcframework".to_string()];
        for path in artifacts.paths() {
            args.push("-library".to_string());
            args.push(path_arg(path));
        }
        args.push("-output".to_string());
        args.push(path_arg(output));
        args
    }

    /// Packages one library into `output_dir`.
    pub fn package(&self, library: &str, artifacts: &LibraryArtifacts, output_dir: &Path) -> Result<PathBuf> {
        let output = output_path(output_dir, library);
        let _lock = BundleLock::acquire(output_dir, library, self.overwrite)?;

        if output.exists() {
            if !self.overwrite {
                return Err(BuildError::OutputAlreadyExists { path: output });
            }
            debug!(path = %output.display(), "removing existing bundle");
            remove_existing(&output)?;
        }

        info!(library, platforms = artifacts.len(), "creating XCFramework");
        self.runner
            .run(&self.command, &self.create_xcframework_args(artifacts, &output), self.output)
            .map_err(|source| BuildError::Xcodebuild {
                library: library.to_string(),
                source: Box::new(source),
            })?;
        Ok(output)
    }

    /// Packages every library in `index`, collecting per-library failures.
    pub fn package_all(&self, index: &ArtifactIndex, output_dir: &Path) -> PackagingReport {
        let mut report = PackagingReport::default();
        if index.is_empty() {
            warn!(output_dir = %output_dir.display(), "no static libraries found, no bundles created");
            return report;
        }

        for (library, artifacts) in index.iter() {
            match self.package(library, artifacts, output_dir) {
                Ok(path) => report.created.push(path),
                Err(error) => {
                    warn!(library, error = %error, "packaging failed");
                    report.failures.push(PackagingFailure {
                        library: library.to_string(),
                        error,
                    });
                }
            }
        }
        report
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    if path.is_dir() {
        remove_directory(path)
    } else {
        fs::remove_file(path)
            .map_err(|e| BuildError::io(format!("failed to remove {}", path.display()), e))
    }
}

/// Exclusive marker held while one bundle is checked and written.
struct BundleLock {
    path: PathBuf,
}

impl BundleLock {
    fn acquire(output_dir: &Path, library: &str, take_over: bool) -> Result<Self> {
        let path = output_dir.join(format!(".{library}.{XCFRAMEWORK_EXTENSION}.lock"));
        let mut created = Self::create(&path);
        if take_over && matches!(&created, Err(e) if e.kind() == io::ErrorKind::AlreadyExists) {
            warn!(path = %path.display(), "removing leftover lock file");
            fs::remove_file(&path).map_err(|e| {
                BuildError::io(format!("failed to remove lock file {}", path.display()), e)
            })?;
            created = Self::create(&path);
        }

        match created {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(BuildError::OutputAlreadyExists { path })
            }
            Err(e) => Err(BuildError::io(
                format!("failed to create lock file {}", path.display()),
                e,
            )),
        }
    }

    fn create(path: &Path) -> io::Result<()> {
        OpenOptions::new().write(true).create_new(true).open(path).map(drop)
    }
}

impl Drop for BundleLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}
