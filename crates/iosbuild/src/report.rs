//! JSON summary of a build, written with `--summary`.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use iosbuild_sdk::{Platform, PipelineReport};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    pub generated_at: String,
    pub generated_at_unix: u64,
    pub platforms: Vec<Platform>,
    pub toolchain: PathBuf,
    pub output_dir: PathBuf,
    /// XCFrameworks created.
    pub bundles: Vec<PathBuf>,
    pub failures: Vec<FailureSummary>,
    pub collisions: Vec<CollisionSummary>,
    pub cleaned_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub library: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionSummary {
    pub platform: Platform,
    pub library: String,
    pub kept: PathBuf,
    pub discarded: PathBuf,
}

impl BuildSummary {
    pub fn from_report(report: &PipelineReport) -> Result<Self> {
        let generated_at_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("generating timestamp")?
            .as_secs();
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| generated_at_unix.to_string());

        Ok(Self {
            generated_at,
            generated_at_unix,
            platforms: report.platforms.clone(),
            toolchain: report.toolchain.clone(),
            output_dir: report.output_dir.clone(),
            bundles: report.packaging.created.clone(),
            failures: report
                .packaging
                .failures
                .iter()
                .map(|f| FailureSummary {
                    library: f.library.clone(),
                    error: error_chain(&f.error),
                })
                .collect(),
            collisions: report
                .collisions
                .iter()
                .map(|c| CollisionSummary {
                    platform: c.platform,
                    library: c.library.clone(),
                    kept: c.kept.clone(),
                    discarded: c.discarded.clone(),
                })
                .collect(),
            cleaned_up: report.cleaned_up,
        })
    }
}

/// An error and all of its sources, joined with `: `.
pub fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub fn write_summary(path: &Path, summary: &BuildSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    fs::write(path, json).with_context(|| format!("writing file {:?}", path))
}
