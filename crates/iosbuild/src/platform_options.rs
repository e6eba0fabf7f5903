//! Platform specific CMake options given as JSON.
//!
//! The JSON document maps platform names to objects of CMake options:
//!
//! ```json
//! {
//!     "OS64": { "ENABLE_BITCODE": false, "DEPLOYMENT_TARGET": "15.0" },
//!     "MAC_ARM64": { "DEPLOYMENT_TARGET": "13.0" }
//! }
//! ```
//!
//! Booleans become `ON`/`OFF`; strings and numbers are used as written.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use iosbuild_sdk::{BuildOptions, Platform};
use serde_json::Value;

/// Reads platform options from a JSON file into `options`.
pub fn load_file(path: &Path, options: &mut BuildOptions) -> Result<()> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read platform options file: {:?}", path))?;
    apply(&contents, options)
        .with_context(|| format!("Invalid platform options in {:?}", path))
}

/// Parses inline platform options into `options`.
pub fn apply(json: &str, options: &mut BuildOptions) -> Result<()> {
    let document: Value = serde_json::from_str(json).context("platform options are not valid JSON")?;
    let platforms = document
        .as_object()
        .ok_or_else(|| anyhow!("platform options must be a JSON object keyed by platform"))?;

    for (name, entries) in platforms {
        let platform: Platform = name.parse()?;
        let entries = entries
            .as_object()
            .ok_or_else(|| anyhow!("options for {platform} must be a JSON object"))?;
        for (key, value) in entries {
            options.insert_platform(platform, key.as_str(), cmake_value(value).with_context(|| {
                format!("option {key} for {platform}")
            })?)?;
        }
    }
    Ok(())
}

fn cmake_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "ON".to_string(),
        Value::Bool(false) => "OFF".to_string(),
        other => bail!("unsupported value {other}, use a string, number or boolean"),
    })
}
