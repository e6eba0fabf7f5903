//! Acquisition of the ios-cmake toolchain file.
//!
//! The toolchain can be given as a local file or as a URL. URLs are
//! downloaded into a directory (the system temp directory by default) as
//! `ios.toolchain.cmake`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use tracing::info;

use crate::types::{BuildError, Result};

/// Toolchain used when none is configured.
pub const DEFAULT_TOOLCHAIN_URL: &str =
    "https://github.com/leetal/ios-cmake/blob/master/ios.toolchain.cmake?raw=true";

/// File name a downloaded toolchain is saved under.
pub const TOOLCHAIN_FILE_NAME: &str = "ios.toolchain.cmake";

const USER_AGENT: &str = concat!("iosbuild/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the toolchain file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainSource {
    Path(PathBuf),
    Url(Url),
}

impl ToolchainSource {
    /// Interprets `value` as a URL when it has a scheme and a host, otherwise
    /// as a file path.
    pub fn parse(value: &str) -> Self {
        match Url::parse(value) {
            Ok(url) if url.host_str().is_some_and(|host| !host.is_empty()) => {
                ToolchainSource::Url(url)
            }
            _ => ToolchainSource::Path(PathBuf::from(value)),
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, ToolchainSource::Url(_))
    }

    /// Returns a local path to the toolchain file, downloading it into
    /// `download_dir` first when the source is a URL.
    pub fn acquire(&self, download_dir: &Path) -> Result<PathBuf> {
        match self {
            ToolchainSource::Path(path) => {
                if !path.is_file() {
                    return Err(BuildError::Toolchain(format!(
                        "unable to find toolchain file: {}",
                        path.display()
                    )));
                }
                std::path::absolute(path).map_err(|e| {
                    BuildError::io(format!("failed to resolve {}", path.display()), e)
                })
            }
            ToolchainSource::Url(url) => {
                let destination = download_dir.join(TOOLCHAIN_FILE_NAME);
                download(url, &destination)?;
                Ok(destination)
            }
        }
    }
}

impl Default for ToolchainSource {
    fn default() -> Self {
        ToolchainSource::parse(DEFAULT_TOOLCHAIN_URL)
    }
}

impl fmt::Display for ToolchainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainSource::Path(path) => write!(f, "{}", path.display()),
            ToolchainSource::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Downloads `url` to `destination`. Anything but `200 OK` is an error.
pub fn download(url: &Url, destination: &Path) -> Result<()> {
    info!(%url, destination = %destination.display(), "downloading toolchain file");

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| BuildError::Toolchain(format!("failed to build HTTP client: {e}")))?;

    let response = client.get(url.clone()).send().map_err(|e| {
        BuildError::Toolchain(format!("unable to download {url}, check the network connection: {e}"))
    })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(BuildError::Toolchain(format!(
            "unable to download {url}: server responded with {status}"
        )));
    }

    let body = response
        .bytes()
        .map_err(|e| BuildError::Toolchain(format!("failed to read response from {url}: {e}")))?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BuildError::io(format!("failed to create directory {}", parent.display()), e)
        })?;
    }
    fs::write(destination, &body)
        .map_err(|e| BuildError::io(format!("failed to write {}", destination.display()), e))
}
