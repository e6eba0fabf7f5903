//! Discovery of installed static libraries.
//!
//! After every platform has been installed, each `install_root/<PLATFORM>`
//! tree is scanned for `.a` files. The per-platform results are inverted into
//! an [`ArtifactIndex`] keyed by library name so that every library can be
//! packaged with the builds for all platforms that produced it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::types::{BuildError, Platform, Result};

/// File suffix of a static library.
pub const STATIC_LIBRARY_SUFFIX: &str = ".a";

/// Name a library is grouped under: the file name up to its first `.`.
///
/// Returns `None` for files that are not static libraries or whose name would
/// be empty (`.a`).
pub fn library_name(file_name: &str) -> Option<&str> {
    if !file_name.ends_with(STATIC_LIBRARY_SUFFIX) {
        return None;
    }
    file_name.split('.').next().filter(|name| !name.is_empty())
}

/// Two files in one platform tree that map to the same library name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub platform: Platform,
    pub library: String,
    /// The path that was replaced.
    pub discarded: PathBuf,
    /// The path that was kept.
    pub kept: PathBuf,
}

/// Static libraries found in one platform tree, keyed by library name.
///
/// Files are visited in sorted order, so when two files share a library name
/// the later one wins and a [`Collision`] is recorded.
pub fn find_platform_libraries(
    platform: Platform,
    directory: &Path,
) -> Result<(BTreeMap<String, PathBuf>, Vec<Collision>)> {
    let mut libraries = BTreeMap::new();
    let mut collisions = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry
            .map_err(|e| BuildError::io(format!("failed to scan {}", directory.display()), e.into()))?;
        // symlinked files count, symlinked directories are not descended
        if !entry.path().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(name) = library_name(&file_name) else {
            continue;
        };

        let path = entry.path().to_path_buf();
        debug!(%platform, library = name, path = %path.display(), "found static library");
        if let Some(previous) = libraries.insert(name.to_string(), path.clone()) {
            warn!(
                %platform,
                library = name,
                discarded = %previous.display(),
                kept = %path.display(),
                "duplicate library name, keeping the later file"
            );
            collisions.push(Collision {
                platform,
                library: name.to_string(),
                discarded: previous,
                kept: path,
            });
        }
    }

    Ok((libraries, collisions))
}

/// The platforms and paths that provide one library.
///
/// Entries follow the order of the platform list given to [`find_libraries`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryArtifacts {
    entries: Vec<(Platform, PathBuf)>,
}

impl LibraryArtifacts {
    pub fn get(&self, platform: Platform) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, path)| path.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Platform, &Path)> {
        self.entries.iter().map(|(p, path)| (*p, path.as_path()))
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.entries.iter().map(|(p, _)| *p)
    }

    /// Library paths in platform order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|(_, path)| path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Installed libraries grouped by name across platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactIndex {
    libraries: BTreeMap<String, LibraryArtifacts>,
    collisions: Vec<Collision>,
}

impl ArtifactIndex {
    /// Inverts per-platform maps (`platform -> name -> path`) into
    /// `name -> platform -> path`, keeping the order of `per_platform`.
    pub fn invert(per_platform: Vec<(Platform, BTreeMap<String, PathBuf>)>) -> Self {
        let mut libraries: BTreeMap<String, LibraryArtifacts> = BTreeMap::new();
        for (platform, found) in per_platform {
            for (name, path) in found {
                libraries.entry(name).or_default().entries.push((platform, path));
            }
        }
        Self {
            libraries,
            collisions: Vec::new(),
        }
    }

    pub fn get(&self, library: &str) -> Option<&LibraryArtifacts> {
        self.libraries.get(library)
    }

    /// Libraries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LibraryArtifacts)> {
        self.libraries.iter().map(|(name, artifacts)| (name.as_str(), artifacts))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

/// Scans `install_root/<PLATFORM>` for every platform and groups the static
/// libraries found by name.
///
/// # Errors
///
/// [`BuildError::MissingPlatformDirectory`] if a platform was never
/// installed.
pub fn find_libraries(install_root: &Path, platforms: &[Platform]) -> Result<ArtifactIndex> {
    let mut per_platform = Vec::with_capacity(platforms.len());
    let mut collisions = Vec::new();

    for &platform in platforms {
        let directory = install_root.join(platform.as_str());
        if !directory.is_dir() {
            return Err(BuildError::MissingPlatformDirectory {
                platform,
                path: directory,
            });
        }
        let (found, mut clashes) = find_platform_libraries(platform, &directory)?;
        collisions.append(&mut clashes);
        per_platform.push((platform, found));
    }

    let mut index = ArtifactIndex::invert(per_platform);
    index.collisions = collisions;
    debug!(libraries = index.len(), "artifact index built");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"!<arch>\n").unwrap();
    }

    #[test]
    fn library_name_is_text_before_first_dot() {
        assert_eq!(library_name("libfoo.a"), Some("libfoo"));
        assert_eq!(library_name("libfoo.1.2.a"), Some("libfoo"));
        assert_eq!(library_name("libfoo.dylib"), None);
        assert_eq!(library_name("libfoo.a.bak"), None);
        assert_eq!(library_name(".a"), None);
    }

    #[test]
    fn finds_libraries_recursively() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("lib/libfoo.a"));
        touch(&temp.path().join("lib/nested/deeper/libbar.a"));
        touch(&temp.path().join("include/foo.h"));

        let (found, collisions) = find_platform_libraries(Platform::Os64, temp.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["libfoo"], temp.path().join("lib/libfoo.a"));
        assert_eq!(found["libbar"], temp.path().join("lib/nested/deeper/libbar.a"));
        assert!(collisions.is_empty());
    }

    #[test]
    fn grouping_is_a_true_inversion() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("OS64/lib/libfoo.a"));
        touch(&root.join("OS64/lib/libbar.a"));
        touch(&root.join("SIMULATORARM64/lib/libfoo.a"));
        touch(&root.join("MAC_ARM64/lib/libbaz.a"));
        let platforms = [Platform::Os64, Platform::SimulatorArm64, Platform::MacArm64];

        let index = find_libraries(root, &platforms).unwrap();

        assert_eq!(index.names().collect::<Vec<_>>(), ["libbar", "libbaz", "libfoo"]);
        // every (platform, name, path) found per platform appears exactly once
        for &platform in &platforms {
            let (found, _) =
                find_platform_libraries(platform, &root.join(platform.as_str())).unwrap();
            for (name, path) in found {
                assert_eq!(index.get(&name).unwrap().get(platform), Some(path.as_path()));
            }
        }
        let total: usize = index.iter().map(|(_, artifacts)| artifacts.len()).sum();
        assert_eq!(total, 4);
        assert!(index.iter().all(|(_, artifacts)| !artifacts.is_empty()));

        let foo = index.get("libfoo").unwrap();
        assert_eq!(
            foo.platforms().collect::<Vec<_>>(),
            [Platform::Os64, Platform::SimulatorArm64]
        );
        assert_eq!(foo.get(Platform::MacArm64), None);
    }

    #[test]
    fn entries_follow_platform_list_order() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("OS64/libfoo.a"));
        touch(&temp.path().join("MAC_ARM64/libfoo.a"));

        let index = find_libraries(temp.path(), &[Platform::MacArm64, Platform::Os64]).unwrap();
        assert_eq!(
            index.get("libfoo").unwrap().platforms().collect::<Vec<_>>(),
            [Platform::MacArm64, Platform::Os64]
        );
    }

    #[test]
    fn same_name_in_one_platform_keeps_last_and_records_collision() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("OS64/a/libfoo.a"));
        touch(&temp.path().join("OS64/b/libfoo.debug.a"));

        let index = find_libraries(temp.path(), &[Platform::Os64]).unwrap();

        let kept = temp.path().join("OS64/b/libfoo.debug.a");
        assert_eq!(index.get("libfoo").unwrap().get(Platform::Os64), Some(kept.as_path()));
        assert_eq!(
            index.collisions(),
            [Collision {
                platform: Platform::Os64,
                library: "libfoo".into(),
                discarded: temp.path().join("OS64/a/libfoo.a"),
                kept,
            }]
        );
    }

    #[test]
    fn missing_platform_directory_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("OS64")).unwrap();

        let err = find_libraries(temp.path(), &[Platform::Os64, Platform::TvOs]).unwrap_err();
        match err {
            BuildError::MissingPlatformDirectory { platform, path } => {
                assert_eq!(platform, Platform::TvOs);
                assert_eq!(path, temp.path().join("TVOS"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_library_is_found() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("elsewhere/libfoo.a");
        touch(&real);
        fs::create_dir_all(temp.path().join("OS64/lib")).unwrap();
        let link = temp.path().join("OS64/lib/libfoo.a");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let index = find_libraries(temp.path(), &[Platform::Os64]).unwrap();
        assert_eq!(index.get("libfoo").unwrap().get(Platform::Os64), Some(link.as_path()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_file_name_is_still_found() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("OS64");
        fs::create_dir(&dir).unwrap();
        touch(&dir.join(OsStr::from_bytes(b"lib\xff.a")));

        let (found, _) = find_platform_libraries(Platform::Os64, &dir).unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), ["lib\u{FFFD}"]);
    }

    #[test]
    fn empty_trees_give_an_empty_index() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("OS64")).unwrap();
        let index = find_libraries(temp.path(), &[Platform::Os64]).unwrap();
        assert!(index.is_empty());
    }
}
