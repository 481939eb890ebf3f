//! Locating the AqKanji2Koe shared library on disk.
//!
//! ## Resolution order
//!
//! 1. An explicit path, when the caller gives one. Nothing else is tried.
//! 2. Otherwise, for every file name listed for the current platform in a
//!    [`LibraryCandidates`] table, the following locations in order:
//!    * the bare name (left to the system loader's own search path),
//!    * the process working directory,
//!    * the directory of the running executable,
//!    * the dictionary directory,
//!    * `lib/` next to the executable,
//!    * `../lib` relative to the executable.
//!
//! The first candidate that opens wins. When none does, the error lists every
//! path that was attempted along with the last loader error.

use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Kanji2KoeError, Result};

/// Platform identifier for the running target (`std::env::consts::OS`).
pub fn current_platform() -> &'static str {
    std::env::consts::OS
}

// ─── Candidate table ─────────────────────────────────────────────────────────

/// Platform identifier → library file names, in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryCandidates(HashMap<String, Vec<String>>);

static DEFAULT_CANDIDATES: Lazy<LibraryCandidates> = Lazy::new(|| {
    LibraryCandidates::from_iter([
        ("windows", vec!["AqKanji2Koe.dll", "libAqKanji2Koe.dll"]),
        ("linux", vec!["libAqKanji2Koe.so", "libAqKanji2Koe.so.1"]),
        ("macos", vec!["libAqKanji2Koe.dylib", "libAqKanji2Koe.so"]),
    ])
});

impl Default for LibraryCandidates {
    fn default() -> Self {
        DEFAULT_CANDIDATES.clone()
    }
}

impl<P: Into<String>, N: Into<String>> FromIterator<(P, Vec<N>)> for LibraryCandidates {
    fn from_iter<I: IntoIterator<Item = (P, Vec<N>)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(platform, names)| {
                    (platform.into(), names.into_iter().map(Into::into).collect())
                })
                .collect(),
        )
    }
}

impl LibraryCandidates {
    /// File names for `platform`; empty for an unknown platform.
    pub fn names_for(&self, platform: &str) -> &[String] {
        self.0.get(platform).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ─── Search order ────────────────────────────────────────────────────────────

/// Directories searched for each candidate file name.
#[derive(Debug, Clone, Default)]
pub struct SearchDirs {
    pub working_dir: Option<PathBuf>,
    pub executable_dir: Option<PathBuf>,
    pub dictionary_dir: Option<PathBuf>,
}

impl SearchDirs {
    /// Directories of the running process, plus the dictionary directory.
    pub fn for_process(dictionary_dir: &Path) -> Self {
        Self {
            working_dir: std::env::current_dir().ok(),
            executable_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            dictionary_dir: Some(dictionary_dir.to_path_buf()),
        }
    }
}

/// Ordered, de-duplicated list of paths to try.
pub fn candidate_paths(
    explicit: Option<&Path>,
    candidates: &LibraryCandidates,
    platform: &str,
    dirs: &SearchDirs,
) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for name in candidates.names_for(platform) {
        paths.push(PathBuf::from(name));
        if let Some(dir) = &dirs.working_dir {
            paths.push(dir.join(name));
        }
        if let Some(dir) = &dirs.executable_dir {
            paths.push(dir.join(name));
        }
        if let Some(dir) = &dirs.dictionary_dir {
            paths.push(dir.join(name));
        }
        if let Some(dir) = &dirs.executable_dir {
            paths.push(dir.join("lib").join(name));
            paths.push(dir.join("..").join("lib").join(name));
        }
    }

    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));
    paths
}

/// Try `open` on each path in order and return the first success together with
/// the path that produced it.
pub fn load_first<T, E: Display>(
    paths: &[PathBuf],
    mut open: impl FnMut(&Path) -> std::result::Result<T, E>,
) -> Result<(T, PathBuf)> {
    let mut last_error = None;
    for path in paths {
        debug!(path = %path.display(), "trying AqKanji2Koe library");
        match open(path) {
            Ok(lib) => return Ok((lib, path.clone())),
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    Err(Kanji2KoeError::LibraryLoad { attempted: paths.to_vec(), last_error })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
