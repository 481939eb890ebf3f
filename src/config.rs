//! Converter configuration, loadable from JSON.
//!
//! ```json
//! {
//!   "library_path": "/opt/aquestalk/lib64/libAqKanji2Koe.so",
//!   "candidates": { "linux": ["libAqKanji2Koe.so.4"] },
//!   "buffer_size": 4096,
//!   "sjis_code_pages": ["windows-31j", "shift_jis"],
//!   "developer_key": "XXX-XXX-XXX"
//! }
//! ```
//!
//! Every field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    encoding::DEFAULT_SJIS_CODE_PAGES,
    error::{Kanji2KoeError, Result},
    resolve::LibraryCandidates,
};

/// Output buffer capacity used when the caller does not pass one.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Overrides [`Kanji2KoeConfig::library_path`].
pub const ENV_LIBRARY: &str = "AQKANJI2KOE_LIBRARY";
/// Overrides [`Kanji2KoeConfig::developer_key`].
pub const ENV_DEV_KEY: &str = "AQKANJI2KOE_DEV_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Kanji2KoeConfig {
    /// Explicit library file. When set, no other location is tried.
    pub library_path: Option<PathBuf>,

    /// Platform → library file names searched when `library_path` is unset.
    pub candidates: LibraryCandidates,

    /// Default output buffer capacity in bytes.
    pub buffer_size: usize,

    /// Code pages tried in order for Shift-JIS input.
    pub sjis_code_pages: Vec<String>,

    /// Developer license key applied right after the instance is created.
    pub developer_key: Option<String>,
}

impl Default for Kanji2KoeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            candidates: LibraryCandidates::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            sjis_code_pages: DEFAULT_SJIS_CODE_PAGES.iter().map(|s| s.to_string()).collect(),
            developer_key: None,
        }
    }
}

impl Kanji2KoeConfig {
    /// Read a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Kanji2KoeError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_slice(&bytes)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Kanji2KoeError::Config(e.to_string()))
    }

    /// Apply `AQKANJI2KOE_LIBRARY` and `AQKANJI2KOE_DEV_KEY` when set and
    /// non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(lib) = get(ENV_LIBRARY) {
            self.library_path = Some(PathBuf::from(lib));
        }
        if let Some(key) = get(ENV_DEV_KEY) {
            self.developer_key = Some(key);
        }
        self
    }

    /// Pin the library file; wins over `AQKANJI2KOE_LIBRARY` when applied
    /// after [`with_env_overrides`](Self::with_env_overrides).
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }
}
