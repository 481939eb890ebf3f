//! Error type shared by every fallible operation in the crate.

use std::path::PathBuf;

/// Everything that can go wrong between locating the library and decoding a
/// phoneme string.
///
/// Foreign failures keep the raw code the library returned; see
/// [`Kanji2KoeError::code`].
#[derive(Debug, thiserror::Error)]
pub enum Kanji2KoeError {
    /// No candidate path could be opened as a dynamic library.
    #[error(
        "could not load AqKanji2Koe library. Tried: {}. Last error: {}",
        display_paths(.attempted),
        .last_error.as_deref().unwrap_or("none")
    )]
    LibraryLoad {
        attempted: Vec<PathBuf>,
        last_error: Option<String>,
    },

    /// The library loaded but a required entry point is not exported.
    #[error("AqKanji2Koe library does not export `{name}`: {source}")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// An optional entry point was called but the loaded library lacks it.
    #[error("entry point `{0}` is not available in the loaded library")]
    UnavailableEntryPoint(&'static str),

    /// Dictionary directory or `aqdic.bin` is missing.
    #[error("{what} not found: {}", .path.display())]
    FileNotFound { what: &'static str, path: PathBuf },

    /// The dictionary path cannot be handed to the library as a C string.
    #[error("dictionary path cannot be passed to AqKanji2Koe: {}", .0.display())]
    InvalidPath(PathBuf),

    /// `AqKanji2Koe_Create` returned a null handle or a non-zero code.
    #[error("failed to create AqKanji2Koe instance (error code: {code})")]
    Initialization { code: i32 },

    /// The converter was released (or never created).
    #[error("converter not initialized or already released")]
    NotInitialized,

    #[error("unsupported encoding: {0:?}. Supported: 'utf-8', 'sjis'")]
    UnsupportedEncoding(String),

    /// The text cannot be represented in the requested encoding.
    #[error("failed to encode text: {0}")]
    Encoding(String),

    #[error("invalid output buffer size {0}: must be between 1 and i32::MAX")]
    InvalidBufferSize(usize),

    /// A convert entry point returned a non-zero status.
    #[error("text conversion failed (error code: {code})")]
    Conversion { code: i32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Kanji2KoeError {
    /// Foreign error code, for the variants that carry one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Initialization { code } | Self::Conversion { code } => Some(*code),
            _ => None,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Kanji2KoeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_load_lists_every_path() {
        let err = Kanji2KoeError::LibraryLoad {
            attempted: vec![PathBuf::from("a.so"), PathBuf::from("/opt/b.so")],
            last_error: Some("no such file".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.so, /opt/b.so"), "got: {msg}");
        assert!(msg.contains("no such file"), "got: {msg}");
    }

    #[test]
    fn test_code_only_for_foreign_failures() {
        assert_eq!(Kanji2KoeError::Conversion { code: 105 }.code(), Some(105));
        assert_eq!(Kanji2KoeError::Initialization { code: 101 }.code(), Some(101));
        assert_eq!(Kanji2KoeError::NotInitialized.code(), None);
    }
}
