//! # aqkanji2koe
//!
//! Safe Rust binding for AQUEST's **AqKanji2Koe**, the closed-source language
//! processor that turns kanji/kana mixed Japanese text into the phoneme
//! symbol strings (音声記号列) consumed by AquesTalk.
//!
//! The vendor library is loaded at runtime, so this crate builds without it.
//!
//! ## Quick start
//!
//! ```no_run
//! use aqkanji2koe::Kanji2Koe;
//!
//! // Directory that contains `aqdic.bin`.
//! let mut conv = Kanji2Koe::open_with_library("aq_dic", "lib64/libAqKanji2Koe.so")?;
//!
//! let koe = conv.convert("こんにちは", "utf-8", 1024)?;
//! println!("{koe}");
//!
//! conv.release();
//! # Ok::<(), aqkanji2koe::Kanji2KoeError>(())
//! ```
//!
//! Scoped use releases the instance when the block ends, including on panic:
//!
//! ```no_run
//! # use aqkanji2koe::Kanji2Koe;
//! let mut conv = Kanji2Koe::open("aq_dic")?;
//! let koe = conv.scope(|c| c.to_phonemes("ゆっくりしていってね"))?;
//! assert!(!conv.is_initialized());
//! # Ok::<(), aqkanji2koe::Kanji2KoeError>(())
//! ```
//!
//! ## Locating the library
//! | Platform | File names tried                                   |
//! |----------|----------------------------------------------------|
//! | Windows  | `AqKanji2Koe.dll`, `libAqKanji2Koe.dll`            |
//! | Linux    | `libAqKanji2Koe.so`, `libAqKanji2Koe.so.1`         |
//! | macOS    | `libAqKanji2Koe.dylib`, `libAqKanji2Koe.so`        |
//!
//! See [`resolve`] for the directories searched, and [`Kanji2KoeConfig`] to
//! override the table or pin an explicit path.
//!
//! ## Threads
//! A converter is `Send` but not `Sync`; wrap it in a `Mutex` to share it.

pub mod bindings;
pub mod config;
pub mod converter;
pub mod encoding;
pub mod error;
pub mod resolve;

#[cfg(test)]
mod testing;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use bindings::{ConvertEntry, DynamicLibrary, Kanji2KoeApi};
pub use config::{Kanji2KoeConfig, DEFAULT_BUFFER_SIZE};
pub use converter::{Kanji2Koe, DICTIONARY_FILE};
pub use encoding::TextEncoding;
pub use error::{Kanji2KoeError, Result};
pub use resolve::LibraryCandidates;
