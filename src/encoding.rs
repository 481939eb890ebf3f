//! Text encodings accepted by the AqKanji2Koe convert entry points.
//!
//! The library exposes one entry point per input encoding. UTF-8 text is
//! passed through as-is; Shift-JIS text is encoded with the first code page of
//! an ordered list that can represent it without loss.

use std::{ffi::CString, fmt, str::FromStr};

use encoding_rs::Encoding;

use crate::error::{Kanji2KoeError, Result};

/// Code pages tried, in order, for the Shift-JIS entry points.
pub const DEFAULT_SJIS_CODE_PAGES: &[&str] = &["windows-31j", "shift_jis"];

/// Input encoding selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf8,
    ShiftJis,
}

impl TextEncoding {
    /// Canonical label, accepted back by [`FromStr`].
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::ShiftJis => "sjis",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TextEncoding {
    type Err = Kanji2KoeError;

    /// Case-insensitive: `utf-8`, `utf8`, `sjis`, `shift-jis`, `shift_jis`.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "sjis" | "shift-jis" | "shift_jis" => Ok(Self::ShiftJis),
            _ => Err(Kanji2KoeError::UnsupportedEncoding(s.to_string())),
        }
    }
}

// ─── Byte conversion ─────────────────────────────────────────────────────────

/// Input bytes ready for a convert call, plus the code page needed to decode
/// the library's output (which uses the same encoding as its input).
#[derive(Debug)]
pub(crate) struct EncodedText {
    pub bytes: CString,
    pub code_page: &'static Encoding,
}

/// Resolve code-page labels to encodings.
///
/// Unknown labels and labels naming anything other than Shift-JIS (e.g.
/// `euc-jp`) are rejected; the sjis entry points accept nothing else.
pub(crate) fn resolve_code_pages(labels: &[String]) -> Result<Vec<&'static Encoding>> {
    if labels.is_empty() {
        return Err(Kanji2KoeError::Config("sjis_code_pages must not be empty".into()));
    }
    labels
        .iter()
        .map(|label| {
            let code_page = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                Kanji2KoeError::Config(format!("unknown code page label {label:?}"))
            })?;
            if code_page != encoding_rs::SHIFT_JIS {
                return Err(Kanji2KoeError::Config(format!(
                    "code page {label:?} is {}, not Shift-JIS",
                    code_page.name()
                )));
            }
            Ok(code_page)
        })
        .collect()
}

/// Encode `text` for the entry point matching `encoding`.
///
/// Shift-JIS tries each of `code_pages` in order and keeps the first lossless
/// result.
pub(crate) fn encode(
    text: &str,
    encoding: TextEncoding,
    code_pages: &[&'static Encoding],
) -> Result<EncodedText> {
    let (bytes, code_page) = match encoding {
        TextEncoding::Utf8 => (text.as_bytes().to_vec(), encoding_rs::UTF_8),
        TextEncoding::ShiftJis => code_pages
            .iter()
            .find_map(|&cp| {
                let (bytes, _, had_errors) = cp.encode(text);
                (!had_errors).then(|| (bytes.into_owned(), cp))
            })
            .ok_or_else(|| {
                Kanji2KoeError::Encoding(format!("text cannot be represented as Shift-JIS: {text:?}"))
            })?,
    };
    let bytes = CString::new(bytes)
        .map_err(|_| Kanji2KoeError::Encoding("text contains a null byte".into()))?;
    Ok(EncodedText { bytes, code_page })
}

/// Decode a zero-padded output buffer.
///
/// Only the bytes before the first NUL are considered. Undecodable sequences,
/// such as a lead byte cut off at the end of a full buffer, are dropped.
pub(crate) fn decode(buf: &[u8], code_page: &'static Encoding) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let bytes = &buf[..end];

    let text = if code_page == encoding_rs::UTF_8 {
        bytes.utf8_chunks().map(|chunk| chunk.valid()).collect::<String>()
    } else {
        match code_page.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => text.into_owned(),
            // Shift-JIS has no mapping for U+FFFD, so every one of them
            // stands for malformed input.
            None => code_page
                .decode_without_bom_handling(bytes)
                .0
                .chars()
                .filter(|&c| c != char::REPLACEMENT_CHARACTER)
                .collect(),
        }
    };
    text.trim_end_matches('\0').to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
