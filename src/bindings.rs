//! Foreign entry points of `AqKanji2Koe` and the seam the converter calls
//! them through.
//!
//! The library is loaded at runtime with [`libloading`]; nothing is linked at
//! build time. Entry points are declared once in the table below and bound in
//! a single pass when the library is opened.
//!
//! | Symbol                         | Required |
//! |--------------------------------|----------|
//! | `AqKanji2Koe_Create`           | yes      |
//! | `AqKanji2Koe_Release`          | yes      |
//! | `AqKanji2Koe_Convert_utf8`     | yes      |
//! | `AqKanji2Koe_Convert_sjis`     | yes      |
//! | `AqKanji2Koe_SetDevKey`        | yes      |
//! | `AqKanji2Koe_ConvRoman_utf8`   | no       |
//! | `AqKanji2Koe_ConvRoman_sjis`   | no       |

use std::{
    ffi::CStr,
    os::raw::{c_char, c_int, c_void},
    path::{Path, PathBuf},
};

use libloading::Library;
use tracing::info;

use crate::{
    error::{Kanji2KoeError, Result},
    resolve::{candidate_paths, current_platform, load_first, LibraryCandidates, SearchDirs},
};

// ─── FFI types ───────────────────────────────────────────────────────────────

/// Raw instance handle returned by `AqKanji2Koe_Create`.
pub type RawHandle = *mut c_void;

// The vendor header declares every function `__stdcall`; "system" is stdcall
// on 32-bit Windows and the C ABI everywhere else.
type CreateFn = unsafe extern "system" fn(*const c_char, *mut c_int) -> RawHandle;
type ReleaseFn = unsafe extern "system" fn(RawHandle);
type ConvertFn = unsafe extern "system" fn(RawHandle, *const c_char, *mut c_char, c_int) -> c_int;
type SetDevKeyFn = unsafe extern "system" fn(*const c_char) -> c_int;

/// Which convert entry point to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertEntry {
    /// Kana phoneme symbols, UTF-8 in and out.
    Utf8,
    /// Kana phoneme symbols, Shift-JIS in and out.
    Sjis,
    /// Romaji symbols for AquesTalk pico, UTF-8 in, ASCII out.
    RomanUtf8,
    /// Romaji symbols for AquesTalk pico, Shift-JIS in, ASCII out.
    RomanSjis,
}

impl ConvertEntry {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Utf8 => "AqKanji2Koe_Convert_utf8",
            Self::Sjis => "AqKanji2Koe_Convert_sjis",
            Self::RomanUtf8 => "AqKanji2Koe_ConvRoman_utf8",
            Self::RomanSjis => "AqKanji2Koe_ConvRoman_sjis",
        }
    }
}

// ─── Foreign seam ────────────────────────────────────────────────────────────

/// The foreign AqKanji2Koe interface.
///
/// [`DynamicLibrary`] is the real implementation. The converter only ever
/// talks to the library through this trait.
///
/// # Safety
///
/// Implementors must behave like the vendor library: `release` and `convert`
/// accept any handle previously returned by `create` and not yet released.
pub unsafe trait Kanji2KoeApi {
    /// `AqKanji2Koe_Create`. `dic_dir` must end with a path separator.
    /// Returns null on failure, with the code written to `err`.
    ///
    /// # Safety
    /// A non-null result must eventually be passed to [`release`](Self::release)
    /// exactly once.
    unsafe fn create(&self, dic_dir: &CStr, err: &mut c_int) -> RawHandle;

    /// `AqKanji2Koe_Release`.
    ///
    /// # Safety
    /// `handle` must be live; it is invalid afterwards.
    unsafe fn release(&self, handle: RawHandle);

    /// One of the convert entry points. Writes a NUL-terminated string into
    /// `out` and returns the library's status code (0 on success).
    ///
    /// # Safety
    /// `handle` must be live.
    unsafe fn convert(
        &self,
        entry: ConvertEntry,
        handle: RawHandle,
        input: &CStr,
        out: &mut [u8],
    ) -> Result<c_int>;

    /// `AqKanji2Koe_SetDevKey`. 0 means accepted.
    fn set_dev_key(&self, key: &CStr) -> c_int;
}

// ─── Entry point table ───────────────────────────────────────────────────────

macro_rules! entry_points {
    (
        required { $( $field:ident : $ty:ty = $sym:literal, )* }
        optional { $( $opt:ident : $oty:ty = $osym:literal, )* }
    ) => {
        /// Function pointers copied out of the loaded library.
        ///
        /// Valid only while the owning [`Library`] stays loaded.
        #[derive(Clone, Copy)]
        struct EntryPoints {
            $( $field: $ty, )*
            $( $opt: Option<$oty>, )*
        }

        impl EntryPoints {
            /// Names of every entry point the binding knows about.
            const SYMBOLS: &'static [&'static str] = &[$( $sym, )* $( $osym, )*];

            /// # Safety
            /// The declared signatures must match the library's exports.
            unsafe fn bind(lib: &Library) -> Result<Self> {
                Ok(Self {
                    $(
                        $field: *lib
                            .get::<$ty>(concat!($sym, "\0").as_bytes())
                            .map_err(|source| Kanji2KoeError::MissingSymbol { name: $sym, source })?,
                    )*
                    $(
                        $opt: lib.get::<$oty>(concat!($osym, "\0").as_bytes()).ok().map(|s| *s),
                    )*
                })
            }
        }
    };
}

entry_points! {
    required {
        create: CreateFn = "AqKanji2Koe_Create",
        release: ReleaseFn = "AqKanji2Koe_Release",
        convert_utf8: ConvertFn = "AqKanji2Koe_Convert_utf8",
        convert_sjis: ConvertFn = "AqKanji2Koe_Convert_sjis",
        set_dev_key: SetDevKeyFn = "AqKanji2Koe_SetDevKey",
    }
    optional {
        conv_roman_utf8: ConvertFn = "AqKanji2Koe_ConvRoman_utf8",
        conv_roman_sjis: ConvertFn = "AqKanji2Koe_ConvRoman_sjis",
    }
}

// ─── Shared library ──────────────────────────────────────────────────────────

/// AqKanji2Koe loaded from a shared library file.
pub struct DynamicLibrary {
    entry: EntryPoints,
    path: PathBuf,
    // Dropped last: `entry` points into this library.
    _lib: Library,
}

impl DynamicLibrary {
    /// Open the library at `path` and bind its entry points.
    pub fn open(path: &Path) -> Result<Self> {
        let (lib, path) = load_first(&[path.to_path_buf()], open_library)?;
        Self::bind(lib, path)
    }

    /// Locate the library with the candidate `table` (or `explicit` when given)
    /// and bind its entry points.
    pub fn locate(
        explicit: Option<&Path>,
        table: &LibraryCandidates,
        dirs: &SearchDirs,
    ) -> Result<Self> {
        let paths = candidate_paths(explicit, table, current_platform(), dirs);
        let (lib, path) = load_first(&paths, open_library)?;
        Self::bind(lib, path)
    }

    fn bind(lib: Library, path: PathBuf) -> Result<Self> {
        // SAFETY: signatures in the entry point table follow AqKanji2Koe.h.
        let entry = unsafe { EntryPoints::bind(&lib)? };
        info!(
            path = %path.display(),
            roman = entry.conv_roman_utf8.is_some(),
            "loaded AqKanji2Koe library"
        );
        Ok(Self { entry, path, _lib: lib })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every symbol name the binding looks up.
    pub fn symbols() -> &'static [&'static str] {
        EntryPoints::SYMBOLS
    }
}

fn open_library(path: &Path) -> std::result::Result<Library, libloading::Error> {
    // SAFETY: loading runs the library's initialisers; AqKanji2Koe has no
    // load-time requirements beyond being a valid shared object.
    unsafe { Library::new(path) }
}

unsafe impl Kanji2KoeApi for DynamicLibrary {
    unsafe fn create(&self, dic_dir: &CStr, err: &mut c_int) -> RawHandle {
        unsafe { (self.entry.create)(dic_dir.as_ptr(), err) }
    }

    unsafe fn release(&self, handle: RawHandle) {
        unsafe { (self.entry.release)(handle) }
    }

    unsafe fn convert(
        &self,
        entry: ConvertEntry,
        handle: RawHandle,
        input: &CStr,
        out: &mut [u8],
    ) -> Result<c_int> {
        let f = match entry {
            ConvertEntry::Utf8 => Some(self.entry.convert_utf8),
            ConvertEntry::Sjis => Some(self.entry.convert_sjis),
            ConvertEntry::RomanUtf8 => self.entry.conv_roman_utf8,
            ConvertEntry::RomanSjis => self.entry.conv_roman_sjis,
        }
        .ok_or(Kanji2KoeError::UnavailableEntryPoint(entry.symbol()))?;

        let len = c_int::try_from(out.len())
            .map_err(|_| Kanji2KoeError::InvalidBufferSize(out.len()))?;
        Ok(unsafe { f(handle, input.as_ptr(), out.as_mut_ptr().cast::<c_char>(), len) })
    }

    fn set_dev_key(&self, key: &CStr) -> c_int {
        // SAFETY: the key is a valid NUL-terminated string for the call's duration.
        unsafe { (self.entry.set_dev_key)(key.as_ptr()) }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
