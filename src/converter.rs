//! The converter: one AqKanji2Koe instance and its lifetime.
//!
//! A [`Kanji2Koe`] is either initialized (it holds a live instance handle) or
//! released. Every conversion on a released converter fails with
//! [`Kanji2KoeError::NotInitialized`]. Release happens explicitly through
//! [`release`](Kanji2Koe::release), at the end of a [`scope`](Kanji2Koe::scope)
//! block, or on drop, whichever comes first.
//!
//! The vendor library does not document its instance handle as thread-safe, so
//! a converter is `Send` (when its backend is) but never `Sync`. Share one
//! across threads behind a `Mutex`.

use std::{
    ffi::{c_void, CString},
    fmt,
    os::raw::c_int,
    path::{Path, PathBuf},
    ptr::NonNull,
};

use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::{
    bindings::{ConvertEntry, DynamicLibrary, Kanji2KoeApi},
    config::Kanji2KoeConfig,
    encoding::{self, TextEncoding},
    error::{Kanji2KoeError, Result},
    resolve::SearchDirs,
};

/// File that must sit directly inside the dictionary directory.
pub const DICTIONARY_FILE: &str = "aqdic.bin";

/// Japanese text → phoneme string converter backed by AqKanji2Koe.
pub struct Kanji2Koe<A: Kanji2KoeApi = DynamicLibrary> {
    handle: Option<NonNull<c_void>>,
    dictionary_dir: PathBuf,
    buffer_size: usize,
    code_pages: Vec<&'static Encoding>,
    api: A,
}

// The handle is only ever touched through `&self`/`&mut self` of its single
// owner, and the type stays !Sync.
unsafe impl<A: Kanji2KoeApi + Send> Send for Kanji2Koe<A> {}

// ─── Constructors ────────────────────────────────────────────────────────────

impl Kanji2Koe<DynamicLibrary> {
    /// Open a converter on `dictionary_dir`, searching for the library in the
    /// default locations.
    ///
    /// `AQKANJI2KOE_LIBRARY` and `AQKANJI2KOE_DEV_KEY` are honoured.
    pub fn open(dictionary_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(dictionary_dir, &Kanji2KoeConfig::default().with_env_overrides())
    }

    /// Open a converter using the library file at `library_path`.
    ///
    /// Environment overrides apply as in [`open`](Self::open), except that
    /// `library_path` always wins over `AQKANJI2KOE_LIBRARY`.
    pub fn open_with_library(
        dictionary_dir: impl AsRef<Path>,
        library_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let config = Kanji2KoeConfig::default()
            .with_env_overrides()
            .with_library_path(library_path.as_ref());
        Self::open_with_config(dictionary_dir, &config)
    }

    /// Open a converter with an explicit configuration.
    ///
    /// `config` is used as given; environment overrides are not applied here,
    /// call [`Kanji2KoeConfig::with_env_overrides`] first to honour them.
    pub fn open_with_config(
        dictionary_dir: impl AsRef<Path>,
        config: &Kanji2KoeConfig,
    ) -> Result<Self> {
        let dictionary_dir = validate_dictionary(dictionary_dir.as_ref())?;
        let code_pages = encoding::resolve_code_pages(&config.sjis_code_pages)?;
        let api = DynamicLibrary::locate(
            config.library_path.as_deref(),
            &config.candidates,
            &SearchDirs::for_process(&dictionary_dir),
        )?;
        Self::create(api, dictionary_dir, code_pages, config)
    }
}

impl<A: Kanji2KoeApi> Kanji2Koe<A> {
    /// Create a converter on top of an already-bound foreign API.
    pub fn with_api(
        api: A,
        dictionary_dir: impl AsRef<Path>,
        config: &Kanji2KoeConfig,
    ) -> Result<Self> {
        let dictionary_dir = validate_dictionary(dictionary_dir.as_ref())?;
        let code_pages = encoding::resolve_code_pages(&config.sjis_code_pages)?;
        Self::create(api, dictionary_dir, code_pages, config)
    }

    fn create(
        api: A,
        dictionary_dir: PathBuf,
        code_pages: Vec<&'static Encoding>,
        config: &Kanji2KoeConfig,
    ) -> Result<Self> {
        let dic_arg = dictionary_arg(&dictionary_dir)?;

        let mut code: c_int = 0;
        // SAFETY: a non-null result is stored below or released on the error path.
        let raw = unsafe { api.create(&dic_arg, &mut code) };

        let handle = match NonNull::new(raw) {
            Some(h) if code == 0 => h,
            partial => {
                if let Some(h) = partial {
                    warn!(code, "AqKanji2Koe_Create returned a handle with an error code; releasing it");
                    // SAFETY: `h` was just created and is not stored anywhere.
                    unsafe { api.release(h.as_ptr()) };
                }
                return Err(Kanji2KoeError::Initialization { code });
            }
        };
        debug!(dictionary = %dictionary_dir.display(), "created AqKanji2Koe instance");

        let converter = Self {
            handle: Some(handle),
            dictionary_dir,
            buffer_size: config.buffer_size,
            code_pages,
            api,
        };
        if let Some(key) = &config.developer_key {
            if !converter.set_developer_key(key) {
                warn!("AqKanji2Koe rejected the configured developer key");
            }
        }
        Ok(converter)
    }

    /// Convert `text` to a phoneme string.
    ///
    /// `encoding` is a label: `utf-8`/`utf8` or `sjis`/`shift-jis`/`shift_jis`
    /// (case-insensitive). `buffer_size` is the output capacity in bytes.
    pub fn convert(&self, text: &str, encoding: &str, buffer_size: usize) -> Result<String> {
        self.live_handle()?;
        let encoding: TextEncoding = encoding.parse()?;
        self.run(false, text, encoding, buffer_size)
    }

    /// [`convert`](Self::convert) with a typed encoding.
    pub fn convert_with(
        &self,
        text: &str,
        encoding: TextEncoding,
        buffer_size: usize,
    ) -> Result<String> {
        self.run(false, text, encoding, buffer_size)
    }

    /// UTF-8 conversion with the configured default buffer size.
    pub fn to_phonemes(&self, text: &str) -> Result<String> {
        self.run(false, text, TextEncoding::Utf8, self.buffer_size)
    }

    /// Convert `text` to ASCII romaji symbols (AquesTalk pico notation).
    ///
    /// Fails with [`Kanji2KoeError::UnavailableEntryPoint`] on library builds
    /// that do not export the romaji entry points.
    pub fn convert_roman(
        &self,
        text: &str,
        encoding: TextEncoding,
        buffer_size: usize,
    ) -> Result<String> {
        self.run(true, text, encoding, buffer_size)
    }

    fn run(
        &self,
        roman: bool,
        text: &str,
        encoding: TextEncoding,
        buffer_size: usize,
    ) -> Result<String> {
        let handle = self.live_handle()?;
        if buffer_size == 0 || c_int::try_from(buffer_size).is_err() {
            return Err(Kanji2KoeError::InvalidBufferSize(buffer_size));
        }

        let input = encoding::encode(text, encoding, &self.code_pages)?;
        let entry = match (roman, encoding) {
            (false, TextEncoding::Utf8) => ConvertEntry::Utf8,
            (false, TextEncoding::ShiftJis) => ConvertEntry::Sjis,
            (true, TextEncoding::Utf8) => ConvertEntry::RomanUtf8,
            (true, TextEncoding::ShiftJis) => ConvertEntry::RomanSjis,
        };

        let mut out = vec![0u8; buffer_size];
        // SAFETY: `handle` is live for as long as `self` is borrowed.
        let status = unsafe { self.api.convert(entry, handle.as_ptr(), &input.bytes, &mut out)? };
        if status != 0 {
            debug!(status, entry = entry.symbol(), "conversion failed");
            return Err(Kanji2KoeError::Conversion { code: status });
        }

        Ok(encoding::decode(&out, input.code_page))
    }

    /// Set the developer license key. Best effort: returns `false` when the
    /// converter is released, the key contains a NUL byte, or the library
    /// rejects it.
    ///
    /// The library may report success for some invalid keys without lifting
    /// the evaluation restrictions.
    pub fn set_developer_key(&self, key: impl AsRef<[u8]>) -> bool {
        if self.handle.is_none() {
            return false;
        }
        let Ok(key) = CString::new(key.as_ref()) else {
            return false;
        };
        self.api.set_dev_key(&key) == 0
    }

    /// Release the instance. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: the handle came from `create` and was just taken out, so
            // it is released exactly once.
            unsafe { self.api.release(handle.as_ptr()) };
            debug!(dictionary = %self.dictionary_dir.display(), "released AqKanji2Koe instance");
        }
    }

    /// Run `f`, then release the instance, even if `f` panics.
    pub fn scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        struct ReleaseOnExit<'a, A: Kanji2KoeApi>(&'a mut Kanji2Koe<A>);

        impl<A: Kanji2KoeApi> Drop for ReleaseOnExit<'_, A> {
            fn drop(&mut self) {
                self.0.release();
            }
        }

        let mut guard = ReleaseOnExit(self);
        f(&mut *guard.0)
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }

    /// Absolute dictionary directory the instance was created with.
    pub fn dictionary_directory(&self) -> &Path {
        &self.dictionary_dir
    }

    /// Default output buffer capacity used by [`to_phonemes`](Self::to_phonemes).
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The foreign API backing this converter.
    pub fn api(&self) -> &A {
        &self.api
    }

    fn live_handle(&self) -> Result<NonNull<c_void>> {
        self.handle.ok_or(Kanji2KoeError::NotInitialized)
    }
}

// ─── Release on drop ─────────────────────────────────────────────────────────

impl<A: Kanji2KoeApi> Drop for Kanji2Koe<A> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("AqKanji2Koe converter dropped without explicit release");
        }
        self.release();
    }
}

impl<A: Kanji2KoeApi> fmt::Debug for Kanji2Koe<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kanji2Koe")
            .field("dictionary_dir", &self.dictionary_dir)
            .field("initialized", &self.is_initialized())
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Check the dictionary layout and return the directory as an absolute path.
fn validate_dictionary(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(Kanji2KoeError::FileNotFound {
            what: "dictionary directory",
            path: dir.to_path_buf(),
        });
    }
    let dic = dir.join(DICTIONARY_FILE);
    if !dic.is_file() {
        return Err(Kanji2KoeError::FileNotFound { what: "system dictionary", path: dic });
    }
    std::path::absolute(dir).map_err(|_| Kanji2KoeError::InvalidPath(dir.to_path_buf()))
}

/// Dictionary path as passed to `AqKanji2Koe_Create`: UTF-8, trailing separator.
fn dictionary_arg(dir: &Path) -> Result<CString> {
    let invalid = || Kanji2KoeError::InvalidPath(dir.to_path_buf());
    let mut s = dir.to_str().ok_or_else(invalid)?.to_owned();
    if !s.chars().next_back().is_some_and(std::path::is_separator) {
        s.push(std::path::MAIN_SEPARATOR);
    }
    CString::new(s).map_err(|_| invalid())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;
    use crate::testing::{dictionary_dir, FakeApi};

    fn open(api: FakeApi, dir: &Path) -> Result<Kanji2Koe<FakeApi>> {
        Kanji2Koe::with_api(api, dir, &Kanji2KoeConfig::default())
    }

    #[test]
    fn test_missing_directory() {
        let api = FakeApi::new("");
        let log = api.log();
        let err = open(api, Path::new("/nonexistent/aq_dic")).unwrap_err();
        assert!(
            matches!(err, Kanji2KoeError::FileNotFound { what: "dictionary directory", .. }),
            "got: {err}"
        );
        assert_eq!(log.creates.get(), 0);
    }

    #[test]
    fn test_missing_dictionary_file() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi::new("");
        let log = api.log();
        let err = open(api, dir.path()).unwrap_err();
        match err {
            Kanji2KoeError::FileNotFound { what, path } => {
                assert_eq!(what, "system dictionary");
                assert!(path.ends_with(DICTIONARY_FILE));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(log.creates.get(), 0);
    }

    #[test]
    fn test_create_gets_trailing_separator() {
        let dir = dictionary_dir();
        let api = FakeApi::new("");
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();
        assert!(conv.is_initialized());
        assert!(conv.dictionary_directory().is_absolute());

        let passed = log.dictionary.borrow().clone().unwrap();
        assert!(passed.ends_with(std::path::MAIN_SEPARATOR));
        assert!(passed.starts_with(dir.path().to_str().unwrap()));
    }

    #[test]
    fn test_create_null_handle() {
        let dir = dictionary_dir();
        let mut api = FakeApi::new("");
        api.create_result = (false, 101);
        let log = api.log();
        let err = open(api, dir.path()).unwrap_err();
        assert!(matches!(err, Kanji2KoeError::Initialization { code: 101 }));
        assert_eq!(err.code(), Some(101));
        assert_eq!(log.releases.get(), 0);
    }

    #[test]
    fn test_partial_create_is_released() {
        let dir = dictionary_dir();
        let mut api = FakeApi::new("");
        api.create_result = (true, 7);
        let log = api.log();
        let err = open(api, dir.path()).unwrap_err();
        assert!(matches!(err, Kanji2KoeError::Initialization { code: 7 }));
        assert_eq!(log.releases.get(), 1);
    }

    #[test]
    fn test_convert_utf8() {
        let dir = dictionary_dir();
        let api = FakeApi::new("コンニチワ");
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();

        let koe = conv.convert("こんにちは", "utf-8", 1024).unwrap();
        assert_eq!(koe, "コンニチワ");
        assert!(!koe.contains('\0'));

        let calls = log.converts.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ConvertEntry::Utf8);
        assert_eq!(calls[0].1, "こんにちは".as_bytes());
        assert_eq!(calls[0].2, 1024);
    }

    #[test]
    fn test_convert_sjis() {
        let dir = dictionary_dir();
        let api = FakeApi::with_output(vec![0x83, 0x41]); // "ア" in Shift-JIS
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();

        let koe = conv.convert("あ", "Shift_JIS", 64).unwrap();
        assert_eq!(koe, "ア");

        let calls = log.converts.borrow();
        assert_eq!(calls[0].0, ConvertEntry::Sjis);
        assert_eq!(calls[0].1, [0x82u8, 0xA0]);
    }

    #[test]
    fn test_sjis_unrepresentable_text() {
        let dir = dictionary_dir();
        let api = FakeApi::new("");
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();
        let err = conv.convert_with("\u{1F600}", TextEncoding::ShiftJis, 64).unwrap_err();
        assert!(matches!(err, Kanji2KoeError::Encoding(_)));
        assert!(log.converts.borrow().is_empty());
    }

    #[test]
    fn test_unsupported_encoding_skips_foreign_call() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();
        let err = conv.convert("こんにちは", "euc-jp", 1024).unwrap_err();
        assert!(matches!(err, Kanji2KoeError::UnsupportedEncoding(_)));
        assert!(log.converts.borrow().is_empty());
    }

    #[test]
    fn test_conversion_error_code() {
        let dir = dictionary_dir();
        let mut api = FakeApi::new("ignored");
        api.convert_status = 105;
        let conv = open(api, dir.path()).unwrap();
        let err = conv.convert("漢字", "utf-8", 1024).unwrap_err();
        assert!(matches!(err, Kanji2KoeError::Conversion { code: 105 }));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();
        assert!(matches!(
            conv.convert("a", "utf-8", 0),
            Err(Kanji2KoeError::InvalidBufferSize(0))
        ));
        assert!(log.converts.borrow().is_empty());
    }

    #[test]
    fn test_output_truncated_to_buffer() {
        let dir = dictionary_dir();
        let api = FakeApi::new("abcdefgh");
        let conv = open(api, dir.path()).unwrap();
        // the fake fills the whole buffer without a terminator
        assert_eq!(conv.convert("a", "utf-8", 4).unwrap(), "abcd");
    }

    #[test]
    fn test_sjis_output_truncated_mid_character() {
        let dir = dictionary_dir();
        // "アイ" in Shift-JIS, cut after the lead byte of "イ"
        let api = FakeApi::with_output(vec![0x83, 0x41, 0x83, 0x43]);
        let conv = open(api, dir.path()).unwrap();
        assert_eq!(conv.convert("あ", "sjis", 3).unwrap(), "ア");
    }

    #[test]
    fn test_to_phonemes_uses_configured_buffer() {
        let dir = dictionary_dir();
        let api = FakeApi::new("ア");
        let log = api.log();
        let config = Kanji2KoeConfig { buffer_size: 256, ..Kanji2KoeConfig::default() };
        let conv = Kanji2Koe::with_api(api, dir.path(), &config).unwrap();
        assert_eq!(conv.to_phonemes("亜").unwrap(), "ア");
        assert_eq!(log.converts.borrow()[0].2, 256);
    }

    #[test]
    fn test_convert_after_release() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let mut conv = open(api, dir.path()).unwrap();
        conv.release();
        assert!(!conv.is_initialized());

        for encoding in ["utf-8", "sjis", "euc-jp"] {
            assert!(matches!(
                conv.convert("こんにちは", encoding, 1024),
                Err(Kanji2KoeError::NotInitialized)
            ));
        }
        assert!(matches!(
            conv.convert_roman("a", TextEncoding::Utf8, 16),
            Err(Kanji2KoeError::NotInitialized)
        ));
        assert!(log.converts.borrow().is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let mut conv = open(api, dir.path()).unwrap();
        conv.release();
        conv.release();
        drop(conv);
        assert_eq!(log.releases.get(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        drop(open(api, dir.path()).unwrap());
        assert_eq!(log.creates.get(), 1);
        assert_eq!(log.releases.get(), 1);
    }

    #[test]
    fn test_scope_releases_on_exit() {
        let dir = dictionary_dir();
        let api = FakeApi::new("コ");
        let log = api.log();
        let mut conv = open(api, dir.path()).unwrap();

        let koe = conv.scope(|c| c.convert("こ", "utf-8", 32)).unwrap();
        assert_eq!(koe, "コ");
        assert!(matches!(
            conv.convert("こ", "utf-8", 32),
            Err(Kanji2KoeError::NotInitialized)
        ));
        assert_eq!(log.releases.get(), 1);
    }

    #[test]
    fn test_scope_releases_on_panic() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let mut conv = open(api, dir.path()).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            conv.scope(|_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(!conv.is_initialized());
        assert!(matches!(
            conv.convert("a", "utf-8", 32),
            Err(Kanji2KoeError::NotInitialized)
        ));
        assert_eq!(log.releases.get(), 1);
    }

    #[test]
    fn test_developer_key() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let mut conv = open(api, dir.path()).unwrap();

        assert!(conv.set_developer_key("XXX-XXX-XXX"));
        assert!(conv.set_developer_key(b"raw-bytes"));
        assert!(!conv.set_developer_key("bad\0key"));
        assert!(!conv.set_developer_key("REJECT"));
        conv.release();
        assert!(!conv.set_developer_key("XXX-XXX-XXX"));

        let keys = log.dev_keys.borrow();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0], b"XXX-XXX-XXX");
        assert_eq!(keys[1], b"raw-bytes");
    }

    #[test]
    fn test_configured_developer_key_applied() {
        let dir = dictionary_dir();
        let api = FakeApi::new("x");
        let log = api.log();
        let config = Kanji2KoeConfig {
            developer_key: Some("REJECT".into()),
            ..Kanji2KoeConfig::default()
        };
        // a rejected key does not fail initialisation
        let conv = Kanji2Koe::with_api(api, dir.path(), &config).unwrap();
        assert!(conv.is_initialized());
        assert_eq!(log.dev_keys.borrow().len(), 1);
    }

    #[test]
    fn test_roman_entry_points() {
        let dir = dictionary_dir();
        let api = FakeApi::new("konnichiwa");
        let log = api.log();
        let conv = open(api, dir.path()).unwrap();
        assert_eq!(conv.convert_roman("こんにちは", TextEncoding::Utf8, 64).unwrap(), "konnichiwa");
        assert_eq!(log.converts.borrow()[0].0, ConvertEntry::RomanUtf8);

        let dir = dictionary_dir();
        let mut api = FakeApi::new("konnichiwa");
        api.roman = false;
        let conv = open(api, dir.path()).unwrap();
        let err = conv.convert_roman("こんにちは", TextEncoding::ShiftJis, 64).unwrap_err();
        assert!(matches!(
            err,
            Kanji2KoeError::UnavailableEntryPoint("AqKanji2Koe_ConvRoman_sjis")
        ));
    }

    #[test]
    fn test_dictionary_arg_separator() {
        let sep = std::path::MAIN_SEPARATOR;
        let arg = dictionary_arg(Path::new("/aq/aq_dic")).unwrap();
        assert_eq!(arg.to_str().unwrap(), format!("/aq/aq_dic{sep}"));

        let with_sep = format!("/aq/aq_dic{sep}");
        let arg = dictionary_arg(Path::new(&with_sep)).unwrap();
        assert_eq!(arg.to_str().unwrap(), with_sep);
    }

    #[test]
    fn test_converter_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Kanji2Koe<DynamicLibrary>>();
    }

    /// Needs the vendor library and dictionary:
    /// `AQKANJI2KOE_DIC=/path/to/aq_dic AQKANJI2KOE_LIBRARY=/path/to/libAqKanji2Koe.so`
    #[test]
    #[ignore]
    fn test_real_library_round_trip() {
        let dic = std::env::var("AQKANJI2KOE_DIC").expect("AQKANJI2KOE_DIC not set");
        let mut conv = Kanji2Koe::open(&dic).expect("open failed");
        let koe = conv.convert("こんにちは", "utf-8", 1024).expect("convert failed");
        assert!(!koe.is_empty());
        assert!(!koe.contains('\0'));
        println!("koe: {koe}");

        conv.release();
        assert!(matches!(
            conv.convert("こんにちは", "utf-8", 1024),
            Err(Kanji2KoeError::NotInitialized)
        ));
    }
}
