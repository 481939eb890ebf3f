//! In-process stand-in for the vendor library, used by unit tests.

use std::{
    cell::{Cell, RefCell},
    ffi::CStr,
    os::raw::c_int,
    rc::Rc,
};

use tempfile::TempDir;

use crate::{
    bindings::{ConvertEntry, Kanji2KoeApi, RawHandle},
    converter::DICTIONARY_FILE,
    error::{Kanji2KoeError, Result},
};

/// Every call the fake received.
#[derive(Default)]
pub struct CallLog {
    pub creates: Cell<u32>,
    pub releases: Cell<u32>,
    pub dictionary: RefCell<Option<String>>,
    /// (entry point, input bytes, buffer capacity)
    pub converts: RefCell<Vec<(ConvertEntry, Vec<u8>, usize)>>,
    pub dev_keys: RefCell<Vec<Vec<u8>>>,
}

pub struct FakeApi {
    log: Rc<CallLog>,
    instance: Box<u8>,
    /// (return a handle?, error code written by create)
    pub create_result: (bool, c_int),
    pub convert_status: c_int,
    /// Bytes written to the output buffer, NUL-terminated when they fit.
    pub output: Vec<u8>,
    pub roman: bool,
}

impl FakeApi {
    pub fn new(output: &str) -> Self {
        Self::with_output(output.as_bytes().to_vec())
    }

    pub fn with_output(output: Vec<u8>) -> Self {
        Self {
            log: Rc::default(),
            instance: Box::new(0),
            create_result: (true, 0),
            convert_status: 0,
            output,
            roman: true,
        }
    }

    pub fn log(&self) -> Rc<CallLog> {
        Rc::clone(&self.log)
    }

    fn handle(&self) -> RawHandle {
        (&*self.instance as *const u8).cast_mut().cast()
    }
}

unsafe impl Kanji2KoeApi for FakeApi {
    unsafe fn create(&self, dic_dir: &CStr, err: &mut c_int) -> RawHandle {
        self.log.creates.set(self.log.creates.get() + 1);
        *self.log.dictionary.borrow_mut() = Some(dic_dir.to_string_lossy().into_owned());
        let (ok, code) = self.create_result;
        *err = code;
        if ok {
            self.handle()
        } else {
            std::ptr::null_mut()
        }
    }

    unsafe fn release(&self, handle: RawHandle) {
        assert_eq!(handle, self.handle(), "released a foreign handle");
        self.log.releases.set(self.log.releases.get() + 1);
        assert_eq!(self.log.releases.get(), 1, "handle released twice");
    }

    unsafe fn convert(
        &self,
        entry: ConvertEntry,
        handle: RawHandle,
        input: &CStr,
        out: &mut [u8],
    ) -> Result<c_int> {
        assert_eq!(handle, self.handle());
        if !self.roman && matches!(entry, ConvertEntry::RomanUtf8 | ConvertEntry::RomanSjis) {
            return Err(Kanji2KoeError::UnavailableEntryPoint(entry.symbol()));
        }
        self.log
            .converts
            .borrow_mut()
            .push((entry, input.to_bytes().to_vec(), out.len()));
        if self.convert_status != 0 {
            return Ok(self.convert_status);
        }
        let n = self.output.len().min(out.len());
        out[..n].copy_from_slice(&self.output[..n]);
        if n < out.len() {
            out[n] = 0;
        }
        Ok(0)
    }

    fn set_dev_key(&self, key: &CStr) -> c_int {
        self.log.dev_keys.borrow_mut().push(key.to_bytes().to_vec());
        if key.to_bytes() == b"REJECT" {
            1
        } else {
            0
        }
    }
}

/// Temporary directory laid out like `aq_dic/`.
pub fn dictionary_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(DICTIONARY_FILE), b"dummy").expect("write aqdic.bin");
    dir
}
