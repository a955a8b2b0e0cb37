//! Purpose: Adapt raw psql/libpq handles to the host capability traits.
//! Exports: Raw handle types, `RawHandles`, `HostSymbols`, `PsqlHost`, `read_buffer`.
//! Role: Used by the C hook and by exported plugins when running inside psql.
//! Invariants: Host functions are resolved at run time with `dlsym`; no link-time dependency.
//! Invariants: Strings returned by `psql_scan_slash_option` are freed with `free`.
//! Invariants: `PQresult`s are always cleared before returning.
//! Notes: The host binary must export its symbols (e.g. `-Wl,--export-dynamic`).
use std::ffi::{CStr, CString, c_void};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::OnceLock;

use super::{CommandContext, OptionKind, QueryBuffer, ScanState, Session};
use crate::core::error::{Error, ErrorKind};

#[repr(C)]
pub struct PQExpBufferData {
    pub data: *mut c_char,
    pub len: usize,
    pub maxlen: usize,
}

pub type PQExpBuffer = *mut PQExpBufferData;

#[repr(C)]
pub struct PsqlScanStateData {
    _private: [u8; 0],
}

pub type PsqlScanState = *mut PsqlScanStateData;

#[repr(C)]
pub struct PGconn {
    _private: [u8; 0],
}

#[repr(C)]
pub struct PGresult {
    _private: [u8; 0],
}

/// Leading fields of psql's `struct _psqlSettings`; only `db` is read.
#[repr(C)]
pub struct PsqlSettingsData {
    pub db: *mut PGconn,
}

pub type PsqlSettings = *mut PsqlSettingsData;

const PGRES_TUPLES_OK: c_int = 2;

/// The untouched pointers psql handed to the hook for one call.
#[derive(Clone, Copy, Debug)]
pub struct RawHandles {
    pub scan_state: PsqlScanState,
    pub query_buf: PQExpBuffer,
    pub previous_buf: PQExpBuffer,
    pub settings: PsqlSettings,
}

type ScanSlashOptionFn =
    unsafe extern "C" fn(PsqlScanState, c_int, *mut c_char, bool) -> *mut c_char;
type BufferFn = unsafe extern "C" fn(PQExpBuffer);
type AppendBufferFn = unsafe extern "C" fn(PQExpBuffer, *const c_char);
type ErrorMessageFn = unsafe extern "C" fn(*const PGconn) -> *mut c_char;
type ExecFn = unsafe extern "C" fn(*mut PGconn, *const c_char) -> *mut PGresult;
type ResultIntFn = unsafe extern "C" fn(*const PGresult) -> c_int;
type ResultErrorFn = unsafe extern "C" fn(*const PGresult) -> *mut c_char;
type GetValueFn = unsafe extern "C" fn(*const PGresult, c_int, c_int) -> *mut c_char;
type GetIsNullFn = unsafe extern "C" fn(*const PGresult, c_int, c_int) -> c_int;
type ClearFn = unsafe extern "C" fn(*mut PGresult);

/// Function table of the psql/libpq entry points the extension calls back into.
pub struct HostSymbols {
    scan_slash_option: ScanSlashOptionFn,
    reset_buffer: BufferFn,
    append_buffer: AppendBufferFn,
    error_message: ErrorMessageFn,
    exec: ExecFn,
    result_status: ResultIntFn,
    result_error: ResultErrorFn,
    ntuples: ResultIntFn,
    get_value: GetValueFn,
    get_is_null: GetIsNullFn,
    clear: ClearFn,
}

static SYMBOLS: OnceLock<Result<HostSymbols, String>> = OnceLock::new();

impl HostSymbols {
    pub fn resolve() -> Result<&'static HostSymbols, Error> {
        SYMBOLS
            .get_or_init(Self::lookup_all)
            .as_ref()
            .map_err(|message| {
                Error::new(ErrorKind::Host)
                    .with_message(message.clone())
                    .with_hint(
                        "Build psql with exported symbols (-Wl,--export-dynamic) and libpq loaded.",
                    )
            })
    }

    #[cfg(unix)]
    fn lookup_all() -> Result<Self, String> {
        macro_rules! symbol {
            ($name:literal) => {{
                let ptr = unsafe {
                    libc::dlsym(libc::RTLD_DEFAULT, concat!($name, "\0").as_ptr().cast())
                };
                if ptr.is_null() {
                    return Err(format!("host symbol `{}` not found", $name));
                }
                // SAFETY: the host exports this symbol with the signature of the target field.
                unsafe { std::mem::transmute::<*mut c_void, _>(ptr) }
            }};
        }

        Ok(Self {
            scan_slash_option: symbol!("psql_scan_slash_option"),
            reset_buffer: symbol!("resetPQExpBuffer"),
            append_buffer: symbol!("appendPQExpBufferStr"),
            error_message: symbol!("PQerrorMessage"),
            exec: symbol!("PQexec"),
            result_status: symbol!("PQresultStatus"),
            result_error: symbol!("PQresultErrorMessage"),
            ntuples: symbol!("PQntuples"),
            get_value: symbol!("PQgetvalue"),
            get_is_null: symbol!("PQgetisnull"),
            clear: symbol!("PQclear"),
        })
    }

    #[cfg(not(unix))]
    fn lookup_all() -> Result<Self, String> {
        Err("host symbol lookup is only supported on unix".to_string())
    }
}

/// Copies the contents of a `PQExpBuffer` into an owned string.
///
/// # Safety
/// `buffer` must be null or point to a live `PQExpBufferData` whose `data`
/// holds at least `len` readable bytes.
pub unsafe fn read_buffer(buffer: PQExpBuffer) -> Result<String, Error> {
    if buffer.is_null() {
        return Err(Error::new(ErrorKind::Host).with_message("query buffer is null"));
    }
    let buf = unsafe { &*buffer };
    if buf.data.is_null() || buf.len == 0 {
        return Ok(String::new());
    }
    let bytes = unsafe { std::slice::from_raw_parts(buf.data.cast::<u8>(), buf.len) };
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| {
            Error::new(ErrorKind::Host)
                .with_message("query buffer is not valid UTF-8")
                .with_source(err)
        })
}

fn owned_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

pub struct PsqlScan {
    symbols: &'static HostSymbols,
    raw: PsqlScanState,
}

impl ScanState for PsqlScan {
    fn next_option(&mut self, kind: OptionKind) -> Option<String> {
        if self.raw.is_null() {
            return None;
        }
        let ptr = unsafe {
            (self.symbols.scan_slash_option)(self.raw, kind as c_int, ptr::null_mut(), true)
        };
        let value = owned_c_string(ptr);
        if !ptr.is_null() {
            unsafe { libc::free(ptr.cast()) };
        }
        value
    }
}

pub struct PsqlBuffer {
    symbols: &'static HostSymbols,
    raw: PQExpBuffer,
}

impl QueryBuffer for PsqlBuffer {
    fn text(&self) -> Result<String, Error> {
        unsafe { read_buffer(self.raw) }
    }

    fn reset(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.symbols.reset_buffer)(self.raw) };
        }
    }

    fn append(&mut self, text: &str) -> Result<(), Error> {
        if self.raw.is_null() {
            return Err(Error::new(ErrorKind::Host).with_message("query buffer is null"));
        }
        let text = CString::new(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("text contains a NUL byte")
                .with_source(err)
        })?;
        unsafe { (self.symbols.append_buffer)(self.raw, text.as_ptr()) };
        Ok(())
    }
}

pub struct PsqlSession {
    symbols: &'static HostSymbols,
    settings: PsqlSettings,
}

impl PsqlSession {
    fn conn(&self) -> *mut PGconn {
        if self.settings.is_null() {
            return ptr::null_mut();
        }
        unsafe { (*self.settings).db }
    }
}

impl Session for PsqlSession {
    fn last_error(&self) -> Option<String> {
        let conn = self.conn();
        if conn.is_null() {
            return None;
        }
        let message = owned_c_string(unsafe { (self.symbols.error_message)(conn) })?;
        let message = message.trim_end();
        if message.is_empty() {
            None
        } else {
            Some(message.to_string())
        }
    }

    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error> {
        let conn = self.conn();
        if conn.is_null() {
            return Err(Error::new(ErrorKind::Host).with_message("no database connection"));
        }
        let sql = CString::new(sql).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("query contains a NUL byte")
                .with_source(err)
        })?;
        let result = unsafe { (self.symbols.exec)(conn, sql.as_ptr()) };
        if result.is_null() {
            let message = self
                .last_error()
                .unwrap_or_else(|| "query returned no result".to_string());
            return Err(Error::new(ErrorKind::Upstream).with_message(message));
        }

        let outcome = unsafe {
            if (self.symbols.result_status)(result) != PGRES_TUPLES_OK {
                let message = owned_c_string((self.symbols.result_error)(result))
                    .map(|message| message.trim_end().to_string())
                    .unwrap_or_default();
                Err(Error::new(ErrorKind::Upstream).with_message(message))
            } else if (self.symbols.ntuples)(result) < 1
                || (self.symbols.get_is_null)(result, 0, 0) != 0
            {
                Ok(None)
            } else {
                Ok(owned_c_string((self.symbols.get_value)(result, 0, 0)))
            }
        };
        unsafe { (self.symbols.clear)(result) };
        outcome
    }
}

/// All four host adapters for one hook call.
pub struct PsqlHost {
    raw: RawHandles,
    scan: PsqlScan,
    query_buf: PsqlBuffer,
    previous_buf: PsqlBuffer,
    session: PsqlSession,
}

impl PsqlHost {
    pub fn new(symbols: &'static HostSymbols, raw: RawHandles) -> Self {
        Self {
            raw,
            scan: PsqlScan {
                symbols,
                raw: raw.scan_state,
            },
            query_buf: PsqlBuffer {
                symbols,
                raw: raw.query_buf,
            },
            previous_buf: PsqlBuffer {
                symbols,
                raw: raw.previous_buf,
            },
            session: PsqlSession {
                symbols,
                settings: raw.settings,
            },
        }
    }

    pub fn context(&mut self, active_branch: bool) -> CommandContext<'_> {
        CommandContext::new(
            &mut self.scan,
            active_branch,
            &mut self.query_buf,
            &self.previous_buf,
            &mut self.session,
        )
        .with_raw(self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::{HostSymbols, PQExpBufferData, read_buffer};
    use crate::core::error::ErrorKind;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn read_buffer_copies_len_bytes() {
        let raw = CString::new("select 1; trailing").expect("cstring").into_raw();
        let mut data = PQExpBufferData {
            data: raw,
            len: 9,
            maxlen: 19,
        };
        let text = unsafe { read_buffer(&mut data) }.expect("read");
        assert_eq!(text, "select 1;");
        drop(unsafe { CString::from_raw(raw) });
    }

    #[test]
    fn read_buffer_handles_empty_and_null() {
        let mut empty = PQExpBufferData {
            data: ptr::null_mut(),
            len: 0,
            maxlen: 0,
        };
        assert_eq!(unsafe { read_buffer(&mut empty) }.expect("read"), "");

        let err = unsafe { read_buffer(ptr::null_mut()) }.expect_err("null");
        assert_eq!(err.kind(), ErrorKind::Host);
    }

    #[test]
    fn resolve_fails_outside_psql() {
        let err = HostSymbols::resolve().err().expect("no psql symbols in tests");
        assert_eq!(err.kind(), ErrorKind::Host);
        assert!(err.hint().is_some());
    }
}
