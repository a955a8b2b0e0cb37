//! Purpose: The extension hook psql calls for backslash commands it does not know.
//! Exports: `has_command_ext`, `exec_command_ext` (C ABI, see `include/psqlx.h`).
//! Role: Thin C boundary over the process-global plugin registry.
//! Invariants: Null or non-UTF-8 command names are "not ours" (`0` / `Unknown`).
//! Invariants: Panics never cross into psql; they become `Error`.
//! Invariants: No host pointer is kept after a call returns.
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

use crate::core::result::BackslashResult;
use crate::host::RawHandles;
use crate::host::psql::{HostSymbols, PQExpBuffer, PsqlHost, PsqlScanState, PsqlSettings};
use crate::plugin::registry;

/// Returns 1 when a registered plugin provides `cmd`, else 0.
#[unsafe(no_mangle)]
pub extern "C" fn has_command_ext(cmd: *const c_char) -> c_int {
    let Some(cmd) = command_name(cmd) else {
        return 0;
    };
    let found = panic::catch_unwind(|| registry::global().has_command(cmd)).unwrap_or(false);
    c_int::from(found)
}

/// Runs `cmd` with psql's live scanner, buffers and settings.
#[unsafe(no_mangle)]
pub extern "C" fn exec_command_ext(
    cmd: *const c_char,
    scan_state: PsqlScanState,
    active_branch: bool,
    query_buf: PQExpBuffer,
    previous_buf: PQExpBuffer,
    pset: PsqlSettings,
) -> BackslashResult {
    let Some(cmd) = command_name(cmd) else {
        return BackslashResult::Unknown;
    };
    let raw = RawHandles {
        scan_state,
        query_buf,
        previous_buf,
        settings: pset,
    };
    panic::catch_unwind(AssertUnwindSafe(|| dispatch(cmd, raw, active_branch))).unwrap_or_else(
        |_| {
            tracing::error!(command = cmd, "meta-command panicked");
            BackslashResult::Error
        },
    )
}

fn dispatch(cmd: &str, raw: RawHandles, active_branch: bool) -> BackslashResult {
    let registry = registry::global();
    if !registry.has_command(cmd) {
        return BackslashResult::Unknown;
    }
    let symbols = match HostSymbols::resolve() {
        Ok(symbols) => symbols,
        Err(err) => {
            tracing::error!(command = cmd, "cannot call back into psql: {err}");
            return BackslashResult::Error;
        }
    };
    let mut host = PsqlHost::new(symbols, raw);
    let mut ctx = host.context(active_branch);
    registry.dispatch(cmd, &mut ctx)
}

fn command_name<'a>(cmd: *const c_char) -> Option<&'a str> {
    if cmd.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(cmd) }.to_str().ok()
}
