//! Purpose: Library side of the plugin ABI, used through `export_plugin!`.
//! Exports: `ExportedStrings`, `execute_exported`, the `export_plugin!` macro.
//! Role: Lets a `cdylib` expose one `Plugin` implementation to psqlx's loader.
//! Invariants: Exported strings live as long as the library; callers never free them.
//! Invariants: Panics inside a plugin are caught and reported as `Error`.
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

use super::Plugin;
use crate::core::result::BackslashResult;
use crate::host::RawHandles;
use crate::host::psql::{HostSymbols, PsqlHost};

/// NUL-terminated copies of a plugin's name, version and command list.
pub struct ExportedStrings {
    name: CString,
    version: CString,
    commands: CString,
}

impl ExportedStrings {
    pub fn new(plugin: &dyn Plugin) -> Self {
        Self {
            name: c_string(plugin.name()),
            version: c_string(plugin.version()),
            commands: c_string(&plugin.command_names().join(",")),
        }
    }

    pub fn name(&self) -> *const c_char {
        self.name.as_ptr()
    }

    pub fn version(&self) -> *const c_char {
        self.version.as_ptr()
    }

    pub fn commands(&self) -> *const c_char {
        self.commands.as_ptr()
    }
}

fn c_string(text: &str) -> CString {
    CString::new(text).unwrap_or_default()
}

/// Runs `cmd` on `plugin` with the host handles received over the ABI.
///
/// # Safety
/// `cmd` must be null or a valid NUL-terminated string, and `raw` must hold
/// the handles psql passed to the hook for the current call.
pub unsafe fn execute_exported(
    plugin: &dyn Plugin,
    cmd: *const c_char,
    raw: RawHandles,
    active_branch: bool,
) -> c_int {
    if cmd.is_null() {
        return BackslashResult::Unknown.as_raw();
    }
    let Ok(cmd) = unsafe { CStr::from_ptr(cmd) }.to_str() else {
        return BackslashResult::Unknown.as_raw();
    };
    if !plugin
        .meta_commands()
        .iter()
        .any(|command| command.name() == cmd)
    {
        return BackslashResult::Unknown.as_raw();
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let symbols = match HostSymbols::resolve() {
            Ok(symbols) => symbols,
            Err(err) => {
                tracing::error!(plugin = plugin.name(), command = cmd, "{err}");
                return BackslashResult::Error;
            }
        };
        let mut host = PsqlHost::new(symbols, raw);
        let mut ctx = host.context(active_branch);
        plugin.execute_command(cmd, &mut ctx)
    }))
    .unwrap_or(BackslashResult::Error);
    result.as_raw()
}

/// Exports a `Plugin` from a `cdylib` so psqlx can load it.
///
/// ```ignore
/// psqlx::export_plugin!(MyPlugin::new());
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($constructor:expr) => {
        fn __psqlx_exported_plugin() -> &'static dyn $crate::plugin::Plugin {
            static PLUGIN: ::std::sync::OnceLock<::std::boxed::Box<dyn $crate::plugin::Plugin>> =
                ::std::sync::OnceLock::new();
            PLUGIN
                .get_or_init(|| ::std::boxed::Box::new($constructor))
                .as_ref()
        }

        fn __psqlx_exported_strings() -> &'static $crate::plugin::export::ExportedStrings {
            static STRINGS: ::std::sync::OnceLock<$crate::plugin::export::ExportedStrings> =
                ::std::sync::OnceLock::new();
            STRINGS.get_or_init(|| {
                $crate::plugin::export::ExportedStrings::new(__psqlx_exported_plugin())
            })
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn psqlx_plugin_abi_version() -> u32 {
            $crate::plugin::PLUGIN_ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn psqlx_plugin_name() -> *const ::std::os::raw::c_char {
            __psqlx_exported_strings().name()
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn psqlx_plugin_version() -> *const ::std::os::raw::c_char {
            __psqlx_exported_strings().version()
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn psqlx_plugin_meta_commands() -> *const ::std::os::raw::c_char {
            __psqlx_exported_strings().commands()
        }

        /// # Safety
        /// Must only be called by psqlx with the handles psql passed to the hook.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn psqlx_plugin_execute(
            cmd: *const ::std::os::raw::c_char,
            scan_state: $crate::host::psql::PsqlScanState,
            active_branch: bool,
            query_buf: $crate::host::psql::PQExpBuffer,
            previous_buf: $crate::host::psql::PQExpBuffer,
            settings: $crate::host::psql::PsqlSettings,
        ) -> ::std::os::raw::c_int {
            let raw = $crate::host::RawHandles {
                scan_state,
                query_buf,
                previous_buf,
                settings,
            };
            unsafe {
                $crate::plugin::export::execute_exported(
                    __psqlx_exported_plugin(),
                    cmd,
                    raw,
                    active_branch,
                )
            }
        }
    };
}
