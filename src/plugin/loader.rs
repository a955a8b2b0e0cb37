//! Purpose: Load plugin shared libraries and call their exported entry points.
//! Exports: `LoadedPlugin`, `PluginSymbols`, `PluginExecuteFn`, `load_dir`, `load_dir_with`.
//! Exports: `is_plugin_library`, `parse_command_list`.
//! Role: Dynamic half of the plugin registry (embedded plugins never pass through here).
//! Invariants: A library is accepted only if every ABI symbol resolves and the ABI version matches.
//! Invariants: The `Library` outlives every function pointer taken from it.
//! Invariants: Plugin result codes are validated; unknown codes become `Error`.
use std::ffi::{CStr, CString};
use std::fs;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};

use libloading::Library;

use super::PLUGIN_ABI_VERSION;
use crate::core::error::{Error, ErrorKind};
use crate::core::result::BackslashResult;
use crate::host::RawHandles;
use crate::host::psql::{PQExpBuffer, PsqlScanState, PsqlSettings};

pub type PluginExecuteFn = unsafe extern "C" fn(
    cmd: *const c_char,
    scan_state: PsqlScanState,
    active_branch: bool,
    query_buf: PQExpBuffer,
    previous_buf: PQExpBuffer,
    settings: PsqlSettings,
) -> c_int;

pub type PluginStrFn = unsafe extern "C" fn() -> *const c_char;
pub type PluginAbiFn = unsafe extern "C" fn() -> u32;

const ABI_VERSION_SYMBOL: &str = "psqlx_plugin_abi_version";
const NAME_SYMBOL: &str = "psqlx_plugin_name";
const VERSION_SYMBOL: &str = "psqlx_plugin_version";
const COMMANDS_SYMBOL: &str = "psqlx_plugin_meta_commands";
const EXECUTE_SYMBOL: &str = "psqlx_plugin_execute";

/// Entry points exported by a plugin library; `None` when a symbol is absent.
#[derive(Clone, Copy, Default)]
pub struct PluginSymbols {
    pub abi_version: Option<PluginAbiFn>,
    pub name: Option<PluginStrFn>,
    pub version: Option<PluginStrFn>,
    pub commands: Option<PluginStrFn>,
    pub execute: Option<PluginExecuteFn>,
}

impl PluginSymbols {
    fn resolve(library: &Library) -> Self {
        Self {
            abi_version: symbol(library, ABI_VERSION_SYMBOL),
            name: symbol(library, NAME_SYMBOL),
            version: symbol(library, VERSION_SYMBOL),
            commands: symbol(library, COMMANDS_SYMBOL),
            execute: symbol(library, EXECUTE_SYMBOL),
        }
    }
}

pub struct LoadedPlugin {
    name: String,
    version: String,
    commands: Vec<String>,
    path: PathBuf,
    execute: PluginExecuteFn,
    _library: Option<Library>,
}

impl LoadedPlugin {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let library = unsafe { Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::Plugin)
                .with_message("failed to load plugin library")
                .with_path(path)
                .with_source(err)
        })?;
        let symbols = PluginSymbols::resolve(&library);
        Self::from_symbols(path, symbols, Some(library))
    }

    /// Validates `symbols` and builds the plugin; `library` is kept alive with it.
    ///
    /// The ABI version is checked before any other entry point is called.
    pub fn from_symbols(
        path: &Path,
        symbols: PluginSymbols,
        library: Option<Library>,
    ) -> Result<Self, Error> {
        let abi_version = required(symbols.abi_version, path, ABI_VERSION_SYMBOL)?;
        let found = unsafe { abi_version() };
        if found != PLUGIN_ABI_VERSION {
            return Err(Error::new(ErrorKind::Plugin)
                .with_message(format!(
                    "plugin ABI version {found} is not supported (expected {PLUGIN_ABI_VERSION})"
                ))
                .with_path(path)
                .with_hint("Rebuild the plugin against this version of psqlx."));
        }

        let name_fn = required(symbols.name, path, NAME_SYMBOL)?;
        let version_fn = required(symbols.version, path, VERSION_SYMBOL)?;
        let commands_fn = required(symbols.commands, path, COMMANDS_SYMBOL)?;
        let execute = required(symbols.execute, path, EXECUTE_SYMBOL)?;

        let name = plugin_string(unsafe { name_fn() }, path, "name")?;
        if name.is_empty() {
            return Err(Error::new(ErrorKind::Plugin)
                .with_message("plugin name is empty")
                .with_path(path));
        }
        let version = plugin_string(unsafe { version_fn() }, path, "version")?;
        let commands = plugin_string(unsafe { commands_fn() }, path, "commands")?;
        let commands = parse_command_list(&commands);

        tracing::debug!(plugin = %name, ?commands, path = %path.display(), "loaded plugin library");
        Ok(Self {
            name,
            version,
            commands,
            path: path.to_path_buf(),
            execute,
            _library: library,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forwards the host's raw handles to the library's execute entry point.
    pub fn execute(&self, cmd: &str, raw: RawHandles, active_branch: bool) -> BackslashResult {
        let Ok(cmd) = CString::new(cmd) else {
            return BackslashResult::Error;
        };
        let code = unsafe {
            (self.execute)(
                cmd.as_ptr(),
                raw.scan_state,
                active_branch,
                raw.query_buf,
                raw.previous_buf,
                raw.settings,
            )
        };
        BackslashResult::from_raw(code).unwrap_or_else(|| {
            tracing::warn!(plugin = %self.name, code, "plugin returned an unknown result code");
            BackslashResult::Error
        })
    }
}

fn symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    let mut raw = name.as_bytes().to_vec();
    raw.push(0);
    match unsafe { library.get::<T>(&raw) } {
        Ok(found) => Some(*found),
        Err(err) => {
            tracing::debug!(symbol = name, error = %err, "plugin symbol not found");
            None
        }
    }
}

fn required<T>(found: Option<T>, path: &Path, name: &str) -> Result<T, Error> {
    found.ok_or_else(|| {
        Error::new(ErrorKind::Plugin)
            .with_message(format!("plugin does not export `{name}`"))
            .with_path(path)
    })
}

fn plugin_string(ptr: *const c_char, path: &Path, what: &str) -> Result<String, Error> {
    if ptr.is_null() {
        return Err(Error::new(ErrorKind::Plugin)
            .with_message(format!("plugin returned a null {what}"))
            .with_path(path));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_string)
        .map_err(|err| {
            Error::new(ErrorKind::Plugin)
                .with_message(format!("plugin {what} is not valid UTF-8"))
                .with_path(path)
                .with_source(err)
        })
}

/// Splits the comma separated command list exported by a plugin.
pub fn parse_command_list(raw: &str) -> Vec<String> {
    let mut commands: Vec<String> = Vec::new();
    for item in raw.split(',') {
        let item = item.trim().trim_start_matches('\\');
        if item.is_empty() || commands.iter().any(|known| known == item) {
            continue;
        }
        commands.push(item.to_string());
    }
    commands
}

pub fn is_plugin_library(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
}

/// Loads every plugin library in `dir`, in file name order.
///
/// Failures are returned alongside the successes so one broken library
/// never hides the others. A missing directory yields nothing.
pub fn load_dir(dir: &Path) -> (Vec<LoadedPlugin>, Vec<Error>) {
    load_dir_with(dir, LoadedPlugin::load)
}

/// Like [`load_dir`], with `load` turning each candidate path into a plugin.
pub fn load_dir_with<F>(dir: &Path, mut load: F) -> (Vec<LoadedPlugin>, Vec<Error>)
where
    F: FnMut(&Path) -> Result<LoadedPlugin, Error>,
{
    let mut plugins = Vec::new();
    let mut failures = Vec::new();
    if !dir.is_dir() {
        return (plugins, failures);
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            failures.push(
                Error::new(ErrorKind::Io)
                    .with_message("failed to read plugin directory")
                    .with_path(dir)
                    .with_source(err),
            );
            return (plugins, failures);
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| is_plugin_library(path))
        .collect();
    paths.sort();

    for path in paths {
        tracing::debug!(path = %path.display(), "validating plugin");
        match load(&path) {
            Ok(plugin) => plugins.push(plugin),
            Err(err) => failures.push(err),
        }
    }
    (plugins, failures)
}
