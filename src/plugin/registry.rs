//! Purpose: Keep every registered plugin and route meta-commands to their owner.
//! Exports: `PluginRegistry`, `PluginSummary`, `PluginSource`, `global`.
//! Role: Backing store for `has_command_ext` / `exec_command_ext` and the CLI.
//! Invariants: Plugins keep registration order; embedded plugins register before libraries.
//! Invariants: A command name belongs to the first plugin that claimed it.
//! Invariants: Inactive-branch calls consume arguments and return `SkipLine`.
//! Invariants: A plugin never runs in an inactive branch.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{LoadedPlugin, Plugin, loader};
use crate::ai::AiPlugin;
use crate::config::Config;
use crate::core::error::{Error, ErrorKind};
use crate::core::result::BackslashResult;
use crate::host::CommandContext;
use crate::{logging, paths};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    Embedded,
    Library(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    pub commands: Vec<String>,
    pub source: PluginSource,
}

enum Handler {
    Embedded(Box<dyn Plugin>),
    Library(LoadedPlugin),
}

struct Entry {
    name: String,
    version: String,
    commands: Vec<String>,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    owners: HashMap<String, usize>,
}

#[derive(Default)]
pub struct PluginRegistry {
    inner: RwLock<Inner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the plugins compiled into psqlx.
    pub fn with_builtins(config: &Config) -> Self {
        let registry = Self::new();
        if let Err(err) = registry.register_embedded(Box::new(AiPlugin::from_config(config))) {
            tracing::warn!("failed to register built-in plugin: {err}");
        }
        registry
    }

    pub fn register_embedded(&self, plugin: Box<dyn Plugin>) -> Result<(), Error> {
        let name = plugin.name().to_string();
        let version = plugin.version().to_string();
        let commands = plugin.command_names();
        self.insert(Entry {
            name,
            version,
            commands,
            handler: Handler::Embedded(plugin),
        })
    }

    pub fn register_loaded(&self, plugin: LoadedPlugin) -> Result<(), Error> {
        let path = plugin.path().to_path_buf();
        self.insert(Entry {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            commands: plugin.commands().to_vec(),
            handler: Handler::Library(plugin),
        })
        .map_err(|err| err.with_path(path))
    }

    /// Loads and registers every plugin library in `dir`; returns the failures.
    pub fn load_directory(&self, dir: &Path) -> Vec<Error> {
        let (plugins, mut failures) = loader::load_dir(dir);
        for plugin in plugins {
            if let Err(err) = self.register_loaded(plugin) {
                failures.push(err);
            }
        }
        failures
    }

    fn insert(&self, entry: Entry) -> Result<(), Error> {
        let mut inner = self.write();
        if inner.entries.iter().any(|existing| existing.name == entry.name) {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("plugin `{}` is already registered", entry.name)));
        }

        let index = inner.entries.len();
        for command in &entry.commands {
            if let Some(&owner) = inner.owners.get(command) {
                tracing::warn!(
                    command = %command,
                    plugin = %entry.name,
                    owner = %inner.entries[owner].name,
                    "command already provided by another plugin; keeping the first"
                );
                continue;
            }
            inner.owners.insert(command.clone(), index);
        }
        tracing::debug!(plugin = %entry.name, version = %entry.version, "registered plugin");
        inner.entries.push(entry);
        Ok(())
    }

    pub fn has_command(&self, cmd: &str) -> bool {
        self.read().owners.contains_key(cmd)
    }

    pub fn dispatch(&self, cmd: &str, ctx: &mut CommandContext<'_>) -> BackslashResult {
        let inner = self.read();
        let Some(&index) = inner.owners.get(cmd) else {
            return BackslashResult::Unknown;
        };
        if !ctx.active_branch {
            tracing::debug!(command = cmd, "inactive branch; skipping");
            ctx.scan.skip_options();
            return BackslashResult::SkipLine;
        }

        let entry = &inner.entries[index];
        tracing::debug!(command = cmd, plugin = %entry.name, "dispatching");
        match &entry.handler {
            Handler::Embedded(plugin) => plugin.execute_command(cmd, ctx),
            Handler::Library(plugin) => match ctx.raw {
                Some(raw) => plugin.execute(cmd, raw, ctx.active_branch),
                None => {
                    tracing::error!(
                        command = cmd,
                        plugin = %entry.name,
                        "plugin libraries can only run inside psql"
                    );
                    BackslashResult::Error
                }
            },
        }
    }

    pub fn plugins(&self) -> Vec<PluginSummary> {
        self.read()
            .entries
            .iter()
            .map(|entry| PluginSummary {
                name: entry.name.clone(),
                version: entry.version.clone(),
                commands: entry.commands.clone(),
                source: match &entry.handler {
                    Handler::Embedded(_) => PluginSource::Embedded,
                    Handler::Library(plugin) => PluginSource::Library(plugin.path().to_path_buf()),
                },
            })
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

static GLOBAL: OnceLock<PluginRegistry> = OnceLock::new();

/// The process-wide registry used by the C hook.
///
/// The first call sets up logging, registers the built-in plugins and scans
/// the plugin directory. Problems are logged; they never reach psql.
pub fn global() -> &'static PluginRegistry {
    GLOBAL.get_or_init(|| {
        let config = Config::from_env().unwrap_or_else(|err| {
            eprintln!("psqlx: {err}; using defaults");
            Config::default()
        });
        logging::init(config.log_filter.as_deref(), logging::HOST_DEFAULT_FILTER);

        let registry = PluginRegistry::with_builtins(&config);
        let dir = paths::plugin_dir(&config);
        tracing::debug!(dir = %dir.display(), "scanning plugin directory");
        for err in registry.load_directory(&dir) {
            tracing::warn!("skipping plugin: {err}");
        }
        registry
    })
}
