//! Purpose: psql extension hook and the plugin system behind it.
//! Exports: `abi` (C hook), `plugin` (traits, registry, loader), `host`, `ai`, `core`.
//! Role: Built as `staticlib`/`cdylib` for linking into psql and as `rlib` for the CLI and plugins.
//! Invariants: psql only ever sees `has_command_ext` / `exec_command_ext`.
//! Invariants: Every meta-command outcome is a `BackslashResult`; errors never unwind into psql.
#[cfg(feature = "hook")]
pub mod abi;
pub mod ai;
pub mod config;
pub mod core;
pub mod host;
pub mod logging;
pub mod paths;
pub mod plugin;
pub mod spinner;
