//! Purpose: Define what a psqlx plugin and its meta-commands look like.
//! Exports: `MetaCommand`, `Plugin`, `PLUGIN_ABI_VERSION`, registry and loader modules.
//! Role: Shared contract for embedded plugins and dynamically loaded libraries.
//! Invariants: Command names are matched exactly, without the leading backslash.
//! Invariants: `Plugin::execute_command` never panics on an unknown command; it reports `Unknown`.
pub mod export;
pub mod loader;
pub mod registry;

use crate::core::error::Error;
use crate::core::result::BackslashResult;
use crate::host::CommandContext;

pub use loader::LoadedPlugin;
pub use registry::{PluginRegistry, PluginSource, PluginSummary};

/// Version of the C ABI exported by plugin libraries.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// One backslash meta-command.
pub trait MetaCommand: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error>;
}

/// A named, versioned bundle of meta-commands.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn meta_commands(&self) -> &[Box<dyn MetaCommand>];

    fn command_names(&self) -> Vec<String> {
        self.meta_commands()
            .iter()
            .map(|command| command.name().to_string())
            .collect()
    }

    fn execute_command(&self, cmd: &str, ctx: &mut CommandContext<'_>) -> BackslashResult {
        let Some(command) = self
            .meta_commands()
            .iter()
            .find(|command| command.name() == cmd)
        else {
            return BackslashResult::Unknown;
        };
        match command.execute(ctx) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(plugin = self.name(), command = cmd, "command failed: {err}");
                BackslashResult::Error
            }
        }
    }
}
