//! Purpose: Minimal plugin library for psqlx.
//! Exports: the psqlx plugin ABI via `export_plugin!`.
//! Role: Reference for third-party plugins; install with `psqlx plugins install`.
use psqlx::core::error::{Error, ErrorKind};
use psqlx::core::result::BackslashResult;
use psqlx::host::{CommandContext, OptionKind};
use psqlx::plugin::{MetaCommand, Plugin};

/// `\example`: prints a greeting and leaves the query buffer alone.
struct ExampleCommand;

impl MetaCommand for ExampleCommand {
    fn name(&self) -> &str {
        "example"
    }

    fn description(&self) -> &str {
        "Print a greeting"
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error> {
        let who = ctx
            .scan
            .next_option(OptionKind::Normal)
            .unwrap_or_else(|| "psql".to_string());
        println!("Hello from the example plugin, {who}!");
        Ok(BackslashResult::SkipLine)
    }
}

/// `\repeat`: re-queues the previous query and sends it.
struct RepeatCommand;

impl MetaCommand for RepeatCommand {
    fn name(&self) -> &str {
        "repeat"
    }

    fn description(&self) -> &str {
        "Send the previous query again"
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error> {
        let previous = ctx.previous_buf.text()?;
        if previous.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("no previous query"));
        }
        ctx.query_buf.replace(&previous)?;
        Ok(BackslashResult::Send)
    }
}

struct ExamplePlugin {
    commands: Vec<Box<dyn MetaCommand>>,
}

impl ExamplePlugin {
    fn new() -> Self {
        Self {
            commands: vec![Box::new(ExampleCommand), Box::new(RepeatCommand)],
        }
    }
}

impl Plugin for ExamplePlugin {
    fn name(&self) -> &str {
        "example"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn meta_commands(&self) -> &[Box<dyn MetaCommand>] {
        &self.commands
    }
}

psqlx::export_plugin!(ExamplePlugin::new());

#[cfg(test)]
mod tests {
    use super::ExamplePlugin;
    use psqlx::core::result::BackslashResult;
    use psqlx::host::memory::{LineScanner, MemorySession, TextBuffer};
    use psqlx::host::{CommandContext, QueryBuffer};
    use psqlx::plugin::Plugin;

    fn run(cmd: &str, previous: &str) -> (BackslashResult, String) {
        let plugin = ExamplePlugin::new();
        let mut scan = LineScanner::new("");
        let mut query = TextBuffer::default();
        let previous = TextBuffer::new(previous);
        let mut session = MemorySession::new();
        let mut ctx = CommandContext::new(&mut scan, true, &mut query, &previous, &mut session);
        let result = plugin.execute_command(cmd, &mut ctx);
        (result, query.text().expect("text"))
    }

    #[test]
    fn repeat_sends_previous_query() {
        assert_eq!(run("repeat", "select 1;"), (BackslashResult::Send, "select 1;".to_string()));
    }

    #[test]
    fn repeat_without_previous_query_is_error() {
        assert_eq!(run("repeat", ""), (BackslashResult::Error, String::new()));
    }
}
