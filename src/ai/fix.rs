use std::sync::Arc;

use super::{Assistant, prompt, schema};
use crate::core::error::Error;
use crate::core::result::BackslashResult;
use crate::host::{CommandContext, OptionKind};
use crate::plugin::MetaCommand;

/// `\fix`: propose a corrected version of the statement that just failed.
pub(super) struct FixCommand {
    assistant: Arc<Assistant>,
}

impl FixCommand {
    pub(super) fn new(assistant: Arc<Assistant>) -> Self {
        Self { assistant }
    }
}

impl MetaCommand for FixCommand {
    fn name(&self) -> &str {
        "fix"
    }

    fn description(&self) -> &str {
        "Fix the previous query using its error message"
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error> {
        let console = &self.assistant.console;
        while let Some(extra) = ctx.scan.next_option(OptionKind::Normal) {
            console.print(&format!("\\fix: extra argument \"{extra}\" ignored"));
        }

        // Read the error before the schema query replaces it.
        let Some(error) = ctx.session.last_error() else {
            console.print("No previous error found.");
            return Ok(BackslashResult::SkipLine);
        };
        let code = ctx.previous_buf.text()?;
        if code.trim().is_empty() {
            console.print("No previous query found.");
            return Ok(BackslashResult::SkipLine);
        }

        let schema = schema::fetch_schema(ctx.session);
        self.assistant.propose(
            ctx,
            prompt::fix(&code, &error, &schema),
            "Run fix?",
            Some("Fix not applied."),
        )
    }
}
