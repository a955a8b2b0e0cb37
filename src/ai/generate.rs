use std::sync::Arc;

use super::{Assistant, prompt, schema};
use crate::core::error::Error;
use crate::core::result::BackslashResult;
use crate::host::{CommandContext, OptionKind};
use crate::plugin::MetaCommand;

const USAGE: &str = "\\generate: missing request. Usage: \\generate 'a query to list all users'";

/// `\generate <request>`: turn a natural language request into SQL.
pub(super) struct GenerateCommand {
    assistant: Arc<Assistant>,
}

impl GenerateCommand {
    pub(super) fn new(assistant: Arc<Assistant>) -> Self {
        Self { assistant }
    }
}

impl MetaCommand for GenerateCommand {
    fn name(&self) -> &str {
        "generate"
    }

    fn description(&self) -> &str {
        "Generate SQL from a natural language request"
    }

    fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<BackslashResult, Error> {
        let words: Vec<String> =
            std::iter::from_fn(|| ctx.scan.next_option(OptionKind::Normal)).collect();
        let request = request_text(&words);
        if request.is_empty() {
            self.assistant.console.print(USAGE);
            return Ok(BackslashResult::Error);
        }

        let schema = schema::fetch_schema(ctx.session);
        self.assistant
            .propose(ctx, prompt::generate(&request, &schema), "Run code?", None)
    }
}

/// Joins the words, dropping the quotes psql keeps around each `"..."` option.
fn request_text(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            word.strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(word)
                .trim()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
