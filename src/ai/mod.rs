//! Purpose: Built-in `ai` plugin providing `\generate` and `\fix`.
//! Exports: `AiPlugin`, completion/console traits, prompt and schema helpers.
//! Role: Embedded plugin registered ahead of any plugin library.
//! Invariants: The query buffer is only replaced after the user confirms.
//! Invariants: Backend failures are shown to the user and reported as `Error`, never propagated.
mod client;
mod console;
mod fix;
mod generate;
pub mod prompt;
pub mod schema;

use std::sync::Arc;

pub use client::{Completion, CompletionRequest, OpenAiClient, clean_sql};
pub use console::{Console, TerminalConsole, parse_confirmation};

use crate::config::Config;
use crate::core::error::{Error, ErrorKind};
use crate::core::result::BackslashResult;
use crate::host::CommandContext;
use crate::plugin::{MetaCommand, Plugin};
use crate::spinner::Spinner;

pub const PLUGIN_NAME: &str = "ai";

pub struct AiPlugin {
    commands: Vec<Box<dyn MetaCommand>>,
}

impl AiPlugin {
    pub fn new(client: Arc<dyn Completion>, console: Arc<dyn Console>) -> Self {
        let assistant = Arc::new(Assistant { client, console });
        Self {
            commands: vec![
                Box::new(generate::GenerateCommand::new(Arc::clone(&assistant))),
                Box::new(fix::FixCommand::new(assistant)),
            ],
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client: Arc<dyn Completion> = match OpenAiClient::new(&config.ai) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                tracing::warn!("AI commands disabled: {err}");
                Arc::new(Unavailable(err.to_string()))
            }
        };
        Self::new(client, Arc::new(TerminalConsole))
    }
}

impl Plugin for AiPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn meta_commands(&self) -> &[Box<dyn MetaCommand>] {
        &self.commands
    }
}

struct Unavailable(String);

impl Completion for Unavailable {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, Error> {
        Err(Error::new(ErrorKind::Usage).with_message(self.0.clone()))
    }
}

/// Shared flow of the AI commands: ask the backend, show, confirm, apply.
struct Assistant {
    client: Arc<dyn Completion>,
    console: Arc<dyn Console>,
}

impl Assistant {
    fn propose(
        &self,
        ctx: &mut CommandContext<'_>,
        request: CompletionRequest,
        question: &str,
        declined: Option<&str>,
    ) -> Result<BackslashResult, Error> {
        let completion = {
            let _spinner = Spinner::start();
            self.client.complete(&request)
        };
        let sql = match completion {
            Ok(text) => clean_sql(&text),
            Err(err) => {
                tracing::debug!("completion failed: {err}");
                self.report(&err);
                return Ok(BackslashResult::Error);
            }
        };
        if sql.is_empty() {
            self.console.print("Error: the assistant returned no SQL");
            return Ok(BackslashResult::Error);
        }

        self.console.print(&sql);
        if self.console.confirm(question) {
            ctx.query_buf.replace(&sql)?;
            Ok(BackslashResult::NewEdit)
        } else {
            if let Some(message) = declined {
                self.console.print(message);
            }
            Ok(BackslashResult::SkipLine)
        }
    }

    fn report(&self, err: &Error) {
        let message = err.message().map(str::to_string).unwrap_or_else(|| err.to_string());
        self.console.print(&format!("Error: {message}"));
        if let Some(hint) = err.hint() {
            self.console.print(&format!("Hint: {hint}"));
        }
    }
}
