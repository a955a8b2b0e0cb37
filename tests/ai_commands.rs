// `\generate` and `\fix` end to end with a scripted backend and console.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use psqlx::ai::schema::SCHEMA_QUERY;
use psqlx::ai::{AiPlugin, Completion, CompletionRequest, Console};
use psqlx::core::error::{Error, ErrorKind};
use psqlx::core::result::BackslashResult;
use psqlx::host::memory::{LineScanner, MemorySession, TextBuffer};
use psqlx::host::{CommandContext, QueryBuffer};
use psqlx::plugin::Plugin;

struct FakeBackend {
    reply: Result<String, (ErrorKind, &'static str, Option<&'static str>)>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeBackend {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(kind: ErrorKind, message: &'static str, hint: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            reply: Err((kind, message, hint)),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Completion for FakeBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, Error> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err((kind, message, hint)) => {
                let err = Error::new(*kind).with_message(*message);
                Err(match hint {
                    Some(hint) => err.with_hint(*hint),
                    None => err,
                })
            }
        }
    }
}

#[derive(Default)]
struct ScriptedConsole {
    answers: Mutex<VecDeque<bool>>,
    printed: Mutex<Vec<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConsole {
    fn answering(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Self::default()
        })
    }

    fn printed(&self) -> Vec<String> {
        self.printed.lock().unwrap().clone()
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Console for ScriptedConsole {
    fn print(&self, text: &str) {
        self.printed.lock().unwrap().push(text.to_string());
    }

    fn confirm(&self, question: &str) -> bool {
        self.asked.lock().unwrap().push(question.to_string());
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

struct Outcome {
    result: BackslashResult,
    query: String,
    executed: Vec<String>,
}

fn run(
    plugin: &AiPlugin,
    cmd: &str,
    args: &str,
    previous: &str,
    mut session: MemorySession,
) -> Outcome {
    let mut scan = LineScanner::new(args);
    let mut query = TextBuffer::new("select 0;");
    let previous = TextBuffer::new(previous);
    let result = {
        let mut ctx = CommandContext::new(&mut scan, true, &mut query, &previous, &mut session);
        plugin.execute_command(cmd, &mut ctx)
    };
    Outcome {
        result,
        query: query.text().unwrap(),
        executed: session.executed().to_vec(),
    }
}

fn plugin(backend: &Arc<FakeBackend>, console: &Arc<ScriptedConsole>) -> AiPlugin {
    AiPlugin::new(backend.clone(), console.clone())
}

#[test]
fn plugin_exposes_generate_and_fix() {
    let plugin = plugin(&FakeBackend::replying(""), &ScriptedConsole::answering(&[]));
    assert_eq!(plugin.name(), "ai");
    assert_eq!(plugin.command_names(), ["generate", "fix"]);
}

#[test]
fn generate_accepted_replaces_query_buffer() {
    let backend = FakeBackend::replying("```sql\nSELECT * FROM users;\n```");
    let console = ScriptedConsole::answering(&[true]);
    let session = MemorySession::new().with_scalar(SCHEMA_QUERY, r#"[{"table_name":"users"}]"#);

    let outcome = run(&plugin(&backend, &console), "generate", "list all users", "", session);

    assert_eq!(outcome.result, BackslashResult::NewEdit);
    assert_eq!(outcome.query, "SELECT * FROM users;");
    assert_eq!(outcome.executed, [SCHEMA_QUERY]);
    assert_eq!(console.printed(), ["SELECT * FROM users;"]);
    assert_eq!(console.asked(), ["Run code?"]);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].user.ends_with("list all users"));
    assert!(requests[0].system.contains(r#"[{"table_name":"users"}]"#));
}

#[test]
fn generate_quoted_request_is_unquoted() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[true]);

    run(
        &plugin(&backend, &console),
        "generate",
        "\"count orders\"",
        "",
        MemorySession::new(),
    );

    assert!(backend.requests()[0].user.ends_with("count orders"));
}

#[test]
fn generate_separately_quoted_words_and_trailing_semicolon() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[true]);

    run(
        &plugin(&backend, &console),
        "generate",
        "\"orders\" by \"customer\";",
        "",
        MemorySession::new(),
    );

    assert!(backend.requests()[0].user.ends_with("orders by customer"));
}

#[test]
fn generate_declined_keeps_query_buffer() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[false]);

    let outcome = run(&plugin(&backend, &console), "generate", "one", "", MemorySession::new());

    assert_eq!(outcome.result, BackslashResult::SkipLine);
    assert_eq!(outcome.query, "select 0;");
    assert_eq!(console.printed(), ["SELECT 1;"]);
}

#[test]
fn generate_without_request_prints_usage() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[true]);

    let outcome = run(&plugin(&backend, &console), "generate", "", "", MemorySession::new());

    assert_eq!(outcome.result, BackslashResult::Error);
    assert!(backend.requests().is_empty());
    assert!(outcome.executed.is_empty());
    assert!(console.printed()[0].starts_with("\\generate: missing request"));
}

#[test]
fn generate_backend_failure_is_shown_with_hint() {
    let backend = FakeBackend::failing(
        ErrorKind::Upstream,
        "invalid api key",
        Some("Check that OPENAI_API_KEY is valid."),
    );
    let console = ScriptedConsole::answering(&[true]);

    let outcome = run(&plugin(&backend, &console), "generate", "x", "", MemorySession::new());

    assert_eq!(outcome.result, BackslashResult::Error);
    assert_eq!(outcome.query, "select 0;");
    assert_eq!(
        console.printed(),
        ["Error: invalid api key", "Hint: Check that OPENAI_API_KEY is valid."]
    );
    assert!(console.asked().is_empty());
}

#[test]
fn generate_empty_reply_is_error() {
    let backend = FakeBackend::replying("```sql\n```");
    let console = ScriptedConsole::answering(&[true]);

    let outcome = run(&plugin(&backend, &console), "generate", "x", "", MemorySession::new());

    assert_eq!(outcome.result, BackslashResult::Error);
    assert_eq!(console.printed(), ["Error: the assistant returned no SQL"]);
    assert!(console.asked().is_empty());
}

#[test]
fn fix_without_previous_error_skips() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[true]);

    let outcome = run(&plugin(&backend, &console), "fix", "", "SELEC 1;", MemorySession::new());

    assert_eq!(outcome.result, BackslashResult::SkipLine);
    assert_eq!(console.printed(), ["No previous error found."]);
    assert!(backend.requests().is_empty());
}

#[test]
fn fix_without_previous_query_skips() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[true]);
    let session = MemorySession::new().with_last_error("boom");

    let outcome = run(&plugin(&backend, &console), "fix", "", "  ", session);

    assert_eq!(outcome.result, BackslashResult::SkipLine);
    assert_eq!(console.printed(), ["No previous query found."]);
    assert!(backend.requests().is_empty());
}

#[test]
fn fix_accepted_replaces_query_buffer() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[true]);
    let session = MemorySession::new()
        .with_last_error("ERROR:  syntax error at or near \"SELEC\"")
        .with_scalar(SCHEMA_QUERY, "[]");

    let outcome = run(&plugin(&backend, &console), "fix", "", "SELEC 1;", session);

    assert_eq!(outcome.result, BackslashResult::NewEdit);
    assert_eq!(outcome.query, "SELECT 1;");
    assert_eq!(console.asked(), ["Run fix?"]);
    let request = &backend.requests()[0];
    assert!(request.user.contains("SELEC 1;"));
    assert!(request.user.contains("syntax error at or near"));
}

#[test]
fn fix_declined_says_so() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[false]);
    let session = MemorySession::new().with_last_error("boom");

    let outcome = run(&plugin(&backend, &console), "fix", "", "SELEC 1;", session);

    assert_eq!(outcome.result, BackslashResult::SkipLine);
    assert_eq!(outcome.query, "select 0;");
    assert_eq!(console.printed(), ["SELECT 1;", "Fix not applied."]);
}

#[test]
fn fix_warns_about_extra_arguments() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[false]);

    run(&plugin(&backend, &console), "fix", "now please", "", MemorySession::new());

    let printed = console.printed();
    assert_eq!(printed[0], "\\fix: extra argument \"now\" ignored");
    assert_eq!(printed[1], "\\fix: extra argument \"please\" ignored");
    assert_eq!(printed[2], "No previous error found.");
}

#[test]
fn unknown_command_is_unknown() {
    let backend = FakeBackend::replying("SELECT 1;");
    let console = ScriptedConsole::answering(&[]);

    let outcome = run(&plugin(&backend, &console), "explain", "", "", MemorySession::new());

    assert_eq!(outcome.result, BackslashResult::Unknown);
    assert!(console.printed().is_empty());
}
