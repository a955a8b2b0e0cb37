//! Purpose: `psqlx` CLI entry point.
//! Role: Binary crate root; manages plugin libraries and runs meta-commands outside psql.
//! Invariants: Commands emit JSON on stdout except `plugins dir`, `plugins list` and `completion`.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

mod command_dispatch;

use psqlx::ai::{self, schema::SCHEMA_QUERY};
use psqlx::config::Config;
use psqlx::core::error::{Error, ErrorKind, to_exit_code};
use psqlx::host::CommandContext;
use psqlx::host::memory::{LineScanner, MemorySession, TextBuffer};
use psqlx::plugin::{LoadedPlugin, PluginRegistry, PluginSource, PluginSummary, loader};
use psqlx::{logging, paths};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `psqlx --help`."));
            }
        },
    };

    let config = Config::from_env()?;
    logging::init(config.log_filter.as_deref(), logging::CLI_DEFAULT_FILTER);

    command_dispatch::dispatch_command(cli.command, &config)
}

#[derive(Parser)]
#[command(
    name = "psqlx",
    version,
    about = "Extension meta-commands for psql",
    long_about = None,
    before_help = r#"psql calls into psqlx for backslash commands it does not know.
This tool inspects the plugins behind those commands and runs them outside psql."#,
    after_help = r#"EXAMPLES
  $ psqlx plugins list
  $ psqlx plugins install ./target/release/libmy_plugin.so
  $ psqlx exec '\generate list all users'
  $ psqlx exec '\fix' --previous 'SELEC 1' --last-error 'syntax error at or near "SELEC"'

ENVIRONMENT
  PSQLX_PLUGIN_DIR       plugin library directory
  PSQLX_LOG              log filter (falls back to RUST_LOG)
  OPENAI_API_KEY         key for \generate and \fix
  PSQLX_AI_MODEL         model name (default: gpt-4o-mini)
  PSQLX_AI_BASE_URL      chat completions base URL
  PSQLX_AI_TIMEOUT_SECS  request timeout in seconds"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Inspect and manage plugins",
        after_help = r#"EXAMPLES
  $ psqlx plugins list --json
  $ psqlx plugins dir
  $ psqlx plugins install ./libhello.so
  $ psqlx plugins remove hello"#
    )]
    Plugins {
        #[command(subcommand)]
        command: PluginsCommand,
    },
    #[command(
        arg_required_else_help = true,
        about = "Run one backslash command against an in-memory session",
        long_about = r#"Run one backslash command line the way psql would, against an in-memory
query buffer and session. Prints the result code and the final query buffer as JSON.

Plugin libraries need a live psql and report `error` here; built-in commands run fully."#,
        after_help = r#"EXAMPLES
  $ psqlx exec '\generate "count orders per day"' --schema-file schema.json
  $ psqlx exec '\fix' --previous 'SELEC 1' --last-error 'syntax error'
  $ psqlx exec '\generate x' --inactive"#
    )]
    Exec {
        #[arg(help = "Command line, e.g. '\\generate list users'")]
        line: String,
        #[arg(long, value_name = "SQL", help = "Current query buffer contents")]
        query: Option<String>,
        #[arg(long, value_name = "SQL", help = "Previously executed query")]
        previous: Option<String>,
        #[arg(long = "last-error", value_name = "MSG", help = "Error from the previous query")]
        last_error: Option<String>,
        #[arg(
            long = "schema-file",
            value_name = "PATH",
            value_hint = ValueHint::FilePath,
            help = "File answering the schema query (JSON)"
        )]
        schema_file: Option<PathBuf>,
        #[arg(long, help = "Run as if inside a false \\if branch")]
        inactive: bool,
    },
    #[command(arg_required_else_help = true, about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum, help = "Target shell")]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum PluginsCommand {
    #[command(about = "List registered plugins and their commands")]
    List {
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(about = "Print the plugin directory")]
    Dir,
    #[command(
        arg_required_else_help = true,
        about = "Validate a plugin library and copy it into the plugin directory"
    )]
    Install {
        #[arg(help = "Path to the plugin library", value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, help = "Replace an installed library with the same file name")]
        force: bool,
    },
    #[command(arg_required_else_help = true, about = "Delete an installed plugin library")]
    Remove {
        #[arg(help = "Plugin name")]
        name: String,
    },
}

struct ExecRequest {
    line: String,
    query: Option<String>,
    previous: Option<String>,
    last_error: Option<String>,
    schema_file: Option<PathBuf>,
    inactive: bool,
}

/// Registry as psql would see it: built-ins first, then the plugin directory.
fn load_registry(config: &Config) -> (PluginRegistry, Vec<Error>) {
    let registry = PluginRegistry::with_builtins(config);
    let failures = registry.load_directory(&paths::plugin_dir(config));
    (registry, failures)
}

/// Splits `\cmd rest` into the command name and its argument text.
fn split_command(line: &str) -> Result<(String, &str), Error> {
    let trimmed = line.trim_start();
    let body = trimmed.strip_prefix('\\').unwrap_or(trimmed);
    let end = body
        .find(|ch: char| ch.is_whitespace() || ch == '\\')
        .unwrap_or(body.len());
    let (cmd, rest) = body.split_at(end);
    if cmd.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("missing command name")
            .with_hint("Pass a backslash command, e.g. `psqlx exec '\\generate list users'`."));
    }
    Ok((cmd.to_string(), rest))
}

fn exec_line(config: &Config, request: ExecRequest) -> Result<Value, Error> {
    let (cmd, rest) = split_command(&request.line)?;
    let (registry, failures) = load_registry(config);
    for err in &failures {
        tracing::warn!("skipping plugin: {}", error_message(err));
    }
    if !registry.has_command(&cmd) {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message(format!("no plugin provides \\{cmd}"))
            .with_hint("Run `psqlx plugins list` to see available commands."));
    }

    let mut session = MemorySession::new();
    if let Some(message) = request.last_error {
        session = session.with_last_error(message);
    }
    if let Some(path) = request.schema_file {
        let schema = fs::read_to_string(&path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read schema file")
                .with_path(&path)
                .with_source(err)
        })?;
        session = session.with_scalar(SCHEMA_QUERY, schema);
    }

    let mut scan = LineScanner::new(rest);
    let mut query_buf = TextBuffer::new(request.query.unwrap_or_default());
    let previous_buf = TextBuffer::new(request.previous.unwrap_or_default());
    let result = {
        let mut ctx = CommandContext::new(
            &mut scan,
            !request.inactive,
            &mut query_buf,
            &previous_buf,
            &mut session,
        );
        registry.dispatch(&cmd, &mut ctx)
    };

    let unconsumed = scan.remaining();
    Ok(json!({
        "command": cmd,
        "result": result.as_str(),
        "result_code": result.as_raw(),
        "query_buffer": query_buf.as_str(),
        "unconsumed": unconsumed.trim(),
    }))
}

fn install_plugin(config: &Config, source: &Path, force: bool) -> Result<Value, Error> {
    if !loader::is_plugin_library(source) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("not a plugin library")
            .with_path(source)
            .with_hint(format!(
                "Plugin libraries have the `.{}` extension.",
                std::env::consts::DLL_EXTENSION
            )));
    }
    let file_name = source.file_name().ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("plugin path has no file name")
            .with_path(source)
    })?;
    let dir = paths::plugin_dir(config);
    let target = dir.join(file_name);

    // Libraries are unloaded before any file is written.
    let (name, version, commands) = {
        let plugin = LoadedPlugin::load(source)?;
        (
            plugin.name().to_string(),
            plugin.version().to_string(),
            plugin.commands().to_vec(),
        )
    };
    if name == ai::PLUGIN_NAME {
        return Err(Error::new(ErrorKind::AlreadyExists)
            .with_message(format!("`{name}` is a built-in plugin"))
            .with_path(source)
            .with_hint("Rename the plugin."));
    }
    {
        let (installed, _) = loader::load_dir(&dir);
        if let Some(existing) = installed
            .iter()
            .find(|plugin| plugin.name() == name && plugin.path() != target)
        {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("plugin `{name}` is already installed"))
                .with_path(existing.path())
                .with_hint(format!("Remove it first with `psqlx plugins remove {name}`.")));
        }
    }
    if target.exists() && !force {
        return Err(Error::new(ErrorKind::AlreadyExists)
            .with_message("a library with this file name is already installed")
            .with_path(&target)
            .with_hint("Pass --force to replace it."));
    }

    let bytes =
        fs::read(source).map_err(|err| io_error("failed to read plugin library", source, err))?;
    let permissions = fs::metadata(source)
        .map_err(|err| io_error("failed to read plugin library", source, err))?
        .permissions();
    fs::create_dir_all(&dir)
        .map_err(|err| io_error("failed to create plugin directory", &dir, err))?;
    replace_file(&dir, &target, &bytes, permissions)?;
    tracing::info!(plugin = %name, path = %target.display(), "installed plugin");

    Ok(json!({
        "installed": {
            "name": name,
            "version": version,
            "commands": commands,
            "path": target.display().to_string(),
            "sha256": sha256_hex(&bytes),
        }
    }))
}

fn remove_plugin(config: &Config, name: &str) -> Result<Value, Error> {
    if name == ai::PLUGIN_NAME {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("`{name}` is built in and cannot be removed")));
    }
    let dir = paths::plugin_dir(config);
    let path = {
        let (installed, _) = loader::load_dir(&dir);
        installed
            .iter()
            .find(|plugin| plugin.name() == name)
            .map(|plugin| plugin.path().to_path_buf())
    };
    let Some(path) = path else {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message(format!("no installed plugin named `{name}`"))
            .with_path(&dir)
            .with_hint("Run `psqlx plugins list` to see installed plugins."));
    };
    fs::remove_file(&path).map_err(|err| io_error("failed to remove plugin library", &path, err))?;
    tracing::info!(plugin = name, path = %path.display(), "removed plugin");

    Ok(json!({
        "removed": {
            "name": name,
            "path": path.display().to_string(),
        }
    }))
}

/// Writes `bytes` beside `target` and renames it into place.
///
/// A running psql keeps its mapping of the old file: the path gets a new
/// inode instead of being rewritten under the loaded library.
fn replace_file(
    dir: &Path,
    target: &Path,
    bytes: &[u8],
    permissions: fs::Permissions,
) -> Result<(), Error> {
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .map_err(|err| io_error("failed to stage plugin library", dir, err))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|err| io_error("failed to write plugin library", staged.path(), err))?;
    fs::set_permissions(staged.path(), permissions)
        .map_err(|err| io_error("failed to write plugin library", staged.path(), err))?;
    staged
        .persist(target)
        .map_err(|err| io_error("failed to install plugin library", target, err.error))?;
    Ok(())
}

fn io_error(message: &str, path: &Path, err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn summary_json(summary: &PluginSummary) -> Value {
    let source = match &summary.source {
        PluginSource::Embedded => json!("embedded"),
        PluginSource::Library(path) => json!(path.display().to_string()),
    };
    json!({
        "name": summary.name,
        "version": summary.version,
        "commands": summary.commands,
        "source": source,
    })
}

fn emit_plugin_table(plugins: &[PluginSummary]) {
    let name_width = plugins
        .iter()
        .map(|plugin| plugin.name.len())
        .chain(std::iter::once("NAME".len()))
        .max()
        .unwrap_or(4);
    let version_width = plugins
        .iter()
        .map(|plugin| plugin.version.len())
        .chain(std::iter::once("VERSION".len()))
        .max()
        .unwrap_or(7);
    println!("{:<name_width$}  {:<version_width$}  COMMANDS", "NAME", "VERSION");
    for plugin in plugins {
        let commands = plugin
            .commands
            .iter()
            .map(|cmd| format!("\\{cmd}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{:<name_width$}  {:<version_width$}  {commands}",
            plugin.name, plugin.version
        );
    }
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_fields(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    Value::Object(inner)
}

fn error_json(err: &Error) -> Value {
    json!({ "error": error_fields(err) })
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
