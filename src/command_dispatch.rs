//! Purpose: Hold top-level CLI command dispatch for `psqlx`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Helpers in `main.rs` remain the source of command business logic.

use super::*;

pub(super) fn dispatch_command(command: Command, config: &Config) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "psqlx", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Plugins { command } => match command {
            PluginsCommand::Dir => {
                println!("{}", paths::plugin_dir(config).display());
                Ok(RunOutcome::ok())
            }
            PluginsCommand::List { json } => {
                let (registry, failures) = load_registry(config);
                let plugins = registry.plugins();
                if json {
                    let plugins = plugins.iter().map(summary_json).collect::<Vec<_>>();
                    let failures = failures.iter().map(error_fields).collect::<Vec<_>>();
                    emit_json(json!({ "plugins": plugins, "failures": failures }));
                } else {
                    emit_plugin_table(&plugins);
                    for err in &failures {
                        emit_error(err);
                    }
                }
                Ok(RunOutcome::ok())
            }
            PluginsCommand::Install { path, force } => {
                emit_json(install_plugin(config, &path, force)?);
                Ok(RunOutcome::ok())
            }
            PluginsCommand::Remove { name } => {
                emit_json(remove_plugin(config, &name)?);
                Ok(RunOutcome::ok())
            }
        },
        Command::Exec {
            line,
            query,
            previous,
            last_error,
            schema_file,
            inactive,
        } => {
            let request = ExecRequest {
                line,
                query,
                previous,
                last_error,
                schema_file,
                inactive,
            };
            emit_json(exec_line(config, request)?);
            Ok(RunOutcome::ok())
        }
    }
}
