//! Purpose: Install the `tracing` subscriber shared by the hook and the CLI.
//! Exports: `init`, `HOST_DEFAULT_FILTER`, `CLI_DEFAULT_FILTER`.
//! Role: One place that decides log filtering and the stderr format.
//! Invariants: Never panics and never replaces a subscriber that is already installed.
//! Invariants: Logs go to stderr so psql's query output on stdout stays clean.
use tracing_subscriber::EnvFilter;

/// Inside psql only warnings and errors are shown unless asked otherwise.
pub const HOST_DEFAULT_FILTER: &str = "warn";
pub const CLI_DEFAULT_FILTER: &str = "info";

/// Filter precedence: `configured` (`PSQLX_LOG`), then `RUST_LOG`, then `default_filter`.
pub fn init(configured: Option<&str>, default_filter: &str) {
    let env_filter = configured
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
