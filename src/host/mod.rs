//! Purpose: Model the handles psql passes to the extension hook as capability traits.
//! Exports: `ScanState`, `QueryBuffer`, `Session`, `OptionKind`, `CommandContext`.
//! Role: Seam between meta-command logic and whichever host drives it (psql or memory).
//! Invariants: A `CommandContext` borrows host handles for exactly one dispatch call.
//! Invariants: `raw` is present only when the call came through the C hook.
pub mod memory;
pub mod psql;

use crate::core::error::Error;
pub use psql::RawHandles;

/// How the host scanner should interpret the next backslash-command argument.
///
/// Mirrors psql's `slash_option_type`; discriminants are passed straight through.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptionKind {
    /// Ordinary argument; single quotes are processed, double quotes kept.
    Normal = 0,
    /// SQL identifier; unquoted text is downcased.
    SqlId = 1,
    /// Like `SqlId` without downcasing.
    SqlIdHack = 2,
    /// File name, or `|command` taking the rest of the line.
    FilePipe = 3,
    /// Everything up to the end of the line.
    WholeLine = 4,
}

/// The host's in-progress scanner for the current input line.
pub trait ScanState {
    /// Returns the next argument of the current backslash command, if any.
    fn next_option(&mut self, kind: OptionKind) -> Option<String>;

    /// Consumes every remaining argument of the current command.
    fn skip_options(&mut self) {
        while self.next_option(OptionKind::Normal).is_some() {}
    }
}

/// An expandable text buffer owned by the host.
pub trait QueryBuffer {
    fn text(&self) -> Result<String, Error>;

    fn reset(&mut self);

    fn append(&mut self, text: &str) -> Result<(), Error>;

    fn replace(&mut self, text: &str) -> Result<(), Error> {
        self.reset();
        self.append(text)
    }
}

/// The connection and display settings of the running session.
pub trait Session {
    /// Last error reported by the connection, if one is pending.
    fn last_error(&self) -> Option<String>;

    /// Runs `sql` and returns the first column of the first row.
    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error>;
}

pub struct CommandContext<'a> {
    pub scan: &'a mut dyn ScanState,
    pub active_branch: bool,
    pub query_buf: &'a mut dyn QueryBuffer,
    pub previous_buf: &'a dyn QueryBuffer,
    pub session: &'a mut dyn Session,
    pub raw: Option<RawHandles>,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        scan: &'a mut dyn ScanState,
        active_branch: bool,
        query_buf: &'a mut dyn QueryBuffer,
        previous_buf: &'a dyn QueryBuffer,
        session: &'a mut dyn Session,
    ) -> Self {
        Self {
            scan,
            active_branch,
            query_buf,
            previous_buf,
            session,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: RawHandles) -> Self {
        self.raw = Some(raw);
        self
    }
}
