//! Purpose: Mirror psql's `backslashResult` as a closed Rust enum.
//! Exports: `BackslashResult`.
//! Role: The only value a meta-command hands back to the host loop.
//! Invariants: Discriminants equal the host's C enum values; `#[repr(C)]` keeps the ABI.
//! Invariants: Raw integers from plugins are validated through `from_raw`, never transmuted.
use std::fmt;
use std::os::raw::c_int;

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BackslashResult {
    /// Not a command handled here.
    Unknown = 0,
    /// Query complete; send it off.
    Send = 1,
    /// Keep building the query.
    SkipLine = 2,
    /// Quit the program.
    Terminate = 3,
    /// The query buffer was changed.
    NewEdit = 4,
    /// The command failed.
    Error = 5,
}

impl BackslashResult {
    pub fn as_raw(self) -> c_int {
        self as c_int
    }

    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            0 => Some(Self::Unknown),
            1 => Some(Self::Send),
            2 => Some(Self::SkipLine),
            3 => Some(Self::Terminate),
            4 => Some(Self::NewEdit),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Send => "send",
            Self::SkipLine => "skip_line",
            Self::Terminate => "terminate",
            Self::NewEdit => "new_edit",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for BackslashResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
