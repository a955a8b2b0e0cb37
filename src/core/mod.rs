// Core types shared by the hook, the plugin system and the CLI.
pub mod error;
pub mod result;
