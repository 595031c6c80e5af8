// ABOUTME: Command implementations exposed to the CLI
// ABOUTME: Exports the compare command and its progress bar helper

pub mod compare;

pub use compare::{compare, table_progress_bar};
