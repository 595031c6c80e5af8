// ABOUTME: Library module for dbcmp
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod utils;
pub mod verify;
