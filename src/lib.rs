pub mod access;
pub mod backend;
pub mod checks;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod logging;
pub mod report;
pub mod ui;
