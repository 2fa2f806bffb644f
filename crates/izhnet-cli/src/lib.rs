//! Command-line driver for izhnet reservoir simulations

pub mod commands;
pub mod config;
pub mod error;
pub mod reservoir;

pub use commands::IzhnetCli;
