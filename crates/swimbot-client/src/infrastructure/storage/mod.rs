//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory, fills every missing field with a default
//! (so a first run needs no file at all), and writes it back for
//! `swimbot init-config`.

pub mod config;
