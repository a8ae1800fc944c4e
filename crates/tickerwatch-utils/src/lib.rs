//! Shared utilities for tickerwatch
//!
//! This crate provides the pieces every tickerwatch binary needs before the
//! pipeline starts: tracing setup and typed environment variable lookups.

pub mod config;
pub mod logging;

pub use config::{EnvError, env_duration_millis, env_duration_secs, env_parse, env_string};
pub use logging::{LogFormat, init_tracing};
