//! Typed environment variable lookups
//!
//! Every tickerwatch setting can be overridden from the environment. These
//! helpers treat an unset or blank variable as "not configured" and report a
//! value that fails to parse instead of silently falling back to a default.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// A configured environment variable could not be parsed
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct EnvError {
    /// Variable name
    pub name: String,
    /// Raw value found in the environment
    pub value: String,
    /// Parser message
    pub reason: String,
}

/// Read a variable, trimming whitespace. Blank values count as unset.
pub fn env_string(name: &str) -> Option<String> {
    non_blank(std::env::var(name).ok())
}

/// Read and parse a variable into any `FromStr` type
pub fn env_parse<T>(name: &str) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(name, env_string(name))
}

/// Read a whole number of seconds as a `Duration`
pub fn env_duration_secs(name: &str) -> Result<Option<Duration>, EnvError> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}

/// Read a whole number of milliseconds as a `Duration`
pub fn env_duration_millis(name: &str) -> Result<Option<Duration>, EnvError> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_value<T>(name: &str, raw: Option<String>) -> Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = non_blank(raw) else {
        return Ok(None);
    };

    value.parse::<T>().map(Some).map_err(|e| EnvError {
        name: name.to_string(),
        value: value.clone(),
        reason: e.to_string(),
    })
}
