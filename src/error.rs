//! Error types for the runtime core.

use thiserror::Error;

/// Errors raised constructing identifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentError {
    #[error("identifier value was empty or all whitespace")]
    Empty,

    #[error("trader ID '{0}' must contain a hyphen separating name and tag")]
    MissingTag(String),

    #[error("invalid UUID v4 string '{0}'")]
    InvalidUuid(String),
}

/// Errors raised by clock timer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("timer name was empty or all whitespace")]
    InvalidName,

    #[error("timer '{0}' interval must be positive")]
    InvalidInterval(String),

    #[error("timer '{name}' stop time is invalid: {reason}")]
    InvalidStop { name: String, reason: String },

    #[error("timer '{0}' already exists")]
    DuplicateTimer(String),

    #[error("timer '{0}' not found")]
    UnknownTimer(String),

    #[error("timer '{name}' would fire at {scheduled} which is before current time {now}")]
    PastTime {
        name: String,
        scheduled: String,
        now: String,
    },

    #[error("cannot advance time backwards: current {current} ns, requested {requested} ns")]
    TimeBackwards { current: u64, requested: u64 },

    #[error("no callback given and no default handler registered")]
    NoHandler,
}

/// Errors raised by message bus registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("topic was empty")]
    InvalidTopic,

    #[error("endpoint name was empty")]
    InvalidEndpoint,

    #[error("endpoint '{0}' already registered")]
    DuplicateEndpoint(String),

    #[error("endpoint '{0}' not registered")]
    UnknownEndpoint(String),

    #[error("endpoint '{0}' is registered to a different handler")]
    HandlerMismatch(String),
}
