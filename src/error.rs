//! Error types for the bridge.
//!
//! Only [`BridgeError`] ever reaches the host: it is the startup-fatal class.
//! Everything else is caught at the registry, control channel or publish
//! pipeline boundary and turned into a log line.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`Driver`](crate::capture::Driver) call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node {0} is not writable")]
    NotWritable(String),

    #[error("node {node} has type {actual}, not {requested}")]
    WrongNodeType {
        node: String,
        actual: &'static str,
        requested: &'static str,
    },

    #[error("camera is not initialized")]
    NotInitialized,

    #[error("driver error: {0}")]
    Sdk(String),
}

/// Parameter definition and declaration errors
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("cannot read parameter definition file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown parameter kind: {0}")]
    UnknownKind(String),

    #[error("expected 3 tokens, found {found}: {line}")]
    BadLine { line: String, found: usize },

    #[error("unterminated quote: {0}")]
    UnterminatedQuote(String),

    #[error("parameter {name} is a {kind} but got {value}")]
    TypeMismatch {
        name: String,
        kind: &'static str,
        value: String,
    },
}

/// Reasons a frame did not make it onto a sink
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("no wire encoding for pixel format {0}")]
    InvalidEncoding(String),

    #[error("image buffer too short: need {needed} bytes, have {actual}")]
    ShortBuffer { needed: usize, actual: usize },

    #[error("stride {stride} is smaller than a row of {row} bytes")]
    BadStride { stride: u32, row: u64 },

    #[error("sink {0} is full")]
    SinkFull(String),

    #[error("sink {0} has no subscribers")]
    Disconnected(String),
}

/// Startup-fatal errors: the bridge refuses to come up
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    ParameterFile(#[from] ParamError),

    #[error("camera {serial} not found after {attempts} attempts")]
    CameraNotFound { serial: String, attempts: u32 },

    #[error("init camera failed for {serial}: {source}")]
    InitFailed {
        serial: String,
        #[source]
        source: DriverError,
    },

    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
