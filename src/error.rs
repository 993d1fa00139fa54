//! Startup error type.

use thiserror::Error;

/// The error type returned by restwell's fallible startup operations.
///
/// Request-level failures never surface here: they are [`Fault`](crate::Fault)s,
/// converted into an error envelope on the wire. This type covers the things
/// that can go wrong before a request exists to answer: configuration, route
/// registration, binding to a port and accepting connections.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured port is unset or zero.
    #[error("an invalid port was specified for this HTTP server")]
    InvalidPort,

    /// A configuration value could not be parsed.
    #[error("invalid value `{value}` for {key}")]
    InvalidConfig { key: &'static str, value: String },

    /// A route path was rejected by the route table.
    #[error("invalid route `{method} {path}`: {source}")]
    Route {
        method: http::Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// The listener could not bind to the configured port.
    #[error("could not bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
