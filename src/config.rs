//! Server configuration.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `RESTWELL_PORT` | TCP port to listen on (`1..=65535`) | required |
//! | `RESTWELL_EXPOSE_STACK` | include backtraces in error envelopes | on in debug builds, off in release |
//!
//! Backtraces are always logged server-side; `expose_stack` only controls
//! whether they also reach the caller.

use crate::error::Error;

pub const PORT_VAR: &str = "RESTWELL_PORT";
pub const EXPOSE_STACK_VAR: &str = "RESTWELL_EXPOSE_STACK";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub port: u16,
    pub expose_stack: bool,
}

impl Config {
    pub fn new(port: u16) -> Self {
        Self { port, expose_stack: cfg!(debug_assertions) }
    }

    pub fn with_expose_stack(mut self, expose: bool) -> Self {
        self.expose_stack = expose;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let port = match lookup(PORT_VAR) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| Error::InvalidConfig {
                key: PORT_VAR,
                value: raw.clone(),
            })?,
            None => return Err(Error::InvalidPort),
        };
        if port == 0 {
            return Err(Error::InvalidPort);
        }

        let mut config = Self::new(port);
        if let Some(raw) = lookup(EXPOSE_STACK_VAR) {
            config.expose_stack = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(Error::InvalidConfig { key: EXPOSE_STACK_VAR, value: raw }),
            };
        }
        Ok(config)
    }
}
