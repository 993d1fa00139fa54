//! Middleware layer.
//!
//! A middleware is a function that inspects the inbound [`Request`] before
//! the handler runs and either lets it through or rejects it. The chain runs
//! in registration order; the first rejection stops it, and neither later
//! middleware nor the handler see the request.
//!
//! Rejections are server faults: the caller gets a `500` envelope naming the
//! zero-based position of the middleware that failed.
//!
//! ```rust
//! use restwell::{BoxError, Request, Server, Config};
//!
//! fn require_tenant(req: &Request) -> Result<(), BoxError> {
//!     match req.header("x-tenant") {
//!         Some(_) => Ok(()),
//!         None => Err("missing x-tenant header".into()),
//!     }
//! }
//!
//! let server = Server::new(Config::new(8080)).middleware(require_tenant);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::fault::{BoxError, Fault, HttpError};
use crate::request::Request;

/// A type-erased middleware function.
pub type Middleware = Arc<dyn Fn(&Request) -> Result<(), BoxError> + Send + Sync + 'static>;

/// An ordered, append-only list of middleware.
///
/// Built during registration, then frozen into an [`App`](crate::App) and
/// shared read-only by every request.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` to the end of the chain.
    pub fn push<F>(&mut self, middleware: F)
    where
        F: Fn(&Request) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs every middleware in order, stopping at the first failure.
    pub fn run(&self, req: &Request, prefix: &str) -> Result<(), Fault> {
        for (level, middleware) in self.middlewares.iter().enumerate() {
            if let Err(err) = middleware(req) {
                debug!(prefix, level, "middleware rejected request: {err}");
                return Err(HttpError::internal(format!("middleware level {level} failed: {err}")).into());
            }
        }
        Ok(())
    }
}
