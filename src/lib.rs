//! # restwell
//!
//! A small framework for JSON REST services: every response a handler sends
//! is wrapped in a uniform envelope, and every failure, returned or panicked,
//! becomes exactly one error envelope instead of a dropped connection.
//!
//! ## The pipeline
//!
//! For each routed request:
//!
//! 1. Authenticated routes resolve the caller's [`Credentials`] first. A
//!    failing [`Authenticator`] answers the request itself; nothing else runs.
//! 2. A [`RequestContext`] is built and fault recovery is activated.
//! 3. Middleware run in registration order; the first rejection stops them.
//! 4. The handler runs and sends its answer through the context.
//!
//! Every log line of a request carries the same correlation `prefix`.
//!
//! ## The envelope
//!
//! ```json
//! {"StatusCode": 200, "Data": [1, 2, 3], "Count": 3, "Result": "Success"}
//! {"StatusCode": 400, "Message": "request body is empty", "Result": "Error"}
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use restwell::{AuthenticatedContext, Config, Fault, HttpError, RequestContext, Server, health};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restwell::Error> {
//!     Server::new(Config::from_env()?)
//!         .get("/ping", health::ping)
//!         .get("/users/{id}", get_user)
//!         .delete_authenticated("/users/{id}", delete_user)
//!         .serve()
//!         .await
//! }
//!
//! async fn get_user(ctx: RequestContext) {
//!     ctx.send_id(restwell::parse_id(ctx.param("id")));
//! }
//!
//! async fn delete_user(ctx: AuthenticatedContext) -> Result<(), Fault> {
//!     if !ctx.credentials().has_role("admin") {
//!         return Err(HttpError::forbidden("admins only").into());
//!     }
//!     ctx.send_ok();
//!     Ok(())
//! }
//! ```

mod app;
mod auth;
mod codec;
mod config;
mod context;
mod credentials;
mod envelope;
mod error;
mod fault;
mod handler;
mod recovery;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use app::App;
pub use auth::{Authenticator, FnAuthenticator, SystemAuthenticator};
pub use codec::{DecodeError, Validate, ValidationError, parse_id};
pub use config::{Config, EXPOSE_STACK_VAR, PORT_VAR};
pub use context::{AuthenticatedContext, RequestContext};
pub use credentials::{Credentials, SYSTEM_USER_ID, SYSTEM_USERNAME};
pub use envelope::{Envelope, Outcome};
pub use error::Error;
pub use fault::{BoxError, Fault, FaultKind, HttpError};
pub use handler::{Handler, HandlerOutput};
pub use middleware::MiddlewareChain;
pub use request::Request;
pub use response::{ContentType, Response, ResponseBuilder};
pub use server::Server;
