//! Built-in liveness handler.
//!
//! Register it on any path your orchestrator probes:
//!
//! ```rust,no_run
//! use restwell::{Config, Server, health};
//!
//! let server = Server::new(Config::new(8080)).get("/ping", health::ping);
//! ```
//!
//! The answer is `{"Timestamp": <unix seconds>}` with
//! `Cache-Control: max-age=0, no-cache`, so intermediaries never serve a
//! stale probe. It has no dependencies: if the process can respond at all,
//! it is alive.

use crate::context::RequestContext;

/// Answers with the current server time.
pub async fn ping(ctx: RequestContext) {
    ctx.send_pong();
}
