//! Caller authentication for authenticated routes.
//!
//! An [`Authenticator`] turns the raw request into [`Credentials`] or a
//! [`Fault`]. A structured [`HttpError`](crate::HttpError) is sent to the
//! caller verbatim (`401`, `403`, …); any other fault becomes a `500`.
//! Either way neither middleware nor the handler run.
//!
//! When no authenticator is configured, [`SystemAuthenticator`] is used and
//! every authenticated route sees the system identity.

use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::fault::Fault;
use crate::request::Request;

/// Resolves the identity behind a request.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self, req: &Request) -> Result<Credentials, Fault>;
}

/// Always succeeds with [`Credentials::system`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAuthenticator;

#[async_trait]
impl Authenticator for SystemAuthenticator {
    async fn authenticate(&self, _req: &Request) -> Result<Credentials, Fault> {
        Ok(Credentials::system())
    }
}

/// Adapts a synchronous closure into an [`Authenticator`].
pub struct FnAuthenticator<F>(pub F);

#[async_trait]
impl<F> Authenticator for FnAuthenticator<F>
where
    F: Fn(&Request) -> Result<Credentials, Fault> + Send + Sync + 'static,
{
    async fn authenticate(&self, req: &Request) -> Result<Credentials, Fault> {
        (self.0)(req)
    }
}
