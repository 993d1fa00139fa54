//! The composed request pipeline.
//!
//! An [`App`] is what a [`Server`](crate::Server) freezes into once
//! registration is over. For every routed request it:
//!
//! 1. resolves credentials (authenticated routes only) and answers directly
//!    if that fails;
//! 2. builds the request context and activates fault containment;
//! 3. runs the middleware chain in order;
//! 4. calls the handler.
//!
//! Any fault from step 3 or 4, returned or panicked, is turned into exactly
//! one error envelope by the request's recovery point.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use crate::auth::Authenticator;
use crate::context::{AuthenticatedContext, RequestContext, correlation_prefix};
use crate::fault::{BoxError, Fault};
use crate::handler::BoxedHandler;
use crate::middleware::MiddlewareChain;
use crate::recovery::{Recovery, contain};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Lookup, Route, Router};

/// A frozen, cheaply clonable request pipeline.
///
/// Usable as a hyper service, so it can be mounted on any hyper-compatible
/// host instead of [`Server::serve`](crate::Server::serve).
#[derive(Clone)]
pub struct App {
    inner: Arc<Inner>,
}

struct Inner {
    router: Router,
    middlewares: MiddlewareChain,
    authenticator: Arc<dyn Authenticator>,
    expose_stack: bool,
    shutdown: CancellationToken,
}

impl App {
    pub(crate) fn new(
        router: Router,
        middlewares: MiddlewareChain,
        authenticator: Arc<dyn Authenticator>,
        expose_stack: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                router,
                middlewares,
                authenticator,
                expose_stack,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Parent of every request's cancellation token.
    ///
    /// Cancelling it signals all in-flight handlers that the host is going away.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Routes one request and produces one response.
    ///
    /// Unknown paths get a bare `404`, known paths under the wrong method a
    /// bare `405`; neither reaches the pipeline.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        let (route, params) = match self.inner.router.lookup(&parts.method, parts.uri.path()) {
            Lookup::Found(route, params) => (route, params),
            Lookup::MethodNotAllowed => return Response::status(StatusCode::METHOD_NOT_ALLOWED).into_http(),
            Lookup::NotFound => return Response::status(StatusCode::NOT_FOUND).into_http(),
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let e: BoxError = e.into();
                warn!(path = parts.uri.path(), "failed to read request body: {e}");
                return Response::status(StatusCode::BAD_REQUEST).into_http();
            }
        };

        let request = Request::new(parts.method, parts.uri, parts.headers, body);
        self.handle(route, request, params).await.into_http()
    }

    async fn handle(&self, route: Route, request: Request, params: HashMap<String, String>) -> Response {
        let prefix = correlation_prefix();
        let span = info_span!("request", prefix = %prefix, method = %request.method(), path = request.path());
        let request = request.with_params(params);
        let recovery = Recovery::new(prefix, self.inner.expose_stack);

        async {
            let cancellation = self.inner.shutdown.child_token();
            match route {
                Route::Public(handler) => {
                    let ctx = RequestContext::new(request, recovery.clone(), cancellation);
                    recovery.protect(self.guarded(handler, ctx)).await;
                }
                Route::Authenticated(handler) => {
                    match contain(self.inner.authenticator.authenticate(&request)).await {
                        Ok(credentials) => {
                            debug!(prefix = %recovery.prefix(), user_id = credentials.user_id(), "caller authenticated");
                            let base = RequestContext::new(request, recovery.clone(), cancellation);
                            let ctx = AuthenticatedContext::new(base, credentials);
                            recovery.protect(self.guarded(handler, ctx)).await;
                        }
                        Err(fault) => recovery.reject(fault),
                    }
                }
            }
            recovery.finish()
        }
        .instrument(span)
        .await
    }

    /// Middleware chain, then handler.
    async fn guarded<C>(&self, handler: BoxedHandler<C>, ctx: C) -> Result<(), Fault>
    where
        C: AsRef<RequestContext>,
    {
        let base = ctx.as_ref();
        self.inner.middlewares.run(base.request(), base.prefix())?;
        handler.call(ctx).await
    }
}

impl<B> hyper::service::Service<http::Request<B>> for App
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Infallible>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let app = self.clone();
        Box::pin(async move { Ok(app.dispatch(req).await) })
    }
}
