//! Route registration and the HTTP server loop.
//!
//! A [`Server`] has two phases. During registration it is an owned builder:
//! routes, middleware and the authenticator are added by value. Serving (or
//! [`Server::into_app`]) consumes it and freezes everything into an
//! [`App`], so nothing can be registered once requests are flowing.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`; no new connections are made.
//! 2. Cancelling every request's [`cancellation`](crate::RequestContext::cancellation) token.
//! 3. Letting every in-flight connection task run to completion.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::Method;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::App;
use crate::auth::{Authenticator, FnAuthenticator, SystemAuthenticator};
use crate::config::Config;
use crate::context::{AuthenticatedContext, RequestContext};
use crate::credentials::Credentials;
use crate::error::Error;
use crate::fault::{BoxError, Fault};
use crate::handler::Handler;
use crate::middleware::MiddlewareChain;
use crate::request::Request;
use crate::router::{Route, Router};

struct Registration {
    method: Method,
    path: String,
    route: Route,
}

/// The HTTP server builder.
///
/// ```rust,no_run
/// use restwell::{AuthenticatedContext, Config, Fault, RequestContext, Server};
///
/// #[tokio::main]
/// async fn main() -> Result<(), restwell::Error> {
///     Server::new(Config::from_env()?)
///         .get("/users/{id}", show_user)
///         .post_authenticated("/users", create_user)
///         .serve()
///         .await
/// }
///
/// async fn show_user(ctx: RequestContext) {
///     ctx.send_id(restwell::parse_id(ctx.param("id")));
/// }
///
/// async fn create_user(ctx: AuthenticatedContext) -> Result<(), Fault> {
///     let body: serde_json::Value = ctx.read_json()?;
///     ctx.send_json(&body);
///     Ok(())
/// }
/// ```
pub struct Server {
    config: Config,
    routes: Vec<Registration>,
    middlewares: MiddlewareChain,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            routes: Vec::new(),
            middlewares: MiddlewareChain::new(),
            authenticator: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers an unauthenticated handler for a method + path pair.
    pub fn route(self, method: Method, path: &str, handler: impl Handler<RequestContext>) -> Self {
        self.register(method, path, Route::Public(handler.into_boxed_handler()))
    }

    /// Registers a handler that runs only after the caller is authenticated.
    pub fn route_authenticated(
        self,
        method: Method,
        path: &str,
        handler: impl Handler<AuthenticatedContext>,
    ) -> Self {
        self.register(method, path, Route::Authenticated(handler.into_boxed_handler()))
    }

    fn register(mut self, method: Method, path: &str, route: Route) -> Self {
        self.routes.push(Registration { method, path: path.to_owned(), route });
        self
    }

    pub fn get(self, path: &str, handler: impl Handler<RequestContext>) -> Self {
        self.route(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler<RequestContext>) -> Self {
        self.route(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler<RequestContext>) -> Self {
        self.route(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler<RequestContext>) -> Self {
        self.route(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler<RequestContext>) -> Self {
        self.route(Method::DELETE, path, handler)
    }

    pub fn get_authenticated(self, path: &str, handler: impl Handler<AuthenticatedContext>) -> Self {
        self.route_authenticated(Method::GET, path, handler)
    }

    pub fn post_authenticated(self, path: &str, handler: impl Handler<AuthenticatedContext>) -> Self {
        self.route_authenticated(Method::POST, path, handler)
    }

    pub fn put_authenticated(self, path: &str, handler: impl Handler<AuthenticatedContext>) -> Self {
        self.route_authenticated(Method::PUT, path, handler)
    }

    pub fn patch_authenticated(self, path: &str, handler: impl Handler<AuthenticatedContext>) -> Self {
        self.route_authenticated(Method::PATCH, path, handler)
    }

    pub fn delete_authenticated(self, path: &str, handler: impl Handler<AuthenticatedContext>) -> Self {
        self.route_authenticated(Method::DELETE, path, handler)
    }

    /// Appends a middleware. Middleware run in the order they are added.
    pub fn middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(&Request) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.middlewares.push(middleware);
        self
    }

    /// Sets the authenticator for authenticated routes.
    ///
    /// Without one, authenticated routes see [`Credentials::system`].
    pub fn authenticator(mut self, authenticator: impl Authenticator) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Sets a synchronous closure as the authenticator.
    pub fn authenticate_with<F>(self, resolve: F) -> Self
    where
        F: Fn(&Request) -> Result<Credentials, Fault> + Send + Sync + 'static,
    {
        self.authenticator(FnAuthenticator(resolve))
    }

    /// Ends registration and builds the request pipeline.
    ///
    /// Fails if a route path is malformed or conflicts with another route.
    pub fn into_app(self) -> Result<App, Error> {
        let mut router = Router::new();
        for Registration { method, path, route } in self.routes {
            router
                .insert(method.clone(), &path, route)
                .map_err(|source| Error::Route { method, path, source })?;
        }
        let authenticator = self.authenticator.unwrap_or_else(|| Arc::new(SystemAuthenticator));
        Ok(App::new(router, self.middlewares, authenticator, self.config.expose_stack))
    }

    /// Binds `0.0.0.0:<port>` and serves until SIGTERM or Ctrl-C.
    ///
    /// Returns only after a full graceful shutdown.
    pub async fn serve(self) -> Result<(), Error> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(self, signal: impl Future<Output = ()>) -> Result<(), Error> {
        let port = self.config.port;
        if port == 0 {
            return Err(Error::InvalidPort);
        }
        let app = self.into_app()?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { port, source })?;
        accept_loop(app, listener, signal).await
    }

    /// Serves on an already-bound listener until `signal` resolves.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let app = self.into_app()?;
        accept_loop(app, listener, signal).await
    }
}

async fn accept_loop(
    app: App,
    listener: TcpListener,
    signal: impl Future<Output = ()>,
) -> Result<(), Error> {
    info!(addr = %listener.local_addr()?, "restwell listening");

    // JoinSet tracks every spawned connection task so we can wait for
    // them all to finish during graceful shutdown.
    let mut tasks = tokio::task::JoinSet::new();

    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Check shutdown first so a signal immediately stops accepting new
            // connections, even if more are queued.
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                app.shutdown_token().cancel();
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let app = app.clone();

                tasks.spawn(async move {
                    // `auto::Builder` transparently handles both HTTP/1.1
                    // and HTTP/2, whichever the client negotiates.
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, app)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("restwell stopped");
    Ok(())
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` is a future that never resolves, so on non-Unix platforms
    // the SIGTERM arm is effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
