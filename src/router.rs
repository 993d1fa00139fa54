//! Radix-tree route table.
//!
//! One tree per HTTP method. O(path-length) lookup. The table only maps a
//! method + path to a [`Route`]; everything a route does happens in
//! [`App`](crate::App).

use std::collections::HashMap;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::context::{AuthenticatedContext, RequestContext};
use crate::handler::BoxedHandler;

/// A registered handler together with the context it expects.
#[derive(Clone)]
pub(crate) enum Route {
    Public(BoxedHandler<RequestContext>),
    Authenticated(BoxedHandler<AuthenticatedContext>),
}

pub(crate) enum Lookup {
    Found(Route, HashMap<String, String>),
    /// The path exists, but not for this method.
    MethodNotAllowed,
    NotFound,
}

#[derive(Default)]
pub(crate) struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Path parameters use `{name}` syntax; `ctx.param("name")` retrieves them.
    pub(crate) fn insert(
        &mut self,
        method: Method,
        path: &str,
        route: Route,
    ) -> Result<(), matchit::InsertError> {
        self.routes.entry(method).or_default().insert(path, route)
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(matched.value.clone(), params);
        }

        let elsewhere = self.routes.iter()
            .any(|(other, tree)| other != method && tree.at(path).is_ok());
        if elsewhere { Lookup::MethodNotAllowed } else { Lookup::NotFound }
    }
}
