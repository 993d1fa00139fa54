//! Minimal restwell example: enveloped JSON endpoints, bearer-token
//! authentication, a tenant middleware and a liveness probe.
//!
//! Run with:
//!   RESTWELL_PORT=3000 RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/ping
//!   curl -H 'x-tenant: acme' http://localhost:3000/users
//!   curl -H 'x-tenant: acme' 'http://localhost:3000/search?Q=ali'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'x-tenant: acme' -H 'authorization: Bearer admin' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE -H 'x-tenant: acme' http://localhost:3000/users/42

use restwell::{
    AuthenticatedContext, BoxError, Config, Credentials, Fault, HttpError, Request,
    RequestContext, Server, Validate, ValidationError, health, parse_id,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Deserialize, Serialize)]
struct User {
    #[serde(default)]
    id: i64,
    name: String,
}

impl Validate for User {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("name must not be blank"));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), restwell::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("{e}; falling back to port 3000");
        Config::new(3000)
    });

    Server::new(config)
        .middleware(require_tenant)
        .authenticate_with(bearer)
        .get("/ping", health::ping)
        .get("/users", list_users)
        .get("/users/{id}", get_user)
        .get("/search", search)
        .post_authenticated("/users", create_user)
        .delete_authenticated("/users/{id}", delete_user)
        .serve()
        .await
}

fn require_tenant(req: &Request) -> Result<(), BoxError> {
    if req.path() == "/ping" || req.header("x-tenant").is_some() {
        Ok(())
    } else {
        Err("missing x-tenant header".into())
    }
}

// Real services would verify a signed token here.
fn bearer(req: &Request) -> Result<Credentials, Fault> {
    match req.header("authorization").and_then(|v| v.strip_prefix("Bearer ")) {
        Some("admin") => Ok(Credentials::new("admin", 1).with_roles(["admin"])),
        Some(user) => Ok(Credentials::new(user, 2)),
        None => Err(HttpError::unauthorized("missing bearer token").into()),
    }
}

fn users() -> Vec<User> {
    vec![
        User { id: 1, name: "alice".into() },
        User { id: 2, name: "bob".into() },
    ]
}

// GET /users → {"Data":[…],"Count":2,…}
async fn list_users(ctx: RequestContext) {
    ctx.send_json(&users());
}

async fn get_user(ctx: RequestContext) -> Result<(), Fault> {
    let id = parse_id(ctx.param("id"));
    let user = users()
        .into_iter()
        .find(|u| u.id == id)
        .ok_or_else(|| HttpError::not_found(format!("user {id} not found")))?;
    ctx.send_json(&user);
    Ok(())
}

// Accepts both ?q= and ?Q=.
async fn search(ctx: RequestContext) {
    let needle = ctx.query(&["q", "Q"]);
    let hits: Vec<User> = users().into_iter().filter(|u| u.name.contains(&needle)).collect();
    ctx.send_json(&hits);
}

async fn create_user(ctx: AuthenticatedContext) -> Result<(), Fault> {
    let mut user: User = ctx.read_json()?;
    user.id = 99;
    tracing::info!(prefix = ctx.prefix(), by = ctx.username(), "creating user");
    ctx.send_id(user.id);
    Ok(())
}

async fn delete_user(ctx: AuthenticatedContext) {
    if !ctx.credentials().has_role("admin") {
        HttpError::forbidden("admins only").raise();
    }
    ctx.send_ok();
}
