//! Per-request fault containment.
//!
//! A [`Recovery`] is created for every routed request before any middleware
//! or handler code runs. It owns the request's single response slot and is
//! the only place a [`Fault`] is turned into an error envelope.
//!
//! Nothing is written to the connection until the adapter calls
//! [`Recovery::finish`], so a fault raised after a handler already queued a
//! response still yields exactly one response: the error envelope.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::{Future, poll_fn};
use std::panic::{AssertUnwindSafe, PanicHookInfo};
use std::pin::pin;
use std::sync::{Arc, Once};

use futures_util::FutureExt;
use http::StatusCode;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::envelope::Envelope;
use crate::fault::{Fault, FaultKind};
use crate::response::Response;

/// Shared handle to one request's response slot.
///
/// Cloned into the request context; the adapter keeps the original so it
/// can still answer after the context has been moved into a handler that
/// panicked.
#[derive(Clone)]
pub(crate) struct Recovery {
    inner: Arc<Inner>,
}

struct Inner {
    prefix: String,
    expose_stack: bool,
    response: Mutex<Option<Response>>,
}

impl Recovery {
    pub(crate) fn new(prefix: String, expose_stack: bool) -> Self {
        Self {
            inner: Arc::new(Inner { prefix, expose_stack, response: Mutex::new(None) }),
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Queues a success response. The first one wins.
    pub(crate) fn send(&self, response: Response) -> bool {
        let mut slot = self.inner.response.lock();
        if slot.is_some() {
            warn!(prefix = %self.prefix(), "response already sent, dropping a second one");
            return false;
        }
        *slot = Some(response);
        true
    }

    /// Runs `fut` with fault containment active.
    ///
    /// A returned `Err` and a panic from anywhere inside the future end up in
    /// [`recover`](Self::recover); nothing escapes.
    pub(crate) async fn protect<F>(&self, fut: F)
    where
        F: Future<Output = Result<(), Fault>>,
    {
        if let Err(fault) = contain(fut).await {
            self.recover(fault);
        }
    }

    /// Converts `fault` into the request's error envelope, replacing anything
    /// queued so far.
    pub(crate) fn recover(&self, fault: Fault) {
        let status = fault.status();
        let raw = fault.to_string();
        let stack = fault.backtrace().to_string();

        error!(
            prefix = %self.prefix(),
            status = status.as_u16(),
            message = %raw,
            stack = %stack,
            "request aborted",
        );

        let mut envelope = Envelope::error(status, fault.envelope_message()).with_raw_message(raw);
        if self.inner.expose_stack {
            envelope = envelope.with_stack(stack);
        }
        *self.inner.response.lock() = Some(error_response(&envelope, status));
    }

    /// Answers a request whose caller could not be authenticated.
    ///
    /// Resolver failures never expose a stack, whatever `expose_stack` says.
    pub(crate) fn reject(&self, fault: Fault) {
        let status = fault.status();
        match fault.kind() {
            FaultKind::Http(_) => {
                debug!(prefix = %self.prefix(), status = status.as_u16(), "authentication rejected: {fault}");
            }
            _ => {
                error!(prefix = %self.prefix(), status = status.as_u16(), "authentication failed: {fault}");
            }
        }
        let envelope = Envelope::error(status, fault.envelope_message());
        *self.inner.response.lock() = Some(error_response(&envelope, status));
    }

    /// Takes the response to write. A handler that sent nothing yields an
    /// empty `200`.
    pub(crate) fn finish(&self) -> Response {
        self.inner.response.lock().take().unwrap_or_else(|| {
            debug!(prefix = %self.prefix(), "handler returned without sending a response");
            Response::status(StatusCode::OK)
        })
    }
}

// ── Panic containment ─────────────────────────────────────────────────────────

thread_local! {
    /// Number of `contain` polls active on this thread.
    static CONTAINED: Cell<usize> = const { Cell::new(0) };
    /// Backtrace of the last panic raised under containment on this thread.
    static PANIC_SITE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Wraps the process panic hook once.
///
/// Panics raised while a `contain` poll is on the stack have their backtrace
/// recorded for the recovery point and are not printed; every other panic
/// goes to the previous hook unchanged.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            if CONTAINED.with(Cell::get) > 0 {
                let site = Backtrace::force_capture();
                PANIC_SITE.with(|slot| *slot.borrow_mut() = Some(site));
            } else {
                previous(info);
            }
        }));
    });
}

struct Containment;

impl Containment {
    fn enter() -> Self {
        CONTAINED.with(|depth| depth.set(depth.get() + 1));
        Containment
    }
}

impl Drop for Containment {
    fn drop(&mut self) {
        CONTAINED.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Drives `fut`, turning a panic anywhere inside it into a [`Fault`] that
/// carries the backtrace of the panic site.
///
/// A panic unwinds within a single poll on a single thread, so marking each
/// poll is enough to tie the hook's capture to this future.
pub(crate) async fn contain<F, T>(fut: F) -> Result<T, Fault>
where
    F: Future<Output = Result<T, Fault>>,
{
    install_hook();
    let mut fut = pin!(AssertUnwindSafe(fut).catch_unwind());
    poll_fn(|cx| {
        let _scope = Containment::enter();
        fut.as_mut().poll(cx).map(|caught| match caught {
            Ok(outcome) => outcome,
            Err(payload) => {
                let site = PANIC_SITE.with(|slot| slot.borrow_mut().take());
                Err(Fault::from_panic_at(payload, site))
            }
        })
    })
    .await
}

fn error_response(envelope: &Envelope<()>, status: StatusCode) -> Response {
    match envelope.to_bytes() {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            error!("failed to encode error envelope: {e}");
            Response::status(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;

    use super::*;
    use crate::fault::HttpError;

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn returned_fault_becomes_envelope() {
        let recovery = Recovery::new("P1".into(), true);
        recovery.protect(async { Err(HttpError::forbidden("forbidden").into()) }).await;

        let res = recovery.finish();
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        let json = body(&res);
        assert_eq!(json["Result"], "Error");
        assert_eq!(json["Message"], "forbidden");
        assert!(json["Stack"].is_string());
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let recovery = Recovery::new("P2".into(), false);
        recovery
            .protect(async {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            })
            .await;

        let res = recovery.finish();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body(&res);
        assert_eq!(json["Message"], "kaboom");
        assert!(json.get("Stack").is_none());
    }

    #[tokio::test]
    async fn fault_replaces_queued_response() {
        let recovery = Recovery::new("P3".into(), false);
        let handle = recovery.clone();
        recovery
            .protect(async move {
                handle.send(Response::json(Bytes::from_static(b"{}")));
                Err(Fault::message("late failure"))
            })
            .await;

        let res = recovery.finish();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&res)["Message"], "late failure");
    }

    #[test]
    fn first_send_wins() {
        let recovery = Recovery::new("P4".into(), false);
        assert!(recovery.send(Response::text("first")));
        assert!(!recovery.send(Response::text("second")));
        assert_eq!(recovery.finish().body().as_ref(), b"first");
    }

    #[test]
    fn nothing_sent_is_empty_ok() {
        let res = Recovery::new("P5".into(), false).finish();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.body().is_empty());
    }

    #[test]
    fn rejection_has_no_stack() {
        let recovery = Recovery::new("P6".into(), true);
        recovery.reject(Fault::other(std::io::Error::other("ldap down")));
        let res = recovery.finish();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body(&res);
        assert_eq!(json["Message"], "ldap down");
        assert!(json.get("Stack").is_none());
    }

    #[inline(never)]
    fn deep_failure_site() {
        panic!("db down");
    }

    #[tokio::test]
    async fn stack_points_at_the_panic_site() {
        let recovery = Recovery::new("P7".into(), true);
        recovery
            .protect(async {
                deep_failure_site();
                Ok(())
            })
            .await;

        let json = body(&recovery.finish());
        assert_eq!(json["Message"], "db down");
        let stack = json["Stack"].as_str().unwrap();
        assert!(stack.contains("deep_failure_site"), "{stack}");
    }

    #[tokio::test]
    async fn containment_ends_with_the_future() {
        let fault = contain(async {
            if true {
                panic!("contained");
            }
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(fault.envelope_message(), "contained");

        assert_eq!(CONTAINED.with(Cell::get), 0);
        assert!(PANIC_SITE.with(|slot| slot.borrow().is_none()));
    }
}
