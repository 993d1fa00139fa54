//! Per-request contexts handed to handlers.
//!
//! [`RequestContext`] is what unauthenticated routes receive: body decoding,
//! envelope sending, path and query access, cancellation and the fault
//! recovery entry point. [`AuthenticatedContext`] owns a `RequestContext`
//! plus the caller's [`Credentials`] and derefs to it, so every base
//! capability is available on both.
//!
//! ```rust,no_run
//! use restwell::{AuthenticatedContext, Fault};
//!
//! #[derive(serde::Deserialize, serde::Serialize)]
//! struct Note { text: String }
//!
//! impl restwell::Validate for Note {}
//!
//! async fn create_note(ctx: AuthenticatedContext) -> Result<(), Fault> {
//!     let note: Note = ctx.read_json()?;
//!     tracing::info!(user = ctx.user_id(), "creating note");
//!     ctx.send_json(&note);
//!     Ok(())
//! }
//! ```

use std::ops::Deref;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::header::{CACHE_CONTROL, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec::{self, DecodeError, Validate};
use crate::credentials::Credentials;
use crate::envelope::{Envelope, IdPayload, Pong};
use crate::fault::Fault;
use crate::recovery::Recovery;
use crate::request::Request;
use crate::response::{ContentType, Response};

// ── RequestContext ────────────────────────────────────────────────────────────

/// The context of one unauthenticated request.
///
/// Exactly one exists per routed request. Every `send_*` method returns the
/// bytes it rendered; only the first send of a request is written.
pub struct RequestContext {
    request: Request,
    recovery: Recovery,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new(request: Request, recovery: Recovery, cancellation: CancellationToken) -> Self {
        Self { request, recovery, cancellation }
    }

    /// Correlation prefix tagging every log line of this request.
    pub fn prefix(&self) -> &str {
        self.recovery.prefix()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    // ── Decoding ──────────────────────────────────────────────────────────────

    /// Decodes the JSON body into `T`, then runs [`Validate::validate`].
    pub fn read_json<T>(&self) -> Result<T, DecodeError>
    where
        T: DeserializeOwned + Validate,
    {
        self.log_body();
        codec::decode_json(self.request.body())
    }

    /// Decodes a protobuf-encoded body into `M`.
    pub fn read_schema<M>(&self) -> Result<M, DecodeError>
    where
        M: prost::Message + Default,
    {
        debug!(prefix = %self.prefix(), len = self.request.body().len(), "reading protobuf body");
        codec::decode_schema(self.request.body())
    }

    fn log_body(&self) {
        debug!(
            prefix = %self.prefix(),
            body = %String::from_utf8_lossy(self.request.body()),
            "reading JSON body",
        );
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Sends `value` wrapped in a success envelope.
    ///
    /// Sequences get a `Count`. Raw byte buffers (`Vec<u8>`, `[u8]`,
    /// `[u8; N]`, `Bytes`, `BytesMut`) are not enveloped at all and go out as
    /// [`send_bytes`](Self::send_bytes) would send them.
    ///
    /// Returns an empty buffer, and sends nothing, if `value` cannot be
    /// rendered as JSON.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Bytes {
        if let Some(raw) = raw_bytes(value) {
            return self.send_bytes(raw);
        }
        match Envelope::counted(value).and_then(|envelope| envelope.to_bytes()) {
            Ok(body) => self.deliver(Response::json(body), "JSON"),
            Err(e) => {
                error!(prefix = %self.prefix(), "failed to encode JSON response: {e}");
                Bytes::new()
            }
        }
    }

    /// Sends a success envelope whose only content is `message`.
    pub fn send_text(&self, message: impl Into<String>) -> Bytes {
        self.send_envelope(&Envelope::text(message), "text")
    }

    /// Sends `bytes` as-is with `Content-Type: text/plain`.
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) -> Bytes {
        self.deliver(Response::text(bytes.into()), "bytes")
    }

    /// Sends `{"id": id}` as the envelope's `Data`.
    pub fn send_id<I: Serialize>(&self, id: I) -> Bytes {
        self.send_envelope(&Envelope::success(IdPayload { id }), "ID")
    }

    /// Sends a payload-less success envelope.
    pub fn send_ok(&self) -> Bytes {
        self.send_envelope(&Envelope::ok(), "OK")
    }

    /// Sends `{"Timestamp": <unix seconds>}` with caching disabled.
    pub fn send_pong(&self) -> Bytes {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        match serde_json::to_vec(&Pong { timestamp }) {
            Ok(body) => {
                let response = Response::builder()
                    .header(CACHE_CONTROL, HeaderValue::from_static("max-age=0, no-cache"))
                    .json(Bytes::from(body));
                self.deliver(response, "pong")
            }
            Err(e) => {
                error!(prefix = %self.prefix(), "failed to encode pong: {e}");
                Bytes::new()
            }
        }
    }

    /// Sends `message` protobuf-encoded, without an envelope.
    pub fn send_schema<M: prost::Message>(&self, message: &M) -> Bytes {
        let body = Bytes::from(message.encode_to_vec());
        self.deliver(Response::builder().bytes(ContentType::Protobuf, body), "protobuf")
    }

    fn send_envelope<T: Serialize>(&self, envelope: &Envelope<T>, kind: &str) -> Bytes {
        match envelope.to_bytes() {
            Ok(body) => self.deliver(Response::json(body), kind),
            Err(e) => {
                error!(prefix = %self.prefix(), "failed to encode {kind} response: {e}");
                Bytes::new()
            }
        }
    }

    fn deliver(&self, response: Response, kind: &str) -> Bytes {
        let body = response.body().clone();
        if self.recovery.send(response) {
            info!(
                prefix = %self.prefix(),
                body = %String::from_utf8_lossy(&body),
                "successfully sent {kind} response",
            );
        }
        body
    }

    // ── Routing data ──────────────────────────────────────────────────────────

    /// Returns the named path parameter, or `""` when the route has none.
    pub fn param(&self, name: &str) -> &str {
        self.request.param(name).unwrap_or("")
    }

    /// Returns the first non-empty query value among `keys`, or `""`.
    pub fn query(&self, keys: &[&str]) -> String {
        self.request.query_param(keys).unwrap_or_default()
    }

    /// Cancelled when the server starts shutting down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    // ── Recovery ──────────────────────────────────────────────────────────────

    /// Answers the request with the error envelope for `fault`.
    ///
    /// Handlers rarely need this: returning `Err(fault)` or panicking reaches
    /// the same place. It exists for code that wants to finish the request
    /// with an error and keep running, e.g. to release resources.
    pub fn recover(&self, fault: impl Into<Fault>) {
        self.recovery.recover(fault.into());
    }
}

impl AsRef<RequestContext> for RequestContext {
    fn as_ref(&self) -> &RequestContext { self }
}

/// Byte buffer types, as `type_name` spells them. Matched by name so that
/// borrowed payloads need not be `'static`.
const BYTE_BUFFERS: &[&str] = &[
    "alloc::vec::Vec<u8>",
    "alloc::boxed::Box<[u8]>",
    "[u8]",
    "&[u8]",
    "bytes::bytes::Bytes",
    "bytes::bytes_mut::BytesMut",
];

fn is_byte_buffer(name: &str) -> bool {
    BYTE_BUFFERS.contains(&name) || (name.starts_with("[u8; ") && name.ends_with(']'))
}

fn raw_bytes<T: Serialize + ?Sized>(value: &T) -> Option<Bytes> {
    if !is_byte_buffer(std::any::type_name::<T>()) {
        return None;
    }
    // serde renders every byte buffer as an array of small integers.
    let rendered = serde_json::to_value(value).ok()?;
    rendered
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()
        .map(Bytes::from)
}

// ── AuthenticatedContext ──────────────────────────────────────────────────────

/// The context of one authenticated request.
pub struct AuthenticatedContext {
    base: RequestContext,
    credentials: Credentials,
}

impl AuthenticatedContext {
    pub(crate) fn new(base: RequestContext, credentials: Credentials) -> Self {
        Self { base, credentials }
    }

    pub fn base(&self) -> &RequestContext { &self.base }
    pub fn credentials(&self) -> &Credentials { &self.credentials }
    pub fn user_id(&self) -> i64 { self.credentials.user_id() }
    pub fn username(&self) -> &str { self.credentials.username() }
    pub fn is_system_user(&self) -> bool { self.credentials.is_system_user() }
}

impl Deref for AuthenticatedContext {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.base
    }
}

impl AsRef<RequestContext> for AuthenticatedContext {
    fn as_ref(&self) -> &RequestContext { &self.base }
}

// ── Correlation prefix ────────────────────────────────────────────────────────

/// Base-36 rendering of the current time in microseconds.
pub(crate) fn correlation_prefix() -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default();
    base36(micros)
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    out.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use http::{HeaderMap, Method, StatusCode, Uri};
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::codec::ValidationError;

    fn context(uri: &'static str, body: &'static [u8]) -> (RequestContext, Recovery) {
        let request = Request::new(Method::POST, Uri::from_static(uri), HeaderMap::new(), Bytes::from_static(body))
            .with_params(HashMap::from([("id".to_owned(), "42".to_owned())]));
        let recovery = Recovery::new(correlation_prefix(), false);
        let ctx = RequestContext::new(request, recovery.clone(), CancellationToken::new());
        (ctx, recovery)
    }

    fn json_of(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[derive(Debug, Deserialize, Serialize)]
    struct Order {
        qty: u32,
    }

    impl Validate for Order {
        fn validate(&self) -> Result<(), ValidationError> {
            if self.qty == 0 {
                return Err(ValidationError::new("qty must be positive"));
            }
            Ok(())
        }
    }

    #[test]
    fn base36_encoding() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "Z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1_295), "ZZ");
    }

    #[test]
    fn sequence_send_is_counted() {
        let (ctx, recovery) = context("/", b"");
        let body = ctx.send_json(&vec![1, 2, 3]);
        let json = json_of(&body);
        assert_eq!(json["Count"], 3);
        assert_eq!(json["Result"], "Success");
        assert_eq!(json["StatusCode"], 200);
        assert_eq!(recovery.finish().content_type(), Some("application/json"));
    }

    #[test]
    fn byte_vectors_are_sent_raw() {
        let (ctx, recovery) = context("/", b"");
        let body = ctx.send_json(&vec![104_u8, 105]);
        assert_eq!(body.as_ref(), b"hi");

        let res = recovery.finish();
        assert_eq!(res.content_type(), Some("text/plain"));
        assert_eq!(res.body().as_ref(), b"hi");
    }

    #[test]
    fn bytes_values_are_sent_raw() {
        let (ctx, _) = context("/", b"");
        assert_eq!(ctx.send_json(&Bytes::from_static(b"\x00\x01")).as_ref(), b"\x00\x01");
    }

    #[test]
    fn borrowed_payloads_are_enveloped() {
        let (ctx, _) = context("/orders/42", b"");
        let ids: Vec<&str> = vec![ctx.param("id"), "43"];
        let json = json_of(&ctx.send_json(&ids));
        assert_eq!(json["Data"], json!(["42", "43"]));
        assert_eq!(json["Count"], 2);
    }

    #[test]
    fn byte_slices_and_arrays_are_sent_raw() {
        let (ctx, _) = context("/", b"");
        assert_eq!(ctx.send_json(&b"ok"[..]).as_ref(), b"ok");

        let (ctx, _) = context("/", b"");
        assert_eq!(ctx.send_json(b"ok").as_ref(), b"ok");

        // Wider integers are data, not bytes.
        let (ctx, _) = context("/", b"");
        assert_eq!(json_of(&ctx.send_json(&vec![104_u16, 105]))["Count"], 2);
    }

    #[test]
    fn id_and_ok_shapes() {
        let (ctx, _) = context("/", b"");
        assert_eq!(json_of(&ctx.send_id(42))["Data"], json!({ "id": 42 }));

        let (ctx, _) = context("/", b"");
        let ok = json_of(&ctx.send_ok());
        assert_eq!(ok["Result"], "Success");
        assert!(ok.get("Data").is_none());
    }

    #[test]
    fn text_envelope() {
        let (ctx, _) = context("/", b"");
        let json = json_of(&ctx.send_text("saved"));
        assert_eq!(json["Message"], "saved");
        assert!(json.get("Data").is_none());
    }

    #[test]
    fn pong_is_uncached_and_monotonic() {
        let (ctx, recovery) = context("/", b"");
        let first = json_of(&ctx.send_pong());
        let second = json_of(&ctx.send_pong());
        assert!(second["Timestamp"].as_u64().unwrap() >= first["Timestamp"].as_u64().unwrap());
        assert_eq!(first.as_object().unwrap().len(), 1);

        let res = recovery.finish();
        assert_eq!(res.headers()[CACHE_CONTROL], "max-age=0, no-cache");
    }

    #[test]
    fn decode_paths() {
        let (ctx, _) = context("/", br#"{"qty":2}"#);
        assert_eq!(ctx.read_json::<Order>().unwrap().qty, 2);

        let (ctx, _) = context("/", br#"{"qty":0}"#);
        assert!(matches!(ctx.read_json::<Order>(), Err(DecodeError::ValidationFailed(_))));

        let (ctx, _) = context("/", b"");
        assert!(matches!(ctx.read_json::<Order>(), Err(DecodeError::EmptyBody)));
    }

    #[test]
    fn routing_data() {
        let (ctx, _) = context("/orders/42?ID=7", b"");
        assert_eq!(ctx.param("id"), "42");
        assert_eq!(ctx.param("missing"), "");
        assert_eq!(ctx.query(&["id", "ID"]), "7");
        assert_eq!(ctx.query(&["nope"]), "");
    }

    #[test]
    fn explicit_recover_answers_with_error() {
        let (ctx, recovery) = context("/", b"");
        ctx.recover(crate::HttpError::bad_request("missing field"));
        let res = recovery.finish();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(res.body())["Message"], "missing field");
    }

    #[test]
    fn authenticated_context_delegates() {
        let (base, _) = context("/orders/42", b"");
        let ctx = AuthenticatedContext::new(base, Credentials::system());
        assert!(ctx.is_system_user());
        assert_eq!(ctx.user_id(), 0);
        assert_eq!(ctx.param("id"), "42");
        assert_eq!(ctx.as_ref().prefix(), ctx.prefix());
    }
}
