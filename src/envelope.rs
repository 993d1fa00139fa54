//! The uniform JSON envelope wrapped around every structured response.
//!
//! ```text
//! {"StatusCode":200,"Data":[1,2,3],"Count":3,"Result":"Success"}
//! {"StatusCode":403,"Message":"forbidden","Result":"Error","Stack":"…"}
//! ```
//!
//! Absent optional fields are omitted rather than written as `null`.

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Success / error classification carried in the `Result` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Error,
}

/// One outgoing payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub result: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Rendered error text kept for the server log; never serialized.
    #[serde(skip)]
    pub raw_message: Option<String>,
}

impl<T> Envelope<T> {
    fn new(status: StatusCode, result: Outcome) -> Self {
        Self {
            status_code: status.as_u16(),
            data: None,
            message: None,
            count: None,
            result,
            stack: None,
            raw_message: None,
        }
    }

    /// `200` success carrying `data`.
    pub fn success(data: T) -> Self {
        Self { data: Some(data), ..Self::new(StatusCode::OK, Outcome::Success) }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == Outcome::Success
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

impl Envelope<Value> {
    /// `200` success for an arbitrary value.
    ///
    /// The value is rendered to JSON once; if it comes out as an array its
    /// length goes into `Count`. That covers every sequence (`Vec`, slices,
    /// sets, fixed-size arrays) and also tuples and tuple structs, which
    /// serde renders as arrays too.
    pub fn counted<T: Serialize + ?Sized>(data: &T) -> serde_json::Result<Self> {
        let data = serde_json::to_value(data)?;
        let count = data.as_array().map(Vec::len);
        let envelope = Self::success(data);
        Ok(match count {
            Some(count) => envelope.with_count(count),
            None => envelope,
        })
    }
}

impl Envelope<()> {
    /// `200` success with no payload.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK, Outcome::Success)
    }

    /// `200` success carrying only a message.
    pub fn text(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::ok() }
    }

    /// Error envelope with the given status and caller-facing message.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::new(status, Outcome::Error) }
    }

    pub fn with_raw_message(mut self, raw: impl Into<String>) -> Self {
        self.raw_message = Some(raw.into());
        self
    }
}

/// `{ "id": <value> }`, the payload of an identifier response.
#[derive(Debug, Serialize)]
pub(crate) struct IdPayload<I> {
    pub id: I,
}

/// Body of a liveness response.
#[derive(Debug, Serialize)]
pub(crate) struct Pong {
    #[serde(rename = "Timestamp")]
    pub timestamp: u64,
}
