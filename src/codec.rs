//! Body decoding for JSON and protobuf payloads.
//!
//! These are the only two places request bytes turn into typed values. Every
//! failure is a [`DecodeError`], which converts into a 400 [`Fault`](crate::Fault)
//! so a handler can simply write `ctx.read_json::<T>()?`.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::fault::BoxError;

/// Why a request body could not be turned into the requested type.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("failed to decode payload - {0}")]
    MalformedPayload(#[source] BoxError),

    #[error("failed to validate payload - {0}")]
    ValidationFailed(#[source] ValidationError),
}

/// A domain rule violated by an otherwise well-formed payload.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Post-decode checks for request DTOs.
///
/// Every type read with [`RequestContext::read_json`](crate::RequestContext::read_json)
/// implements this, and its checks always run after a successful decode, so
/// structurally valid but semantically wrong input becomes a 400. Types
/// without rules opt in with an empty impl.
///
/// ```rust
/// use restwell::{Validate, ValidationError};
///
/// #[derive(serde::Deserialize)]
/// struct CreateUser { name: String }
///
/// impl Validate for CreateUser {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.name.trim().is_empty() {
///             return Err(ValidationError::new("name must not be blank"));
///         }
///         Ok(())
///     }
/// }
///
/// #[derive(serde::Deserialize)]
/// struct Ping { note: String }
///
/// impl Validate for Ping {}
/// ```
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for serde_json::Value {}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.as_ref().map_or(Ok(()), Validate::validate)
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.iter().try_for_each(Validate::validate)
    }
}

/// Decodes `body` as JSON, then runs `T`'s validation.
pub(crate) fn decode_json<T>(body: &Bytes) -> Result<T, DecodeError>
where
    T: DeserializeOwned + Validate,
{
    if body.is_empty() {
        return Err(DecodeError::EmptyBody);
    }
    let value: T =
        serde_json::from_slice(body).map_err(|e| DecodeError::MalformedPayload(e.into()))?;
    value.validate().map_err(DecodeError::ValidationFailed)?;
    Ok(value)
}

pub(crate) fn decode_schema<M>(body: &Bytes) -> Result<M, DecodeError>
where
    M: prost::Message + Default,
{
    if body.is_empty() {
        return Err(DecodeError::EmptyBody);
    }
    M::decode(body.clone()).map_err(|e| DecodeError::MalformedPayload(e.into()))
}

/// Parses a decimal 64-bit id, returning `0` when `s` is not one.
///
/// Convenient for path parameters where `0` already means "no such record".
pub fn parse_id(s: &str) -> i64 {
    s.parse().unwrap_or(0)
}
