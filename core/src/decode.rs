//! Response body decoding.
//!
//! The caller picks a [`Decoder`] at every call site: [`RawText`] for
//! documents such as `config.xml` or console output, [`Structured`] for
//! JSON records, [`Discard`] when only the status matters. Decoding never
//! fails the request itself; the result travels next to the envelope in
//! [`Response::decoded`].

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::ApiError;
use crate::http::ResponseEnvelope;

/// A structured body did not parse into the requested record.
#[derive(Debug, Error)]
#[error("could not decode structured response: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

pub trait Decoder {
    type Output;

    fn decode(&self, body: &[u8]) -> Result<Self::Output, DecodeError>;
}

/// Body verbatim as text. Invalid UTF-8 is replaced, never rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawText;

impl Decoder for RawText {
    type Output = String;

    fn decode(&self, body: &[u8]) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(body).into_owned())
    }
}

/// Body parsed as JSON into `T`.
#[derive(Debug)]
pub struct Structured<T>(PhantomData<fn() -> T>);

impl<T> Structured<T> {
    pub fn new() -> Self {
        Structured(PhantomData)
    }
}

impl<T> Default for Structured<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Decoder for Structured<T> {
    type Output = T;

    fn decode(&self, body: &[u8]) -> Result<T, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Ignores the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl Decoder for Discard {
    type Output = ();

    fn decode(&self, _body: &[u8]) -> Result<(), DecodeError> {
        Ok(())
    }
}

/// A response together with the outcome of decoding its body.
#[derive(Debug)]
pub struct Response<T> {
    pub envelope: ResponseEnvelope,
    pub decoded: Result<T, DecodeError>,
}

impl<T> Response<T> {
    pub fn status(&self) -> u16 {
        self.envelope.status
    }

    pub fn value(&self) -> Option<&T> {
        self.decoded.as_ref().ok()
    }

    /// The decoded value, or a `Status` error when the status is not 2xx.
    pub fn into_value(self, path: &str) -> Result<T, ApiError> {
        if !self.envelope.is_success() {
            return Err(ApiError::Status {
                status: self.envelope.status,
                path: path.to_string(),
            });
        }
        Ok(self.decoded?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Origin;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Named {
        name: String,
    }

    fn envelope(status: u16, body: &str) -> ResponseEnvelope {
        ResponseEnvelope {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
            origin: Origin::Remote,
        }
    }

    #[test]
    fn raw_text_copies_body() {
        assert_eq!(RawText.decode(b"<project/>").unwrap(), "<project/>");
    }

    #[test]
    fn raw_text_replaces_invalid_utf8() {
        assert_eq!(RawText.decode(&[0x61, 0xff]).unwrap(), "a\u{fffd}");
    }

    #[test]
    fn structured_parses_record() {
        let named = Structured::<Named>::new().decode(br#"{"name":"alpha"}"#).unwrap();
        assert_eq!(named.name, "alpha");
    }

    #[test]
    fn structured_reports_malformed_body() {
        assert!(Structured::<Named>::new().decode(b"<html>").is_err());
        assert!(Structured::<Named>::new().decode(b"").is_err());
    }

    #[test]
    fn into_value_rejects_failure_status_before_decoding() {
        let response = Response {
            envelope: envelope(500, "oops"),
            decoded: Structured::<Named>::new().decode(b"oops"),
        };
        let err = response.into_value("/job/alpha").unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn into_value_surfaces_decode_failure() {
        let response = Response {
            envelope: envelope(200, "not json"),
            decoded: Structured::<Named>::new().decode(b"not json"),
        };
        assert!(response.value().is_none());
        assert!(matches!(
            response.into_value("/job/alpha"),
            Err(ApiError::Decode(_))
        ));
    }
}
