use crate::http::types::StatusCode;
use std::{any::Any, error, io};
use thiserror::Error;

/// Error type returned by route and error callbacks.
///
/// Anything that implements [`std::error::Error`] converts into it with `?`.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Reasons a request is rejected while it is being parsed.
///
/// Every variant is answered with the status returned by
/// [`status`](ProtocolError::status), rendered as a small HTML page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("request method is not an upper-case token")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("request line or header line is too long")]
    LineTooLong,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("query string repeats a key")]
    DuplicateQueryKey,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("too many header lines")]
    TooManyHeaders,
    #[error("Content-Length is not a number")]
    InvalidContentLength,
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,
    #[error("missing Host header")]
    MissingHost,
}

impl ProtocolError {
    /// Returns the status code sent to the client for this rejection.
    #[inline]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedVersion => StatusCode::HttpVersionNotSupported,
            Self::LineTooLong | Self::BodyTooLarge => StatusCode::RequestEntityTooLarge,
            Self::TooManyHeaders => StatusCode::RequestHeaderFieldsTooLarge,
            Self::InvalidRequestLine
            | Self::InvalidMethod
            | Self::InvalidEncoding
            | Self::DuplicateQueryKey
            | Self::InvalidHeader
            | Self::InvalidContentLength
            | Self::MissingHost => StatusCode::BadRequest,
        }
    }
}

/// Errors raised while building a TLS context.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
