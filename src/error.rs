// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::types::ResponseEnvelope;
use serde::de::DeserializeOwned;
use snafu::{ErrorCompat, IntoError, Snafu};

/// Failures of client construction and of individual service calls.
///
/// Configuration errors are returned when the client or a service is built. Every other variant
/// is delivered through the [CallHandle](crate::CallHandle) of the call that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("invalid client configuration: {}", message))]
    InvalidConfiguration { message: String },

    #[snafu(display("unsupported response type {}: {}", type_name, reason))]
    UnsupportedType { type_name: String, reason: String },

    #[snafu(display("response body fails to deserialize into {}: {}", type_name, message))]
    Deserialization { type_name: String, message: String },

    #[snafu(display("network error: {}", message))]
    Network { message: String },

    #[snafu(display("request failed with status {}", status))]
    HttpStatus {
        status: u16,
        envelope: ResponseEnvelope,
    },

    #[snafu(display("invalid arguments for {}: {}", method, message))]
    InvalidArguments { method: String, message: String },

    #[snafu(display("request body fails to serialize: {}", source))]
    Serialization { source: serde_json::Error },

    #[snafu(display("{} has no binding for method {}", service, method))]
    UnboundMethod { service: String, method: String },

    #[snafu(display("call was cancelled"))]
    Cancelled,
}

impl Error {
    /// The HTTP status of a call that failed with a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The raw response of a call that failed with a non-success status.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Error::HttpStatus { envelope, .. } => Some(envelope),
            _ => None,
        }
    }
}

/// Errors which a web API serializes into the body of its error responses.
///
/// A service usually defines one error type shared by all of its endpoints. When a call fails
/// with a non-success status, the body of the response is decoded into this type. Failures which
/// do not carry such a body (network errors, undecodable bodies, configuration problems) are
/// converted to strings using their [Display](std::fmt::Display) instance and wrapped with
/// [ApiError::catch_all].
pub trait ApiError: std::error::Error + DeserializeOwned + Send + Sync + 'static {
    fn catch_all(msg: String) -> Self;

    /// Convert from a client-side call error to the API's error type.
    fn from_client_error(source: Error) -> Self {
        match &source {
            Error::HttpStatus { envelope, .. } => serde_json::from_slice(envelope.body())
                .unwrap_or_else(|_| Self::catch_all(source.to_string())),
            _ => Self::catch_all(source.to_string()),
        }
    }
}

/// Context for embedding client call errors into specific API error types.
///
/// This type implements the [IntoError] trait from SNAFU, so it can be used with
/// [ResultExt::context](snafu::ResultExt::context) just like automatically generated SNAFU
/// contexts. Calling `some_result.context(ClientError)` converts a potential [Error] into `E`
/// using [ApiError::from_client_error].
pub struct ClientError;

impl<E: ApiError + ErrorCompat> IntoError<E> for ClientError {
    type Source = Error;

    fn into_error(self, source: Self::Source) -> E {
        E::from_client_error(source)
    }
}
