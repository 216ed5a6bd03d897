// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::Error;
use crate::types::{HttpRequest, ResponseEnvelope};
use futures::future::BoxFuture;
use std::fmt::{self, Debug, Formatter};
use surf::{Client, Request};

/// Sends a resolved request and collects the whole response.
///
/// Implementations report connection and I/O failures as [Error::Network]. A response with any
/// status is a successful send; status handling belongs to the
/// [HttpCallInvoker](crate::HttpCallInvoker).
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<ResponseEnvelope, Error>>;
}

/// The default transport, backed by a [surf::Client].
#[derive(Clone)]
pub struct SurfTransport {
    client: Client,
}

impl SurfTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Use a preconfigured client, for instance one with extra middleware attached.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for SurfTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SurfTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfTransport").finish()
    }
}

fn network_error(err: surf::Error) -> Error {
    Error::Network {
        message: err.to_string(),
    }
}

impl Transport for SurfTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<ResponseEnvelope, Error>> {
        Box::pin(async move {
            let mut req = Request::new(request.method, request.url);
            for (name, value) in &request.headers {
                req.insert_header(name.as_str(), value.as_str());
            }
            if let Some(payload) = request.body {
                // The Content-Type header must be in place before the body, or surf replaces it
                // with the mime type of the body.
                req.insert_header("content-type", payload.content_type.as_str());
                req.set_body(payload.bytes.to_vec());
            }

            let mut res = self.client.send(req).await.map_err(network_error)?;
            let headers = res
                .iter()
                .map(|(name, values)| {
                    let value = values
                        .iter()
                        .map(|value| value.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    (name.as_str().to_string(), value)
                })
                .collect::<Vec<_>>();
            let body = res.body_bytes().await.map_err(network_error)?;

            let mut envelope = ResponseEnvelope::new(res.status() as u16, body);
            for (name, value) in headers {
                envelope.insert_header(&name, value);
            }
            Ok(envelope)
        })
    }
}
