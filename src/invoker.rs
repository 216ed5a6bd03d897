// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::{Error, HttpStatusSnafu, InvalidConfigurationSnafu};
use crate::transport::Transport;
use crate::types::{HttpParameterSet, HttpRequest, ResponseEnvelope};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use surf::Url;
use tracing::{event, Level};

/// Decorates every outgoing request, for instance with credentials.
pub trait Authenticator: Send + Sync + 'static {
    fn authenticate(&self, request: &mut HttpRequest);
}

/// Passes requests through unmodified.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuthenticator;

impl Authenticator for NoAuthenticator {
    fn authenticate(&self, _request: &mut HttpRequest) {}
}

/// Sends a fixed bearer token in the Authorization header.
#[derive(Clone)]
pub struct BearerAuthenticator {
    token: String,
}

impl BearerAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Debug for BearerAuthenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthenticator")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Authenticator for BearerAuthenticator {
    fn authenticate(&self, request: &mut HttpRequest) {
        request.insert_header("authorization", format!("Bearer {}", self.token));
    }
}

/// Executes resolved requests against the client's transport.
///
/// Each call makes exactly one attempt. Retries, if wanted, belong in the transport.
pub struct HttpCallInvoker {
    base_url: Url,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
    timeout: Option<Duration>,
    logging: bool,
}

impl HttpCallInvoker {
    pub fn new(
        base_url: Url,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            base_url,
            transport,
            authenticator,
            timeout: None,
            logging: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Emit a tracing event for every request and response.
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The absolute URL of a request. Any path of the base URL is kept as a prefix.
    pub fn resolve_url(&self, params: &HttpParameterSet) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let separator = if params.path.starts_with('/') { "" } else { "/" };
        let mut url = Url::parse(&format!("{}{}{}", base, separator, params.path)).map_err(
            |err| Error::InvalidConfiguration {
                message: format!("cannot resolve {} against {}: {}", params.path, base, err),
            },
        )?;
        if url.cannot_be_a_base() {
            return InvalidConfigurationSnafu {
                message: format!("{} cannot carry a request path", self.base_url),
            }
            .fail();
        }
        if !params.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &params.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    pub async fn invoke(&self, params: HttpParameterSet) -> Result<ResponseEnvelope, Error> {
        let url = self.resolve_url(&params)?;
        let mut request = HttpRequest {
            method: params.method,
            url,
            headers: params.headers,
            body: params.body,
        };
        self.authenticator.authenticate(&mut request);

        if self.logging {
            event!(
                Level::INFO,
                "--> sending request {{method: {}, url: {}, content-type: {:?}}}",
                request.method,
                request.url,
                request.body.as_ref().map(|body| body.content_type.as_str()),
            );
        }
        let method = request.method.clone();
        let url = request.url.clone();

        let sent = self.transport.send(request);
        let res = match self.timeout {
            Some(timeout) => match async_std::future::timeout(timeout, sent).await {
                Ok(res) => res,
                Err(_) => Err(Error::Network {
                    message: format!("no response within {:?}", timeout),
                }),
            },
            None => sent.await,
        };
        let envelope = match res {
            Ok(envelope) => envelope,
            Err(err) => {
                if self.logging {
                    event!(Level::WARN, "{} {} failed: {}", method, url, err);
                }
                return Err(err);
            }
        };

        if self.logging {
            event!(
                Level::INFO,
                "<-- received response {{status: {}, content-type: {:?}, length: {}}}",
                envelope.status(),
                envelope.content_type(),
                envelope.body().len(),
            );
        }
        if !envelope.is_success() {
            if self.logging {
                event!(
                    Level::WARN,
                    "{} {} responded with status {}",
                    method,
                    url,
                    envelope.status()
                );
            }
            return HttpStatusSnafu {
                status: envelope.status(),
                envelope,
            }
            .fail();
        }
        Ok(envelope)
    }
}

impl Debug for HttpCallInvoker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCallInvoker")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("logging", &self.logging)
            .finish()
    }
}
