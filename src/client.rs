// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::adapter::{CallAdapter, DeferredCallAdapter};
use crate::converter::{Converter, SerdeConverter};
use crate::error::{Error, InvalidConfigurationSnafu};
use crate::invoker::{Authenticator, HttpCallInvoker, NoAuthenticator};
use crate::manager::ServiceInstancesManager;
use crate::router::{Pipeline, Service};
use crate::serializer::SerializerRegistry;
use crate::transport::{SurfTransport, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use surf::Url;
use tracing::{event, Level};

/// Plain settings of a client. Deserializable, so they can live in a config file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Trace every request and response.
    pub logging: bool,
    /// Upper bound for a single transport call.
    pub timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Parse the base URL, which must be an absolute http(s) URL with a host.
    pub fn parse_base_url(&self) -> Result<Url, Error> {
        let url = Url::parse(&self.base_url).map_err(|err| Error::InvalidConfiguration {
            message: format!("invalid base url {:?}: {}", self.base_url, err),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return InvalidConfigurationSnafu {
                message: format!("base url {} must use http or https", url),
            }
            .fail();
        }
        if url.host_str().is_none() || url.cannot_be_a_base() {
            return InvalidConfigurationSnafu {
                message: format!("base url {} has no host", url),
            }
            .fail();
        }
        Ok(url)
    }
}

/// The pluggable collaborators of a client.
#[derive(Clone)]
pub struct Components {
    pub authenticator: Arc<dyn Authenticator>,
    pub call_adapter: Arc<dyn CallAdapter>,
    pub converter: Arc<dyn Converter>,
    pub transport: Arc<dyn Transport>,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            authenticator: Arc::new(NoAuthenticator),
            call_adapter: Arc::new(DeferredCallAdapter),
            converter: Arc::new(SerdeConverter),
            transport: Arc::new(SurfTransport::new()),
        }
    }
}

/// An HTTP client for declaratively defined services.
///
/// Each client owns its serializer registry and one [ServiceInstancesManager], so every service
/// type is built at most once per client.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    base_url: Url,
    registry: Arc<SerializerRegistry>,
    instances: ServiceInstancesManager,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        Self::from_config(ClientConfig::new(base_url))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, Error> {
        Self::with_components(config, Components::default())
    }

    /// Fails with [Error::InvalidConfiguration] before any request is possible if the base URL is
    /// malformed.
    pub fn with_components(config: ClientConfig, components: Components) -> Result<Self, Error> {
        let base_url = config.parse_base_url()?;
        let registry = Arc::new(SerializerRegistry::new());
        let invoker =
            HttpCallInvoker::new(base_url.clone(), components.transport, components.authenticator)
                .with_timeout(config.timeout())
                .with_logging(config.logging);
        let pipeline = Pipeline::new(
            invoker,
            components.converter,
            components.call_adapter,
            registry.clone(),
        );
        event!(Level::DEBUG, "created client for {}", base_url);
        Ok(Self {
            config,
            base_url,
            registry,
            instances: ServiceInstancesManager::new(pipeline),
        })
    }

    /// The instance of service `S` for this client; the same instance on every call.
    pub fn service<S: Service>(&self) -> Result<Arc<S>, Error> {
        self.instances.get::<S>()
    }

    pub fn instances(&self) -> &ServiceInstancesManager {
        &self.instances
    }

    pub fn registry(&self) -> &Arc<SerializerRegistry> {
        &self.registry
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Named factory for service instances, equivalent to [Client::service].
pub fn get_service<S: Service>(client: &Client) -> Result<Arc<S>, Error> {
    client.service::<S>()
}
