// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # Declarative HTTP service clients.
//!
//! A service is described once, as a [ServiceDescriptor] listing its methods: the HTTP method and
//! path template of each, the roles of its parameters (path slot, query, header, body), and the
//! type it returns. A hand-written adapter type implements [Service] and forwards each of its
//! methods to an [InvocationRouter]. The [Client] builds one such adapter per service type and
//! hands it out through [get_service].
//!
//! Every call runs the same pipeline. The method's [FunctionWorker] turns the call arguments into
//! a request, the [HttpCallInvoker] sends it through the client's [Transport], the [Converter]
//! decodes the response into the declared return type, and the [CallAdapter] decides when all of
//! this runs. The caller always receives a [CallHandle], which can be awaited, waited on, or
//! cancelled.
//!
//! Return types are classified by their outer shape: the raw [ResponseEnvelope], raw bytes, text,
//! a sequence (`Vec<T>`), a mapping (`HashMap<K, V>`, `BTreeMap<K, V>`), or any other
//! deserializable type marked [Structured]. Structured values use derived serde implementations
//! and are decoded as JSON or bincode, depending on the Content-Type of the response.
//! Deserialization strategies are derived once per type and cached in the client's
//! [SerializerRegistry].
//!
//! Errors returned by the service with a non-success status keep the raw response, so they can
//! be decoded into an API-specific error type with [ApiError].

pub mod adapter;
pub mod client;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod invoker;
pub mod manager;
pub mod router;
pub mod serializer;
pub mod transport;
pub mod types;
pub mod worker;

pub use adapter::{BoxedCall, CallAdapter, CallHandle, DeferredCallAdapter, LazyCallAdapter};
pub use client::{get_service, Client, ClientConfig, Components};
pub use converter::{Converter, Format, SerdeConverter};
pub use descriptor::{
    AnyValue, Converted, MethodDescriptor, ParamRole, ResponseType, ReturnDescriptor,
    ServiceDescriptor, Structured, TypeClassifier, TypeToken,
};
pub use error::*;
pub use invoker::{Authenticator, BearerAuthenticator, HttpCallInvoker, NoAuthenticator};
pub use manager::{ServiceInstancesManager, ServiceState};
pub use router::{InvocationRouter, Pipeline, Service};
pub use serializer::{Serializer, SerializerRegistry};
pub use transport::{SurfTransport, Transport};
pub use types::*;
pub use worker::FunctionWorker;

pub use bytes::Bytes;
pub use surf::http::Method;
pub use surf::Url;
