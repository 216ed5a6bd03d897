// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::adapter::{CallAdapter, CallHandle};
use crate::converter::Converter;
use crate::descriptor::{AnyValue, ResponseType, ReturnDescriptor, ServiceDescriptor};
use crate::error::{CancelledSnafu, Error, InvalidConfigurationSnafu, UnboundMethodSnafu};
use crate::invoker::HttpCallInvoker;
use crate::serializer::SerializerRegistry;
use crate::types::Arguments;
use crate::worker::FunctionWorker;
use futures::future::{abortable, FutureExt};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use tracing::{event, Level};

/// A service interface, implemented by a hand-written adapter type.
///
/// The adapter describes its methods once in [Service::descriptor] and forwards each method to
/// [InvocationRouter::call] under the same name:
///
/// ```ignore
/// struct Users {
///     router: InvocationRouter,
/// }
///
/// impl Service for Users {
///     fn descriptor() -> ServiceDescriptor {
///         ServiceDescriptor::new("Users").method(
///             MethodDescriptor::get("get_user", "/users/{id}")
///                 .path_param("id")
///                 .returns::<User>(),
///         )
///     }
///
///     fn from_router(router: InvocationRouter) -> Self {
///         Users { router }
///     }
/// }
///
/// impl Users {
///     pub fn get_user(&self, id: u64) -> CallHandle<User> {
///         self.router.call("get_user", Arguments::new().value(id))
///     }
/// }
/// ```
pub trait Service: Send + Sync + Sized + 'static {
    fn descriptor() -> ServiceDescriptor;
    fn from_router(router: InvocationRouter) -> Self;
}

/// The collaborators every call of one client runs through.
#[derive(Clone)]
pub struct Pipeline {
    invoker: Arc<HttpCallInvoker>,
    converter: Arc<dyn Converter>,
    adapter: Arc<dyn CallAdapter>,
    registry: Arc<SerializerRegistry>,
}

impl Pipeline {
    pub fn new(
        invoker: HttpCallInvoker,
        converter: Arc<dyn Converter>,
        adapter: Arc<dyn CallAdapter>,
        registry: Arc<SerializerRegistry>,
    ) -> Self {
        Self {
            invoker: Arc::new(invoker),
            converter,
            adapter,
            registry,
        }
    }

    pub fn invoker(&self) -> &HttpCallInvoker {
        &self.invoker
    }

    pub fn registry(&self) -> &Arc<SerializerRegistry> {
        &self.registry
    }
}

impl Debug for Pipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("invoker", &self.invoker)
            .field("registry", &self.registry)
            .finish()
    }
}

#[derive(Debug)]
struct Binding {
    worker: FunctionWorker,
    returns: ReturnDescriptor,
}

/// Dispatches the methods of one service through the client's pipeline.
///
/// The method table is fixed when the router is bound; cloning a router shares it.
#[derive(Clone, Debug)]
pub struct InvocationRouter {
    service: Arc<str>,
    bindings: Arc<HashMap<String, Arc<Binding>>>,
    pipeline: Pipeline,
}

impl InvocationRouter {
    /// Bind a worker for every method of `descriptor`.
    pub fn bind(descriptor: &ServiceDescriptor, pipeline: Pipeline) -> Result<Self, Error> {
        let mut bindings = HashMap::new();
        for method in descriptor.methods() {
            let binding = Binding {
                worker: FunctionWorker::bind(method)?,
                returns: method.return_descriptor(),
            };
            if bindings
                .insert(method.name().to_string(), Arc::new(binding))
                .is_some()
            {
                return InvalidConfigurationSnafu {
                    message: format!(
                        "{} declares method {} more than once",
                        descriptor.name(),
                        method.name()
                    ),
                }
                .fail();
            }
        }
        Ok(Self {
            service: descriptor.name().into(),
            bindings: Arc::new(bindings),
            pipeline,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_bound(&self, method: &str) -> bool {
        self.bindings.contains_key(method)
    }

    /// The declared return type of a bound method.
    pub fn returns(&self, method: &str) -> Option<ReturnDescriptor> {
        self.bindings.get(method).map(|binding| binding.returns)
    }

    /// Call `method` with `args`.
    ///
    /// The call builds its request, sends it, and converts the response using the return type
    /// the method was declared with; the client's [CallAdapter] decides when that happens.
    pub fn call<T: ResponseType>(&self, method: &str, args: Arguments) -> CallHandle<T> {
        let binding = match self.bindings.get(method) {
            Some(binding) => binding.clone(),
            None => {
                event!(
                    Level::ERROR,
                    "{} has no binding for method {}",
                    self.service,
                    method
                );
                return CallHandle::failed(
                    UnboundMethodSnafu {
                        service: self.service.to_string(),
                        method,
                    }
                    .build(),
                );
            }
        };
        let pipeline = self.pipeline.clone();

        let block = async move {
            let params = binding.worker.build(&args)?;
            let envelope = pipeline.invoker.invoke(params).await?;
            let converted = pipeline.converter.convert(
                envelope,
                &binding.returns.classifier(),
                &pipeline.registry,
            )?;
            let value = T::from_converted(converted)?;
            Ok::<_, Error>(Box::new(value) as AnyValue)
        };
        let (block, abort) = abortable(block);
        let block = block
            .map(|res| match res {
                Ok(res) => res,
                Err(_) => CancelledSnafu.fail(),
            })
            .boxed();
        CallHandle::new(self.pipeline.adapter.wrap_call(block), Some(abort))
    }
}
