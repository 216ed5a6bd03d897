// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::descriptor::{downcast, AnyValue};
use crate::error::Error;
use futures::future::{self, AbortHandle, BoxFuture, FutureExt};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A type-erased call: build the request, send it, convert the response.
pub type BoxedCall = BoxFuture<'static, Result<AnyValue, Error>>;

/// Decides when and where a call runs.
///
/// Whatever the policy, the adapted call must resolve to the outcome of the wrapped one,
/// failures included.
pub trait CallAdapter: Send + Sync + 'static {
    fn wrap_call(&self, call: BoxedCall) -> BoxedCall;
}

/// Starts every call immediately on the async-std executor.
///
/// The caller gets a handle to the running task and may await it whenever it likes, or never.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferredCallAdapter;

impl CallAdapter for DeferredCallAdapter {
    fn wrap_call(&self, call: BoxedCall) -> BoxedCall {
        async_std::task::spawn(call).boxed()
    }
}

/// Runs a call only when its handle is polled, on the caller's task.
#[derive(Clone, Copy, Debug, Default)]
pub struct LazyCallAdapter;

impl CallAdapter for LazyCallAdapter {
    fn wrap_call(&self, call: BoxedCall) -> BoxedCall {
        call
    }
}

/// The result of a service call, resolving to the method's declared return type.
#[must_use = "a call handle does nothing unless awaited, waited on, or cancelled"]
pub struct CallHandle<T> {
    call: BoxedCall,
    abort: Option<AbortHandle>,
    _output: PhantomData<fn() -> T>,
}

impl<T: 'static> CallHandle<T> {
    pub(crate) fn new(call: BoxedCall, abort: Option<AbortHandle>) -> Self {
        Self {
            call,
            abort,
            _output: PhantomData,
        }
    }

    /// A handle which resolves to `err` without running anything.
    pub fn failed(err: Error) -> Self {
        Self::new(future::ready(Err(err)).boxed(), None)
    }

    /// Abort the call. The transport request is dropped if it is still in flight, and the handle
    /// resolves to [Error::Cancelled] unless the call had already completed.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Block the current thread until the call completes.
    pub fn wait(self) -> Result<T, Error> {
        futures::executor::block_on(self)
    }
}

impl<T: 'static> Future for CallHandle<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.call
            .poll_unpin(cx)
            .map(|res| res.and_then(downcast::<T>))
    }
}
