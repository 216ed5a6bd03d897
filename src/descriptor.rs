// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Declarative descriptions of services, their methods, and the types they return.

use crate::error::Error;
use crate::serializer::Serializer;
use crate::types::ResponseEnvelope;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug, Formatter};
use std::hash::{BuildHasher, Hash};
use surf::http::Method;

/// A type-erased value produced by a serializer.
pub type AnyValue = Box<dyn Any + Send>;

/// The role a method parameter plays in the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamRole {
    /// Fills the `{name}` slot of the path template.
    Path(String),
    Query(String),
    Header(String),
    Body,
}

/// The identity of a deserializable type and the way to derive its serialization strategy.
#[derive(Clone, Copy)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
    derive: fn() -> Serializer,
}

impl TypeToken {
    pub fn of<T: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            derive: Serializer::derive::<T>,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn derive(&self) -> Serializer {
        (self.derive)()
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Debug for TypeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Selects the conversion strategy for a declared return type.
///
/// Only the outermost generic level is classified. The element, key and value types of
/// sequences and mappings are deserialized by their own serde implementations, however deeply
/// they nest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeClassifier {
    Envelope,
    Bytes,
    Text,
    Sequence(TypeToken),
    Mapping(TypeToken, TypeToken),
    Structured(TypeToken),
}

/// The intermediate result of a [Converter](crate::Converter), shaped by the classifier.
#[derive(Debug)]
pub enum Converted {
    Envelope(ResponseEnvelope),
    Bytes(Bytes),
    Text(String),
    Sequence(Vec<AnyValue>),
    /// Entries in the order they appear on the wire.
    Mapping(Vec<(AnyValue, AnyValue)>),
    Structured(AnyValue),
}

impl Converted {
    fn shape(&self) -> &'static str {
        match self {
            Converted::Envelope(_) => "envelope",
            Converted::Bytes(_) => "bytes",
            Converted::Text(_) => "text",
            Converted::Sequence(_) => "sequence",
            Converted::Mapping(_) => "mapping",
            Converted::Structured(_) => "structured value",
        }
    }
}

/// Types which a service method can declare as its (unwrapped) return type.
pub trait ResponseType: Sized + Send + 'static {
    fn classifier() -> TypeClassifier;
    fn from_converted(value: Converted) -> Result<Self, Error>;
}

/// Marker for application types decoded from the whole response body.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct User { id: u64, name: String }
///
/// impl Structured for User {}
/// ```
pub trait Structured: DeserializeOwned + Send + 'static {}

impl<T: Structured> ResponseType for T {
    fn classifier() -> TypeClassifier {
        TypeClassifier::Structured(TypeToken::of::<T>())
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Structured(value) => downcast(value),
            other => Err(mismatch::<T>(&other)),
        }
    }
}

macro_rules! structured {
    ($($t:ty),*) => {
        $(impl Structured for $t {})*
    };
}

structured!(bool, u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, serde_json::Value);

impl<T: DeserializeOwned + Send + 'static> Structured for Option<T> {}

impl ResponseType for ResponseEnvelope {
    fn classifier() -> TypeClassifier {
        TypeClassifier::Envelope
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Envelope(envelope) => Ok(envelope),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ResponseType for Bytes {
    fn classifier() -> TypeClassifier {
        TypeClassifier::Bytes
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Bytes(bytes) => Ok(bytes),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ResponseType for String {
    fn classifier() -> TypeClassifier {
        TypeClassifier::Text
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Text(text) => Ok(text),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> ResponseType for Vec<T> {
    fn classifier() -> TypeClassifier {
        TypeClassifier::Sequence(TypeToken::of::<T>())
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Sequence(items) => items.into_iter().map(downcast).collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<K, V, S> ResponseType for HashMap<K, V, S>
where
    K: DeserializeOwned + Eq + Hash + Send + 'static,
    V: DeserializeOwned + Send + 'static,
    S: BuildHasher + Default + Send + 'static,
{
    fn classifier() -> TypeClassifier {
        TypeClassifier::Mapping(TypeToken::of::<K>(), TypeToken::of::<V>())
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Mapping(entries) => entries
                .into_iter()
                .map(|(key, value)| Ok((downcast(key)?, downcast(value)?)))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<K, V> ResponseType for BTreeMap<K, V>
where
    K: DeserializeOwned + Ord + Send + 'static,
    V: DeserializeOwned + Send + 'static,
{
    fn classifier() -> TypeClassifier {
        TypeClassifier::Mapping(TypeToken::of::<K>(), TypeToken::of::<V>())
    }

    fn from_converted(value: Converted) -> Result<Self, Error> {
        match value {
            Converted::Mapping(entries) => entries
                .into_iter()
                .map(|(key, value)| Ok((downcast(key)?, downcast(value)?)))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

pub(crate) fn downcast<T: 'static>(value: AnyValue) -> Result<T, Error> {
    value
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| Error::UnsupportedType {
            type_name: type_name::<T>().to_string(),
            reason: "converter produced a value of another type".to_string(),
        })
}

fn mismatch<T>(value: &Converted) -> Error {
    Error::UnsupportedType {
        type_name: type_name::<T>().to_string(),
        reason: format!("converter produced a {}", value.shape()),
    }
}

/// The declared return type of a method, with any call adapter wrapping removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReturnDescriptor {
    type_name: &'static str,
    classifier: TypeClassifier,
}

impl ReturnDescriptor {
    pub fn of<T: ResponseType>() -> Self {
        Self {
            type_name: type_name::<T>(),
            classifier: T::classifier(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn classifier(&self) -> TypeClassifier {
        self.classifier
    }
}

/// One method of a service: how its arguments become a request and what it returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    method: Method,
    path: String,
    params: Vec<ParamRole>,
    headers: Vec<(String, String)>,
    returns: ReturnDescriptor,
}

impl MethodDescriptor {
    /// A method returning the raw [ResponseEnvelope] until [MethodDescriptor::returns] says
    /// otherwise.
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            params: Vec::new(),
            headers: Vec::new(),
            returns: ReturnDescriptor::of::<ResponseEnvelope>(),
        }
    }

    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Post, path)
    }

    pub fn put(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Put, path)
    }

    pub fn patch(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Patch, path)
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Delete, path)
    }

    pub fn path_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamRole::Path(name.into()));
        self
    }

    pub fn query_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamRole::Query(name.into()));
        self
    }

    pub fn header_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamRole::Header(name.into()));
        self
    }

    pub fn body_param(mut self) -> Self {
        self.params.push(ParamRole::Body);
        self
    }

    /// A header sent with every call of this method.
    pub fn static_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn returns<T: ResponseType>(mut self) -> Self {
        self.returns = ReturnDescriptor::of::<T>();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[ParamRole] {
        &self.params
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn return_descriptor(&self) -> ReturnDescriptor {
        self.returns
    }
}

/// A service: a name and its ordered methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn find(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }
}
