// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::{Error, SerializationSnafu};
use bytes::Bytes;
use serde::Serialize;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt::Display;
use surf::http::Method;
use surf::Url;

pub const JSON: &str = "application/json";
pub const BYTE_STREAM: &str = "application/octet-stream";

/// The raw response to one call, before conversion.
///
/// Header names are stored lower-cased, so lookups through [ResponseEnvelope::header] are case
/// insensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseEnvelope {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl ResponseEnvelope {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// An encoded request body together with its media type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub content_type: String,
    pub bytes: Bytes,
}

impl Payload {
    pub fn new(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(value).context(SerializationSnafu)?;
        Ok(Self::new(JSON, bytes))
    }
}

/// One positional argument of a service call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    Text(String),
    /// An optional query or header value which was not supplied.
    Absent,
    Body(Payload),
}

/// The arguments of one service call, in the order the method declares its parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Arguments(Vec<Argument>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, value: impl Display) -> Self {
        self.0.push(Argument::Text(value.to_string()));
        self
    }

    pub fn optional<V: Display>(mut self, value: Option<V>) -> Self {
        self.0.push(match value {
            Some(value) => Argument::Text(value.to_string()),
            None => Argument::Absent,
        });
        self
    }

    /// Append a body argument, serialized as JSON.
    pub fn body<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, Error> {
        Ok(self.payload(Payload::json(value)?))
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.0.push(Argument::Body(payload));
        self
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The resolved request for one invocation, relative to the client's base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpParameterSet {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Payload>,
}

/// A fully resolved request, as handed to a [Transport](crate::Transport).
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Payload>,
}

impl HttpRequest {
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
