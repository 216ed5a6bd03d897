// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::descriptor::{AnyValue, Converted, TypeClassifier, TypeToken};
use crate::error::Error;
use crate::serializer::{Serializer, SerializerRegistry};
use crate::types::{ResponseEnvelope, BYTE_STREAM, JSON};
use serde_json::{Map, Value};

/// Turns a raw response into a value of a method's declared return type.
pub trait Converter: Send + Sync + 'static {
    fn convert(
        &self,
        envelope: ResponseEnvelope,
        classifier: &TypeClassifier,
        registry: &SerializerRegistry,
    ) -> Result<Converted, Error>;
}

/// Payload encodings understood by [SerdeConverter].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Bincode,
}

impl Format {
    /// Pick the format of a response body from its Content-Type header.
    ///
    /// A response without a Content-Type, or with a `text/*` one, is treated as JSON.
    pub fn of(envelope: &ResponseEnvelope, type_name: &str) -> Result<Self, Error> {
        let content_type = match envelope.content_type() {
            Some(content_type) => content_type,
            None => return Ok(Format::Json),
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            JSON => Ok(Format::Json),
            BYTE_STREAM => Ok(Format::Bincode),
            essence if essence.ends_with("+json") || essence.starts_with("text/") => {
                Ok(Format::Json)
            }
            _ => Err(Error::Deserialization {
                type_name: type_name.to_string(),
                message: format!("unsupported content type {}", content_type),
            }),
        }
    }
}

/// The default converter, built on serde.
///
/// Raw envelopes, bytes and text pass through without a serializer. Everything else is decoded
/// as JSON or bincode, depending on the Content-Type of the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerdeConverter;

impl Converter for SerdeConverter {
    fn convert(
        &self,
        envelope: ResponseEnvelope,
        classifier: &TypeClassifier,
        registry: &SerializerRegistry,
    ) -> Result<Converted, Error> {
        match *classifier {
            TypeClassifier::Envelope => Ok(Converted::Envelope(envelope)),
            TypeClassifier::Bytes => Ok(Converted::Bytes(envelope.into_body())),
            TypeClassifier::Text => String::from_utf8(envelope.into_body().to_vec())
                .map(Converted::Text)
                .map_err(|err| Error::Deserialization {
                    type_name: "String".to_string(),
                    message: err.to_string(),
                }),
            TypeClassifier::Sequence(element) => {
                let serializer = registry.get(&element);
                let type_name = format!("Vec<{}>", element.name());
                match Format::of(&envelope, &type_name)? {
                    Format::Json => parse_sequence(&serializer, envelope.body(), &type_name),
                    Format::Bincode => serializer
                        .sequence_from_bincode(envelope.body())
                        .map(Converted::Sequence),
                }
            }
            TypeClassifier::Mapping(key, value) => {
                let type_name = format!("Map<{}, {}>", key.name(), value.name());
                match Format::of(&envelope, &type_name)? {
                    Format::Json => parse_mapping(
                        &registry.get(&key),
                        &registry.get(&value),
                        envelope.body(),
                        &type_name,
                    ),
                    Format::Bincode => Err(Error::UnsupportedType {
                        type_name,
                        reason: format!("mappings cannot be decoded from {}", BYTE_STREAM),
                    }),
                }
            }
            TypeClassifier::Structured(token) => parse_structured(registry, &token, &envelope),
        }
    }
}

fn parse_structured(
    registry: &SerializerRegistry,
    token: &TypeToken,
    envelope: &ResponseEnvelope,
) -> Result<Converted, Error> {
    let serializer = registry.get(token);
    let value = match Format::of(envelope, token.name())? {
        Format::Json => serializer.from_json(envelope.body())?,
        Format::Bincode => serializer.from_bincode(envelope.body())?,
    };
    Ok(Converted::Structured(value))
}

fn parse_sequence(
    element: &Serializer,
    body: &[u8],
    type_name: &str,
) -> Result<Converted, Error> {
    let items: Vec<Value> = serde_json::from_slice(body).map_err(|err| Error::Deserialization {
        type_name: type_name.to_string(),
        message: err.to_string(),
    })?;
    items
        .into_iter()
        .map(|item| element.from_json_value(item))
        .collect::<Result<Vec<_>, _>>()
        .map(Converted::Sequence)
}

fn parse_mapping(
    key: &Serializer,
    value: &Serializer,
    body: &[u8],
    type_name: &str,
) -> Result<Converted, Error> {
    let object: Map<String, Value> =
        serde_json::from_slice(body).map_err(|err| Error::Deserialization {
            type_name: type_name.to_string(),
            message: err.to_string(),
        })?;
    object
        .into_iter()
        .map(|(k, v)| Ok((parse_key(key, k)?, value.from_json_value(v)?)))
        .collect::<Result<Vec<_>, Error>>()
        .map(Converted::Mapping)
}

// JSON object keys are always strings. Keys of other types (numbers, booleans) are written as
// their JSON text, so retry with the key parsed as JSON.
fn parse_key(key: &Serializer, raw: String) -> Result<AnyValue, Error> {
    match key.from_json_value(Value::String(raw.clone())) {
        Ok(key) => Ok(key),
        Err(err) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed) if !parsed.is_string() => key.from_json_value(parsed),
            _ => Err(err),
        },
    }
}
