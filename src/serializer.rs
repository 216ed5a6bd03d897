// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::descriptor::{AnyValue, TypeToken};
use crate::error::Error;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{event, Level};

/// The type-erased deserialization strategy of one type.
///
/// Each entry point is monomorphized for the type the strategy was derived from and boxes the
/// decoded value, so the converter can work with types it only knows through a [TypeToken].
pub struct Serializer {
    type_name: &'static str,
    json: fn(&[u8]) -> serde_json::Result<AnyValue>,
    json_value: fn(Value) -> serde_json::Result<AnyValue>,
    bincode: fn(&[u8]) -> bincode::Result<AnyValue>,
    bincode_sequence: fn(&[u8]) -> bincode::Result<Vec<AnyValue>>,
}

impl Serializer {
    pub fn derive<T: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            type_name: type_name::<T>(),
            json: json_bytes::<T>,
            json_value: json_value::<T>,
            bincode: bincode_bytes::<T>,
            bincode_sequence: bincode_sequence::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn from_json(&self, bytes: &[u8]) -> Result<AnyValue, Error> {
        (self.json)(bytes).map_err(|err| self.failed(err))
    }

    pub fn from_json_value(&self, value: Value) -> Result<AnyValue, Error> {
        (self.json_value)(value).map_err(|err| self.failed(err))
    }

    pub fn from_bincode(&self, bytes: &[u8]) -> Result<AnyValue, Error> {
        (self.bincode)(bytes).map_err(|err| self.failed(err))
    }

    pub fn sequence_from_bincode(&self, bytes: &[u8]) -> Result<Vec<AnyValue>, Error> {
        (self.bincode_sequence)(bytes).map_err(|err| self.failed(err))
    }

    fn failed(&self, err: impl fmt::Display) -> Error {
        Error::Deserialization {
            type_name: self.type_name.to_string(),
            message: err.to_string(),
        }
    }
}

impl Debug for Serializer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn json_bytes<T: DeserializeOwned + Send + 'static>(bytes: &[u8]) -> serde_json::Result<AnyValue> {
    serde_json::from_slice::<T>(bytes).map(|value| Box::new(value) as AnyValue)
}

fn json_value<T: DeserializeOwned + Send + 'static>(value: Value) -> serde_json::Result<AnyValue> {
    serde_json::from_value::<T>(value).map(|value| Box::new(value) as AnyValue)
}

fn bincode_bytes<T: DeserializeOwned + Send + 'static>(bytes: &[u8]) -> bincode::Result<AnyValue> {
    bincode::deserialize::<T>(bytes).map(|value| Box::new(value) as AnyValue)
}

fn bincode_sequence<T: DeserializeOwned + Send + 'static>(
    bytes: &[u8],
) -> bincode::Result<Vec<AnyValue>> {
    let items = bincode::deserialize::<Vec<T>>(bytes)?;
    Ok(items
        .into_iter()
        .map(|item| Box::new(item) as AnyValue)
        .collect())
}

/// Memoized type → [Serializer] lookups, owned by a client and shared by all of its services.
///
/// A strategy is derived at most once per type, the first time the type is requested, and kept
/// for the lifetime of the registry. Concurrent first lookups of the same type serialize on the
/// write lock, and the second one finds the entry the first one stored.
#[derive(Default)]
pub struct SerializerRegistry {
    strategies: RwLock<HashMap<TypeId, Arc<Serializer>>>,
    computations: AtomicUsize,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &TypeToken) -> Arc<Serializer> {
        let cached = self.strategies.read().get(&token.id()).cloned();
        if let Some(strategy) = cached {
            return strategy;
        }

        let mut strategies = self.strategies.write();
        strategies
            .entry(token.id())
            .or_insert_with(|| {
                self.computations.fetch_add(1, Ordering::SeqCst);
                event!(Level::DEBUG, "derived serializer for {}", token.name());
                Arc::new(token.derive())
            })
            .clone()
    }

    /// Number of strategies derived so far.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for SerializerRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("entries", &self.len())
            .field("computations", &self.computations())
            .finish()
    }
}
