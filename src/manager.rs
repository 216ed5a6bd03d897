// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Courier library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::error::Error;
use crate::router::{InvocationRouter, Pipeline, Service};
use parking_lot::{Mutex, RwLock};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{event, Level};

/// Lifecycle of one service type within a manager. `Ready` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    Unbuilt,
    Building,
    Ready,
}

type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Slot {
    /// Set once, when the build succeeds, and never cleared.
    instance: RwLock<Option<Instance>>,
    /// Held for the duration of a build.
    build: Mutex<()>,
    building: AtomicBool,
}

impl Slot {
    fn instance(&self) -> Option<Instance> {
        self.instance.read().clone()
    }
}

/// Builds and caches exactly one instance of each service type for a client.
///
/// The map lock is only held to find a type's slot. Building happens under the slot's own build
/// lock, so concurrent first requests for one type build it once, while different types build in
/// parallel. Lookups of a ready service never take the build lock.
pub struct ServiceInstancesManager {
    pipeline: Pipeline,
    slots: Mutex<HashMap<TypeId, Arc<Slot>>>,
}

impl ServiceInstancesManager {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot<S: Service>(&self) -> Option<Arc<Slot>> {
        self.slots.lock().get(&TypeId::of::<S>()).cloned()
    }

    /// The instance of service `S`, built on first request.
    pub fn get<S: Service>(&self) -> Result<Arc<S>, Error> {
        let slot = self
            .slots
            .lock()
            .entry(TypeId::of::<S>())
            .or_default()
            .clone();

        if let Some(instance) = slot.instance() {
            return downcast_service(instance);
        }
        let _build = slot.build.lock();
        // Another caller may have finished the build while we waited.
        if let Some(instance) = slot.instance() {
            return downcast_service(instance);
        }

        slot.building.store(true, Ordering::SeqCst);
        let built = self.build::<S>();
        if let Ok(instance) = &built {
            *slot.instance.write() = Some(instance.clone() as Instance);
        }
        slot.building.store(false, Ordering::SeqCst);
        built
    }

    fn build<S: Service>(&self) -> Result<Arc<S>, Error> {
        let descriptor = S::descriptor();
        let router = InvocationRouter::bind(&descriptor, self.pipeline.clone())?;
        let instance = Arc::new(S::from_router(router));
        event!(
            Level::DEBUG,
            "service {} is ready with {} methods",
            descriptor.name(),
            descriptor.methods().len()
        );
        Ok(instance)
    }

    pub fn state<S: Service>(&self) -> ServiceState {
        let slot = match self.slot::<S>() {
            Some(slot) => slot,
            None => return ServiceState::Unbuilt,
        };
        if slot.instance().is_some() {
            return ServiceState::Ready;
        }
        if slot.building.load(Ordering::SeqCst) {
            return ServiceState::Building;
        }
        // The build may have completed between the two checks above.
        if slot.instance().is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Unbuilt
        }
    }

    /// Number of service types built so far.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.instance().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast_service<S: Service>(instance: Instance) -> Result<Arc<S>, Error> {
    instance
        .downcast::<S>()
        .map_err(|_| Error::UnsupportedType {
            type_name: type_name::<S>().to_string(),
            reason: "service slot holds another type".to_string(),
        })
}

impl Debug for ServiceInstancesManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstancesManager")
            .field("services", &self.slots.lock().len())
            .finish()
    }
}
