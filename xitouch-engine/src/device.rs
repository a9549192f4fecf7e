//! Input devices known to the engine.
//!
//! Each [`Device`] owns its touch table, gesture slot and persistent state;
//! no other device's processing path touches them.

use std::collections::HashMap;

use serde::Deserialize;

use crate::device_state::DeviceState;
use crate::error::EngineError;
use crate::gesture::GestureRecord;
use crate::touch::TouchTable;
use crate::types::{DeviceId, Point, TouchId};

fn default_buttons() -> usize {
    5
}

fn default_axes() -> usize {
    2
}

/// Static description of a device, as registered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub is_master: bool,
    #[serde(default = "default_buttons")]
    pub num_buttons: usize,
    #[serde(default = "default_axes")]
    pub num_axes: usize,
    #[serde(default)]
    pub has_keys: bool,
    #[serde(default)]
    pub has_touch: bool,
    #[serde(default)]
    pub has_gesture: bool,
}

impl DeviceDescriptor {
    /// A master touchscreen with pointer buttons and two axes.
    pub fn touchscreen(id: DeviceId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            is_master: true,
            num_buttons: default_buttons(),
            num_axes: default_axes(),
            has_keys: false,
            has_touch: true,
            has_gesture: true,
        }
    }
}

/// A touch the hardware still reports as down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalTouch {
    pub touch_id: TouchId,
    pub source_device: DeviceId,
    pub emulate_pointer: bool,
    pub detail: u32,
    pub root: Point,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub(crate) descriptor: DeviceDescriptor,
    pub(crate) state: DeviceState,
    pub(crate) touches: TouchTable,
    pub(crate) gesture: GestureRecord,
    pub(crate) physical: Vec<PhysicalTouch>,
}

impl Device {
    pub fn new(descriptor: DeviceDescriptor, initial_slots: usize) -> Self {
        let state = DeviceState::new(descriptor.num_buttons, descriptor.num_axes, descriptor.has_keys);
        Self {
            descriptor,
            state,
            touches: TouchTable::new(initial_slots),
            gesture: GestureRecord::default(),
            physical: Vec::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_master(&self) -> bool {
        self.descriptor.is_master
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn has_touch(&self) -> bool {
        self.descriptor.has_touch
    }

    pub fn has_gesture(&self) -> bool {
        self.descriptor.has_gesture
    }

    pub fn touches(&self) -> &TouchTable {
        &self.touches
    }

    pub fn gesture(&self) -> &GestureRecord {
        &self.gesture
    }

    pub fn physically_active_touches(&self) -> &[PhysicalTouch] {
        &self.physical
    }

    pub(crate) fn note_physical_begin(&mut self, touch: PhysicalTouch) {
        if !self.physical.iter().any(|t| t.touch_id == touch.touch_id) {
            self.physical.push(touch);
        }
    }

    pub(crate) fn note_physical_end(&mut self, touch_id: TouchId) {
        self.physical.retain(|t| t.touch_id != touch_id);
    }
}

/// Registry of devices, owned by the server root.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: Device) -> Result<(), EngineError> {
        let id = device.id();
        if self.devices.contains_key(&id) {
            return Err(EngineError::DuplicateDevice(id));
        }
        self.devices.insert(id, device);
        Ok(())
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<Device> {
        self.devices.remove(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
