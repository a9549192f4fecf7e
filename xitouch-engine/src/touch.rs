//! Touch records and their per-device slot table.
//!
//! Records live in a slot vector owned by the device; an index into it is the
//! handle the resolver passes around. Slots are reused after a touch ends and
//! the table grows on demand.

use crate::error::EngineError;
use crate::event::{EventFlags, EventKind, EventRecord, TouchPhase};
use crate::listener::Listener;
use crate::types::{DeviceId, Point, ResourceId, TouchId, WindowId};
use crate::valuator::ValuatorMask;

/// Bounded log of the Begin and Updates a touch has seen, replayed to a
/// newly promoted owner.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchHistory {
    events: Vec<EventRecord>,
    capacity: usize,
}

impl TouchHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity.min(16)),
            capacity: capacity.max(1),
        }
    }

    /// Records a live phase event. Ends, replays, server-generated events
    /// and repeated Begins are ignored. When full, the newest entry
    /// overwrites the last slot.
    pub fn push(&mut self, event: &EventRecord) {
        let Some(phase) = event.touch_phase() else {
            return;
        };
        match phase {
            TouchPhase::Begin if !self.events.is_empty() => return,
            TouchPhase::End => return,
            _ => {}
        }
        if event.flags.intersects(EventFlags::CLIENT_ID | EventFlags::REPLAYING) {
            return;
        }
        if self.events.len() >= self.capacity {
            tracing::debug!(
                "source device {}: history size {} overflowing for touch {}",
                event.source_device,
                self.capacity,
                event.detail()
            );
            if let Some(last) = self.events.last_mut() {
                *last = event.clone();
            }
            return;
        }
        self.events.push(event.clone());
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// State of one touch sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchPoint {
    pub(crate) client_id: TouchId,
    pub(crate) source_device: DeviceId,
    pub(crate) active: bool,
    pub(crate) emulate_pointer: bool,
    pub(crate) pending_finish: bool,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) num_grabs: usize,
    /// Window ancestry under the touch at begin time, root first.
    pub(crate) spatial_trace: Vec<WindowId>,
    pub(crate) history: Option<TouchHistory>,
    /// Last known axis values, used for synthesised Ends.
    pub(crate) valuators: ValuatorMask,
    pub(crate) root: Point,
    pub(crate) detail: u32,
    pub(crate) time: u32,
}

impl TouchPoint {
    fn vacant() -> Self {
        Self {
            client_id: TouchId(0),
            source_device: DeviceId(0),
            active: false,
            emulate_pointer: false,
            pending_finish: false,
            listeners: Vec::new(),
            num_grabs: 0,
            spatial_trace: Vec::new(),
            history: None,
            valuators: ValuatorMask::new(),
            root: Point::default(),
            detail: 0,
            time: 0,
        }
    }

    pub fn touch_id(&self) -> TouchId {
        self.client_id
    }

    pub fn source_device(&self) -> DeviceId {
        self.source_device
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn emulates_pointer(&self) -> bool {
        self.emulate_pointer
    }

    pub fn pending_finish(&self) -> bool {
        self.pending_finish
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn num_grabs(&self) -> usize {
        self.num_grabs
    }

    pub fn spatial_trace(&self) -> &[WindowId] {
        &self.spatial_trace
    }

    pub fn history(&self) -> Option<&TouchHistory> {
        self.history.as_ref()
    }

    pub fn listener_index(&self, resource: ResourceId) -> Option<usize> {
        self.listeners.iter().position(|l| l.resource == resource)
    }

    pub fn resource_is_owner(&self, resource: ResourceId) -> bool {
        self.listeners.first().map(|l| l.resource) == Some(resource)
    }

    /// Whether any listener only sees emulated pointer events.
    pub fn has_pointer_listener(&self) -> bool {
        self.listeners.iter().any(|l| l.kind.is_pointer())
    }

    pub(crate) fn allocate_history(&mut self, capacity: usize) {
        if self.history.is_none() {
            self.history = Some(TouchHistory::new(capacity));
        }
    }

    pub(crate) fn push_history(&mut self, event: &EventRecord) {
        if let Some(history) = self.history.as_mut() {
            history.push(event);
        }
    }

    pub(crate) fn add_listener(&mut self, listener: Listener) {
        if listener.grab.is_some() {
            self.num_grabs += 1;
        }
        self.listeners.push(listener);
        self.check_invariants();
    }

    /// Removes the listener for `resource`, keeping the order of the rest.
    pub(crate) fn remove_listener(&mut self, resource: ResourceId) -> bool {
        let Some(index) = self.listener_index(resource) else {
            return false;
        };
        let removed = self.listeners.remove(index);
        if removed.grab.is_some() {
            self.num_grabs -= 1;
        }
        self.check_invariants();
        true
    }

    /// Stores the axis values and position of a live event.
    pub(crate) fn copy_event_data(&mut self, event: &EventRecord) {
        self.valuators.merge_from(&event.valuators);
        self.root = event.root;
        self.time = event.time;
    }

    /// Builds the End the server sends on its own for this touch.
    pub(crate) fn synthesize_end(&self, device: DeviceId, flags: EventFlags) -> EventRecord {
        let mut flags = flags | EventFlags::CLIENT_ID;
        if self.emulate_pointer {
            flags |= EventFlags::POINTER_EMULATED;
        }
        EventRecord {
            time: self.time,
            device,
            source_device: self.source_device,
            flags,
            root: self.root,
            valuators: self.valuators.clone(),
            kind: EventKind::Touch(crate::event::TouchData {
                phase: TouchPhase::End,
                touch_id: self.client_id,
                detail: self.detail,
                resource: None,
            }),
        }
    }

    pub(crate) fn check_invariants(&self) {
        assert!(
            self.num_grabs <= self.listeners.len(),
            "touch {}: num_grabs {} exceeds listener count {}",
            self.client_id,
            self.num_grabs,
            self.listeners.len()
        );
    }
}

/// Touch records of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchTable {
    slots: Vec<TouchPoint>,
}

impl TouchTable {
    pub fn new(initial_slots: usize) -> Self {
        Self {
            slots: (0..initial_slots.max(1)).map(|_| TouchPoint::vacant()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find_by_client_id(&self, touch_id: TouchId) -> Option<usize> {
        self.slots
            .iter()
            .position(|t| t.active && t.client_id == touch_id)
    }

    pub fn get(&self, index: usize) -> &TouchPoint {
        &self.slots[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut TouchPoint {
        &mut self.slots[index]
    }

    pub fn by_id(&self, touch_id: TouchId) -> Option<&TouchPoint> {
        self.find_by_client_id(touch_id).map(|i| &self.slots[i])
    }

    /// Indices of active records.
    pub fn active_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, t)| t.active)
            .map(|(i, _)| i)
            .collect()
    }

    /// Claims a slot for a new touch sequence.
    pub fn begin_touch(
        &mut self,
        device: DeviceId,
        source_device: DeviceId,
        touch_id: TouchId,
        emulate_pointer: bool,
    ) -> Result<usize, EngineError> {
        if self.find_by_client_id(touch_id).is_some() {
            return Err(EngineError::DuplicateTouch { device, touch_id });
        }
        let index = match self.slots.iter().position(|t| !t.active) {
            Some(index) => index,
            None => {
                self.slots.push(TouchPoint::vacant());
                self.slots.len() - 1
            }
        };
        let touch = &mut self.slots[index];
        touch.active = true;
        touch.client_id = touch_id;
        touch.source_device = source_device;
        touch.emulate_pointer = emulate_pointer;
        Ok(index)
    }

    /// Releases a slot. Listeners, trace and history are dropped.
    pub(crate) fn release(&mut self, index: usize) {
        self.slots[index] = TouchPoint::vacant();
    }

    /// Whether `index` still holds the live record for `touch_id`.
    pub(crate) fn is_live(&self, index: usize, touch_id: TouchId) -> bool {
        self.slots
            .get(index)
            .map_or(false, |t| t.active && t.client_id == touch_id)
    }

    pub(crate) fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut TouchPoint> {
        self.slots.iter_mut().filter(|t| t.active)
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &TouchPoint> {
        self.slots.iter().filter(|t| t.active)
    }

    /// Oldest active touch that emulates the pointer and still has a
    /// pointer listener.
    pub fn find_oldest_pointer_emulated_touch(&self) -> Option<usize> {
        let mut oldest: Option<usize> = None;
        for (index, touch) in self.slots.iter().enumerate() {
            if !touch.active || !touch.emulate_pointer || !touch.has_pointer_listener() {
                continue;
            }
            match oldest {
                None => oldest = Some(index),
                Some(current) => {
                    if self.slots[current].client_id.not_older_than(touch.client_id) {
                        oldest = Some(index);
                    }
                }
            }
        }
        oldest
    }
}
