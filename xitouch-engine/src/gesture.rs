//! Gesture sequences.
//!
//! A device tracks at most one gesture. It has a single listener picked at
//! Begin; there is no chain and no ownership transfer.

use crate::delivery::{DeliveryOutcome, DeviceContext};
use crate::env::{Grab, GrabKind, GrabMode};
use crate::event::{EventKind, EventRecord, GestureData, GestureKind, GesturePhase};
use crate::types::{ClientId, DeviceId, InputLevel, ResourceId, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureListenerKind {
    /// Grab selecting the gesture type.
    Grab,
    /// Active grab that does not select gestures. Swallows the sequence.
    NonGestureGrab,
    Regular,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GestureListener {
    pub(crate) resource: ResourceId,
    pub(crate) client: ClientId,
    pub(crate) kind: GestureListenerKind,
    pub(crate) window: WindowId,
    pub(crate) grab: Option<Grab>,
}

impl GestureListener {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn kind(&self) -> GestureListenerKind {
        self.kind
    }

    pub fn window(&self) -> WindowId {
        self.window
    }
}

/// The device's gesture slot.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureRecord {
    pub(crate) active: bool,
    pub(crate) source_device: DeviceId,
    pub(crate) kind: GestureKind,
    pub(crate) num_touches: u32,
    pub(crate) listener: Option<GestureListener>,
    pub(crate) spatial_trace: Vec<WindowId>,
}

impl Default for GestureRecord {
    fn default() -> Self {
        Self {
            active: false,
            source_device: DeviceId(0),
            kind: GestureKind::Pinch,
            num_touches: 0,
            listener: None,
            spatial_trace: Vec::new(),
        }
    }
}

impl GestureRecord {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn source_device(&self) -> DeviceId {
        self.source_device
    }

    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    pub fn num_touches(&self) -> u32 {
        self.num_touches
    }

    pub fn listener(&self) -> Option<&GestureListener> {
        self.listener.as_ref()
    }

    pub fn spatial_trace(&self) -> &[WindowId] {
        &self.spatial_trace
    }

    fn start(&mut self, source_device: DeviceId, data: &GestureData) {
        *self = Self {
            active: true,
            source_device,
            kind: data.kind,
            num_touches: data.num_touches,
            listener: None,
            spatial_trace: Vec::new(),
        };
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn truncate_trace(&mut self, window: WindowId) {
        if let Some(depth) = self.spatial_trace.iter().position(|&w| w == window) {
            self.spatial_trace.truncate(depth);
        }
    }
}

impl DeviceContext<'_> {
    /// Entry point for gesture Begin, Update and End.
    pub(crate) fn process_gesture(&mut self, event: EventRecord) {
        if !self.dev.has_gesture() {
            return;
        }
        let EventKind::Gesture(data) = &event.kind else {
            return;
        };
        let data = data.clone();
        let device = self.id();

        if data.phase == GesturePhase::Begin {
            let record = &self.dev.gesture;
            if self.dev.is_master() && record.active && record.source_device != event.source_device {
                tracing::debug!(
                    "device {}: ignoring gesture from {} while {} has one active",
                    device,
                    event.source_device,
                    record.source_device
                );
                return;
            }
            self.dev.gesture.start(event.source_device, &data);
            let trace = self.env.sprite_trace(device, event.root);
            if trace.is_empty() {
                tracing::debug!("device {}: no window under gesture", device);
                self.dev.gesture.reset();
                return;
            }
            self.dev.gesture.spatial_trace = trace;
            self.setup_gesture_listener(&event, &data);
        } else {
            let record = &self.dev.gesture;
            if !record.active || record.kind != data.kind || record.source_device != event.source_device {
                tracing::debug!("device {}: dropping {:?} without a matching gesture", device, data.phase);
                return;
            }
            self.dev.gesture.num_touches = data.num_touches;
        }

        let delivered = match self.dev.gesture.listener.clone() {
            Some(listener) => self.deliver_gesture_event(&listener, &event, &data),
            None => false,
        };

        let active = self.env.active_grab_for(device);
        let deactivate = data.phase == GesturePhase::End
            && active
                .as_ref()
                .map_or(false, |a| a.from_passive && a.grab.kind == GrabKind::Gesture);
        let sync_grab = active.as_ref().map_or(false, |a| a.grab.mode == GrabMode::Sync);
        if delivered && !deactivate && data.phase != GesturePhase::Update && sync_grab {
            self.env.freeze_for_sync_grab(device);
        }

        if data.phase == GesturePhase::End {
            self.dev.gesture.reset();
            if deactivate {
                self.env.deactivate_grab(device);
            }
        }
    }

    fn setup_gesture_listener(&mut self, event: &EventRecord, data: &GestureData) {
        let device = self.id();
        let begin_type = data.begin_type();

        if let Some(active) = self.env.active_grab_for(device) {
            let kind = if active.grab.event_mask.has(begin_type) {
                GestureListenerKind::Grab
            } else {
                GestureListenerKind::NonGestureGrab
            };
            self.dev.gesture.listener = Some(gesture_grab_listener(&active.grab, kind));
            return;
        }

        let trace = self.dev.gesture.spatial_trace.clone();
        for &window in &trace {
            if let Some(grab) = self.env.passive_grab_on_window(window, device, event, false) {
                if grab.kind != GrabKind::Gesture {
                    continue;
                }
                self.env.activate_passive_grab(device, &grab, event);
                self.dev.gesture.listener = Some(gesture_grab_listener(&grab, GestureListenerKind::Grab));
                return;
            }
        }

        for &window in trace.iter().rev() {
            let selection = self
                .env
                .selections(window, device)
                .into_iter()
                .find(|s| s.level == InputLevel::Xi2 && s.mask.has(begin_type));
            if let Some(selection) = selection {
                self.dev.gesture.listener = Some(GestureListener {
                    resource: selection.resource,
                    client: selection.client,
                    kind: GestureListenerKind::Regular,
                    window,
                    grab: None,
                });
                return;
            }
        }
    }

    fn deliver_gesture_event(&mut self, listener: &GestureListener, event: &EventRecord, data: &GestureData) -> bool {
        let event_type = data.event_type();
        let outcome = match listener.kind {
            GestureListenerKind::NonGestureGrab => return false,
            GestureListenerKind::Grab => {
                let Some(grab) = listener.grab.as_ref() else {
                    return false;
                };
                if !grab.event_mask.has(event_type) {
                    return false;
                }
                self.write_to(grab.client, grab.window, grab.level, event)
            }
            GestureListenerKind::Regular => {
                let selection = self
                    .env
                    .selections(listener.window, self.id())
                    .into_iter()
                    .find(|s| s.resource == listener.resource);
                let Some(selection) = selection else {
                    return false;
                };
                if !selection.mask.has(event_type) {
                    return false;
                }
                self.write_to(selection.client, listener.window, selection.level, event)
            }
        };
        outcome == DeliveryOutcome::Delivered
    }

    pub(crate) fn gesture_listener_gone(&mut self, client: ClientId) {
        let record = &mut self.dev.gesture;
        if record.listener.as_ref().map_or(false, |l| l.client == client) {
            record.listener = None;
        }
    }
}

fn gesture_grab_listener(grab: &Grab, kind: GestureListenerKind) -> GestureListener {
    GestureListener {
        resource: grab.resource,
        client: grab.client,
        kind,
        window: grab.window,
        grab: Some(grab.clone()),
    }
}
