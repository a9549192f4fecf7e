//! Wire-ready events handed to the client-write collaborator.
//!
//! A [`WireEvent`] is built once per recipient and never mutated afterwards.
//! Byte encoding happens outside the engine; this type only carries the
//! semantic fields the engine is responsible for.

use bitflags::bitflags;

use crate::env::ModsGroups;
use crate::event::{EventFlags, EventKind, EventRecord, EventType};
use crate::types::{DeviceId, InputLevel, Point, ResourceId, WindowId};

bitflags! {
    /// Flag bits that reach the client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WireFlags: u32 {
        const POINTER_EMULATED = 1 << 0;
        const TOUCH_PENDING_END = 1 << 1;
        const KEY_REPEAT = 1 << 2;
        const GESTURE_CANCELLED = 1 << 3;
        const BARRIER_DEVICE_IS_GRABBED = 1 << 4;
    }
}

impl WireFlags {
    fn from_event(flags: EventFlags) -> Self {
        let mut wire = WireFlags::empty();
        if flags.contains(EventFlags::POINTER_EMULATED) {
            wire |= WireFlags::POINTER_EMULATED;
        }
        if flags.contains(EventFlags::PENDING_END) {
            wire |= WireFlags::TOUCH_PENDING_END;
        }
        if flags.contains(EventFlags::KEY_REPEAT) {
            wire |= WireFlags::KEY_REPEAT;
        }
        if flags.contains(EventFlags::CANCELLED) {
            wire |= WireFlags::GESTURE_CANCELLED;
        }
        if flags.contains(EventFlags::DEVICE_IS_GRABBED) {
            wire |= WireFlags::BARRIER_DEVICE_IS_GRABBED;
        }
        wire
    }
}

/// Gesture fields owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureFields {
    pub num_touches: u32,
    pub delta: Point,
    pub delta_unaccel: Point,
    pub scale: f64,
    pub angle_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrierFields {
    pub barrier: ResourceId,
    pub event_id: u32,
    pub delta: Point,
}

/// One outbound protocol event.
#[derive(Debug, Clone, PartialEq)]
pub struct WireEvent {
    pub event_type: EventType,
    /// Protocol view the event is rendered in.
    pub level: InputLevel,
    pub device: DeviceId,
    pub source_device: DeviceId,
    pub time: u32,
    /// Button, keycode, touch id or gesture touch count.
    pub detail: u32,
    pub window: WindowId,
    pub root: Point,
    pub flags: WireFlags,
    pub mods: ModsGroups,
    pub gesture: Option<GestureFields>,
    pub barrier: Option<BarrierFields>,
}

impl WireEvent {
    /// Renders `event` for delivery on `window` at `level`.
    pub fn from_record(event: &EventRecord, window: WindowId, level: InputLevel, mods: ModsGroups) -> Self {
        let gesture = match &event.kind {
            EventKind::Gesture(g) => Some(GestureFields {
                num_touches: g.num_touches,
                delta: g.delta,
                delta_unaccel: g.delta_unaccel,
                scale: g.scale,
                angle_delta: g.angle_delta,
            }),
            _ => None,
        };
        let barrier = match &event.kind {
            EventKind::Barrier(b) => Some(BarrierFields {
                barrier: b.barrier,
                event_id: b.event_id,
                delta: b.delta,
            }),
            _ => None,
        };
        Self {
            event_type: event.event_type(),
            level,
            device: event.device,
            source_device: event.source_device,
            time: event.time,
            detail: event.detail(),
            window,
            root: event.root,
            flags: WireFlags::from_event(event.flags),
            mods,
            gesture,
            barrier,
        }
    }
}
