//! Internal event records.
//!
//! An [`EventRecord`] is one hardware-originated occurrence. The payload is a
//! closed enum ([`EventKind`]); the common header (time, devices, flags,
//! position, valuators) is shared by every kind.

use bitflags::bitflags;
use serde::Deserialize;

use crate::types::{DeviceId, Point, ResourceId, TouchId, WindowId};
use crate::valuator::ValuatorMask;

bitflags! {
    /// Per-event flag bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u32 {
        /// Synthesised End sent because the owner accepted the touch.
        const TOUCH_ACCEPT = 1 << 0;
        /// Synthesised End sent because the listener rejected the touch.
        const TOUCH_REJECT = 1 << 1;
        /// The touch has physically ended but ownership is unresolved.
        const PENDING_END = 1 << 2;
        /// Generated by the server for an existing touch id, not by hardware.
        const CLIENT_ID = 1 << 3;
        /// Replayed from a touch's history to a newly promoted owner.
        const REPLAYING = 1 << 4;
        /// The touch drives legacy pointer emulation.
        const POINTER_EMULATED = 1 << 5;
        /// Gesture cancelled rather than ended.
        const CANCELLED = 1 << 6;
        /// Auto-repeated key press.
        const KEY_REPEAT = 1 << 7;
        /// Barrier event generated while the device was grabbed.
        const DEVICE_IS_GRABBED = 1 << 8;
    }
}

/// Flat event type, used for selection and grab masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[repr(u8)]
pub enum EventType {
    KeyPress = 0,
    KeyRelease = 1,
    ButtonPress = 2,
    ButtonRelease = 3,
    Motion = 4,
    ProximityIn = 5,
    ProximityOut = 6,
    TouchBegin = 7,
    TouchUpdate = 8,
    TouchEnd = 9,
    TouchOwnership = 10,
    GesturePinchBegin = 11,
    GesturePinchUpdate = 12,
    GesturePinchEnd = 13,
    GestureSwipeBegin = 14,
    GestureSwipeUpdate = 15,
    GestureSwipeEnd = 16,
    RawKeyPress = 17,
    RawKeyRelease = 18,
    RawButtonPress = 19,
    RawButtonRelease = 20,
    RawMotion = 21,
    RawTouchBegin = 22,
    RawTouchUpdate = 23,
    RawTouchEnd = 24,
    BarrierHit = 25,
    BarrierLeave = 26,
    DeviceChanged = 27,
}

impl EventType {
    /// Single-bit mask for this type.
    pub fn mask(self) -> EventMask {
        EventMask::from_bits_retain(1u64 << (self as u8))
    }

    pub fn is_raw(self) -> bool {
        (EventType::RawKeyPress as u8..=EventType::RawTouchEnd as u8).contains(&(self as u8))
    }
}

bitflags! {
    /// Set of event types a client selected for, or a grab listens to.
    ///
    /// Core and XI1 selections use the same bits for the pointer and key
    /// types they can express.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u64 {
        const KEY_PRESS = 1 << 0;
        const KEY_RELEASE = 1 << 1;
        const BUTTON_PRESS = 1 << 2;
        const BUTTON_RELEASE = 1 << 3;
        const MOTION = 1 << 4;
        const PROXIMITY_IN = 1 << 5;
        const PROXIMITY_OUT = 1 << 6;
        const TOUCH_BEGIN = 1 << 7;
        const TOUCH_UPDATE = 1 << 8;
        const TOUCH_END = 1 << 9;
        const TOUCH_OWNERSHIP = 1 << 10;
        const GESTURE_PINCH_BEGIN = 1 << 11;
        const GESTURE_PINCH_UPDATE = 1 << 12;
        const GESTURE_PINCH_END = 1 << 13;
        const GESTURE_SWIPE_BEGIN = 1 << 14;
        const GESTURE_SWIPE_UPDATE = 1 << 15;
        const GESTURE_SWIPE_END = 1 << 16;
        const RAW_KEY_PRESS = 1 << 17;
        const RAW_KEY_RELEASE = 1 << 18;
        const RAW_BUTTON_PRESS = 1 << 19;
        const RAW_BUTTON_RELEASE = 1 << 20;
        const RAW_MOTION = 1 << 21;
        const RAW_TOUCH_BEGIN = 1 << 22;
        const RAW_TOUCH_UPDATE = 1 << 23;
        const RAW_TOUCH_END = 1 << 24;
        const BARRIER_HIT = 1 << 25;
        const BARRIER_LEAVE = 1 << 26;
        const DEVICE_CHANGED = 1 << 27;

        const TOUCH_EVENTS = Self::TOUCH_BEGIN.bits() | Self::TOUCH_UPDATE.bits() | Self::TOUCH_END.bits();
        const POINTER_EVENTS = Self::BUTTON_PRESS.bits() | Self::BUTTON_RELEASE.bits() | Self::MOTION.bits();
    }
}

impl EventMask {
    pub fn has(self, event_type: EventType) -> bool {
        self.contains(event_type.mask())
    }

    pub fn from_types(types: &[EventType]) -> Self {
        types.iter().fold(EventMask::empty(), |acc, t| acc | t.mask())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchPhase {
    Begin,
    Update,
    End,
}

impl TouchPhase {
    pub fn event_type(self) -> EventType {
        match self {
            TouchPhase::Begin => EventType::TouchBegin,
            TouchPhase::Update => EventType::TouchUpdate,
            TouchPhase::End => EventType::TouchEnd,
        }
    }

    /// Legacy pointer type a pointer-emulating listener sees for this phase.
    pub fn pointer_event_type(self) -> EventType {
        match self {
            TouchPhase::Begin => EventType::ButtonPress,
            TouchPhase::Update => EventType::Motion,
            TouchPhase::End => EventType::ButtonRelease,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchData {
    pub phase: TouchPhase,
    pub touch_id: TouchId,
    /// Button number used when the touch emulates the pointer.
    pub detail: u32,
    /// Restricts delivery to one listener when replaying or resending.
    pub resource: Option<ResourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipReason {
    None,
    Accept,
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipData {
    pub touch_id: TouchId,
    pub reason: OwnershipReason,
    /// Listener that produced the reason, or the listener to notify for `None`.
    pub resource: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureKind {
    Pinch,
    Swipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GesturePhase {
    Begin,
    Update,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GestureData {
    pub kind: GestureKind,
    pub phase: GesturePhase,
    pub num_touches: u32,
    pub delta: Point,
    pub delta_unaccel: Point,
    /// Pinch only.
    pub scale: f64,
    /// Pinch only.
    pub angle_delta: f64,
}

impl GestureData {
    pub fn event_type(&self) -> EventType {
        match (self.kind, self.phase) {
            (GestureKind::Pinch, GesturePhase::Begin) => EventType::GesturePinchBegin,
            (GestureKind::Pinch, GesturePhase::Update) => EventType::GesturePinchUpdate,
            (GestureKind::Pinch, GesturePhase::End) => EventType::GesturePinchEnd,
            (GestureKind::Swipe, GesturePhase::Begin) => EventType::GestureSwipeBegin,
            (GestureKind::Swipe, GesturePhase::Update) => EventType::GestureSwipeUpdate,
            (GestureKind::Swipe, GesturePhase::End) => EventType::GestureSwipeEnd,
        }
    }

    pub fn begin_type(&self) -> EventType {
        match self.kind {
            GestureKind::Pinch => EventType::GesturePinchBegin,
            GestureKind::Swipe => EventType::GestureSwipeBegin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierKind {
    Hit,
    Leave,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarrierData {
    pub kind: BarrierKind,
    /// Barrier resource; its client bits identify the owning client.
    pub barrier: ResourceId,
    pub owner: crate::types::ClientId,
    pub window: WindowId,
    pub event_id: u32,
    pub delta: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceChangeData {
    pub num_buttons: usize,
    pub num_axes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    KeyPress { keycode: u32 },
    KeyRelease { keycode: u32 },
    ButtonPress { button: u32 },
    ButtonRelease { button: u32 },
    Motion,
    ProximityIn,
    ProximityOut,
    Touch(TouchData),
    Ownership(OwnershipData),
    Gesture(GestureData),
    /// `raw_type` is one of the `Raw*` event types.
    Raw { raw_type: EventType, detail: u32 },
    Barrier(BarrierData),
    DeviceChanged(DeviceChangeData),
}

/// One hardware-originated occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Milliseconds.
    pub time: u32,
    pub device: DeviceId,
    pub source_device: DeviceId,
    pub flags: EventFlags,
    pub root: Point,
    pub valuators: ValuatorMask,
    pub kind: EventKind,
}

impl EventRecord {
    pub fn new(device: DeviceId, kind: EventKind) -> Self {
        Self {
            time: 0,
            device,
            source_device: device,
            flags: EventFlags::empty(),
            root: Point::default(),
            valuators: ValuatorMask::new(),
            kind,
        }
    }

    /// Touch phase event with detail (emulation button) 1.
    pub fn touch(device: DeviceId, phase: TouchPhase, touch_id: TouchId, root: Point) -> Self {
        Self::new(
            device,
            EventKind::Touch(TouchData {
                phase,
                touch_id,
                detail: 1,
                resource: None,
            }),
        )
        .at(root)
    }

    pub fn ownership(device: DeviceId, touch_id: TouchId, reason: OwnershipReason, resource: ResourceId) -> Self {
        Self::new(
            device,
            EventKind::Ownership(OwnershipData {
                touch_id,
                reason,
                resource,
            }),
        )
    }

    pub fn button_press(device: DeviceId, button: u32) -> Self {
        Self::new(device, EventKind::ButtonPress { button })
    }

    pub fn button_release(device: DeviceId, button: u32) -> Self {
        Self::new(device, EventKind::ButtonRelease { button })
    }

    pub fn key_press(device: DeviceId, keycode: u32) -> Self {
        Self::new(device, EventKind::KeyPress { keycode })
    }

    pub fn key_release(device: DeviceId, keycode: u32) -> Self {
        Self::new(device, EventKind::KeyRelease { keycode })
    }

    pub fn motion(device: DeviceId, root: Point) -> Self {
        Self::new(device, EventKind::Motion).at(root)
    }

    pub fn gesture(device: DeviceId, kind: GestureKind, phase: GesturePhase, num_touches: u32) -> Self {
        Self::new(
            device,
            EventKind::Gesture(GestureData {
                kind,
                phase,
                num_touches,
                delta: Point::default(),
                delta_unaccel: Point::default(),
                scale: 1.0,
                angle_delta: 0.0,
            }),
        )
    }

    pub fn raw(device: DeviceId, raw_type: EventType, detail: u32) -> Self {
        debug_assert!(raw_type.is_raw(), "{:?} is not a raw event type", raw_type);
        Self::new(device, EventKind::Raw { raw_type, detail })
    }

    pub fn with_source(mut self, source: DeviceId) -> Self {
        self.source_device = source;
        self
    }

    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_time(mut self, time: u32) -> Self {
        self.time = time;
        self
    }

    pub fn with_valuators(mut self, valuators: ValuatorMask) -> Self {
        self.valuators = valuators;
        self
    }

    pub fn at(mut self, root: Point) -> Self {
        self.root = root;
        self
    }

    /// Overrides the touch detail (emulation button). No effect on other kinds.
    pub fn with_detail(mut self, detail: u32) -> Self {
        if let EventKind::Touch(touch) = &mut self.kind {
            touch.detail = detail;
        }
        self
    }

    pub fn event_type(&self) -> EventType {
        match &self.kind {
            EventKind::KeyPress { .. } => EventType::KeyPress,
            EventKind::KeyRelease { .. } => EventType::KeyRelease,
            EventKind::ButtonPress { .. } => EventType::ButtonPress,
            EventKind::ButtonRelease { .. } => EventType::ButtonRelease,
            EventKind::Motion => EventType::Motion,
            EventKind::ProximityIn => EventType::ProximityIn,
            EventKind::ProximityOut => EventType::ProximityOut,
            EventKind::Touch(touch) => touch.phase.event_type(),
            EventKind::Ownership(_) => EventType::TouchOwnership,
            EventKind::Gesture(gesture) => gesture.event_type(),
            EventKind::Raw { raw_type, .. } => *raw_type,
            EventKind::Barrier(barrier) => match barrier.kind {
                BarrierKind::Hit => EventType::BarrierHit,
                BarrierKind::Leave => EventType::BarrierLeave,
            },
            EventKind::DeviceChanged(_) => EventType::DeviceChanged,
        }
    }

    pub fn touch_data(&self) -> Option<&TouchData> {
        match &self.kind {
            EventKind::Touch(touch) => Some(touch),
            _ => None,
        }
    }

    pub fn touch_phase(&self) -> Option<TouchPhase> {
        self.touch_data().map(|t| t.phase)
    }

    /// Button, keycode, touch id or gesture touch count, depending on kind.
    pub fn detail(&self) -> u32 {
        match &self.kind {
            EventKind::KeyPress { keycode } | EventKind::KeyRelease { keycode } => *keycode,
            EventKind::ButtonPress { button } | EventKind::ButtonRelease { button } => *button,
            EventKind::Touch(touch) => touch.touch_id.0,
            EventKind::Ownership(own) => own.touch_id.0,
            EventKind::Gesture(gesture) => gesture.num_touches,
            EventKind::Raw { detail, .. } => *detail,
            _ => 0,
        }
    }

    /// Whether this is a pointer event (delivered via the sprite rather than focus).
    pub fn is_pointer_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ButtonPress { .. }
                | EventKind::ButtonRelease { .. }
                | EventKind::Motion
                | EventKind::ProximityIn
                | EventKind::ProximityOut
        )
    }

    /// Converts a touch phase into its emulated pointer events.
    ///
    /// Every phase yields a motion; Begin and End also yield a button
    /// press/release with the touch's detail. Flags are reset to
    /// `POINTER_EMULATED`. Returns `None` for non-touch events.
    pub fn to_pointer_events(&self) -> Option<(EventRecord, Option<EventRecord>)> {
        let touch = self.touch_data()?;
        let derive = |kind: EventKind| EventRecord {
            kind,
            flags: EventFlags::POINTER_EMULATED,
            ..self.clone()
        };
        let motion = derive(EventKind::Motion);
        let button = match touch.phase {
            TouchPhase::Begin => Some(derive(EventKind::ButtonPress { button: touch.detail })),
            TouchPhase::Update => None,
            TouchPhase::End => Some(derive(EventKind::ButtonRelease { button: touch.detail })),
        };
        Some((motion, button))
    }
}
