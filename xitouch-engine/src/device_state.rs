//! Persistent per-device down/value state.
//!
//! [`DeviceState::apply`] runs before any delivery decision and vetoes
//! duplicate presses and releases. Emulating touches sit on the same ladder,
//! keyed by touch id.

use crate::event::{EventFlags, EventKind, EventRecord, TouchPhase};
use crate::types::{TouchId, WindowId};
use crate::valuator::MAX_VALUATORS;

/// Number of key and button codes tracked.
pub const MAX_CODES: usize = 256;

/// First modifier-style state bit used for logical buttons 1 to 5.
const BUTTON1_MASK: u32 = 1 << 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    Process,
    DoNotProcess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct CodeSet([u64; MAX_CODES / 64]);

impl CodeSet {
    fn contains(&self, code: u32) -> bool {
        let code = code as usize;
        code < MAX_CODES && self.0[code / 64] & (1 << (code % 64)) != 0
    }

    fn insert(&mut self, code: u32) {
        let code = code as usize;
        if code < MAX_CODES {
            self.0[code / 64] |= 1 << (code % 64);
        }
    }

    fn remove(&mut self, code: u32) {
        let code = code as usize;
        if code < MAX_CODES {
            self.0[code / 64] &= !(1 << (code % 64));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    has_keys: bool,
    /// Physical to logical button map; index 0 is unused.
    button_map: Vec<u32>,
    buttons_pressed: CodeSet,
    keys_pressed: CodeSet,
    buttons_down: u32,
    button_state: u32,
    /// Pointer-emulating touches currently holding the emulated button.
    touches_down: Vec<TouchId>,
    touch_state: u32,
    axes: Vec<f64>,
    in_proximity: bool,
    motion_hint_window: Option<WindowId>,
}

impl DeviceState {
    pub fn new(num_buttons: usize, num_axes: usize, has_keys: bool) -> Self {
        Self {
            has_keys,
            button_map: identity_map(num_buttons),
            buttons_pressed: CodeSet::default(),
            keys_pressed: CodeSet::default(),
            buttons_down: 0,
            button_state: 0,
            touches_down: Vec::new(),
            touch_state: 0,
            axes: vec![0.0; num_axes.min(MAX_VALUATORS)],
            in_proximity: true,
            motion_hint_window: None,
        }
    }

    pub fn num_buttons(&self) -> usize {
        self.button_map.len().saturating_sub(1)
    }

    pub fn num_axes(&self) -> usize {
        self.axes.len()
    }

    pub fn buttons_down(&self) -> u32 {
        self.buttons_down
    }

    pub fn touch_buttons_down(&self) -> u32 {
        self.touches_down.len() as u32
    }

    /// Core button state bits of physically held buttons.
    pub fn button_state(&self) -> u32 {
        self.button_state
    }

    /// Core button state bits of buttons held by emulating touches.
    pub fn touch_state(&self) -> u32 {
        self.touch_state
    }

    pub fn axis(&self, axis: usize) -> Option<f64> {
        self.axes.get(axis).copied()
    }

    pub fn is_key_down(&self, keycode: u32) -> bool {
        self.keys_pressed.contains(keycode)
    }

    pub fn is_button_down(&self, button: u32) -> bool {
        self.buttons_pressed.contains(button)
    }

    pub fn in_proximity(&self) -> bool {
        self.in_proximity
    }

    pub fn motion_hint_window(&self) -> Option<WindowId> {
        self.motion_hint_window
    }

    pub fn set_motion_hint_window(&mut self, window: Option<WindowId>) {
        self.motion_hint_window = window;
    }

    /// Logical button for a physical one, 0 if unmapped.
    pub fn map_button(&self, button: u32) -> u32 {
        self.button_map.get(button as usize).copied().unwrap_or(0)
    }

    /// Replaces the button map. Entry `i` is the logical button for physical
    /// button `i + 1`.
    pub fn set_button_map(&mut self, map: &[u32]) {
        self.button_map = std::iter::once(0).chain(map.iter().copied()).collect();
    }

    /// Applies `event` to the stored state.
    pub fn apply(&mut self, event: &EventRecord) -> StateUpdate {
        match &event.kind {
            EventKind::DeviceChanged(change) => {
                self.button_map = identity_map(change.num_buttons);
                self.axes.resize(change.num_axes.min(MAX_VALUATORS), 0.0);
                return StateUpdate::DoNotProcess;
            }
            EventKind::Motion
            | EventKind::ButtonPress { .. }
            | EventKind::ButtonRelease { .. }
            | EventKind::KeyPress { .. }
            | EventKind::KeyRelease { .. }
            | EventKind::ProximityIn
            | EventKind::ProximityOut
            | EventKind::Touch(_) => {}
            _ => return StateUpdate::Process,
        }

        if let Some(last) = event.valuators.last_axis() {
            if self.axes.is_empty() {
                tracing::debug!("device {}: valuators reported for non-valuator device, ignoring event", event.device);
                return StateUpdate::DoNotProcess;
            }
            if last >= self.axes.len() {
                tracing::debug!("device {}: too many valuators reported ({}), ignoring event", event.device, last + 1);
                return StateUpdate::DoNotProcess;
            }
            for (axis, value) in event.valuators.iter() {
                self.axes[axis] = value;
            }
        }

        match &event.kind {
            EventKind::KeyPress { keycode } => {
                if !self.has_keys {
                    return StateUpdate::DoNotProcess;
                }
                if self.keys_pressed.contains(*keycode) && !event.flags.contains(EventFlags::KEY_REPEAT) {
                    tracing::debug!("device {}: duplicate press of key {}", event.device, keycode);
                    return StateUpdate::DoNotProcess;
                }
                self.motion_hint_window = None;
                self.keys_pressed.insert(*keycode);
            }
            EventKind::KeyRelease { keycode } => {
                if !self.has_keys || !self.keys_pressed.contains(*keycode) {
                    tracing::debug!("device {}: release of key {} that is not down", event.device, keycode);
                    return StateUpdate::DoNotProcess;
                }
                self.motion_hint_window = None;
                self.keys_pressed.remove(*keycode);
            }
            EventKind::ButtonPress { button } => {
                if self.num_buttons() == 0 || self.buttons_pressed.contains(*button) {
                    tracing::debug!("device {}: duplicate press of button {}", event.device, button);
                    return StateUpdate::DoNotProcess;
                }
                self.buttons_pressed.insert(*button);
                let logical = self.map_button(*button);
                if logical == 0 {
                    return StateUpdate::DoNotProcess;
                }
                self.buttons_down += 1;
                self.button_state |= button_mask(logical);
                self.motion_hint_window = None;
            }
            EventKind::ButtonRelease { button } => {
                if self.num_buttons() == 0 || !self.buttons_pressed.contains(*button) {
                    tracing::debug!("device {}: release of button {} that is not down", event.device, button);
                    return StateUpdate::DoNotProcess;
                }
                self.buttons_pressed.remove(*button);
                let logical = self.map_button(*button);
                if logical == 0 {
                    return StateUpdate::DoNotProcess;
                }
                self.buttons_down = self.buttons_down.saturating_sub(1);
                self.button_state &= !button_mask(logical);
                self.motion_hint_window = None;
            }
            EventKind::ProximityIn => self.in_proximity = true,
            EventKind::ProximityOut => self.in_proximity = false,
            // Only a duplicate Begin is vetoed. Ends always go through so the
            // touch record is closed; one that holds no button changes nothing.
            EventKind::Touch(touch) => {
                let counted = event.flags.contains(EventFlags::POINTER_EMULATED)
                    && !event.flags.intersects(EventFlags::REPLAYING | EventFlags::CLIENT_ID);
                let logical = self.map_button(touch.detail);
                match touch.phase {
                    TouchPhase::Begin if counted && logical != 0 => {
                        if self.touches_down.contains(&touch.touch_id) {
                            tracing::debug!("device {}: duplicate begin of touch {}", event.device, touch.touch_id);
                            return StateUpdate::DoNotProcess;
                        }
                        self.touches_down.push(touch.touch_id);
                        self.touch_state |= button_mask(logical);
                    }
                    TouchPhase::End => {
                        let Some(position) = self.touches_down.iter().position(|id| *id == touch.touch_id) else {
                            return StateUpdate::Process;
                        };
                        self.touches_down.swap_remove(position);
                        if self.touches_down.is_empty() {
                            self.touch_state = 0;
                        }
                    }
                    TouchPhase::Begin | TouchPhase::Update => {}
                }
            }
            _ => {}
        }
        StateUpdate::Process
    }
}

fn identity_map(num_buttons: usize) -> Vec<u32> {
    (0..=num_buttons.min(MAX_CODES - 1) as u32).collect()
}

fn button_mask(logical: u32) -> u32 {
    if (1..=5).contains(&logical) {
        BUTTON1_MASK << (logical - 1)
    } else {
        0
    }
}
