//! Interface to the surrounding server.
//!
//! The engine never owns windows, grabs, selections or client connections.
//! It reads and drives them through [`InputEnvironment`], which the server
//! implements (see [`crate::sim::SimEnvironment`] for an in-memory one).

use serde::Deserialize;

use crate::event::{EventMask, EventRecord};
use crate::types::{ClientId, DeviceId, InputLevel, Point, ResourceId, WindowId};
use crate::wire::WireEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub parent: Option<WindowId>,
    /// Client that created the window.
    pub owner: ClientId,
}

/// One client's event selection on a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub client: ClientId,
    pub resource: ResourceId,
    pub level: InputLevel,
    pub mask: EventMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrabMode {
    Sync,
    Async,
}

/// What activates a grab. Decides the pointer/keyboard/touch/gesture grab tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrabKind {
    Pointer,
    Keyboard,
    Touch,
    Gesture,
}

/// Value copy of a grab. Listeners keep their own copy so an ungrab request
/// never leaves them with a dangling reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grab {
    pub resource: ResourceId,
    pub client: ClientId,
    pub window: WindowId,
    pub level: InputLevel,
    pub kind: GrabKind,
    pub owner_events: bool,
    pub mode: GrabMode,
    pub event_mask: EventMask,
}

impl Grab {
    pub fn is_pointer_grab(&self) -> bool {
        self.kind == GrabKind::Pointer
    }
}

/// The device's currently active grab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGrab {
    pub grab: Grab,
    /// Activated by a passive grab (or implicitly) rather than by a grab request.
    pub from_passive: bool,
    /// Activated implicitly by a button press delivered through propagation.
    pub implicit: bool,
    /// Keycode that activated a passive keyboard grab.
    pub activating_key: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModsGroups {
    pub mods: u32,
    pub group: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Operations the engine consumes from the surrounding server.
pub trait InputEnvironment {
    fn lookup_window(&self, id: WindowId) -> Option<WindowInfo>;

    /// Ancestors of `id` ordered root first, `id` last. Empty if unknown.
    fn window_ancestry(&self, id: WindowId) -> Vec<WindowId>;

    /// Windows under `position` for `device`, ordered root first.
    fn sprite_trace(&self, device: DeviceId, position: Point) -> Vec<WindowId>;

    fn root_window(&self) -> WindowId;

    fn focus_window(&self, device: DeviceId) -> Option<WindowId>;

    /// Selections on `window` applicable to `device`, in registration order.
    fn selections(&self, window: WindowId, device: DeviceId) -> Vec<Selection>;

    /// Union of `client`'s selection masks on `window` for `device`.
    fn client_selection_mask(&self, window: WindowId, device: DeviceId, client: ClientId) -> EventMask {
        self.selections(window, device)
            .iter()
            .filter(|s| s.client == client)
            .fold(EventMask::empty(), |acc, s| acc | s.mask)
    }

    fn active_grab_for(&self, device: DeviceId) -> Option<ActiveGrab>;

    /// First passive grab on `window` that `event` would activate. With
    /// `emulate_core`, pointer grabs also match the emulated press of a touch.
    fn passive_grab_on_window(
        &self,
        window: WindowId,
        device: DeviceId,
        event: &EventRecord,
        emulate_core: bool,
    ) -> Option<Grab>;

    fn activate_passive_grab(&mut self, device: DeviceId, grab: &Grab, event: &EventRecord);

    /// Activates the implicit pointer grab for the client that received a press.
    fn activate_implicit_grab(&mut self, device: DeviceId, window: WindowId, selection: &Selection);

    fn deactivate_grab(&mut self, device: DeviceId);

    /// Whether a synchronous grab has frozen `device`.
    fn is_frozen(&self, device: DeviceId) -> bool;

    fn freeze_for_sync_grab(&mut self, device: DeviceId);

    fn access_check(&self, client: ClientId, window: WindowId, event: &WireEvent) -> Access;

    /// Fire-and-forget. Transport failures are the implementor's concern.
    fn write_event_to_client(&mut self, client: ClientId, event: WireEvent);

    fn current_modifier_and_group_state(&self, device: DeviceId) -> ModsGroups;
}
