//! In-memory [`InputEnvironment`].
//!
//! Windows are axis-aligned rectangles in root coordinates; later siblings
//! stack above earlier ones. Every client write is recorded so callers can
//! assert on what was delivered.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::env::{Access, ActiveGrab, Grab, GrabKind, GrabMode, InputEnvironment, ModsGroups, Selection, WindowInfo};
use crate::event::{EventKind, EventRecord, TouchPhase};
use crate::types::{ClientId, DeviceId, Point, ResourceId, WindowId};
use crate::wire::WireEvent;

/// Resource ids handed out to implicit grabs start here.
const IMPLICIT_GRAB_BASE: u32 = 0x7f00_0000;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.y >= self.y && point.x < self.x + self.width && point.y < self.y + self.height
    }
}

#[derive(Debug, Clone)]
struct SimWindow {
    parent: Option<WindowId>,
    owner: ClientId,
    rect: Rect,
    children: Vec<WindowId>,
}

/// A registered passive grab. `device` and `detail` of `None` match any.
#[derive(Debug, Clone, PartialEq)]
pub struct PassiveGrab {
    pub grab: Grab,
    pub device: Option<DeviceId>,
    pub detail: Option<u32>,
}

impl PassiveGrab {
    fn matches(&self, device: DeviceId, event: &EventRecord, emulate_core: bool) -> bool {
        if self.device.map_or(false, |d| d != device) {
            return false;
        }
        let detail_ok = |detail: u32| self.detail.map_or(true, |d| d == detail);
        match (&event.kind, self.grab.kind) {
            (EventKind::ButtonPress { button }, GrabKind::Pointer) => detail_ok(*button),
            (EventKind::KeyPress { keycode }, GrabKind::Keyboard) => detail_ok(*keycode),
            (EventKind::Touch(touch), GrabKind::Touch) => touch.phase == TouchPhase::Begin,
            (EventKind::Touch(touch), GrabKind::Pointer) => {
                emulate_core && touch.phase == TouchPhase::Begin && detail_ok(touch.detail)
            }
            (EventKind::Gesture(gesture), GrabKind::Gesture) => self.grab.event_mask.has(gesture.begin_type()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimEnvironment {
    root: WindowId,
    windows: HashMap<WindowId, SimWindow>,
    selections: HashMap<WindowId, Vec<Selection>>,
    passive_grabs: Vec<PassiveGrab>,
    active_grabs: HashMap<DeviceId, ActiveGrab>,
    focus: HashMap<DeviceId, WindowId>,
    frozen: HashSet<DeviceId>,
    denied: HashSet<(ClientId, WindowId)>,
    mods: ModsGroups,
    next_implicit: u32,
    writes: Vec<(ClientId, WireEvent)>,
}

impl SimEnvironment {
    pub fn new(root: WindowId, owner: ClientId, rect: Rect) -> Self {
        let mut windows = HashMap::new();
        windows.insert(
            root,
            SimWindow {
                parent: None,
                owner,
                rect,
                children: Vec::new(),
            },
        );
        Self {
            root,
            windows,
            selections: HashMap::new(),
            passive_grabs: Vec::new(),
            active_grabs: HashMap::new(),
            focus: HashMap::new(),
            frozen: HashSet::new(),
            denied: HashSet::new(),
            mods: ModsGroups::default(),
            next_implicit: IMPLICIT_GRAB_BASE,
            writes: Vec::new(),
        }
    }

    /// Adds `id` as the top-most child of `parent`. Unknown parents are ignored.
    pub fn add_window(&mut self, id: WindowId, parent: WindowId, owner: ClientId, rect: Rect) -> bool {
        if self.windows.contains_key(&id) {
            return false;
        }
        let Some(parent_window) = self.windows.get_mut(&parent) else {
            return false;
        };
        parent_window.children.push(id);
        self.windows.insert(
            id,
            SimWindow {
                parent: Some(parent),
                owner,
                rect,
                children: Vec::new(),
            },
        );
        true
    }

    /// Removes `id` and its descendants along with their selections and
    /// passive grabs. Returns the removed windows, `id` first.
    pub fn destroy_window(&mut self, id: WindowId) -> Vec<WindowId> {
        if id == self.root || !self.windows.contains_key(&id) {
            return Vec::new();
        }
        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(window) = pending.pop() {
            if let Some(w) = self.windows.remove(&window) {
                pending.extend(w.children.iter().copied());
                removed.push(window);
            }
        }
        for window in &removed {
            self.selections.remove(window);
            self.focus.retain(|_, w| *w != *window);
        }
        self.passive_grabs.retain(|p| !removed.contains(&p.grab.window));
        self.active_grabs.retain(|_, a| !removed.contains(&a.grab.window));
        for window in self.windows.values_mut() {
            window.children.retain(|c| !removed.contains(c));
        }
        removed
    }

    pub fn select(&mut self, window: WindowId, selection: Selection) {
        self.selections.entry(window).or_default().push(selection);
    }

    pub fn add_passive_grab(&mut self, grab: PassiveGrab) {
        self.passive_grabs.push(grab);
    }

    /// Explicit grab request.
    pub fn grab_device(&mut self, device: DeviceId, grab: Grab) {
        self.active_grabs.insert(
            device,
            ActiveGrab {
                grab,
                from_passive: false,
                implicit: false,
                activating_key: None,
            },
        );
    }

    /// Drops every selection and grab owned by `client`.
    pub fn remove_client(&mut self, client: ClientId) {
        for selections in self.selections.values_mut() {
            selections.retain(|s| s.client != client);
        }
        self.passive_grabs.retain(|p| p.grab.client != client);
        self.active_grabs.retain(|_, a| a.grab.client != client);
    }

    pub fn set_focus(&mut self, device: DeviceId, window: WindowId) {
        self.focus.insert(device, window);
    }

    pub fn deny_access(&mut self, client: ClientId, window: WindowId) {
        self.denied.insert((client, window));
    }

    pub fn thaw(&mut self, device: DeviceId) {
        self.frozen.remove(&device);
    }

    pub fn set_modifiers(&mut self, mods: ModsGroups) {
        self.mods = mods;
    }

    pub fn writes(&self) -> &[(ClientId, WireEvent)] {
        &self.writes
    }

    pub fn writes_for(&self, client: ClientId) -> Vec<&WireEvent> {
        self.writes.iter().filter(|(c, _)| *c == client).map(|(_, w)| w).collect()
    }

    pub fn take_writes(&mut self) -> Vec<(ClientId, WireEvent)> {
        std::mem::take(&mut self.writes)
    }
}

impl InputEnvironment for SimEnvironment {
    fn lookup_window(&self, id: WindowId) -> Option<WindowInfo> {
        self.windows.get(&id).map(|w| WindowInfo {
            id,
            parent: w.parent,
            owner: w.owner,
        })
    }

    fn window_ancestry(&self, id: WindowId) -> Vec<WindowId> {
        let mut ancestry = Vec::new();
        let mut current = Some(id);
        while let Some(window) = current {
            let Some(w) = self.windows.get(&window) else {
                return Vec::new();
            };
            ancestry.push(window);
            current = w.parent;
        }
        ancestry.reverse();
        ancestry
    }

    fn sprite_trace(&self, _device: DeviceId, position: Point) -> Vec<WindowId> {
        let mut trace = Vec::new();
        let mut current = self.root;
        loop {
            let Some(window) = self.windows.get(&current) else {
                break;
            };
            if !window.rect.contains(position) {
                break;
            }
            trace.push(current);
            let next = window
                .children
                .iter()
                .rev()
                .find(|c| self.windows.get(*c).map_or(false, |w| w.rect.contains(position)));
            match next {
                Some(&child) => current = child,
                None => break,
            }
        }
        trace
    }

    fn root_window(&self) -> WindowId {
        self.root
    }

    fn focus_window(&self, device: DeviceId) -> Option<WindowId> {
        self.focus.get(&device).copied()
    }

    fn selections(&self, window: WindowId, _device: DeviceId) -> Vec<Selection> {
        self.selections.get(&window).cloned().unwrap_or_default()
    }

    fn active_grab_for(&self, device: DeviceId) -> Option<ActiveGrab> {
        self.active_grabs.get(&device).cloned()
    }

    fn passive_grab_on_window(
        &self,
        window: WindowId,
        device: DeviceId,
        event: &EventRecord,
        emulate_core: bool,
    ) -> Option<Grab> {
        self.passive_grabs
            .iter()
            .filter(|p| p.grab.window == window)
            .find(|p| p.matches(device, event, emulate_core))
            .map(|p| p.grab.clone())
    }

    fn activate_passive_grab(&mut self, device: DeviceId, grab: &Grab, event: &EventRecord) {
        let activating_key = match event.kind {
            EventKind::KeyPress { keycode } => Some(keycode),
            _ => None,
        };
        self.active_grabs.insert(
            device,
            ActiveGrab {
                grab: grab.clone(),
                from_passive: true,
                implicit: false,
                activating_key,
            },
        );
    }

    fn activate_implicit_grab(&mut self, device: DeviceId, window: WindowId, selection: &Selection) {
        let resource = ResourceId(self.next_implicit);
        self.next_implicit += 1;
        let grab = Grab {
            resource,
            client: selection.client,
            window,
            level: selection.level,
            kind: GrabKind::Pointer,
            owner_events: false,
            mode: GrabMode::Async,
            event_mask: selection.mask,
        };
        self.active_grabs.insert(
            device,
            ActiveGrab {
                grab,
                from_passive: true,
                implicit: true,
                activating_key: None,
            },
        );
    }

    fn deactivate_grab(&mut self, device: DeviceId) {
        self.active_grabs.remove(&device);
        self.frozen.remove(&device);
    }

    fn is_frozen(&self, device: DeviceId) -> bool {
        self.frozen.contains(&device)
    }

    fn freeze_for_sync_grab(&mut self, device: DeviceId) {
        self.frozen.insert(device);
    }

    fn access_check(&self, client: ClientId, window: WindowId, _event: &WireEvent) -> Access {
        if self.denied.contains(&(client, window)) {
            Access::Deny
        } else {
            Access::Allow
        }
    }

    fn write_event_to_client(&mut self, client: ClientId, event: WireEvent) {
        self.writes.push((client, event));
    }

    fn current_modifier_and_group_state(&self, _device: DeviceId) -> ModsGroups {
        self.mods
    }
}
