//! Turning resolved recipients into wire events.
//!
//! Every write goes through [`DeviceContext::write_to`], which stamps the
//! modifier state, runs the access check and hands the event to the
//! collaborator. Pointer emulation of touch phases lives here as well.

use crate::device::Device;
use crate::env::{Access, Grab, GrabKind, InputEnvironment, Selection};
use crate::event::{EventFlags, EventKind, EventRecord, EventType, TouchPhase};
use crate::listener::{Listener, ListenerKind, ListenerState};
use crate::resolver::TouchVerdict;
use crate::types::{ClientId, DeviceId, InputLevel, ResourceId, WindowId};
use crate::wire::WireEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Nothing was written; the listener must not count this as seen.
    Suppressed,
    /// Nothing was written, but listener state still advances.
    AccessDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulationOutcome {
    Success,
    NotEmulating,
    NoActiveListener,
    /// An older pointer-emulating touch is still unresolved.
    Deferred,
}

/// Where a listener's events end up.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Recipient {
    pub(crate) client: ClientId,
    pub(crate) window: WindowId,
    pub(crate) level: InputLevel,
    pub(crate) grab: Option<Grab>,
    pub(crate) mask: crate::event::EventMask,
}

/// One device plus the collaborators, for the duration of one event.
pub(crate) struct DeviceContext<'a> {
    pub(crate) dev: &'a mut Device,
    pub(crate) env: &'a mut dyn InputEnvironment,
    pub(crate) history_size: usize,
}

impl<'a> DeviceContext<'a> {
    pub(crate) fn new(dev: &'a mut Device, env: &'a mut dyn InputEnvironment, history_size: usize) -> Self {
        Self { dev, env, history_size }
    }

    pub(crate) fn id(&self) -> DeviceId {
        self.dev.id()
    }

    /// Writes `event` to `client` on `window`, unless access control denies it.
    pub(crate) fn write_to(
        &mut self,
        client: ClientId,
        window: WindowId,
        level: InputLevel,
        event: &EventRecord,
    ) -> DeliveryOutcome {
        let mods = self.env.current_modifier_and_group_state(self.id());
        let wire = WireEvent::from_record(event, window, level, mods);
        if self.env.access_check(client, window, &wire) == Access::Deny {
            tracing::warn!(
                "device {}: access denied delivering {:?} to client {} on window {}",
                self.id(),
                wire.event_type,
                client,
                window
            );
            return DeliveryOutcome::AccessDenied;
        }
        tracing::trace!(
            "device {}: {:?} detail {} -> client {} window {}",
            self.id(),
            wire.event_type,
            wire.detail,
            client,
            window
        );
        self.env.write_event_to_client(client, wire);
        DeliveryOutcome::Delivered
    }

    /// Resolves the client, window and mask a touch listener is served through.
    /// `None` means the listener is skipped for this event.
    pub(crate) fn retrieve_delivery_data(&self, listener: &Listener) -> Option<Recipient> {
        if listener.kind.is_grab() {
            let Some(grab) = listener.grab.as_ref() else {
                tracing::warn!("device {}: grab listener {} has no grab", self.id(), listener.resource);
                return None;
            };
            return Some(Recipient {
                client: grab.client,
                window: grab.window,
                level: grab.level,
                grab: Some(grab.clone()),
                mask: grab.event_mask,
            });
        }
        self.env.lookup_window(listener.window)?;
        let selection = self
            .env
            .selections(listener.window, self.id())
            .into_iter()
            .find(|s| s.resource == listener.resource)?;
        Some(Recipient {
            client: selection.client,
            window: listener.window,
            level: selection.level,
            grab: None,
            mask: selection.mask,
        })
    }

    /// Delivers one touch or ownership event to a listener's recipient.
    ///
    /// A client without the ownership mask is not told about a touch that a
    /// grab may still claim: the delivery is suppressed.
    pub(crate) fn deliver_one(&mut self, index: usize, recipient: &Recipient, event: &EventRecord) -> DeliveryOutcome {
        let num_grabs = self.dev.touches.get(index).num_grabs;
        if recipient.grab.is_none() && num_grabs != 0 && !recipient.mask.has(EventType::TouchOwnership) {
            return DeliveryOutcome::Suppressed;
        }
        self.write_to(recipient.client, recipient.window, recipient.level, event)
    }

    /// Delivers `event` to the grabbing client if the grab selects its type.
    /// Returns the number of clients written to.
    pub(crate) fn deliver_grabbed_event(&mut self, event: &EventRecord, grab: &Grab) -> usize {
        if !grab.event_mask.has(event.event_type()) {
            return 0;
        }
        match self.write_to(grab.client, grab.window, grab.level, event) {
            DeliveryOutcome::Delivered => 1,
            _ => 0,
        }
    }

    /// Propagates `event` from `start` towards the root and delivers it on the
    /// first window with a matching selection. With `grab`, only the grabbing
    /// client's selections count. Propagation stops after `stop_at`.
    ///
    /// A ButtonPress delivered this way with no active grab activates the
    /// implicit grab for the first recipient.
    pub(crate) fn deliver_device_events(
        &mut self,
        start: WindowId,
        event: &EventRecord,
        grab: Option<&Grab>,
        stop_at: Option<WindowId>,
    ) -> usize {
        let event_type = event.event_type();
        let ancestry = self.env.window_ancestry(start);
        for &window in ancestry.iter().rev() {
            let selections: Vec<Selection> = self
                .env
                .selections(window, self.id())
                .into_iter()
                .filter(|s| s.mask.has(event_type))
                .filter(|s| grab.map_or(true, |g| g.client == s.client))
                .collect();
            if !selections.is_empty() {
                let mut deliveries = 0;
                for selection in &selections {
                    if self.write_to(selection.client, window, selection.level, event) == DeliveryOutcome::Delivered {
                        deliveries += 1;
                    }
                }
                if deliveries > 0
                    && event_type == EventType::ButtonPress
                    && grab.is_none()
                    && self.env.active_grab_for(self.id()).is_none()
                {
                    self.env.activate_implicit_grab(self.id(), window, &selections[0]);
                }
                return deliveries;
            }
            if Some(window) == stop_at {
                break;
            }
        }
        0
    }

    /// Innermost window under the device's sprite at `event`'s position.
    pub(crate) fn sprite_window(&self, event: &EventRecord) -> WindowId {
        self.env
            .sprite_trace(self.id(), event.root)
            .last()
            .copied()
            .unwrap_or_else(|| self.env.root_window())
    }

    /// Delivers the legacy pointer event of a touch phase to the touch's
    /// pointer-emulating owner.
    pub(crate) fn deliver_emulated(
        &mut self,
        index: usize,
        mut resource: ResourceId,
        event: &EventRecord,
        recipient: &Recipient,
    ) -> EmulationOutcome {
        let device = self.id();
        let active = self.env.active_grab_for(device);
        let grab = recipient
            .grab
            .clone()
            .or_else(|| active.as_ref().map(|a| a.grab.clone()));

        let touch = self.dev.touches.get(index);
        let touch_id = touch.client_id;
        if !touch.resource_is_owner(resource) {
            return EmulationOutcome::NoActiveListener;
        }
        if !touch.emulate_pointer {
            return EmulationOutcome::NotEmulating;
        }
        if self.dev.touches.find_oldest_pointer_emulated_touch() != Some(index) {
            tracing::debug!("device {}: touch {} waits for an older emulated touch", device, touch_id);
            return EmulationOutcome::Deferred;
        }
        let Some(phase) = event.touch_phase() else {
            return EmulationOutcome::NotEmulating;
        };
        let Some((motion, button)) = event.to_pointer_events() else {
            return EmulationOutcome::NotEmulating;
        };
        let pointer_event = button.unwrap_or(motion);

        if let Some(grab) = grab {
            if phase == TouchPhase::Begin && active.is_none() {
                self.env.activate_passive_grab(device, &grab, &pointer_event);
                self.deliver_grabbed_event(&pointer_event, &grab);
            } else {
                let Some(active) = active else {
                    return EmulationOutcome::NoActiveListener;
                };
                let mut deliveries = 0;
                if grab.owner_events {
                    let sprite = self.sprite_window(&pointer_event);
                    deliveries = self.deliver_device_events(sprite, &pointer_event, Some(&grab), None);
                }
                if deliveries == 0 {
                    deliveries = self.deliver_grabbed_event(&pointer_event, &grab);
                }
                // A pointer listener that got an event past the press owns the touch.
                if deliveries > 0 && phase != TouchPhase::Begin && !event.flags.contains(EventFlags::CLIENT_ID) {
                    if let Err(err) = self.listener_accept_reject(index, 0, TouchVerdict::Accept) {
                        tracing::debug!("device {}: auto-accept of touch {} failed: {}", device, touch_id, err);
                    }
                    if !self.dev.touches.is_live(index, touch_id) {
                        return EmulationOutcome::Success;
                    }
                }
                if phase == TouchPhase::End
                    && self.dev.touches.get(index).listeners.len() == 1
                    && self.dev.state.buttons_down() == 0
                    && active.from_passive
                    && grab.is_pointer_grab()
                {
                    self.env.deactivate_grab(device);
                    self.check_oldest_touch();
                    return EmulationOutcome::Success;
                }
            }
        } else {
            let sprite = self.sprite_window(&pointer_event);
            self.deliver_device_events(sprite, &pointer_event, None, Some(recipient.window));
            if let Some(implicit) = self.env.active_grab_for(device).filter(|a| a.implicit) {
                if self.hand_over_to_implicit_grab(index, &implicit.grab) == Some(resource) {
                    resource = implicit.grab.resource;
                }
            }
        }

        if !self.dev.touches.is_live(index, touch_id) {
            return EmulationOutcome::Success;
        }
        if let Some(position) = self.dev.touches.get(index).listener_index(resource) {
            let listener = &mut self.dev.touches.get_mut(index).listeners[position];
            match phase {
                TouchPhase::Begin => listener.state = ListenerState::IsOwner,
                TouchPhase::End => listener.state = ListenerState::HasEnd,
                TouchPhase::Update => {}
            }
        }
        EmulationOutcome::Success
    }

    /// An implicit grab activated by delivering to the selection listener at
    /// the end of the chain takes over that listener's identity. Position and
    /// state are kept. Returns the resource that was replaced.
    fn hand_over_to_implicit_grab(&mut self, index: usize, grab: &Grab) -> Option<ResourceId> {
        let device = self.dev.id();
        let touch = self.dev.touches.get_mut(index);
        let last = touch.listeners.last_mut()?;
        let replaced = last.resource;
        let was_grab = last.grab.is_some();
        last.resource = grab.resource;
        last.client = grab.client;
        last.level = grab.level;
        last.grab = Some(grab.clone());
        last.kind = if grab.level == InputLevel::Xi2 && grab.kind == GrabKind::Touch {
            ListenerKind::Grab
        } else {
            ListenerKind::PointerGrab
        };
        if !was_grab {
            touch.num_grabs += 1;
        }
        touch.check_invariants();
        tracing::debug!(
            "device {}: implicit grab {} took over the last listener of touch {}",
            device,
            grab.resource,
            touch.client_id
        );
        Some(replaced)
    }

    /// Emulated motion preceding a touch's Begin or End.
    pub(crate) fn deliver_emulated_motion(&mut self, index: usize, event: &EventRecord) {
        let touch = self.dev.touches.get(index);
        match touch.listeners.first() {
            Some(owner) => {
                if !owner.kind.is_pointer() {
                    return;
                }
                let owner = owner.clone();
                let mut motion = event.clone();
                if let EventKind::Touch(data) = &mut motion.kind {
                    data.phase = TouchPhase::Update;
                    data.detail = 0;
                }
                let Some(recipient) = self.retrieve_delivery_data(&owner) else {
                    return;
                };
                self.deliver_emulated(index, owner.resource, &motion, &recipient);
            }
            None => {
                if let Some((motion, _)) = event.to_pointer_events() {
                    self.process_device_event(motion);
                }
            }
        }
    }

    /// Raw events go to raw selections on the root window and to the active
    /// grab, if it selects the raw type.
    pub(crate) fn deliver_raw(&mut self, event: &EventRecord) {
        let event_type = event.event_type();
        let root = self.env.root_window();
        let selections: Vec<Selection> = self
            .env
            .selections(root, self.id())
            .into_iter()
            .filter(|s| s.level == InputLevel::Xi2 && s.mask.has(event_type))
            .collect();
        for selection in &selections {
            self.write_to(selection.client, root, InputLevel::Xi2, event);
        }
        if let Some(active) = self.env.active_grab_for(self.id()) {
            if active.grab.level == InputLevel::Xi2 && active.grab.event_mask.has(event_type) {
                self.write_to(active.grab.client, active.grab.window, InputLevel::Xi2, event);
            }
        }
    }

    /// Barrier events bypass the touch chain entirely.
    pub(crate) fn deliver_barrier(&mut self, mut event: EventRecord) {
        if !self.dev.is_master() {
            return;
        }
        let EventKind::Barrier(barrier) = &event.kind else {
            return;
        };
        let (window, owner) = (barrier.window, barrier.owner);
        if self.env.lookup_window(window).is_none() {
            tracing::debug!("device {}: barrier window {} is gone", self.id(), window);
            return;
        }
        let active = self.env.active_grab_for(self.id());
        if active.is_some() {
            event.flags |= EventFlags::DEVICE_IS_GRABBED;
        }
        match active {
            Some(active) if active.grab.client == owner && active.grab.window == window => {
                self.deliver_grabbed_event(&event, &active.grab);
            }
            _ => {
                let event_type = event.event_type();
                let selections: Vec<Selection> = self
                    .env
                    .selections(window, self.id())
                    .into_iter()
                    .filter(|s| s.mask.has(event_type))
                    .collect();
                for selection in &selections {
                    self.write_to(selection.client, window, selection.level, &event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceDescriptor};
    use crate::env::{GrabMode, Selection};
    use crate::event::EventMask;
    use crate::sim::{Rect, SimEnvironment};
    use crate::types::Point;

    fn env() -> SimEnvironment {
        let mut env = SimEnvironment::new(WindowId(1), ClientId(0), Rect::new(0.0, 0.0, 100.0, 100.0));
        env.add_window(WindowId(2), WindowId(1), ClientId(10), Rect::new(0.0, 0.0, 50.0, 50.0));
        env
    }

    #[test]
    fn test_device_events_propagate_and_start_implicit_grab() {
        let mut env = env();
        env.select(
            WindowId(1),
            Selection {
                client: ClientId(10),
                resource: ResourceId(0x100),
                level: InputLevel::Core,
                mask: EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
            },
        );
        let mut device = Device::new(DeviceDescriptor::touchscreen(DeviceId(2), "ts"), 2);
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        let press = EventRecord::button_press(DeviceId(2), 1).at(Point::new(10.0, 10.0));
        let start = ctx.sprite_window(&press);
        assert_eq!(start, WindowId(2));
        assert_eq!(ctx.deliver_device_events(start, &press, None, None), 1);

        let active = env.active_grab_for(DeviceId(2)).unwrap();
        assert!(active.implicit && active.from_passive);
        assert_eq!(active.grab.client, ClientId(10));
        assert_eq!(active.grab.window, WindowId(1));
        assert_eq!(env.writes().len(), 1);
        assert_eq!(env.writes()[0].1.window, WindowId(1));
    }

    #[test]
    fn test_access_denied_is_not_written() {
        let mut env = env();
        env.deny_access(ClientId(10), WindowId(2));
        let mut device = Device::new(DeviceDescriptor::touchscreen(DeviceId(2), "ts"), 2);
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        let event = EventRecord::motion(DeviceId(2), Point::default());
        assert_eq!(
            ctx.write_to(ClientId(10), WindowId(2), InputLevel::Xi2, &event),
            DeliveryOutcome::AccessDenied
        );
        assert_eq!(
            ctx.write_to(ClientId(10), WindowId(1), InputLevel::Xi2, &event),
            DeliveryOutcome::Delivered
        );
        assert_eq!(env.writes().len(), 1);
    }

    #[test]
    fn test_grabbed_event_filtered_by_mask() {
        let mut env = env();
        let mut device = Device::new(DeviceDescriptor::touchscreen(DeviceId(2), "ts"), 2);
        let grab = Grab {
            resource: ResourceId(0x200),
            client: ClientId(20),
            window: WindowId(1),
            level: InputLevel::Xi2,
            kind: GrabKind::Pointer,
            owner_events: false,
            mode: GrabMode::Async,
            event_mask: EventMask::BUTTON_PRESS,
        };
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        assert_eq!(ctx.deliver_grabbed_event(&EventRecord::button_press(DeviceId(2), 1), &grab), 1);
        assert_eq!(ctx.deliver_grabbed_event(&EventRecord::button_release(DeviceId(2), 1), &grab), 0);
    }
}
