//! Event dispatch.
//!
//! [`InputCore`] owns the device registry and the collaborator. Every event
//! enters through [`InputCore::dispatch`], which classifies it and routes it
//! through the device state updater, the ownership resolver and delivery.

use xitouch_core::TouchConfig;

use crate::delivery::DeviceContext;
use crate::device::{Device, DeviceDescriptor, DeviceRegistry, PhysicalTouch};
use crate::device_state::StateUpdate;
use crate::env::InputEnvironment;
use crate::error::EngineError;
use crate::event::{EventFlags, EventKind, EventRecord, TouchPhase};
use crate::resolver::TouchVerdict;
use crate::touch::TouchPoint;
use crate::types::{ClientId, DeviceId, ResourceId, TouchId, WindowId};

pub struct InputCore<E: InputEnvironment> {
    env: E,
    devices: DeviceRegistry,
    history_size: usize,
    initial_slots: usize,
}

impl<E: InputEnvironment> InputCore<E> {
    pub fn new(env: E, touch: &TouchConfig) -> Self {
        Self {
            env,
            devices: DeviceRegistry::new(),
            history_size: touch.history_size,
            initial_slots: touch.initial_slots,
        }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn register_device(&mut self, descriptor: DeviceDescriptor) -> Result<(), EngineError> {
        let id = descriptor.id;
        let name = descriptor.name.clone();
        self.devices.add(Device::new(descriptor, self.initial_slots))?;
        tracing::info!("Registered input device {} ({})", id, name);
        Ok(())
    }

    fn context(&mut self, device: DeviceId) -> Result<DeviceContext<'_>, EngineError> {
        let dev = self.devices.get_mut(device).ok_or(EngineError::BadDevice(device))?;
        Ok(DeviceContext::new(dev, &mut self.env, self.history_size))
    }

    /// Processes one event to completion.
    pub fn dispatch(&mut self, event: EventRecord) -> Result<(), EngineError> {
        let mut ctx = self.context(event.device)?;
        ctx.process_event(event);
        Ok(())
    }

    pub fn accept_or_reject_touch(
        &mut self,
        device: DeviceId,
        touch_id: TouchId,
        resource: ResourceId,
        verdict: TouchVerdict,
    ) -> Result<(), EngineError> {
        self.context(device)?.accept_or_reject(touch_id, resource, verdict)
    }

    /// Same as [`Self::accept_or_reject_touch`], for a request that names the
    /// client and its grab window instead of a resource.
    pub fn accept_or_reject_touch_for_client(
        &mut self,
        device: DeviceId,
        touch_id: TouchId,
        client: ClientId,
        window: WindowId,
        verdict: TouchVerdict,
    ) -> Result<(), EngineError> {
        self.context(device)?
            .accept_or_reject_for_client(touch_id, client, window, verdict)
    }

    /// Cuts `window` and everything below it out of every touch and gesture
    /// trace. Must run before the window is freed.
    pub fn window_destroyed(&mut self, window: WindowId) {
        for id in self.devices.ids() {
            if let Ok(mut ctx) = self.context(id) {
                ctx.truncate_traces(window);
            }
        }
    }

    /// Drops every touch and gesture record of `device`.
    pub fn device_removed(&mut self, device: DeviceId) -> Result<(), EngineError> {
        let removed = self.devices.remove(device).ok_or(EngineError::BadDevice(device))?;
        let live = removed.touches().iter_active().count();
        if self.env.active_grab_for(device).is_some() {
            self.env.deactivate_grab(device);
        }
        tracing::info!(
            "Removed input device {} ({}), dropping {} active touches",
            device,
            removed.name(),
            live
        );
        Ok(())
    }

    /// Rejects every listener `client` holds, on every device.
    pub fn client_gone(&mut self, client: ClientId) {
        for id in self.devices.ids() {
            if let Ok(mut ctx) = self.context(id) {
                ctx.listener_gone(client);
            }
        }
    }

    /// Sends a TouchEnd for every touch the hardware still reports as down.
    pub fn end_physically_active_touches(&mut self, device: DeviceId) -> Result<(), EngineError> {
        let touches: Vec<PhysicalTouch> = self
            .devices
            .get(device)
            .ok_or(EngineError::BadDevice(device))?
            .physically_active_touches()
            .to_vec();
        for touch in touches {
            let mut end = EventRecord::touch(device, TouchPhase::End, touch.touch_id, touch.root)
                .with_source(touch.source_device)
                .with_detail(touch.detail);
            if touch.emulate_pointer {
                end = end.with_flags(EventFlags::POINTER_EMULATED);
            }
            self.dispatch(end)?;
        }
        Ok(())
    }

    /// Accepts `touch_id` on behalf of its owner and finishes it.
    pub fn accept_and_end(&mut self, device: DeviceId, touch_id: TouchId) -> Result<(), EngineError> {
        self.context(device)?.accept_and_end(touch_id);
        Ok(())
    }

    pub fn find_oldest_pointer_emulated_touch(&self, device: DeviceId) -> Option<TouchId> {
        let touches = self.devices.get(device)?.touches();
        touches
            .find_oldest_pointer_emulated_touch()
            .map(|index| touches.get(index).touch_id())
    }

    pub fn touch(&self, device: DeviceId, touch_id: TouchId) -> Option<&TouchPoint> {
        self.devices.get(device)?.touches().by_id(touch_id)
    }
}

impl DeviceContext<'_> {
    pub(crate) fn process_event(&mut self, event: EventRecord) {
        match &event.kind {
            EventKind::Raw { .. } => self.deliver_raw(&event),
            EventKind::Touch(data) => {
                if !event.flags.intersects(EventFlags::CLIENT_ID | EventFlags::REPLAYING) {
                    if self.dev.state.apply(&event) == StateUpdate::DoNotProcess && data.phase == TouchPhase::Begin {
                        tracing::debug!("device {}: dropping vetoed begin of touch {}", self.id(), data.touch_id);
                        return;
                    }
                    match data.phase {
                        TouchPhase::Begin => self.dev.note_physical_begin(PhysicalTouch {
                            touch_id: data.touch_id,
                            source_device: event.source_device,
                            emulate_pointer: event.flags.contains(EventFlags::POINTER_EMULATED),
                            detail: data.detail,
                            root: event.root,
                        }),
                        TouchPhase::End => self.dev.note_physical_end(data.touch_id),
                        TouchPhase::Update => {}
                    }
                }
                self.process_touch(event);
            }
            EventKind::Ownership(_) => self.process_ownership(event),
            EventKind::Barrier(_) => self.deliver_barrier(event),
            EventKind::Gesture(_) => self.process_gesture(event),
            _ => self.process_device_event(event),
        }
    }

    /// Keys, buttons, motion, proximity and device changes.
    pub(crate) fn process_device_event(&mut self, mut event: EventRecord) {
        let device = self.id();
        if self.dev.state.apply(&event) == StateUpdate::DoNotProcess {
            return;
        }
        if let EventKind::ButtonPress { button } | EventKind::ButtonRelease { button } = &mut event.kind {
            let logical = self.dev.state.map_button(*button);
            if logical == 0 {
                return;
            }
            *button = logical;
        }

        let active = self.env.active_grab_for(device);
        let mut deactivate = false;
        match &event.kind {
            EventKind::KeyPress { .. } | EventKind::ButtonPress { .. } => {
                if active.is_none() && self.check_device_grabs(&event) {
                    return;
                }
            }
            EventKind::KeyRelease { keycode } => {
                deactivate = active
                    .as_ref()
                    .map_or(false, |a| a.from_passive && a.activating_key == Some(*keycode));
            }
            EventKind::ButtonRelease { .. } => {
                deactivate = self.dev.state.buttons_down() == 0
                    && active.as_ref().map_or(false, |a| a.from_passive && a.grab.is_pointer_grab());
            }
            _ => {}
        }

        match active {
            Some(active) => {
                let mut deliveries = 0;
                if active.grab.owner_events {
                    let start = self.event_window(&event);
                    deliveries = self.deliver_device_events(start, &event, Some(&active.grab), None);
                }
                if deliveries == 0 {
                    self.deliver_grabbed_event(&event, &active.grab);
                }
            }
            None => {
                let start = self.event_window(&event);
                self.deliver_device_events(start, &event, None, None);
            }
        }

        if deactivate {
            self.env.deactivate_grab(device);
        }
    }

    /// Sprite window for pointer events, focus window (or sprite) for the rest.
    fn event_window(&self, event: &EventRecord) -> WindowId {
        if event.is_pointer_event() {
            return self.sprite_window(event);
        }
        self.env
            .focus_window(self.id())
            .unwrap_or_else(|| self.sprite_window(event))
    }

    /// Activates the first passive grab root to leaf that `event` triggers
    /// and delivers the event to it.
    fn check_device_grabs(&mut self, event: &EventRecord) -> bool {
        let device = self.id();
        let start = self.event_window(event);
        for window in self.env.window_ancestry(start) {
            if let Some(grab) = self.env.passive_grab_on_window(window, device, event, false) {
                self.env.activate_passive_grab(device, &grab, event);
                self.deliver_grabbed_event(event, &grab);
                return true;
            }
        }
        false
    }
}
