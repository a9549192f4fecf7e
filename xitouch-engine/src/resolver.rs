//! Touch ownership resolution.
//!
//! Builds each touch's listener chain, decides per phase which listeners see
//! the event, and moves ownership along the chain on accept and reject.
//! Listener chains are only mutated from this module (and by the implicit
//! grab hand-over in [`crate::delivery`]).
//!
//! Any call that can deliver may end the touch being processed, so the slot is
//! re-checked with [`TouchTable::is_live`](crate::touch::TouchTable) after it.

use serde::Deserialize;

use crate::delivery::{DeliveryOutcome, DeviceContext, EmulationOutcome, Recipient};
use crate::env::{Grab, GrabMode};
use crate::error::EngineError;
use crate::event::{EventFlags, EventKind, EventRecord, EventType, OwnershipReason, TouchPhase};
use crate::listener::{Listener, ListenerKind, ListenerState};
use crate::types::{ClientId, InputLevel, ResourceId, TouchId, WindowId};

/// A client's decision on a touch it listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchVerdict {
    Accept,
    Reject,
}

impl TouchVerdict {
    fn reason(self) -> OwnershipReason {
        match self {
            TouchVerdict::Accept => OwnershipReason::Accept,
            TouchVerdict::Reject => OwnershipReason::Reject,
        }
    }
}

fn listener_kind_for_grab(grab: &Grab) -> ListenerKind {
    if is_touch_begin_grab(grab) {
        ListenerKind::Grab
    } else {
        ListenerKind::PointerGrab
    }
}

fn is_touch_begin_grab(grab: &Grab) -> bool {
    grab.level == InputLevel::Xi2 && grab.event_mask.has(EventType::TouchBegin)
}

impl DeviceContext<'_> {
    fn is_live(&self, index: usize, touch_id: TouchId) -> bool {
        self.dev.touches.is_live(index, touch_id)
    }

    fn listener_at(&self, index: usize, resource: ResourceId) -> Option<&Listener> {
        let touch = self.dev.touches.get(index);
        touch.listeners.iter().find(|l| l.resource == resource)
    }

    fn listener_mut(&mut self, index: usize, resource: ResourceId) -> Option<&mut Listener> {
        let touch = self.dev.touches.get_mut(index);
        touch.listeners.iter_mut().find(|l| l.resource == resource)
    }

    fn set_state(&mut self, index: usize, resource: ResourceId, state: ListenerState) {
        if let Some(listener) = self.listener_mut(index, resource) {
            listener.state = state;
        }
    }

    /// Entry point for TouchBegin, TouchUpdate and TouchEnd.
    pub(crate) fn process_touch(&mut self, event: EventRecord) {
        if !self.dev.has_touch() {
            return;
        }
        let Some(data) = event.touch_data().cloned() else {
            return;
        };
        let device = self.id();
        let emulate = event.flags.contains(EventFlags::POINTER_EMULATED);
        let replaying = event.flags.contains(EventFlags::REPLAYING);

        let mut found = if data.phase == TouchPhase::Begin && !replaying {
            match self
                .dev
                .touches
                .begin_touch(device, event.source_device, data.touch_id, emulate)
            {
                Ok(index) => Some(index),
                Err(err) => {
                    tracing::warn!("{}", err);
                    None
                }
            }
        } else {
            self.dev.touches.find_by_client_id(data.touch_id)
        };

        // An explicit pointer grab that does not want touch events claims
        // emulated touches outright.
        if emulate {
            if let Some(active) = self.env.active_grab_for(device) {
                let pointer_grab = !is_touch_begin_grab(&active.grab);
                if !active.from_passive && pointer_grab {
                    let existing = found;
                    match existing {
                        Some(index) if data.phase == TouchPhase::End => {
                            if let Err(err) = self.listener_accept_reject(index, 0, TouchVerdict::Accept) {
                                tracing::debug!("device {}: {}", device, err);
                            }
                        }
                        None if data.phase != TouchPhase::Begin => {
                            match self
                                .dev
                                .touches
                                .begin_touch(device, event.source_device, data.touch_id, emulate)
                            {
                                Ok(index) => {
                                    if !self.build_trace(index, &event) {
                                        self.dev.touches.release(index);
                                        return;
                                    }
                                    self.setup_listeners(index, &event);
                                    found = Some(index);
                                }
                                Err(err) => {
                                    tracing::debug!("device {}: no record for grabbed touch: {}", device, err);
                                    return;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let Some(index) = found else {
            tracing::debug!(
                "device {}: dropping {:?} for touch {} without an active record",
                device,
                data.phase,
                data.touch_id
            );
            return;
        };
        if !self.is_live(index, data.touch_id) {
            return;
        }

        if emulate
            && (data.phase == TouchPhase::Begin
                || (data.phase == TouchPhase::End && !self.dev.touches.get(index).listeners.is_empty()))
        {
            self.deliver_emulated_motion(index, &event);
            if !self.is_live(index, data.touch_id) {
                return;
            }
        }

        if data.phase == TouchPhase::Begin && !replaying {
            if !self.build_trace(index, &event) {
                tracing::debug!("device {}: no window under touch {}", device, data.touch_id);
                self.dev.touches.release(index);
                return;
            }
        } else if data.phase != TouchPhase::End && self.dev.touches.get(index).spatial_trace.is_empty() {
            return;
        }

        self.dev.touches.get_mut(index).copy_event_data(&event);
        let mut event = event;
        self.deliver_touch_events(index, &mut event, data.resource);
        if event.touch_phase() == Some(TouchPhase::End) && self.is_live(index, data.touch_id) {
            self.end_touch(index);
        }
    }

    fn build_trace(&mut self, index: usize, event: &EventRecord) -> bool {
        let trace = self.env.sprite_trace(self.id(), event.root);
        if trace.is_empty() {
            return false;
        }
        let touch = self.dev.touches.get_mut(index);
        touch.spatial_trace = trace;
        if let Some(data) = event.touch_data() {
            touch.detail = data.detail;
        }
        true
    }

    /// Populates the listener chain: the explicit active grab, then passive
    /// grabs root to leaf, then the innermost touch selections.
    pub(crate) fn setup_listeners(&mut self, index: usize, event: &EventRecord) {
        let device = self.id();
        if let Some(active) = self.env.active_grab_for(device) {
            if !active.from_passive {
                self.add_active_grab_listener(index, &active.grab);
            }
        }

        // Existing touches picked up by an explicit grab get no other listeners.
        if event.touch_phase() != Some(TouchPhase::Begin) {
            return;
        }

        let trace = self.dev.touches.get(index).spatial_trace.clone();
        let check_core = self.dev.is_master() && self.dev.touches.get(index).emulate_pointer;
        for &window in &trace {
            if let Some(grab) = self.env.passive_grab_on_window(window, device, event, check_core) {
                self.add_grab_listener(index, &grab);
            }
        }

        for &window in trace.iter().rev() {
            if self.add_regular_listeners(index, window) {
                return;
            }
        }
    }

    fn add_grab_listener(&mut self, index: usize, grab: &Grab) {
        let history_size = self.history_size;
        let touch = self.dev.touches.get_mut(index);
        let needs_history = match grab.level {
            InputLevel::Xi2 => !grab.event_mask.has(EventType::TouchOwnership),
            InputLevel::Core | InputLevel::Xi1 => true,
        };
        if needs_history {
            touch.allocate_history(history_size);
        }
        touch.add_listener(Listener::for_grab(grab, listener_kind_for_grab(grab)));
    }

    fn add_active_grab_listener(&mut self, index: usize, grab: &Grab) {
        if !self.dev.touches.get(index).emulate_pointer && !is_touch_begin_grab(grab) {
            return;
        }
        self.add_grab_listener(index, grab);
    }

    /// Adds the selections on `window` that match the touch. Every XI2 touch
    /// selection is added; failing that, an emulating touch gets the first
    /// pointer selection (XI2, then XI1, then core).
    fn add_regular_listeners(&mut self, index: usize, window: WindowId) -> bool {
        let selections = self.env.selections(window, self.id());
        let history_size = self.history_size;
        let touch = self.dev.touches.get_mut(index);

        let mut added = false;
        for selection in selections
            .iter()
            .filter(|s| s.level == InputLevel::Xi2 && s.mask.has(EventType::TouchBegin))
        {
            if !selection.mask.has(EventType::TouchOwnership) {
                touch.allocate_history(history_size);
            }
            touch.add_listener(Listener::for_selection(
                selection.resource,
                selection.client,
                InputLevel::Xi2,
                ListenerKind::Regular,
                window,
            ));
            added = true;
        }
        if added || !touch.emulate_pointer {
            return added;
        }

        for level in [InputLevel::Xi2, InputLevel::Xi1, InputLevel::Core] {
            if let Some(selection) = selections
                .iter()
                .find(|s| s.level == level && s.mask.has(EventType::ButtonPress))
            {
                touch.allocate_history(history_size);
                touch.add_listener(Listener::for_selection(
                    selection.resource,
                    selection.client,
                    level,
                    ListenerKind::PointerRegular,
                    window,
                ));
                return true;
            }
        }
        false
    }

    /// Delivers a touch phase or ownership event along the chain, or only to
    /// the listener for `resource`. Begin events set up the chain first.
    pub(crate) fn deliver_touch_events(&mut self, index: usize, event: &mut EventRecord, resource: Option<ResourceId>) {
        let touch_id = self.dev.touches.get(index).client_id;
        if event.touch_phase() == Some(TouchPhase::Begin)
            && !event.flags.intersects(EventFlags::CLIENT_ID | EventFlags::REPLAYING)
        {
            self.setup_listeners(index, event);
        }
        self.dev.touches.get_mut(index).push_history(event);

        let mut position = 0;
        while self.is_live(index, touch_id) {
            let touch = self.dev.touches.get(index);
            let Some(listener) = touch.listeners.get(position).cloned() else {
                break;
            };
            let before = touch.listeners.len();
            let at = position;
            position += 1;
            if resource.map_or(false, |r| r != listener.resource) {
                continue;
            }
            let Some(recipient) = self.retrieve_delivery_data(&listener) else {
                continue;
            };
            self.deliver_touch_event(index, &listener, event, &recipient);
            if !self.is_live(index, touch_id) {
                break;
            }
            let touch = self.dev.touches.get(index);
            position = match touch.listener_index(listener.resource) {
                Some(current) => current + 1,
                None if touch.listeners.len() < before => at,
                None => at + 1,
            };
        }
    }

    fn deliver_touch_event(
        &mut self,
        index: usize,
        listener: &Listener,
        event: &mut EventRecord,
        recipient: &Recipient,
    ) {
        let resource = listener.resource;
        let has_ownership_mask = recipient.mask.has(EventType::TouchOwnership);
        let is_owner = self.dev.touches.get(index).resource_is_owner(resource);

        let phase = match &event.kind {
            EventKind::Ownership(_) => {
                if !is_owner {
                    return;
                }
                if !listener.kind.is_pointer() {
                    self.deliver_one(index, recipient, event);
                }
                self.set_state(index, resource, ListenerState::IsOwner);
                return;
            }
            EventKind::Touch(data) => data.phase,
            _ => return,
        };

        match phase {
            TouchPhase::Begin => self.deliver_touch_begin(index, listener, event, recipient),
            TouchPhase::Update => {
                if listener.kind.is_pointer() {
                    self.deliver_emulated(index, resource, event, recipient);
                } else if is_owner || has_ownership_mask || listener.seen_begin {
                    self.deliver_one(index, recipient, event);
                }
            }
            TouchPhase::End => self.deliver_touch_end(index, listener, event, recipient),
        }
    }

    fn deliver_touch_begin(&mut self, index: usize, listener: &Listener, event: &EventRecord, recipient: &Recipient) {
        let resource = listener.resource;
        let touch_id = self.dev.touches.get(index).client_id;

        if listener.kind.is_pointer() {
            // Delivery may hand this listener over to an implicit grab, so
            // follow it by position.
            let Some(position) = self.dev.touches.get(index).listener_index(resource) else {
                return;
            };
            if self.deliver_emulated(index, resource, event, recipient) != EmulationOutcome::Success
                || !self.is_live(index, touch_id)
            {
                return;
            }
            let Some(current) = self.dev.touches.get_mut(index).listeners.get_mut(position) else {
                return;
            };
            current.state = ListenerState::IsOwner;
            // Async grabs cannot replay, so they take the touch right away.
            if current.kind == ListenerKind::PointerGrab {
                if let Some(active) = self.env.active_grab_for(self.id()) {
                    if active.from_passive && active.grab.mode == GrabMode::Async {
                        self.activate_early_accept(index);
                    }
                }
            }
            return;
        }

        let touch = self.dev.touches.get(index);
        let is_owner = touch.resource_is_owner(resource);
        let has_ownership_mask = recipient.mask.has(EventType::TouchOwnership);
        let shared = listener.kind == ListenerKind::Regular && touch.num_grabs == 0 && touch.listeners.len() > 1;

        if is_owner || has_ownership_mask || shared {
            if self.deliver_one(index, recipient, event) != DeliveryOutcome::Suppressed {
                if let Some(l) = self.listener_mut(index, resource) {
                    l.seen_begin = true;
                }
            }
        }

        let state = if !is_owner {
            if has_ownership_mask {
                ListenerState::AwaitingOwner
            } else {
                ListenerState::AwaitingBegin
            }
        } else {
            if has_ownership_mask {
                self.send_ownership(index, resource);
                if !self.is_live(index, touch_id) {
                    return;
                }
            }
            match listener.kind {
                ListenerKind::Regular if self.dev.touches.get(index).listeners.len() == 1 => ListenerState::HasAccepted,
                ListenerKind::Regular if has_ownership_mask => ListenerState::IsOwner,
                ListenerKind::Regular => ListenerState::AwaitingBegin,
                _ => ListenerState::IsOwner,
            }
        };
        self.set_state(index, resource, state);
    }

    fn deliver_touch_end(&mut self, index: usize, listener: &Listener, event: &mut EventRecord, recipient: &Recipient) {
        let resource = listener.resource;
        let touch_id = self.dev.touches.get(index).client_id;

        if listener.kind.is_pointer() {
            if listener.state != ListenerState::HasEnd {
                match self.deliver_emulated(index, resource, event, recipient) {
                    EmulationOutcome::Success => {
                        if self.is_live(index, touch_id) {
                            self.set_state(index, resource, ListenerState::HasEnd);
                        }
                    }
                    EmulationOutcome::Deferred => self.defer_end(index, event),
                    EmulationOutcome::NotEmulating | EmulationOutcome::NoActiveListener => {}
                }
            }
            return;
        }

        // Never saw the Begin, so it gets no End either.
        if listener.state == ListenerState::AwaitingBegin && !listener.seen_begin {
            self.set_state(index, resource, ListenerState::HasEnd);
            return;
        }

        let flags = event.flags;
        let is_owner = self.dev.touches.get(index).resource_is_owner(resource);
        if flags.contains(EventFlags::TOUCH_REJECT) || (flags.contains(EventFlags::TOUCH_ACCEPT) && !is_owner) {
            if listener.state != ListenerState::HasEnd {
                self.deliver_one(index, recipient, event);
            }
            self.set_state(index, resource, ListenerState::HasEnd);
        } else if is_owner {
            let normal_end = !flags.contains(EventFlags::TOUCH_ACCEPT);
            if normal_end && listener.state != ListenerState::HasEnd {
                self.deliver_one(index, recipient, event);
            }
            if !self.is_live(index, touch_id) {
                return;
            }
            let touch = self.dev.touches.get(index);
            let unresolved = touch.listeners.len() > 1
                || (touch.num_grabs > 0 && listener.state != ListenerState::HasAccepted);
            if unresolved && !flags.intersects(EventFlags::TOUCH_ACCEPT | EventFlags::TOUCH_REJECT) {
                self.defer_end(index, event);
            }
            if normal_end {
                self.set_state(index, resource, ListenerState::HasEnd);
            }
        }
    }

    /// Turns an End that cannot complete yet into a pending-end Update.
    fn defer_end(&mut self, index: usize, event: &mut EventRecord) {
        if let EventKind::Touch(data) = &mut event.kind {
            data.phase = TouchPhase::Update;
        }
        event.flags |= EventFlags::PENDING_END;
        self.dev.touches.get_mut(index).pending_finish = true;
    }

    fn send_ownership(&mut self, index: usize, resource: ResourceId) {
        let touch = self.dev.touches.get(index);
        let event = EventRecord::ownership(self.id(), touch.client_id, OwnershipReason::None, resource)
            .with_source(touch.source_device)
            .with_time(touch.time);
        self.process_ownership(event);
    }

    /// Handles an accept, a reject, or the first ownership notification for
    /// a listener.
    pub(crate) fn process_ownership(&mut self, event: EventRecord) {
        let EventKind::Ownership(data) = &event.kind else {
            return;
        };
        let data = data.clone();
        let Some(index) = self.dev.touches.find_by_client_id(data.touch_id) else {
            tracing::debug!(
                "device {}: ownership {:?} for touch {} without an active record",
                self.id(),
                data.reason,
                data.touch_id
            );
            return;
        };

        match data.reason {
            OwnershipReason::Reject => self.touch_rejected(index, data.resource, true),
            OwnershipReason::Accept => self.touch_accepted(index),
            OwnershipReason::None => {
                let mut event = event;
                self.deliver_touch_events(index, &mut event, Some(data.resource));
            }
        }
    }

    /// The owner accepted: everyone else gets an End and leaves the chain.
    fn touch_accepted(&mut self, index: usize) {
        let touch = self.dev.touches.get(index);
        let touch_id = touch.client_id;
        let Some(owner) = touch.listeners.first().cloned() else {
            return;
        };
        let others: Vec<ResourceId> = touch.listeners[1..].iter().map(|l| l.resource).collect();

        // An owner that already saw the End still goes through the motions
        // so the record is finished.
        if owner.state == ListenerState::HasEnd {
            self.emit_touch_end(index, EventFlags::TOUCH_ACCEPT, Some(owner.resource));
        }
        for resource in others {
            if !self.is_live(index, touch_id) {
                return;
            }
            self.emit_touch_end(index, EventFlags::TOUCH_ACCEPT, Some(resource));
        }
        if !self.is_live(index, touch_id) {
            return;
        }

        let touch = self.dev.touches.get_mut(index);
        while touch.listeners.len() > 1 {
            let resource = touch.listeners[1].resource;
            touch.remove_listener(resource);
        }
        let Some(owner) = touch.listeners.first_mut() else {
            return;
        };
        if owner.state == ListenerState::HasEnd {
            self.end_touch(index);
        } else {
            owner.state = ListenerState::HasAccepted;
        }
    }

    /// Removes `resource` from the chain after sending it an End. With
    /// `punt`, a removed owner hands over to the next listener.
    pub(crate) fn touch_rejected(&mut self, index: usize, resource: ResourceId, punt: bool) {
        let touch = self.dev.touches.get(index);
        let touch_id = touch.client_id;
        let Some(state) = self.listener_at(index, resource).map(|l| l.state) else {
            tracing::debug!(
                "device {}: resource {} is not listening to touch {}",
                self.id(),
                resource,
                touch_id
            );
            return;
        };
        let was_owner = touch.resource_is_owner(resource);

        if state != ListenerState::HasEnd {
            self.emit_touch_end(index, EventFlags::TOUCH_REJECT, Some(resource));
        }
        if self.is_live(index, touch_id) {
            let touch = self.dev.touches.get_mut(index);
            touch.remove_listener(resource);
            let remaining = touch.listeners.len();
            if punt && remaining > 0 && was_owner {
                self.punt_to_next_owner(index);
            } else if remaining == 0 {
                self.end_touch(index);
            }
        }
        self.check_oldest_touch();
    }

    /// Makes the new listener 0 the owner: ownership notification, or a
    /// history replay if it never saw the Begin. A pending End is emitted
    /// once ownership is unambiguous.
    pub(crate) fn punt_to_next_owner(&mut self, index: usize) {
        let touch = self.dev.touches.get(index);
        let touch_id = touch.client_id;
        let Some(owner) = touch.listeners.first().cloned() else {
            return;
        };
        let accepted_early = owner.state == ListenerState::EarlyAccept;

        match owner.state {
            ListenerState::AwaitingOwner | ListenerState::EarlyAccept => {
                self.send_ownership(index, owner.resource);
            }
            ListenerState::AwaitingBegin if owner.seen_begin => {
                self.set_state(index, owner.resource, ListenerState::IsOwner);
            }
            ListenerState::AwaitingBegin => {
                // Pointer listeners wait until every older emulated touch is done.
                if owner.kind.is_pointer() && self.dev.touches.find_oldest_pointer_emulated_touch() != Some(index) {
                    return;
                }
                self.history_replay(index, owner.resource);
            }
            _ => {}
        }
        if !self.is_live(index, touch_id) {
            return;
        }

        if self.dev.touches.get(index).pending_finish {
            self.emit_touch_end(index, EventFlags::empty(), None);
            if !self.is_live(index, touch_id) {
                return;
            }
            let touch = self.dev.touches.get(index);
            let owner_is_touch_grab = touch
                .listeners
                .first()
                .and_then(|l| l.grab.as_ref())
                .map_or(false, is_touch_begin_grab);
            if touch.listeners.len() == 1 && (touch.num_grabs == 0 || !owner_is_touch_grab) {
                self.end_touch(index);
                return;
            }
        }

        if accepted_early {
            self.activate_early_accept(index);
        }
    }

    fn activate_early_accept(&mut self, index: usize) {
        if let Err(err) = self.listener_accept_reject(index, 0, TouchVerdict::Accept) {
            tracing::warn!("device {}: failed to accept touch after early acceptance: {}", self.id(), err);
        }
    }

    /// Restarts the oldest emulated touch if it stalled behind an older one.
    pub(crate) fn check_oldest_touch(&mut self) {
        let Some(oldest) = self.dev.touches.find_oldest_pointer_emulated_touch() else {
            return;
        };
        let waiting = self.dev.touches.get(oldest).listeners.first().map(|l| l.state);
        if waiting == Some(ListenerState::AwaitingBegin) {
            self.punt_to_next_owner(oldest);
        }
    }

    /// Applies a verdict through the listener at `position`. Only listener 0
    /// can resolve the touch; later listeners reject directly or accept early.
    pub(crate) fn listener_accept_reject(
        &mut self,
        index: usize,
        position: usize,
        verdict: TouchVerdict,
    ) -> Result<(), EngineError> {
        let device = self.id();
        let touch = self.dev.touches.get(index);
        let Some(listener) = touch.listeners.get(position) else {
            tracing::warn!(
                "device {}: listener {} out of range for touch {} ({} listeners)",
                device,
                position,
                touch.client_id,
                touch.listeners.len()
            );
            return Err(EngineError::NoSuchListener {
                device,
                touch_id: touch.client_id,
                resource: ResourceId(0),
            });
        };
        let resource = listener.resource;

        if position > 0 {
            match verdict {
                TouchVerdict::Reject => self.touch_rejected(index, resource, false),
                TouchVerdict::Accept => self.set_state(index, resource, ListenerState::EarlyAccept),
            }
            return Ok(());
        }

        let event = EventRecord::ownership(device, touch.client_id, verdict.reason(), resource)
            .with_source(touch.source_device)
            .with_time(touch.time);
        self.process_ownership(event);
        Ok(())
    }

    /// Accept or reject request for the listener registered as `resource`.
    pub(crate) fn accept_or_reject(
        &mut self,
        touch_id: TouchId,
        resource: ResourceId,
        verdict: TouchVerdict,
    ) -> Result<(), EngineError> {
        let index = self.find_for_request(touch_id)?;
        let position = self
            .dev
            .touches
            .get(index)
            .listener_index(resource)
            .ok_or(EngineError::NoSuchListener {
                device: self.id(),
                touch_id,
                resource,
            })?;
        self.listener_accept_reject(index, position, verdict)
    }

    /// Accept or reject request from `client` naming its grab window.
    pub(crate) fn accept_or_reject_for_client(
        &mut self,
        touch_id: TouchId,
        client: ClientId,
        window: WindowId,
        verdict: TouchVerdict,
    ) -> Result<(), EngineError> {
        let index = self.find_for_request(touch_id)?;
        let touch = self.dev.touches.get(index);
        let Some(position) = touch
            .listeners
            .iter()
            .position(|l| l.client == client && l.window == window)
        else {
            return Err(EngineError::NoSuchListener {
                device: self.id(),
                touch_id,
                resource: ResourceId(window.0),
            });
        };
        self.listener_accept_reject(index, position, verdict)
    }

    fn find_for_request(&self, touch_id: TouchId) -> Result<usize, EngineError> {
        if !self.dev.has_touch() {
            return Err(EngineError::BadDevice(self.id()));
        }
        self.dev
            .touches
            .find_by_client_id(touch_id)
            .ok_or(EngineError::NoSuchTouch {
                device: self.id(),
                touch_id,
            })
    }

    /// Sends a server-generated End to one listener or to all of them.
    /// Nothing is sent while the device is frozen.
    pub(crate) fn emit_touch_end(&mut self, index: usize, flags: EventFlags, resource: Option<ResourceId>) {
        let device = self.id();
        if self.env.is_frozen(device) {
            tracing::debug!("device {}: frozen, not ending touch", device);
            return;
        }
        let mut event = self.dev.touches.get(index).synthesize_end(device, flags);
        self.deliver_touch_events(index, &mut event, resource);
    }

    /// Replays the stored Begin and Updates to `resource` only.
    fn history_replay(&mut self, index: usize, resource: ResourceId) {
        let touch = self.dev.touches.get(index);
        let touch_id = touch.client_id;
        let Some(history) = touch.history.as_ref() else {
            return;
        };
        let events = history.events().to_vec();
        for mut event in events {
            event.flags |= EventFlags::REPLAYING;
            if let EventKind::Touch(data) = &mut event.kind {
                data.resource = Some(resource);
            }
            self.process_touch(event);
            if !self.is_live(index, touch_id) {
                break;
            }
        }
    }

    /// Releases a touch record. An emulating touch ends a passive pointer
    /// grab once nothing holds a button.
    pub(crate) fn end_touch(&mut self, index: usize) {
        let device = self.id();
        let touch = self.dev.touches.get(index);
        if touch.emulate_pointer {
            if let Some(active) = self.env.active_grab_for(device) {
                if active.from_passive
                    && self.dev.state.buttons_down() == 0
                    && self.dev.state.touch_buttons_down() == 0
                    && active.grab.is_pointer_grab()
                {
                    self.env.deactivate_grab(device);
                }
            }
        }
        tracing::debug!("device {}: touch {} finished", device, touch.client_id);
        self.dev.touches.release(index);
        self.check_oldest_touch();
    }

    /// Accepts on behalf of the owner and finishes the touch.
    pub(crate) fn accept_and_end(&mut self, touch_id: TouchId) {
        let Some(index) = self.dev.touches.find_by_client_id(touch_id) else {
            return;
        };
        if let Err(err) = self.listener_accept_reject(index, 0, TouchVerdict::Accept) {
            tracing::debug!("device {}: {}", self.id(), err);
        }
        if !self.is_live(index, touch_id) {
            return;
        }
        if self.dev.touches.get(index).pending_finish {
            self.emit_touch_end(index, EventFlags::empty(), None);
            if !self.is_live(index, touch_id) {
                return;
            }
        }
        if self.dev.touches.get(index).listeners.len() <= 1 {
            self.end_touch(index);
        }
    }

    /// Rejects, on every touch, the first listener owned by `client`.
    pub(crate) fn listener_gone(&mut self, client: ClientId) {
        let device = self.id();
        let touch_ids: Vec<TouchId> = self.dev.touches.iter_active().map(|t| t.client_id).collect();
        for touch_id in touch_ids {
            let Some(touch) = self.dev.touches.by_id(touch_id) else {
                continue;
            };
            let Some(resource) = touch.listeners.iter().find(|l| l.client == client).map(|l| l.resource) else {
                continue;
            };
            self.process_ownership(EventRecord::ownership(device, touch_id, OwnershipReason::Reject, resource));
        }
        self.gesture_listener_gone(client);
    }

    /// Cuts every touch trace at `window`, dropping it and its descendants.
    pub(crate) fn truncate_traces(&mut self, window: WindowId) {
        for touch in self.dev.touches.iter_active_mut() {
            if let Some(depth) = touch.spatial_trace.iter().position(|&w| w == window) {
                touch.spatial_trace.truncate(depth);
            }
        }
        self.dev.gesture.truncate_trace(window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceDescriptor};
    use crate::env::{GrabKind, Selection};
    use crate::event::EventMask;
    use crate::sim::{Rect, SimEnvironment};
    use crate::types::{DeviceId, Point};

    const DEV: DeviceId = DeviceId(2);

    fn env() -> SimEnvironment {
        let mut env = SimEnvironment::new(WindowId(1), ClientId(0), Rect::new(0.0, 0.0, 100.0, 100.0));
        env.add_window(WindowId(2), WindowId(1), ClientId(10), Rect::new(0.0, 0.0, 50.0, 50.0));
        env
    }

    fn touch_selection(client: u32, resource: u32, mask: EventMask) -> Selection {
        Selection {
            client: ClientId(client),
            resource: ResourceId(resource),
            level: InputLevel::Xi2,
            mask,
        }
    }

    fn begin(id: u32) -> EventRecord {
        EventRecord::touch(DEV, TouchPhase::Begin, TouchId(id), Point::new(10.0, 10.0))
    }

    #[test]
    fn test_setup_adds_all_touch_selections_on_innermost_window() {
        let mut env = env();
        env.select(WindowId(2), touch_selection(10, 0x100, EventMask::TOUCH_EVENTS));
        env.select(WindowId(2), touch_selection(11, 0x200, EventMask::TOUCH_EVENTS));
        env.select(WindowId(1), touch_selection(12, 0x300, EventMask::TOUCH_EVENTS));
        let mut device = Device::new(DeviceDescriptor::touchscreen(DEV, "ts"), 2);
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        ctx.process_touch(begin(1));

        let touch = device.touches().by_id(TouchId(1)).unwrap();
        let resources: Vec<_> = touch.listeners().iter().map(|l| l.resource()).collect();
        assert_eq!(resources, vec![ResourceId(0x100), ResourceId(0x200)]);
        assert!(touch.history().is_some(), "listeners without ownership mask need replay");
        assert_eq!(touch.spatial_trace(), &[WindowId(1), WindowId(2)]);
    }

    #[test]
    fn test_xi2_grab_without_touch_begin_is_pointer_grab() {
        let grab = Grab {
            resource: ResourceId(1),
            client: ClientId(1),
            window: WindowId(1),
            level: InputLevel::Xi2,
            kind: GrabKind::Pointer,
            owner_events: false,
            mode: GrabMode::Async,
            event_mask: EventMask::BUTTON_PRESS,
        };
        assert_eq!(listener_kind_for_grab(&grab), ListenerKind::PointerGrab);
        let touch_grab = Grab {
            event_mask: EventMask::TOUCH_EVENTS,
            kind: GrabKind::Touch,
            ..grab.clone()
        };
        assert_eq!(listener_kind_for_grab(&touch_grab), ListenerKind::Grab);
        let core = Grab {
            level: InputLevel::Core,
            event_mask: EventMask::TOUCH_EVENTS,
            ..grab
        };
        assert_eq!(listener_kind_for_grab(&core), ListenerKind::PointerGrab);
    }

    #[test]
    fn test_begin_with_empty_trace_releases_record() {
        let mut env = env();
        let mut device = Device::new(DeviceDescriptor::touchscreen(DEV, "ts"), 2);
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        ctx.process_touch(EventRecord::touch(DEV, TouchPhase::Begin, TouchId(1), Point::new(500.0, 500.0)));
        assert!(device.touches().by_id(TouchId(1)).is_none());
    }

    #[test]
    fn test_request_errors() {
        let mut env = env();
        env.select(WindowId(2), touch_selection(10, 0x100, EventMask::TOUCH_EVENTS));
        let mut device = Device::new(DeviceDescriptor::touchscreen(DEV, "ts"), 2);
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        ctx.process_touch(begin(1));
        assert_eq!(
            ctx.accept_or_reject(TouchId(9), ResourceId(0x100), TouchVerdict::Accept),
            Err(EngineError::NoSuchTouch { device: DEV, touch_id: TouchId(9) })
        );
        assert_eq!(
            ctx.accept_or_reject(TouchId(1), ResourceId(0x999), TouchVerdict::Accept),
            Err(EngineError::NoSuchListener {
                device: DEV,
                touch_id: TouchId(1),
                resource: ResourceId(0x999)
            })
        );
        assert!(ctx.listener_accept_reject(0, 5, TouchVerdict::Accept).is_err());
    }

    #[test]
    fn test_truncate_traces_at_window_depth() {
        let mut env = env();
        env.select(WindowId(2), touch_selection(10, 0x100, EventMask::TOUCH_EVENTS));
        let mut device = Device::new(DeviceDescriptor::touchscreen(DEV, "ts"), 2);
        let mut ctx = DeviceContext::new(&mut device, &mut env, 10);
        ctx.process_touch(begin(1));
        ctx.truncate_traces(WindowId(2));
        assert_eq!(device.touches().by_id(TouchId(1)).unwrap().spatial_trace(), &[WindowId(1)]);
    }
}
