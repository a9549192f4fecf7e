//! Listener chain entries.
//!
//! A touch keeps an ordered list of listeners; index 0 is the current owner
//! candidate. The chain is only mutated by the ownership resolver.

use crate::env::Grab;
use crate::types::{ClientId, InputLevel, ResourceId, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Touch grab.
    Grab,
    /// Grab that only sees emulated pointer events.
    PointerGrab,
    /// Touch event selection.
    Regular,
    /// Selection that only matches emulated pointer events.
    PointerRegular,
}

impl ListenerKind {
    pub fn is_pointer(self) -> bool {
        matches!(self, ListenerKind::PointerGrab | ListenerKind::PointerRegular)
    }

    pub fn is_grab(self) -> bool {
        matches!(self, ListenerKind::Grab | ListenerKind::PointerGrab)
    }
}

/// Per-listener progress through one touch sequence.
///
/// `HasEnd` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    /// Waiting for TouchBegin, or for ownership without ownership events.
    AwaitingBegin,
    /// Saw TouchBegin, waiting for TouchOwnership.
    AwaitingOwner,
    /// Accepted before becoming owner.
    EarlyAccept,
    IsOwner,
    HasAccepted,
    HasEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub(crate) resource: ResourceId,
    pub(crate) client: ClientId,
    pub(crate) kind: ListenerKind,
    pub(crate) level: InputLevel,
    pub(crate) state: ListenerState,
    /// Grab window or selection window.
    pub(crate) window: WindowId,
    pub(crate) grab: Option<Grab>,
    /// A TouchBegin was written to this listener while it was not yet owner.
    pub(crate) seen_begin: bool,
}

impl Listener {
    pub(crate) fn for_grab(grab: &Grab, kind: ListenerKind) -> Self {
        Self {
            resource: grab.resource,
            client: grab.client,
            kind,
            level: grab.level,
            state: ListenerState::AwaitingBegin,
            window: grab.window,
            grab: Some(grab.clone()),
            seen_begin: false,
        }
    }

    pub(crate) fn for_selection(
        resource: ResourceId,
        client: ClientId,
        level: InputLevel,
        kind: ListenerKind,
        window: WindowId,
    ) -> Self {
        Self {
            resource,
            client,
            kind,
            level,
            state: ListenerState::AwaitingBegin,
            window,
            grab: None,
            seen_begin: false,
        }
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn level(&self) -> InputLevel {
        self.level
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn grab(&self) -> Option<&Grab> {
        self.grab.as_ref()
    }
}
