//! # xitouch Engine (`xitouch-engine`)
//!
//! Decides which clients receive each touch and gesture event of an XI2
//! input server, in what role, and how ownership of a touch sequence moves
//! between them.
//!
//! - **Events**: [`EventRecord`] and its closed set of kinds, plus the
//!   [`WireEvent`] shape handed to clients.
//! - **Touch records**: per-device [`TouchTable`]s of [`TouchPoint`]s, each
//!   with an ordered listener chain whose first entry is the owner candidate.
//! - **Resolution and delivery**: listener setup, accept/reject handling,
//!   replay to newly promoted owners and legacy pointer emulation.
//! - **Dispatch**: [`InputCore`] routes each event through the device state
//!   updater, the resolver and delivery; [`InputServer`] puts it behind a lock
//!   and a bounded queue.
//!
//! The surrounding server is reached only through [`InputEnvironment`];
//! [`sim::SimEnvironment`] is an in-memory implementation.
//!
//! ```rust,ignore
//! use xitouch_engine::{DeviceDescriptor, EventRecord, InputCore, TouchPhase};
//! use xitouch_engine::sim::{Rect, SimEnvironment};
//!
//! let env = SimEnvironment::new(WindowId(1), ClientId(0), Rect::new(0.0, 0.0, 800.0, 600.0));
//! let mut core = InputCore::new(env, &TouchConfig::default());
//! core.register_device(DeviceDescriptor::touchscreen(DeviceId(2), "touchscreen"))?;
//! core.dispatch(EventRecord::touch(DeviceId(2), TouchPhase::Begin, TouchId(1), Point::new(10.0, 10.0)))?;
//! ```

pub mod delivery;
pub mod device;
pub mod device_state;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod event;
pub mod gesture;
pub mod listener;
pub mod resolver;
pub mod server;
pub mod sim;
pub mod touch;
pub mod types;
pub mod valuator;
pub mod wire;

pub use delivery::{DeliveryOutcome, EmulationOutcome};
pub use device::{Device, DeviceDescriptor, DeviceRegistry, PhysicalTouch};
pub use device_state::{DeviceState, StateUpdate};
pub use dispatch::InputCore;
pub use env::{Access, ActiveGrab, Grab, GrabKind, GrabMode, InputEnvironment, ModsGroups, Selection, WindowInfo};
pub use error::{EngineError, ProtocolErrorCode};
pub use event::{
    EventFlags, EventKind, EventMask, EventRecord, EventType, GestureKind, GesturePhase, OwnershipReason, TouchPhase,
};
pub use gesture::{GestureListener, GestureListenerKind, GestureRecord};
pub use listener::{Listener, ListenerKind, ListenerState};
pub use resolver::TouchVerdict;
pub use server::{EventSender, InputServer};
pub use touch::{TouchHistory, TouchPoint, TouchTable};
pub use types::{ClientId, DeviceId, InputLevel, Point, ResourceId, TouchId, WindowId};
pub use valuator::ValuatorMask;
pub use wire::{WireEvent, WireFlags};
