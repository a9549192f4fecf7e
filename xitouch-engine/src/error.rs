//! Errors surfaced to the request-handling layer.
//!
//! Everything else the engine runs into (stale events, access denials,
//! vetoed duplicates) is logged and absorbed, and is reported through status
//! values such as [`crate::delivery::DeliveryOutcome`] instead.

use thiserror::Error;

use crate::types::{DeviceId, ResourceId, TouchId};

/// X error class an [`EngineError`] surfaces as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorCode {
    BadDevice,
    BadValue,
    BadAccess,
    BadMatch,
    /// Not a protocol error; the server is shutting down.
    BadImplementation,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Device {0} is not registered")]
    BadDevice(DeviceId),

    #[error("Device {device} has no active touch with id {touch_id}")]
    NoSuchTouch { device: DeviceId, touch_id: TouchId },

    #[error("Touch {touch_id} on device {device} has no listener for resource {resource}")]
    NoSuchListener {
        device: DeviceId,
        touch_id: TouchId,
        resource: ResourceId,
    },

    #[error("Device {device} already has an active touch with id {touch_id}")]
    DuplicateTouch { device: DeviceId, touch_id: TouchId },

    #[error("Device {0} is already registered")]
    DuplicateDevice(DeviceId),

    #[error("Event queue is closed")]
    QueueClosed,
}

impl EngineError {
    pub fn protocol_code(&self) -> ProtocolErrorCode {
        match self {
            EngineError::BadDevice(_) => ProtocolErrorCode::BadDevice,
            EngineError::NoSuchTouch { .. } => ProtocolErrorCode::BadValue,
            EngineError::NoSuchListener { .. } => ProtocolErrorCode::BadAccess,
            EngineError::DuplicateTouch { .. } | EngineError::DuplicateDevice(_) => ProtocolErrorCode::BadMatch,
            EngineError::QueueClosed => ProtocolErrorCode::BadImplementation,
        }
    }
}
