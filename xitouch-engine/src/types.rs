//! Identifiers shared across the engine.
//!
//! All cross references (listener to grab, touch to window trace) are plain
//! ids validated against their owning table at lookup time.

use serde::Deserialize;
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Input device id (master or slave).
    DeviceId, u16
);
id_type!(
    /// Connected client.
    ClientId, u32
);
id_type!(
    /// Window in the window tree.
    WindowId, u32
);
id_type!(
    /// Resource id of a grab or of a client's event selection.
    ResourceId, u32
);
id_type!(
    /// Client-facing touch id. Unique per device while the touch is active.
    TouchId, u32
);

impl TouchId {
    /// Wrapping "is at least as old as" comparison.
    ///
    /// Touch ids are assigned from an increasing 32-bit counter that may wrap,
    /// so `other` is considered older when the wrapped distance from `other`
    /// to `self` is less than half the id space.
    pub fn not_older_than(self, other: TouchId) -> bool {
        self.0.wrapping_sub(other.0) < u32::MAX / 2
    }
}

/// Protocol level a grab or selection was registered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLevel {
    Core,
    Xi1,
    Xi2,
}

/// Root-relative position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
