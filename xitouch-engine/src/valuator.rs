//! Sparse axis values carried by device and touch events.

/// Maximum number of axes a device may report.
pub const MAX_VALUATORS: usize = 36;

/// Which axes changed and to what.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuatorMask {
    bits: u64,
    values: [f64; MAX_VALUATORS],
}

impl Default for ValuatorMask {
    fn default() -> Self {
        Self::new()
    }
}

impl ValuatorMask {
    pub fn new() -> Self {
        Self {
            bits: 0,
            values: [0.0; MAX_VALUATORS],
        }
    }

    /// Builds a mask from `(axis, value)` pairs. Axes beyond [`MAX_VALUATORS`] are ignored.
    pub fn from_pairs(pairs: &[(usize, f64)]) -> Self {
        let mut mask = Self::new();
        for &(axis, value) in pairs {
            mask.set(axis, value);
        }
        mask
    }

    /// Sets `axis` to `value`. Returns `false` if the axis is out of range.
    pub fn set(&mut self, axis: usize, value: f64) -> bool {
        if axis >= MAX_VALUATORS {
            return false;
        }
        self.bits |= 1 << axis;
        self.values[axis] = value;
        true
    }

    pub fn unset(&mut self, axis: usize) {
        if axis < MAX_VALUATORS {
            self.bits &= !(1 << axis);
            self.values[axis] = 0.0;
        }
    }

    pub fn is_set(&self, axis: usize) -> bool {
        axis < MAX_VALUATORS && self.bits & (1 << axis) != 0
    }

    pub fn get(&self, axis: usize) -> Option<f64> {
        self.is_set(axis).then(|| self.values[axis])
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Number of axes set.
    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Highest set axis, if any.
    pub fn last_axis(&self) -> Option<usize> {
        (self.bits != 0).then(|| 63 - self.bits.leading_zeros() as usize)
    }

    pub fn zero(&mut self) {
        *self = Self::new();
    }

    /// Copies every axis set in `other` into `self`, leaving the rest untouched.
    pub fn merge_from(&mut self, other: &ValuatorMask) {
        for (axis, value) in other.iter() {
            self.set(axis, value);
        }
    }

    /// Iterates over `(axis, value)` for set axes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        (0..MAX_VALUATORS).filter_map(move |axis| self.get(axis).map(|v| (axis, v)))
    }
}
