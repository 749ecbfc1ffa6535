//! The vocabulary of writes made against the virtual device.
//!
//! The button latch turns each decoded [`report::Report`](crate::report) into
//! a short batch of these; the [sink](crate::sink) translates them into
//! whatever its backend wants. A batch is only visible to consumers of the
//! virtual device once its trailing [`VirtualEvent::Sync`] lands.

use crate::report;

/// The absolute axes the virtual pen declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::AsRefStr, strum::EnumIter)]
pub enum Axis {
    X,
    Y,
    Pressure,
}

impl Axis {
    /// Upper bound of the declared range. The lower bound is always zero.
    #[must_use]
    pub const fn maximum(self) -> u16 {
        match self {
            Self::X => report::MAX_X,
            Self::Y => report::MAX_Y,
            Self::Pressure => report::MAX_PRESSURE,
        }
    }

    /// Units per millimeter as measured on the hardware, zero when the axis
    /// has no physical extent.
    #[must_use]
    pub const fn resolution(self) -> i32 {
        match self {
            Self::X => 2,
            Self::Y => 3,
            Self::Pressure => 0,
        }
    }
}

/// One write against the virtual device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualEvent {
    /// Absolute axis position.
    Axis { axis: Axis, value: u16 },
    /// Key state change. `pressed` is the new state.
    Key { code: evdev::Key, pressed: bool },
    /// Commit marker: everything since the previous marker becomes visible
    /// atomically. Every batch the latch emits ends with one.
    Sync,
}

/// The writes implied by a single report. Sized so a pose plus a chord fits
/// inline.
pub type EventBatch = smallvec::SmallVec<[VirtualEvent; 8]>;
