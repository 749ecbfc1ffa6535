//! Decoding of the tablet's raw interrupt reports.
//!
//! The hardware speaks a fixed, vendor-specific layout rather than anything a
//! generic HID descriptor parser would recognize, so this module is a plain
//! byte-level state machine: 8-byte packet in, [`Report`] out. The first byte
//! selects the layout; everything multi-byte is little-endian `u16`.
//!
//! ## Quirks
//! * The X axis arrives mirrored - the wire value counts from the *right*
//!   edge, so we subtract from [`MAX_X`].
//! * While the `-` button is held, the pad sometimes stuffs `0x1d` into the
//!   secondary select byte of report `0x02`. That exact combination is
//!   swallowed; the same byte *without* `-` held is treated as unknown.
//!   Don't generalize this, it's a hardware wart.
//!
//! Unknown packets are never an error - they're logged and decode to
//! [`Report::Unrecognized`], which flows through the pipeline as a no-press
//! report.

use smallvec::SmallVec;

/// Rightmost reachable X coordinate. Also the inversion pivot (see module docs).
pub const MAX_X: u16 = 4095;
/// Bottommost reachable Y coordinate.
pub const MAX_Y: u16 = 4095;
/// Hardest reachable pen pressure.
pub const MAX_PRESSURE: u16 = 2047;
/// Interrupt packets from either endpoint are at most this long.
pub const REPORT_LEN: usize = 8;

/// The bytes of one received report, exactly as long as the transfer's
/// actual length. Small enough to live inline.
pub type RawReport = SmallVec<[u8; REPORT_LEN]>;

bitflags::bitflags! {
    /// Flag byte (`raw[1]`) of the pad-button report `0x02`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct PadButtons: u8 {
        const MINUS = 0x01;
        const ONE = 0x02;
        const TWO = 0x04;
    }
}

bitflags::bitflags! {
    /// Flag byte (`raw[1]`) of the pen report `0x05`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct PenFlags: u8 {
        /// Tip touching the surface.
        const CONTACT = 0x01;
        /// Two bits, either of which means the position words are live.
        const MOVING = 0xc0;
    }
}

/// The six logical button groups on the pad.
///
/// Declaration order is priority order: should the hardware ever assert more
/// than one group in a single report (it promises not to), the earliest
/// variant wins.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::AsRefStr,
    strum::IntoStaticStr,
    strum::EnumIter,
    strum::EnumCount,
)]
pub enum ButtonGroup {
    One,
    Two,
    Three,
    Four,
    Plus,
    Minus,
}

/// Snapshot of the pen's axes, straight off the wire. No clamping beyond the
/// hardware's own maxima is applied - quirked values are reported as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pose {
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
    /// The position words are only meaningful while this is set.
    pub moving: bool,
    /// Tip contact with the surface.
    pub contact: bool,
}

/// One decoded report. Produced fresh per packet, never retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Report {
    /// Pen motion/pressure/contact.
    Pointer(Pose),
    /// Pad button state: the asserted group, or `None` when nothing is
    /// pressed this cycle (which is what releases a latched group).
    Buttons(Option<ButtonGroup>),
    /// A packet the device sends that carries no information.
    NoOp,
    /// Anything we can't make sense of. Kept around for diagnostics only.
    Unrecognized(RawReport),
}

/// Decode one raw packet. Pure and one-way; there is no re-encode.
#[must_use]
pub fn decode(raw: &[u8]) -> Report {
    match raw.first() {
        Some(0x02) => decode_pad(raw),
        Some(0x03) => decode_plus(raw),
        Some(0x05) => decode_pen(raw),
        _ => unrecognized(raw),
    }
}

fn unrecognized(raw: &[u8]) -> Report {
    log::debug!("unrecognized report: {raw:02x?}");
    Report::Unrecognized(RawReport::from_slice(raw))
}

/// Report `0x02`: `-`, `1`, `2` as bits of `raw[1]`; `3` and `4` as magic
/// values of `raw[3]`.
fn decode_pad(raw: &[u8]) -> Report {
    let (Some(&flags), Some(&select)) = (raw.get(1), raw.get(3)) else {
        return unrecognized(raw);
    };
    let Some(flags) = PadButtons::from_bits(flags) else {
        return unrecognized(raw);
    };
    let minus = flags.contains(PadButtons::MINUS);
    let secondary = match select {
        0x00 => None,
        0x2c => Some(ButtonGroup::Three),
        0x2b => Some(ButtonGroup::Four),
        // Hardware wart, see module docs. Only swallowed while `-` is held.
        0x1d if minus => None,
        _ => return unrecognized(raw),
    };
    // First asserted group wins, in declared order.
    let group = if flags.contains(PadButtons::ONE) {
        Some(ButtonGroup::One)
    } else if flags.contains(PadButtons::TWO) {
        Some(ButtonGroup::Two)
    } else if let Some(secondary) = secondary {
        Some(secondary)
    } else if minus {
        Some(ButtonGroup::Minus)
    } else {
        None
    };
    Report::Buttons(group)
}

/// Report `0x03`: the `+` button gets a whole report layout to itself.
fn decode_plus(raw: &[u8]) -> Report {
    match raw.get(1) {
        Some(0x00) => Report::NoOp,
        Some(0x02) => Report::Buttons(Some(ButtonGroup::Plus)),
        _ => unrecognized(raw),
    }
}

/// Report `0x05`: pen state. Needs the full packet for the three axis words.
fn decode_pen(raw: &[u8]) -> Report {
    if raw.len() < REPORT_LEN {
        return unrecognized(raw);
    }
    let Some(flags) = PenFlags::from_bits(raw[1]) else {
        return unrecognized(raw);
    };
    Report::Pointer(Pose {
        // Mirrored on the wire; wrapping matches what the hardware's own
        // 16-bit arithmetic would do if it ever over-reported.
        x: MAX_X.wrapping_sub(u16::from_le_bytes([raw[4], raw[5]])),
        y: u16::from_le_bytes([raw[2], raw[3]]),
        pressure: u16::from_le_bytes([raw[6], raw[7]]),
        moving: flags.intersects(PenFlags::MOVING),
        contact: flags.contains(PenFlags::CONTACT),
    })
}
