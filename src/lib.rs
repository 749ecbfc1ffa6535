//! # USB pen tablet → virtual pen device bridge 🖊️
//!
//! Reads raw interrupt reports straight off a cheap pen tablet's two HID
//! endpoints, decodes the vendor protocol, and replays the result through a
//! uinput device that the rest of the desktop sees as a native pen: absolute
//! X/Y/pressure, plus six pad buttons bound to configurable key chords.
//!
//! To get started, create a [`Builder`]. The binary in this crate is just
//! that plus a `SIGINT` handler.
//!
//! The moving parts, in pipeline order:
//! * [`transport`] - submits and completes interrupt reads (rusb underneath,
//!   swappable for tests),
//! * [`report`] - decodes one 8-byte packet into a semantic event,
//! * [`latch`] - turns button-group assertions into press/release chords,
//!   remembering what's held down,
//! * [`sink`] - writes the resulting batches to the virtual device,
//! * [`bridge`] - the loop that ties those together and owns shutdown.
//!
//! **Note:** this decodes one fixed report layout, not HID descriptors.
//! Per-device quirks are reported as-is; where they're known, documentation
//! notes warn about them.

#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod builder;
pub mod channel;
pub mod events;
pub mod keymap;
pub mod latch;
pub mod report;
pub mod sink;
pub mod transport;

pub use bridge::{Bridge, RunError, StopToken};
pub use builder::{BuildError, Builder};
