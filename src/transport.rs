//! The seam between the transfer loop and the USB stack.
//!
//! Rather than surfacing libusb-style completion callbacks, a [`Transport`]
//! is polled: completions queue up inside it and [`Transport::poll`] hands
//! them to the caller one at a time, as typed values, on the caller's own
//! thread. That keeps the whole decode → latch → emit pipeline single
//! threaded - nothing downstream of the transport needs a lock.

use std::time::Duration;

use crate::report::RawReport;

/// Index of an endpoint channel within a transport. The tablet exposes two.
pub type ChannelIndex = usize;

/// Failures while acquiring or talking to the transport itself. Startup
/// errors are fatal; see [`TransferError`] for per-transfer outcomes.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// No connected device matched the vendor/product pair.
    #[error("no device matching {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },
    /// The claimed interface didn't expose the expected interrupt-IN pipe.
    #[error("interface {interface} exposes no interrupt-IN endpoint")]
    MissingEndpoint { interface: u8 },
    /// The completion queue hung up - every reader is gone.
    #[error("transport completion queue disconnected")]
    Disconnected,
    #[error("failed to spawn endpoint reader: {0}")]
    Thread(#[from] std::io::Error),
    #[error(transparent)]
    Usb(#[from] rusb::Error),
}

/// Why one submitted read stopped without delivering a report. Non-fatal to
/// the process, fatal to the channel it happened on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("endpoint stalled")]
    Stall,
    #[error("device disconnected")]
    NoDevice,
    #[error("device sent more than the buffer holds")]
    Overflow,
    #[error("transfer failed: {0}")]
    Other(String),
}

/// Terminal outcome of one submitted read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The device produced a report; holds exactly the bytes received.
    Received(RawReport),
    /// The read was aborted by [`Transport::cancel`].
    Cancelled,
    /// Anything else the bus can do to us.
    Failed(TransferError),
}

/// One completion, tagged with the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub channel: ChannelIndex,
    pub status: CompletionStatus,
}

/// A set of interrupt-IN pipes, one per channel, driven from a single thread.
///
/// At most one read is in flight per channel at a time; each channel's
/// completions arrive in submit order, and no ordering is promised *across*
/// channels beyond delivery order out of [`poll`](Transport::poll).
pub trait Transport {
    /// Endpoint addresses, one per channel, in channel order.
    fn endpoints(&self) -> &[u8];

    /// Begin an asynchronous read on `channel`. The transfer terminates via
    /// a later [`Completion`]. No retry happens in here; that's the caller's
    /// call.
    fn submit(&mut self, channel: ChannelIndex) -> Result<(), TransportError>;

    /// Abort the in-flight read on `channel`, which then terminates with
    /// [`CompletionStatus::Cancelled`]. No-op when nothing is in flight.
    fn cancel(&mut self, channel: ChannelIndex) -> Result<(), TransportError>;

    /// Block until one completion arrives, or `timeout` elapses (`None`).
    fn poll(&mut self, timeout: Duration) -> Result<Option<Completion>, TransportError>;
}

pub mod usb;
pub use usb::UsbTransport;
