//! Per-endpoint transfer bookkeeping.
//!
//! Each interrupt endpoint gets exactly one [`EndpointChannel`] for the life
//! of the bridge, and each channel has at most one transfer in flight. The
//! channel is only the state machine - buffers travel inside
//! [`Completion`](crate::transport::Completion)s, so there is never a moment
//! where two parties could touch the same bytes.

use crate::transport::{ChannelIndex, Transport, TransportError};

/// Where a channel's single transfer currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Nothing in flight. Terminal once draining has begun - and also where
    /// a channel is parked forever after an unhandled completion status.
    Idle,
    /// A read is outstanding; the transport owns the buffer.
    Submitted,
    /// A cancel was requested; waiting for the terminal completion.
    Cancelling,
    /// A report arrived and is being dispatched; resubmission pending.
    Completed,
}

pub struct EndpointChannel {
    index: ChannelIndex,
    endpoint: u8,
    state: ChannelState,
}

impl EndpointChannel {
    pub(crate) fn new(index: ChannelIndex, endpoint: u8) -> Self {
        Self {
            index,
            endpoint,
            state: ChannelState::Idle,
        }
    }

    /// Address of the endpoint this channel reads from.
    #[must_use]
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// True while the transport may still deliver a completion here.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        matches!(
            self.state,
            ChannelState::Submitted | ChannelState::Cancelling
        )
    }

    /// Ask the transport to begin a read on this channel's pipe.
    pub fn submit<T: Transport>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        transport.submit(self.index)?;
        self.state = ChannelState::Submitted;
        Ok(())
    }

    /// Abort the in-flight read, if any. Idempotent: cancelling an idle or
    /// already-cancelling channel does nothing.
    pub fn cancel<T: Transport>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        if self.state == ChannelState::Submitted {
            transport.cancel(self.index)?;
            self.state = ChannelState::Cancelling;
        }
        Ok(())
    }

    /// A report arrived; the channel holds still while it's dispatched.
    pub(crate) fn mark_completed(&mut self) {
        self.state = ChannelState::Completed;
    }

    /// Transfer reached a terminal status with nothing left in flight.
    pub(crate) fn park(&mut self) {
        self.state = ChannelState::Idle;
    }
}
