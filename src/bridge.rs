//! The transfer loop: steady-state polling, and the cancel-and-drain
//! shutdown.
//!
//! Control flow is a single thread the whole way: submit every channel once,
//! block on [`Transport::poll`] with a bounded timeout, push each completion
//! through decode → latch → sink, resubmit, repeat. The stop token is
//! checked once per iteration, so shutdown is cooperative and takes effect
//! within one poll window.
//!
//! ## Quirks
//! A channel whose transfer terminates with anything other than a report or
//! a cancellation is *never resubmitted* - that endpoint simply stops
//! producing events until the process restarts. This mirrors the hardware
//! driver this replaces; it's logged loudly when it happens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::EndpointChannel;
use crate::keymap::KeyMap;
use crate::latch::ButtonLatch;
use crate::report;
use crate::sink::{EventSink, SinkError};
use crate::transport::{Completion, CompletionStatus, Transport, TransportError};

/// How long one blocking poll for completions may wait.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on the whole cancel-and-drain shutdown. Generously more than
/// the two poll windows a clean drain needs; hitting it means the transport
/// swallowed a cancellation.
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Cooperative stop signal, observed once per loop iteration.
///
/// Clone one into a signal handler; hand another to the
/// [builder](crate::builder::Builder::stop_token).
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the bridge to wind down. Takes effect within one poll window.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Cancellation completions never arrived; resources were torn down
    /// anyway rather than hanging forever.
    #[error("channels failed to drain before the shutdown deadline")]
    ShutdownTimeout,
}

/// Drives raw reports from a [`Transport`] into an [`EventSink`] until its
/// stop token trips.
pub struct Bridge<T: Transport, S: EventSink> {
    transport: T,
    sink: S,
    map: KeyMap,
    latch: ButtonLatch,
    channels: Vec<EndpointChannel>,
    stop: StopToken,
    poll_timeout: Duration,
    drain_deadline: Duration,
}

impl<T: Transport, S: EventSink> Bridge<T, S> {
    #[must_use]
    pub fn new(transport: T, sink: S, map: KeyMap, stop: StopToken) -> Self {
        let channels = transport
            .endpoints()
            .iter()
            .enumerate()
            .map(|(index, &endpoint)| EndpointChannel::new(index, endpoint))
            .collect();
        Self {
            transport,
            sink,
            map,
            latch: ButtonLatch::default(),
            channels,
            stop,
            poll_timeout: POLL_TIMEOUT,
            drain_deadline: DRAIN_DEADLINE,
        }
    }

    /// The per-endpoint channels, in transport order.
    #[must_use]
    pub fn channels(&self) -> &[EndpointChannel] {
        &self.channels
    }

    /// Run until the stop token trips, then cancel everything and drain.
    ///
    /// # Errors
    /// Initial submission failures are fatal (nothing has happened yet that
    /// is worth limping along for). Per-transfer failures during steady
    /// state are not - they kill their channel only, see the module docs.
    pub fn run(&mut self) -> Result<(), RunError> {
        for channel in &mut self.channels {
            channel.submit(&mut self.transport)?;
        }
        while !self.stop.is_stopped() {
            let timeout = self.poll_timeout;
            if let Some(completion) = self.transport.poll(timeout)? {
                self.dispatch(completion, true)?;
            }
        }
        self.drain()
    }

    /// One completion through channel bookkeeping and, for received reports,
    /// decode → latch → sink. `resubmit` is false once draining: a late
    /// report is still delivered, but its pipe is left idle afterwards.
    fn dispatch(&mut self, completion: Completion, resubmit: bool) -> Result<(), RunError> {
        let index = completion.channel;
        if index >= self.channels.len() {
            log::debug!("completion for unknown channel {index}");
            return Ok(());
        }
        let endpoint = self.channels[index].endpoint();
        match completion.status {
            CompletionStatus::Received(bytes) => {
                self.channels[index].mark_completed();
                log::debug!("endpoint {endpoint:02x}: {:02x?}", &bytes[..]);
                let decoded = report::decode(&bytes);
                let batch = self.latch.apply(&decoded, &self.map);
                self.sink.write(&batch)?;
                if resubmit {
                    if let Err(error) = self.channels[index].submit(&mut self.transport) {
                        // Same outcome as any other channel death.
                        log::warn!(
                            "endpoint {endpoint:02x}: resubmit failed, channel is now dead: {error}"
                        );
                        self.channels[index].park();
                    }
                } else {
                    self.channels[index].park();
                }
            }
            CompletionStatus::Cancelled => self.channels[index].park(),
            CompletionStatus::Failed(error) => {
                log::warn!(
                    "endpoint {endpoint:02x}: unhandled completion, channel is now dead: {error}"
                );
                self.channels[index].park();
            }
        }
        Ok(())
    }

    /// Cancel every in-flight channel, then keep polling until each has
    /// reported a terminal completion. No channel resource goes away while
    /// the transport might still write to it.
    fn drain(&mut self) -> Result<(), RunError> {
        for index in 0..self.channels.len() {
            if let Err(error) = self.channels[index].cancel(&mut self.transport) {
                log::warn!(
                    "endpoint {:02x}: cancel failed: {error}",
                    self.channels[index].endpoint()
                );
                self.channels[index].park();
            }
        }
        let deadline = Instant::now() + self.drain_deadline;
        while self.channels.iter().any(EndpointChannel::in_flight) {
            if Instant::now() >= deadline {
                return Err(RunError::ShutdownTimeout);
            }
            let timeout = self.poll_timeout;
            if let Some(completion) = self.transport.poll(timeout)? {
                self.dispatch(completion, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use crate::events::{Axis, VirtualEvent};
    use crate::report::ButtonGroup;
    use crate::transport::TransferError;
    use evdev::Key;
    use std::collections::VecDeque;

    /// Plays back a fixed script of completions, acknowledges cancels with
    /// `Cancelled` completions, and trips the stop token once the script is
    /// exhausted.
    struct ScriptedTransport {
        endpoints: Vec<u8>,
        script: VecDeque<Completion>,
        submits: Vec<usize>,
        cancels: Vec<usize>,
        acks_cancels: bool,
        stop: StopToken,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Completion>, stop: StopToken) -> Self {
            Self {
                endpoints: vec![0x81, 0x82],
                script: script.into(),
                submits: Vec::new(),
                cancels: Vec::new(),
                acks_cancels: true,
                stop,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn endpoints(&self) -> &[u8] {
            &self.endpoints
        }
        fn submit(&mut self, channel: usize) -> Result<(), TransportError> {
            self.submits.push(channel);
            Ok(())
        }
        fn cancel(&mut self, channel: usize) -> Result<(), TransportError> {
            self.cancels.push(channel);
            if self.acks_cancels {
                self.script.push_back(Completion {
                    channel,
                    status: CompletionStatus::Cancelled,
                });
            }
            Ok(())
        }
        fn poll(&mut self, _: Duration) -> Result<Option<Completion>, TransportError> {
            if let Some(completion) = self.script.pop_front() {
                return Ok(Some(completion));
            }
            self.stop.stop();
            Ok(None)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Vec<Vec<VirtualEvent>>,
    }
    impl EventSink for RecordingSink {
        fn write(&mut self, events: &[VirtualEvent]) -> Result<(), SinkError> {
            self.batches.push(events.to_vec());
            Ok(())
        }
    }

    fn received(channel: usize, bytes: &[u8]) -> Completion {
        Completion {
            channel,
            status: CompletionStatus::Received(crate::report::RawReport::from_slice(bytes)),
        }
    }

    fn bridge_with(
        script: Vec<Completion>,
    ) -> Bridge<ScriptedTransport, RecordingSink> {
        let stop = StopToken::new();
        let transport = ScriptedTransport::new(script, stop.clone());
        let mut bridge = Bridge::new(transport, RecordingSink::default(), KeyMap::default(), stop);
        bridge.poll_timeout = Duration::from_millis(1);
        bridge.drain_deadline = Duration::from_millis(50);
        bridge
    }

    #[test]
    fn completed_report_is_dispatched_and_resubmitted_once() {
        // Pad report asserting group two (bit 2 of raw[1]).
        let mut bridge = bridge_with(vec![received(0, &[0x02, 0x04, 0, 0, 0, 0, 0, 0])]);
        bridge.run().unwrap();

        // Initial submit of both channels, then exactly one resubmit of 0.
        assert_eq!(bridge.transport.submits, [0, 1, 0]);
        assert_eq!(bridge.latch.active_group(), Some(ButtonGroup::Two));
        assert_eq!(
            bridge.sink.batches,
            [vec![
                VirtualEvent::Key {
                    code: Key::KEY_LEFTCTRL,
                    pressed: true
                },
                VirtualEvent::Key {
                    code: Key::KEY_Y,
                    pressed: true
                },
                VirtualEvent::Sync,
            ]]
        );
        // Both channels were cancelled on shutdown and drained to idle.
        assert_eq!(bridge.transport.cancels, [0, 1]);
        assert!(bridge
            .channels()
            .iter()
            .all(|channel| channel.state() == ChannelState::Idle));
    }

    #[test]
    fn pointer_report_flows_through_to_axis_writes() {
        let mut bridge = bridge_with(vec![received(1, &[0x05, 0x41, 0, 0, 0, 0, 0, 0])]);
        bridge.run().unwrap();
        assert_eq!(
            bridge.sink.batches,
            [vec![
                VirtualEvent::Axis {
                    axis: Axis::X,
                    value: 4095
                },
                VirtualEvent::Axis {
                    axis: Axis::Y,
                    value: 0
                },
                VirtualEvent::Axis {
                    axis: Axis::Pressure,
                    value: 0
                },
                VirtualEvent::Sync,
            ]]
        );
        assert_eq!(bridge.transport.submits, [0, 1, 1]);
    }

    #[test]
    fn failed_channel_is_never_resubmitted() {
        let mut bridge = bridge_with(vec![Completion {
            channel: 0,
            status: CompletionStatus::Failed(TransferError::Stall),
        }]);
        bridge.run().unwrap();

        // No resubmit of channel 0, nothing written, and the drain only had
        // to cancel the surviving channel.
        assert_eq!(bridge.transport.submits, [0, 1]);
        assert!(bridge.sink.batches.is_empty());
        assert_eq!(bridge.transport.cancels, [1]);
    }

    #[test]
    fn unrecognized_report_emits_only_a_sync() {
        let mut bridge = bridge_with(vec![received(0, &[0x7f, 0, 0, 0, 0, 0, 0, 0])]);
        bridge.run().unwrap();
        assert_eq!(bridge.sink.batches, [vec![VirtualEvent::Sync]]);
        assert_eq!(bridge.latch.active_group(), None);
        // Unrecognized is a no-op, not a channel death.
        assert_eq!(bridge.transport.submits, [0, 1, 0]);
    }

    #[test]
    fn shutdown_cancels_each_channel_exactly_once_and_drains() {
        let mut bridge = bridge_with(Vec::new());
        bridge.run().unwrap();
        assert_eq!(bridge.transport.cancels, [0, 1]);
        assert!(bridge
            .channels()
            .iter()
            .all(|channel| channel.state() == ChannelState::Idle));
    }

    #[test]
    fn late_report_during_drain_is_delivered_but_not_resubmitted() {
        let mut bridge = bridge_with(Vec::new());
        // The report for channel 0 beats its cancellation.
        bridge.transport.acks_cancels = false;
        let stop = bridge.stop.clone();
        stop.stop();
        bridge.transport.script = vec![
            received(0, &[0x03, 0x02, 0, 0, 0, 0, 0, 0]),
            Completion {
                channel: 1,
                status: CompletionStatus::Cancelled,
            },
        ]
        .into();
        bridge.run().unwrap();

        // Plus-key press was still emitted, but channel 0 was parked, not
        // resubmitted.
        assert_eq!(
            bridge.sink.batches,
            [vec![
                VirtualEvent::Key {
                    code: Key::KEY_KPPLUS,
                    pressed: true
                },
                VirtualEvent::Sync,
            ]]
        );
        assert_eq!(bridge.transport.submits, [0, 1]);
        assert!(bridge
            .channels()
            .iter()
            .all(|channel| channel.state() == ChannelState::Idle));
    }

    #[test]
    fn drain_gives_up_at_the_deadline() {
        let mut bridge = bridge_with(Vec::new());
        // Cancellations vanish into the transport, completions never come.
        bridge.transport.acks_cancels = false;
        assert!(matches!(bridge.run(), Err(RunError::ShutdownTimeout)));
    }
}
