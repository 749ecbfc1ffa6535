//! The real transport: rusb interrupt reads.
//!
//! libusb's synchronous API has no cancellation, so each endpoint gets a
//! reader thread that blocks in short windows ([`POLL_WINDOW`]) and checks
//! for a cancel request in between. Completions funnel through one bounded
//! queue back to whichever thread drives [`Transport::poll`] - from the
//! loop's point of view this behaves exactly like the async
//! submit/complete/cancel cycle, just with typed results instead of
//! callbacks.
//!
//! The device handle is shared: libusb's synchronous calls are thread-safe,
//! and each reader only ever touches its own endpoint.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusb::UsbContext;

use super::{ChannelIndex, Completion, CompletionStatus, TransferError, Transport, TransportError};
use crate::report::{RawReport, REPORT_LEN};

/// Hardware identity of the tablet.
pub const VENDOR_ID: u16 = 0x08f2;
pub const PRODUCT_ID: u16 = 0x6811;

/// The two HID interfaces whose interrupt endpoints carry the pen and pad
/// report streams. Interface 0 belongs to the mouse-emulation mode and is
/// left alone.
pub const INTERFACES: [u8; 2] = [1, 2];

/// How long one blocking read waits before re-checking for a cancel request.
/// This bounds cancel latency.
const POLL_WINDOW: Duration = Duration::from_millis(250);

/// Completion queue depth. A reader parks on a full queue, which is fine -
/// its transfer has already terminated.
const QUEUE_DEPTH: usize = 8;

const STRING_TIMEOUT: Duration = Duration::from_millis(500);

enum Command {
    Submit,
    Cancel,
}

struct Reader {
    /// `None` once we've hung up on the thread during teardown.
    commands: Option<mpsc::Sender<Command>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// rusb-backed [`Transport`] for the tablet's two interrupt endpoints.
pub struct UsbTransport {
    // Shared with the readers; also keeps the libusb context alive.
    _handle: Arc<rusb::DeviceHandle<rusb::Context>>,
    endpoints: Vec<u8>,
    readers: Vec<Reader>,
    completions: mpsc::Receiver<Completion>,
}

impl UsbTransport {
    /// Find the tablet, detach any kernel driver, claim its HID interfaces,
    /// and spin up one reader per interrupt endpoint.
    ///
    /// Acquisition is scoped: if any step fails, everything taken so far is
    /// released on the way out (claimed interfaces included - rusb tracks
    /// them and releases on handle drop, at which point the kernel driver
    /// reattaches).
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self, TransportError> {
        let context = rusb::Context::new()?;
        let device = context
            .devices()?
            .iter()
            .find(|device| {
                device.device_descriptor().is_ok_and(|descriptor| {
                    descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id
                })
            })
            .ok_or(TransportError::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        let descriptor = device.device_descriptor()?;
        let config = device.config_descriptor(0)?;
        log_descriptors(&descriptor, &config);

        let mut handle = device.open()?;
        log_strings(&handle, &descriptor);
        handle.set_auto_detach_kernel_driver(true)?;

        let mut endpoints = Vec::with_capacity(INTERFACES.len());
        for interface in INTERFACES {
            handle.claim_interface(interface)?;
            endpoints.push(interrupt_in_endpoint(&config, interface)?);
        }

        let handle = Arc::new(handle);
        let (sender, completions) = mpsc::sync_channel(QUEUE_DEPTH);
        let mut readers = Vec::with_capacity(endpoints.len());
        for (channel, &endpoint) in endpoints.iter().enumerate() {
            readers.push(spawn_reader(
                channel,
                endpoint,
                Arc::clone(&handle),
                sender.clone(),
            )?);
        }

        Ok(Self {
            _handle: handle,
            endpoints,
            readers,
            completions,
        })
    }
}

impl Transport for UsbTransport {
    fn endpoints(&self) -> &[u8] {
        &self.endpoints
    }

    fn submit(&mut self, channel: ChannelIndex) -> Result<(), TransportError> {
        self.send(channel, Command::Submit)
    }

    fn cancel(&mut self, channel: ChannelIndex) -> Result<(), TransportError> {
        self.send(channel, Command::Cancel)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Completion>, TransportError> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Ok(Some(completion)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

impl UsbTransport {
    fn send(&mut self, channel: ChannelIndex, command: Command) -> Result<(), TransportError> {
        self.readers
            .get(channel)
            .and_then(|reader| reader.commands.as_ref())
            .ok_or(TransportError::Disconnected)?
            .send(command)
            .map_err(|_| TransportError::Disconnected)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        // Hang up on every reader first so none of them restarts a read...
        for reader in &mut self.readers {
            reader.commands = None;
        }
        // ...then join, draining the queue so a reader mid-send can get out.
        for reader in &mut self.readers {
            let Some(thread) = reader.thread.take() else {
                continue;
            };
            while !thread.is_finished() {
                let _ = self.completions.recv_timeout(POLL_WINDOW);
            }
            let _ = thread.join();
        }
    }
}

fn spawn_reader(
    channel: ChannelIndex,
    endpoint: u8,
    handle: Arc<rusb::DeviceHandle<rusb::Context>>,
    completions: mpsc::SyncSender<Completion>,
) -> Result<Reader, TransportError> {
    let (commands, inbox) = mpsc::channel();
    let thread = thread::Builder::new()
        .name(format!("inkbridge-ep{endpoint:02x}"))
        .spawn(move || reader_main(channel, endpoint, &handle, &inbox, &completions))?;
    Ok(Reader {
        commands: Some(commands),
        thread: Some(thread),
    })
}

fn reader_main(
    channel: ChannelIndex,
    endpoint: u8,
    handle: &rusb::DeviceHandle<rusb::Context>,
    inbox: &mpsc::Receiver<Command>,
    completions: &mpsc::SyncSender<Completion>,
) {
    let mut buffer = [0_u8; REPORT_LEN];
    loop {
        match inbox.recv() {
            Ok(Command::Submit) => {}
            // Cancel with nothing in flight: idempotent, nothing to report.
            Ok(Command::Cancel) => continue,
            Err(mpsc::RecvError) => return,
        }
        let Some(status) = read_one(endpoint, handle, inbox, &mut buffer) else {
            return;
        };
        if completions.send(Completion { channel, status }).is_err() {
            return;
        }
    }
}

/// Drive one submitted read to a terminal status, or `None` if the transport
/// was torn down mid-read.
fn read_one(
    endpoint: u8,
    handle: &rusb::DeviceHandle<rusb::Context>,
    inbox: &mpsc::Receiver<Command>,
    buffer: &mut [u8; REPORT_LEN],
) -> Option<CompletionStatus> {
    loop {
        match inbox.try_recv() {
            Ok(Command::Cancel) => return Some(CompletionStatus::Cancelled),
            Ok(Command::Submit) => {
                // One transfer in flight per channel, always.
                log::warn!("endpoint {endpoint:02x}: duplicate submit ignored");
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => return None,
        }
        match handle.read_interrupt(endpoint, buffer, POLL_WINDOW) {
            Ok(length) => {
                return Some(CompletionStatus::Received(RawReport::from_slice(
                    &buffer[..length],
                )))
            }
            // Just the poll window lapsing, not a device timeout.
            Err(rusb::Error::Timeout) => {}
            Err(error) => return Some(CompletionStatus::Failed(map_transfer_error(error))),
        }
    }
}

fn map_transfer_error(error: rusb::Error) -> TransferError {
    match error {
        rusb::Error::Pipe => TransferError::Stall,
        rusb::Error::NoDevice => TransferError::NoDevice,
        rusb::Error::Overflow => TransferError::Overflow,
        other => TransferError::Other(other.to_string()),
    }
}

/// The first interrupt-IN endpoint of `interface`.
fn interrupt_in_endpoint(
    config: &rusb::ConfigDescriptor,
    interface: u8,
) -> Result<u8, TransportError> {
    for candidate in config.interfaces() {
        if candidate.number() != interface {
            continue;
        }
        for descriptor in candidate.descriptors() {
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.direction() == rusb::Direction::In
                    && endpoint.transfer_type() == rusb::TransferType::Interrupt
                {
                    log::debug!(
                        "interface {interface}: interrupt-IN endpoint {:02x}, max packet {}, interval {}",
                        endpoint.address(),
                        endpoint.max_packet_size(),
                        endpoint.interval(),
                    );
                    return Ok(endpoint.address());
                }
            }
        }
    }
    Err(TransportError::MissingEndpoint { interface })
}

fn log_descriptors(descriptor: &rusb::DeviceDescriptor, config: &rusb::ConfigDescriptor) {
    log::debug!(
        "device {:04x}:{:04x}, usb {:?}, class {:02x}/{:02x}, {} configuration(s)",
        descriptor.vendor_id(),
        descriptor.product_id(),
        descriptor.usb_version(),
        descriptor.class_code(),
        descriptor.sub_class_code(),
        descriptor.num_configurations(),
    );
    log::debug!(
        "configuration {}: {} interface(s), max power {}mA",
        config.number(),
        config.num_interfaces(),
        config.max_power(),
    );
}

fn log_strings(handle: &rusb::DeviceHandle<rusb::Context>, descriptor: &rusb::DeviceDescriptor) {
    let Ok(languages) = handle.read_languages(STRING_TIMEOUT) else {
        return;
    };
    let Some(&language) = languages.first() else {
        return;
    };
    if let Ok(manufacturer) = handle.read_manufacturer_string(language, descriptor, STRING_TIMEOUT)
    {
        log::debug!("manufacturer: {manufacturer}");
    }
    if let Ok(product) = handle.read_product_string(language, descriptor, STRING_TIMEOUT) {
        log::debug!("product: {product}");
    }
}
