//! Builder-style configuration for bringing the bridge up.
//!
//! For a stock tablet on the default bindings, `Builder::new().build()` is
//! all you need!

use crate::bridge::{Bridge, StopToken};
use crate::keymap::KeyMap;
use crate::sink::{SinkError, UinputSink};
use crate::transport::usb::{self, UsbTransport};
use crate::transport::TransportError;

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// The tablet couldn't be found or claimed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The virtual device couldn't be created (usually `/dev/uinput`
    /// permissions).
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Pre-construction configuration for a [`Bridge`].
pub struct Builder {
    vendor_id: u16,
    product_id: u16,
    name: String,
    map: KeyMap,
    stop: StopToken,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            vendor_id: usb::VENDOR_ID,
            product_id: usb::PRODUCT_ID,
            name: concat!("inkbridge pen ", env!("CARGO_PKG_VERSION")).to_owned(),
            map: KeyMap::default(),
            stop: StopToken::new(),
        }
    }
}

/// # Configuration
impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a different vendor/product pair. The protocol still has to be
    /// the one this crate decodes - this exists for rebadged hardware.
    #[must_use]
    pub fn device(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Name the virtual device shows up under.
    #[must_use]
    pub fn virtual_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the default button bindings.
    #[must_use]
    pub fn keymap(mut self, map: KeyMap) -> Self {
        self.map = map;
        self
    }

    /// Use an externally created stop token, e.g. one shared with a signal
    /// handler.
    #[must_use]
    pub fn stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }
}

/// # Finishing
impl Builder {
    /// Open the tablet and create the virtual device.
    ///
    /// # Errors
    /// Fails if the tablet is absent, can't be claimed, or uinput is
    /// unavailable. Acquisition is scoped: anything already taken is
    /// released on the way out.
    pub fn build(self) -> Result<Bridge<UsbTransport, UinputSink>, BuildError> {
        let transport = UsbTransport::open(self.vendor_id, self.product_id)?;
        let sink = UinputSink::create(&self.name, &self.map)?;
        Ok(Bridge::new(transport, sink, self.map, self.stop))
    }
}
