//! Where event batches land: a uinput pen device, or anything test-shaped.

use crate::events::{Axis, VirtualEvent};
use crate::keymap::KeyMap;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, UinputAbsSetup};
use strum::IntoEnumIterator;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("virtual device error: {0}")]
    Io(#[from] std::io::Error),
}

/// Consumes the batches produced by the button latch.
pub trait EventSink {
    /// Write one batch. Nothing is promised to be visible until the batch's
    /// trailing [`VirtualEvent::Sync`] is written.
    fn write(&mut self, events: &[VirtualEvent]) -> Result<(), SinkError>;
}

/// The real sink: an evdev uinput device that looks like a native pen.
pub struct UinputSink {
    device: VirtualDevice,
    pending: Vec<InputEvent>,
}

impl UinputSink {
    /// Create the virtual pen: absolute X/Y/Pressure with the hardware's
    /// declared ranges, plus every key code the map can emit. `BTN_STYLUS`
    /// is always registered - it's what marks the device as a pen.
    pub fn create(name: &str, map: &KeyMap) -> Result<Self, SinkError> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_STYLUS);
        for code in map.all_codes() {
            keys.insert(code);
        }

        let mut builder = VirtualDeviceBuilder::new()?.name(name);
        for axis in Axis::iter() {
            let info = AbsInfo::new(0, 0, i32::from(axis.maximum()), 0, 0, axis.resolution());
            builder = builder.with_absolute_axis(&UinputAbsSetup::new(abs_code(axis), info))?;
        }
        let device = builder.with_keys(&keys)?.build()?;

        Ok(Self {
            device,
            pending: Vec::with_capacity(8),
        })
    }
}

impl EventSink for UinputSink {
    fn write(&mut self, events: &[VirtualEvent]) -> Result<(), SinkError> {
        for &event in events {
            match event {
                VirtualEvent::Axis { axis, value } => self.pending.push(InputEvent::new(
                    EventType::ABSOLUTE,
                    abs_code(axis).0,
                    i32::from(value),
                )),
                VirtualEvent::Key { code, pressed } => self.pending.push(InputEvent::new(
                    EventType::KEY,
                    code.code(),
                    i32::from(pressed),
                )),
                // `emit` appends the SYN_REPORT itself.
                VirtualEvent::Sync => {
                    self.device.emit(&self.pending)?;
                    self.pending.clear();
                }
            }
        }
        Ok(())
    }
}

fn abs_code(axis: Axis) -> AbsoluteAxisType {
    match axis {
        Axis::X => AbsoluteAxisType::ABS_X,
        Axis::Y => AbsoluteAxisType::ABS_Y,
        Axis::Pressure => AbsoluteAxisType::ABS_PRESSURE,
    }
}
