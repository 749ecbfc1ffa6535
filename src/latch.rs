//! The sticky button group.
//!
//! The pad only ever reports the group that is asserted *right now* - there
//! is no explicit release. So the latch remembers which group's chord is
//! currently held down on the virtual device, and lets go of it the first
//! time a report comes in with nothing pressed.
//!
//! A no-press report arriving while nothing is latched still emits the
//! (empty) release plus a sync marker, and repeated no-press reports re-emit
//! the same key-ups. Both are harmless to evdev consumers and deduplicating
//! them isn't worth the state.

use crate::events::{Axis, EventBatch, VirtualEvent};
use crate::keymap::KeyMap;
use crate::report::{ButtonGroup, Report};

/// Tracks which group's chord is currently held down on the virtual device.
#[derive(Clone, Debug, Default)]
pub struct ButtonLatch {
    active: Option<ButtonGroup>,
}

impl ButtonLatch {
    /// The group whose chord is currently held, if any.
    #[must_use]
    pub fn active_group(&self) -> Option<ButtonGroup> {
        self.active
    }

    /// Turn one decoded report into the writes it implies.
    ///
    /// Priority order, first match wins:
    /// 1. a moving pointer emits the three absolute axes;
    /// 2. an asserted group emits its chord's key-downs and becomes active;
    /// 3. anything else emits key-ups for the previously active group.
    ///
    /// Every batch ends with [`VirtualEvent::Sync`].
    pub fn apply(&mut self, report: &Report, map: &KeyMap) -> EventBatch {
        let mut batch = EventBatch::new();
        match report {
            Report::Pointer(pose) if pose.moving => {
                batch.push(VirtualEvent::Axis {
                    axis: Axis::X,
                    value: pose.x,
                });
                batch.push(VirtualEvent::Axis {
                    axis: Axis::Y,
                    value: pose.y,
                });
                batch.push(VirtualEvent::Axis {
                    axis: Axis::Pressure,
                    value: pose.pressure,
                });
            }
            Report::Buttons(Some(group)) => {
                for &code in map.codes(*group) {
                    batch.push(VirtualEvent::Key {
                        code,
                        pressed: true,
                    });
                }
                self.active = Some(*group);
            }
            // Nothing pressed this cycle: let go of whatever was latched.
            // `active` stays put until a new group is asserted.
            _ => {
                if let Some(group) = self.active {
                    for &code in map.codes(group) {
                        batch.push(VirtualEvent::Key {
                            code,
                            pressed: false,
                        });
                    }
                }
            }
        }
        batch.push(VirtualEvent::Sync);
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Pose, RawReport};
    use evdev::Key;

    fn down(code: Key) -> VirtualEvent {
        VirtualEvent::Key {
            code,
            pressed: true,
        }
    }
    fn up(code: Key) -> VirtualEvent {
        VirtualEvent::Key {
            code,
            pressed: false,
        }
    }

    #[test]
    fn group_press_latches_and_emits_chord() {
        let map = KeyMap::default();
        let mut latch = ButtonLatch::default();
        let batch = latch.apply(&Report::Buttons(Some(ButtonGroup::One)), &map);
        assert_eq!(
            &batch[..],
            [
                down(Key::KEY_LEFTCTRL),
                down(Key::KEY_Z),
                VirtualEvent::Sync
            ]
        );
        assert_eq!(latch.active_group(), Some(ButtonGroup::One));
    }

    #[test]
    fn release_is_idempotent_per_no_press_report() {
        let map = KeyMap::default();
        let mut latch = ButtonLatch::default();
        latch.apply(&Report::Buttons(Some(ButtonGroup::Two)), &map);

        let release = [up(Key::KEY_LEFTCTRL), up(Key::KEY_Y), VirtualEvent::Sync];
        // Each no-press report re-emits the same key-ups, never new downs.
        for _ in 0..3 {
            let batch = latch.apply(&Report::Buttons(None), &map);
            assert_eq!(&batch[..], release);
            assert_eq!(latch.active_group(), Some(ButtonGroup::Two));
        }
    }

    #[test]
    fn moving_pointer_emits_axes_only() {
        let map = KeyMap::default();
        let mut latch = ButtonLatch::default();
        let pose = Pose {
            x: 100,
            y: 200,
            pressure: 300,
            moving: true,
            contact: true,
        };
        let expected = [
            VirtualEvent::Axis {
                axis: Axis::X,
                value: 100,
            },
            VirtualEvent::Axis {
                axis: Axis::Y,
                value: 200,
            },
            VirtualEvent::Axis {
                axis: Axis::Pressure,
                value: 300,
            },
            VirtualEvent::Sync,
        ];
        // Applying the same pose twice writes the same thing twice; the
        // latch carries no hidden pointer state.
        assert_eq!(&latch.apply(&Report::Pointer(pose), &map)[..], expected);
        assert_eq!(&latch.apply(&Report::Pointer(pose), &map)[..], expected);
        assert_eq!(latch.active_group(), None);
    }

    #[test]
    fn stationary_pointer_releases_like_no_press() {
        let map = KeyMap::default();
        let mut latch = ButtonLatch::default();
        latch.apply(&Report::Buttons(Some(ButtonGroup::Four)), &map);
        let pose = Pose {
            x: 0,
            y: 0,
            pressure: 0,
            moving: false,
            contact: true,
        };
        let batch = latch.apply(&Report::Pointer(pose), &map);
        assert_eq!(&batch[..], [up(Key::KEY_E), VirtualEvent::Sync]);
    }

    #[test]
    fn noise_never_changes_the_active_group() {
        let map = KeyMap::default();
        let mut latch = ButtonLatch::default();

        let junk = Report::Unrecognized(RawReport::from_slice(&[0xaa; 8]));
        assert_eq!(&latch.apply(&junk, &map)[..], [VirtualEvent::Sync]);
        assert_eq!(latch.active_group(), None);

        latch.apply(&Report::Buttons(Some(ButtonGroup::Plus)), &map);
        latch.apply(&junk, &map);
        latch.apply(&Report::NoOp, &map);
        assert_eq!(latch.active_group(), Some(ButtonGroup::Plus));
    }
}
