//! Button-group to key-code bindings.
//!
//! Each pad [`ButtonGroup`] maps to an *ordered* chord of virtual key codes -
//! pressing the group presses every code in order, releasing it releases them
//! in the same order. Bindings are plain configuration supplied at startup;
//! the defaults suit a drawing app but nothing in the pipeline cares what
//! they are.

use crate::report::ButtonGroup;
use evdev::Key;
use smallvec::SmallVec;
use strum::{EnumCount, IntoEnumIterator};

/// An ordered chord of key codes bound to one group. Most bindings are one
/// or two codes.
pub type Chord = SmallVec<[Key; 2]>;

/// The full group → chord table.
#[derive(Clone, Debug)]
pub struct KeyMap {
    chords: [Chord; ButtonGroup::COUNT],
}

impl KeyMap {
    /// A map with every group unbound.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            chords: std::array::from_fn(|_| Chord::new()),
        }
    }

    /// The codes bound to `group`, in press order.
    #[must_use]
    pub fn codes(&self, group: ButtonGroup) -> &[Key] {
        &self.chords[group as usize]
    }

    /// Replace the binding for `group`.
    pub fn bind(&mut self, group: ButtonGroup, codes: impl IntoIterator<Item = Key>) {
        self.chords[group as usize] = codes.into_iter().collect();
    }

    /// Every code referenced by any group, for registration with the virtual
    /// device. Codes shared between groups appear once per group.
    pub fn all_codes(&self) -> impl Iterator<Item = Key> + '_ {
        ButtonGroup::iter().flat_map(|group| self.codes(group).iter().copied())
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut map = Self::empty();
        map.bind(ButtonGroup::One, [Key::KEY_LEFTCTRL, Key::KEY_Z]);
        map.bind(ButtonGroup::Two, [Key::KEY_LEFTCTRL, Key::KEY_Y]);
        map.bind(ButtonGroup::Three, [Key::KEY_LEFTCTRL, Key::KEY_S]);
        map.bind(ButtonGroup::Four, [Key::KEY_E]);
        map.bind(ButtonGroup::Plus, [Key::KEY_KPPLUS]);
        map.bind(ButtonGroup::Minus, [Key::KEY_KPMINUS]);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_replaces_in_order() {
        let mut map = KeyMap::empty();
        assert!(map.codes(ButtonGroup::Plus).is_empty());
        map.bind(ButtonGroup::Plus, [Key::KEY_LEFTSHIFT, Key::KEY_EQUAL]);
        assert_eq!(
            map.codes(ButtonGroup::Plus),
            [Key::KEY_LEFTSHIFT, Key::KEY_EQUAL]
        );
    }

    #[test]
    fn default_covers_every_group() {
        let map = KeyMap::default();
        for group in ButtonGroup::iter() {
            assert!(!map.codes(group).is_empty(), "{} unbound", group.as_ref());
        }
    }
}
