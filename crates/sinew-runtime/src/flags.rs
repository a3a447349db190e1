//! Bit flags shared by observers and bindings.

use bitflags::bitflags;

bitflags! {
    /// Context passed down through bind, unbind and change propagation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleFlags: u32 {
        /// The initial push performed while binding.
        const FROM_BIND     = 0b0000_0001;
        const FROM_UNBIND   = 0b0000_0010;
        /// Propagating a source change towards the target.
        const UPDATE_TARGET = 0b0000_0100;
        /// Propagating a target change back into the source.
        const UPDATE_SOURCE = 0b0000_1000;
    }
}

bitflags! {
    /// Direction(s) a property binding synchronizes in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindingMode: u8 {
        const ONE_TIME  = 0b0001;
        const TO_VIEW   = 0b0010;
        const FROM_VIEW = 0b0100;
        const TWO_WAY   = Self::TO_VIEW.bits() | Self::FROM_VIEW.bits();
    }
}

bitflags! {
    /// What kind of property an observer sits on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessorType: u8 {
        /// Writes are observable (the observer can notify subscribers).
        const OBSERVER  = 0b0001;
        /// The target is a host element.
        const NODE      = 0b0010;
        /// Writing the property affects layout; writes may be deferred.
        const LAYOUT    = 0b0100;
        /// The target is a primitive; nothing is ever observed.
        const PRIMITIVE = 0b1000;
    }
}

impl BindingMode {
    #[must_use]
    pub fn name(self) -> &'static str {
        if self == Self::ONE_TIME {
            "one-time"
        } else if self == Self::TO_VIEW {
            "to-view"
        } else if self == Self::FROM_VIEW {
            "from-view"
        } else if self == Self::TWO_WAY {
            "two-way"
        } else {
            "invalid"
        }
    }

    /// Exactly one of the four recognized modes.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Self::ONE_TIME
            || self == Self::TO_VIEW
            || self == Self::FROM_VIEW
            || self == Self::TWO_WAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_way_is_union_of_directions() {
        assert!(BindingMode::TWO_WAY.contains(BindingMode::TO_VIEW));
        assert!(BindingMode::TWO_WAY.contains(BindingMode::FROM_VIEW));
        assert!(!BindingMode::TWO_WAY.contains(BindingMode::ONE_TIME));
        assert_eq!(BindingMode::TWO_WAY.name(), "two-way");
    }

    #[test]
    fn mixed_modes_are_invalid() {
        assert!(!(BindingMode::ONE_TIME | BindingMode::TO_VIEW).is_valid());
        assert!(!BindingMode::empty().is_valid());
        assert!(BindingMode::FROM_VIEW.is_valid());
    }
}
