/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Stable identifiers used to refer to the parts of a composed machine.
use core::fmt;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

/// An index of a device in the machine composition graph.
///
/// Devices never hold references to each other, only identifiers.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// The pseudo device representing the embedding program, e.g. when the host
    /// drives an input line or inspects memory.
    pub const HOST: DeviceId = DeviceId(u32::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_host(self) -> bool {
        self == Self::HOST
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            f.write_str("#host")
        }
        else {
            write!(f, "#{}", self.0)
        }
    }
}

/// An index of a [SignalLine][crate::signal::SignalLine] in the machine wiring.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LineId(pub u32);

impl LineId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An index of an [AddressMap][crate::map::AddressMap] in the machine.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SpaceId(pub u32);

impl SpaceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An index of a range registered in an [AddressMap][crate::map::AddressMap].
///
/// Entries are numbered in the order of registration.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntryId(pub u32);

impl EntryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A device-local number of an input or an output pin.
pub type Pin = u16;

/// A logic level carried by a signal line.
///
/// Boolean lines use `0` and `1`, multi-valued lines (e.g. an interrupt priority level)
/// use any value.
pub type Level = u32;

/// The low logic level.
pub const LOW: Level = 0;
/// The high logic level.
pub const HIGH: Level = 1;

/// Converts a boolean into a logic level.
#[inline]
pub fn level(high: bool) -> Level {
    high as Level
}
