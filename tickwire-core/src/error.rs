/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Errors reported while describing a machine and while scheduling events.
use core::fmt;
use std::error::Error;

use crate::clock::VTime;

/// A description of an address range used in error messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeInfo {
    /// The name of the device handling the range.
    pub owner: String,
    /// The first address of the canonical range.
    pub base: u32,
    /// The last address of the canonical range.
    pub last: u32,
    pub mirror: u32,
}

/// An error in a machine description. Configuration errors are fatal: a machine is never
/// started with an incorrect description.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The address space width is not in the range `1..=32` bits.
    InvalidSpaceWidth { space: String, addr_bits: u8 },
    /// A range with size `0`.
    EmptyRange { space: String, range: RangeInfo },
    /// A range reaching past the end of the address space.
    RangeOutOfSpace { space: String, range: RangeInfo },
    /// Some address inside the canonical range has one of the mirror bits set.
    MirrorInsideRange { space: String, range: RangeInfo },
    /// Two ranges decode the same address and at least one of them isn't declared as
    /// a dual-access range.
    OverlappingRanges { space: String, first: RangeInfo, second: RangeInfo },
    /// Too many dual-access ranges share addresses with the range.
    TooManyDualRanges { space: String, range: RangeInfo },
    /// A recurring event or a clock with a zero period.
    ZeroPeriod { owner: String },
    /// A device name registered twice.
    DuplicateDevice(String),
    /// A line name registered twice.
    DuplicateLine(String),
    /// An address space name registered twice.
    DuplicateSpace(String),
    /// A reference to a device that doesn't exist.
    UnknownDevice { name: String, referenced_by: String },
    /// A reference to a line that doesn't exist.
    UnknownLine { name: String, referenced_by: String },
    /// A reference to an address space that doesn't exist.
    UnknownSpace { name: String, referenced_by: String },
}

/// All configuration errors found in a machine description.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

/// An error returned when requesting a scheduled event.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// A recurring event was requested with a zero period.
    ZeroPeriod,
    /// The requested fire time precedes the current virtual time.
    InPast { requested: VTime, now: VTime },
}

/// An error returned by a device refusing to restore its state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateError(pub String);

impl fmt::Display for RangeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:#x}-{:#x}", self.owner, self.base, self.last)?;
        if self.mirror != 0 {
            write!(f, " mirror {:#x}", self.mirror)?;
        }
        f.write_str("]")
    }
}

impl Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConfigError::*;
        match self {
            InvalidSpaceWidth { space, addr_bits } => write!(f,
                "address space {}: width of {} bits is not supported", space, addr_bits),
            EmptyRange { space, range } => write!(f,
                "address space {}: empty range {}", space, range),
            RangeOutOfSpace { space, range } => write!(f,
                "address space {}: range {} exceeds the address space", space, range),
            MirrorInsideRange { space, range } => write!(f,
                "address space {}: mirror bits overlap the range {}", space, range),
            OverlappingRanges { space, first, second } => write!(f,
                "address space {}: range {} overlaps {}", space, second, first),
            TooManyDualRanges { space, range } => write!(f,
                "address space {}: too many dual-access ranges overlap {}", space, range),
            ZeroPeriod { owner } => write!(f, "{}: zero period", owner),
            DuplicateDevice(name) => write!(f, "device {} is defined more than once", name),
            DuplicateLine(name) => write!(f, "line {} is defined more than once", name),
            DuplicateSpace(name) => write!(f, "address space {} is defined more than once", name),
            UnknownDevice { name, referenced_by } => write!(f,
                "{}: no such device: {}", referenced_by, name),
            UnknownLine { name, referenced_by } => write!(f,
                "{}: no such line: {}", referenced_by, name),
            UnknownSpace { name, referenced_by } => write!(f,
                "{}: no such address space: {}", referenced_by, name),
        }
    }
}

impl ConfigErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, ConfigError> {
        self.0.iter()
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(err: ConfigError) -> Self {
        ConfigErrors(vec![err])
    }
}

impl Error for ConfigErrors {}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid machine description")?;
        for err in self.0.iter() {
            write!(f, "\n  {}", err)?;
        }
        Ok(())
    }
}

impl Error for ScheduleError {}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::ZeroPeriod => f.write_str("recurring event period must be positive"),
            ScheduleError::InPast { requested, now } => write!(f,
                "requested event time {} precedes the current time {}", requested, now)
        }
    }
}

impl Error for StateError {}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid device state: {}", self.0)
    }
}
