/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    TICKWIRE is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    TICKWIRE is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
//! TICKWIRE is a library for composing simulated machines out of devices communicating
//! through address spaces and signal lines, driven by a single virtual clock.
//!
//! A machine is described with a [MachineBuilder][machine::MachineBuilder]: devices implementing
//! [Device][device::Device] are registered under unique names, memory ranges of address spaces
//! are mapped to them and their pins are bound to named lines. [finalize][machine::MachineBuilder::finalize]
//! validates the description and creates a [Machine][machine::Machine] which advances virtual
//! time by firing scheduled events, one at a time.
//!
//! * [clock] - virtual time and device clock rates.
//! * [queue] - the time-ordered queue of scheduled events.
//! * [map] - address spaces.
//! * [signal] - signal lines.
//! * [device] - the [Device][device::Device] hooks and the [Ctx][device::Ctx] given to them.
//! * [exec] - execution contexts of clocked devices.
//! * [machine] - the machine and its builder.
//! * [diag] - diagnostics reported while a machine runs.
//! * `peripherals` - generic devices (feature `peripherals`).
//!
//! Save states are available with the `snapshot` feature, see
//! [Machine::snapshot][machine::Machine::snapshot].
pub use tickwire_core::{clock, device, error, map, queue, signal};
pub use tickwire_core::id::*;

pub mod diag;
pub mod exec;
pub mod machine;

#[cfg(feature = "peripherals")]
pub use tickwire_peripherals as peripherals;

/// Imports the types needed to compose and run a machine.
pub mod prelude {
    pub use crate::clock::{ClockRate, VDuration, VTime};
    pub use crate::device::{Ctx, Device};
    pub use crate::diag::{Diagnostic, DiagnosticsSink, LogSink};
    pub use crate::error::{ConfigError, ConfigErrors, ScheduleError, StateError};
    pub use crate::exec::ExecState;
    pub use crate::map::{Access, DualPolicy, Endian, MapRange, SpaceConfig, Width};
    pub use crate::machine::{DeviceConfig, Machine, MachineBuilder};
    #[cfg(feature = "snapshot")]
    pub use crate::machine::{MachineSnapshot, SnapshotError};
    pub use crate::queue::EventHandle;
    pub use crate::signal::{DelayMode, LineConfig, Resolve};
    pub use crate::{DeviceId, EntryId, LineId, SpaceId, Pin, Level, LOW, HIGH, level};
}
