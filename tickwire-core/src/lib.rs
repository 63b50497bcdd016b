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
//! The core components of the TICKWIRE library.
//!
//! * [clock] - the virtual time types shared by the whole machine.
//! * [queue] - the time-ordered queue of scheduled events.
//! * [signal] - logic lines connecting device outputs to device inputs.
//! * [map] - address spaces routing memory accesses to device handlers.
//! * [device] - the interface between simulated devices and the machine driving them.
//! * [error] - configuration errors reported while composing a machine.
pub mod clock;
pub mod device;
pub mod error;
pub mod id;
pub mod map;
pub mod queue;
pub mod signal;

pub use id::*;
