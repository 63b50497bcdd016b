/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! The interface between simulated devices and the machine driving them.
//!
//! A device is a [Device] implementation added to a machine. It doesn't own a thread or a clock:
//! the machine invokes one of its hooks whenever an event addressed to it fires, passing a
//! [Ctx] through which the device may access address spaces, drive its outputs and schedule
//! timers of its own.
use core::any::TypeId;
use core::fmt::{self, Debug};

use crate::clock::{ClockRate, VTime, VDuration};
use crate::error::{ScheduleError, StateError};
use crate::id::{DeviceId, EntryId, LineId, SpaceId, Pin, Level};
use crate::map::Width;
use crate::queue::EventHandle;

impl dyn Device {
    /// Attempts to downcast the box to a concrete type.
    #[inline]
    pub fn downcast<D: 'static>(self: Box<Self>) -> Result<Box<D>, Box<dyn Device>>
        where D: Device
    {
        if self.is::<D>() {
            unsafe {
                let raw: *mut dyn Device = Box::into_raw(self);
                Ok(Box::from_raw(raw as *mut D))
            }
        } else {
            Err(self)
        }
    }
}

impl dyn Device + 'static {
    /// Returns `true` if the boxed type is the same as `D`
    #[inline]
    pub fn is<D: Device + 'static>(&self) -> bool {
        TypeId::of::<D>() == self.type_id()
    }
    /// Returns some reference to the boxed value if it is of type `D`, or
    /// `None` if it isn't.
    pub fn downcast_ref<D: Device + 'static>(&self) -> Option<&D> {
        if self.is::<D>() {
            unsafe {
                Some(&*(self as *const dyn Device as *const D))
            }
        } else {
            None
        }
    }
    /// Returns some mutable reference to the boxed value if it is of type `D`, or
    /// `None` if it isn't.
    pub fn downcast_mut<D: Device + 'static>(&mut self) -> Option<&mut D> {
        if self.is::<D>() {
            unsafe {
                Some(&mut *(self as *mut dyn Device as *mut D))
            }
        } else {
            None
        }
    }
}

/// An interface of a simulated device.
///
/// All hooks have default implementations that do nothing, so a device only implements what its
/// configuration makes reachable: [Device::read] and [Device::write] for mapped ranges,
/// [Device::input_changed] for bound input pins, [Device::execute] for devices with a clock.
pub trait Device: Debug {
    /// Called once when the machine is finalized, in the order of device registration.
    fn start(&mut self, _ctx: &mut dyn Ctx) {}
    /// Called on a machine or device reset after all pending events of the device
    /// have been cancelled.
    fn reset(&mut self, _ctx: &mut dyn Ctx) {}
    /// Called when the machine shuts down.
    fn stop(&mut self) {}
    /// Reads a byte at `offset` relative to the beginning of the mapped range, plus its
    /// bank offset.
    fn read(&mut self, _offset: u32, _ctx: &mut dyn Ctx) -> u8 {
        0xFF
    }
    /// Writes a byte at `offset` relative to the beginning of the mapped range, plus its
    /// bank offset.
    fn write(&mut self, _offset: u32, _data: u8, _ctx: &mut dyn Ctx) {}
    /// Called when the level of a line bound to the input `pin` changes.
    fn input_changed(&mut self, _pin: Pin, _level: Level, _ctx: &mut dyn Ctx) {}
    /// Called when a timer requested by the device fires. `param` is the value given when
    /// requesting the timer.
    fn timer(&mut self, _param: u64, _ctx: &mut dyn Ctx) {}
    /// Performs one unit of work of a clocked device (e.g. a single instruction) and returns
    /// the number of clock cycles it took.
    ///
    /// Returning `None` halts the device, it stays suspended until resumed.
    fn execute(&mut self, _ctx: &mut dyn Ctx) -> Option<u32> {
        None
    }
    /// Serializes the dynamic state of the device.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }
    /// Restores the dynamic state of the device from the data created by [Device::save_state].
    fn load_state(&mut self, _state: &[u8]) -> Result<(), StateError> {
        Ok(())
    }
    /// Gets the `TypeId` of `self`.
    ///
    /// A required part for the ability to downcast dynamic `Device` instances.
    ///
    /// # Safety
    /// The default implementation of this method must not be overwritten by the specializations.
    /// Consider this method as `final`.
    fn type_id(&self) -> TypeId where Self: 'static {
        TypeId::of::<Self>()
    }
}

/// The view of the machine given to a device while one of its hooks runs.
pub trait Ctx {
    /// Returns the id of the device being called.
    fn device(&self) -> DeviceId;
    /// Returns the current virtual time.
    fn now(&self) -> VTime;
    /// Reads a byte from an address space.
    fn read(&mut self, space: SpaceId, address: u32) -> u8;
    /// Writes a byte to an address space.
    fn write(&mut self, space: SpaceId, address: u32, data: u8);
    /// Reads a multi-byte value in the byte order of the address space.
    fn read_wide(&mut self, space: SpaceId, address: u32, width: Width) -> u32;
    /// Writes a multi-byte value in the byte order of the address space.
    fn write_wide(&mut self, space: SpaceId, address: u32, width: Width, value: u32);
    /// Drives all lines bound to the output `pin` of the device.
    fn set_output(&mut self, pin: Pin, level: Level);
    /// Drives a line directly.
    fn drive_line(&mut self, line: LineId, level: Level);
    /// Stops driving a line.
    fn release_line(&mut self, line: LineId);
    /// Returns the current effective level of a line.
    fn line_level(&self, line: LineId) -> Option<Level>;
    /// Requests [Device::timer] to be called with `param` after `delay`.
    fn timer_after(&mut self, delay: VDuration, param: u64) -> EventHandle;
    /// Requests [Device::timer] to be called with `param` at `time`.
    fn timer_at(&mut self, time: VTime, param: u64) -> Result<EventHandle, ScheduleError>;
    /// Requests [Device::timer] to be called with `param` every `period` starting from
    /// now + `period`.
    fn timer_periodic(&mut self, period: VDuration, param: u64) -> Result<EventHandle, ScheduleError>;
    /// Cancels a timer. Returns `false` if the timer is not pending.
    fn cancel(&mut self, timer: EventHandle) -> bool;
    /// Moves a pending timer to a new time.
    fn adjust(&mut self, timer: EventHandle, time: VTime) -> Result<bool, ScheduleError>;
    /// Returns the clock rate of the device being called.
    fn clock(&self) -> Option<ClockRate>;
    /// Changes the clock rate of the device being called, effective from its next execution step.
    fn set_clock(&mut self, rate: ClockRate);
    /// Extends the current execution step of the device that initiated the current bus access.
    fn add_wait_states(&mut self, cycles: u32);
    /// Suspends execution of a clocked device.
    fn suspend(&mut self, device: DeviceId);
    /// Resumes execution of a suspended or halted device.
    fn resume(&mut self, device: DeviceId);
    /// Resets another device, cancelling its timers and its pending step.
    ///
    /// Returns `false` if the device doesn't exist, has been destroyed or is being called,
    /// e.g. it's the device resetting itself.
    fn reset_device(&mut self, device: DeviceId) -> bool;
    /// Changes the bank offset of a mapped range.
    fn set_bank_offset(&mut self, space: SpaceId, entry: EntryId, offset: u32) -> bool;
    fn find_device(&self, name: &str) -> Option<DeviceId>;
    fn find_space(&self, name: &str) -> Option<SpaceId>;
    fn find_line(&self, name: &str) -> Option<LineId>;
    /// Sends a message to the diagnostics sink of the machine, filtered by the log level of
    /// the device.
    fn log(&mut self, level: log::Level, args: fmt::Arguments<'_>);
}
