/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
use core::fmt;

use crate::clock::{ClockRate, VTime, VDuration};
use crate::device::Ctx;
use crate::diag::Diagnostic;
use crate::error::ScheduleError;
use crate::exec::ExecState;
use crate::map::Width;
use crate::queue::EventHandle;
use crate::{DeviceId, EntryId, LineId, SpaceId, Pin, Level};

use super::{Machine, Payload};

/// The machine as seen by the device being called.
pub(super) struct Context<'a> {
    machine: &'a mut Machine,
    device: DeviceId,
    initiator: DeviceId,
}

impl<'a> Context<'a> {
    /// `initiator` is the device which caused the call, e.g. a CPU accessing a memory device,
    /// or the called `device` itself.
    pub(super) fn new(machine: &'a mut Machine, device: DeviceId, initiator: DeviceId) -> Self {
        Context { machine, device, initiator }
    }

    fn owns_timer(&self, timer: EventHandle) -> bool {
        self.machine.queue.get(timer).map_or(false, |ev| {
            ev.owner == self.device && matches!(ev.payload, Payload::Timer(_))
        })
    }
}

impl Ctx for Context<'_> {
    fn device(&self) -> DeviceId {
        self.device
    }

    fn now(&self) -> VTime {
        self.machine.now()
    }

    fn read(&mut self, space: SpaceId, address: u32) -> u8 {
        self.machine.bus_read(self.device, space, address)
    }

    fn write(&mut self, space: SpaceId, address: u32, data: u8) {
        self.machine.bus_write(self.device, space, address, data)
    }

    fn read_wide(&mut self, space: SpaceId, address: u32, width: Width) -> u32 {
        self.machine.bus_read_wide(self.device, space, address, width)
    }

    fn write_wide(&mut self, space: SpaceId, address: u32, width: Width, value: u32) {
        self.machine.bus_write_wide(self.device, space, address, width, value)
    }

    fn set_output(&mut self, pin: Pin, level: Level) {
        self.machine.set_output(self.device, pin, level)
    }

    fn drive_line(&mut self, line: LineId, level: Level) {
        self.machine.drive_line_as(self.device, line, level)
    }

    fn release_line(&mut self, line: LineId) {
        self.machine.release_line_as(self.device, line)
    }

    fn line_level(&self, line: LineId) -> Option<Level> {
        self.machine.line_level(line)
    }

    fn timer_after(&mut self, delay: VDuration, param: u64) -> EventHandle {
        self.machine.queue.schedule_after(delay, self.device, Payload::Timer(param))
    }

    fn timer_at(&mut self, time: VTime, param: u64) -> Result<EventHandle, ScheduleError> {
        self.machine.queue.schedule_at(time, self.device, Payload::Timer(param))
    }

    fn timer_periodic(&mut self, period: VDuration, param: u64) -> Result<EventHandle, ScheduleError> {
        self.machine.queue.schedule_periodic(period, self.device, Payload::Timer(param))
    }

    fn cancel(&mut self, timer: EventHandle) -> bool {
        self.owns_timer(timer) && self.machine.queue.cancel(timer)
    }

    fn adjust(&mut self, timer: EventHandle, time: VTime) -> Result<bool, ScheduleError> {
        if !self.owns_timer(timer) {
            return Ok(false)
        }
        self.machine.queue.reschedule(timer, time)
    }

    fn clock(&self) -> Option<ClockRate> {
        self.machine.exec(self.device).and_then(|exec| exec.rate())
    }

    fn set_clock(&mut self, rate: ClockRate) {
        if !self.machine.set_clock(self.device, rate) {
            self.machine.report(self.device, &Diagnostic::Message {
                level: log::Level::Warn,
                args: format_args!("can't change the clock of an unclocked device to {}", rate)
            });
        }
    }

    fn add_wait_states(&mut self, cycles: u32) {
        if let Some(slot) = self.machine.slots.get_mut(self.initiator.index()) {
            slot.exec.add_wait_states(cycles);
        }
    }

    fn suspend(&mut self, device: DeviceId) {
        self.machine.suspend(device);
    }

    fn resume(&mut self, device: DeviceId) {
        self.machine.resume(device);
    }

    fn reset_device(&mut self, device: DeviceId) -> bool {
        match self.machine.exec(device) {
            Some(exec) if exec.state() != ExecState::Destroyed => {}
            _ => return false
        }
        if self.machine.is_checked_out(device) {
            let name = self.machine.device_name(device).unwrap_or_default().to_string();
            self.machine.report(self.device, &Diagnostic::Message {
                level: log::Level::Warn,
                args: format_args!("can't reset {} while it is being called", name)
            });
            return false
        }
        self.machine.reset_device(device);
        true
    }

    fn set_bank_offset(&mut self, space: SpaceId, entry: EntryId, offset: u32) -> bool {
        self.machine.set_bank_offset(space, entry, offset)
    }

    fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.machine.find_device(name)
    }

    fn find_space(&self, name: &str) -> Option<SpaceId> {
        self.machine.find_space(name)
    }

    fn find_line(&self, name: &str) -> Option<LineId> {
        self.machine.find_line(name)
    }

    fn log(&mut self, level: log::Level, args: fmt::Arguments<'_>) {
        self.machine.report(self.device, &Diagnostic::Message { level, args })
    }
}
