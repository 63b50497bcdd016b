/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! The machine: devices composed with address spaces and signal lines, driven by the
//! event queue.
//!
//! A [Machine] is created by [MachineBuilder::finalize] and owns everything: the devices,
//! the clock and the queue. Time advances only while [Machine::run_until] (or one of its
//! variants) drains the queue. Every fired event invokes a hook of a single device; the hook runs
//! to completion before the next event fires.
//!
//! While a hook runs the device is checked out of the machine. Bus accesses hitting a checked-out
//! device are treated as unmapped and input changes targeting it are deferred until its hook
//! returns. Likewise, input changes reaching a device during start-up are deferred until its
//! own start hook has run.
use core::fmt;
use std::collections::{HashMap, VecDeque};

use arrayvec::ArrayVec;
use log::LevelFilter;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::clock::{VTime, VDuration, ClockRate};
use crate::device::Device;
use crate::diag::{Diagnostic, DiagnosticsSink};
use crate::exec::{Exec, ExecState};
use crate::map::{Access, AddressMap, Width, MAX_HITS};
use crate::queue::{EventQueue, Fired};
use crate::signal::{Propagation, SignalLine, Wiring};
use crate::{DeviceId, EntryId, LineId, SpaceId, Pin, Level};

mod builder;
mod context;
#[cfg(feature = "snapshot")]
mod snapshot;

pub use builder::*;
#[cfg(feature = "snapshot")]
pub use snapshot::*;
use context::Context;

/// The name under which the embedding program reports diagnostics.
pub const HOST_NAME: &str = "host";

/// Payloads of events scheduled by a machine.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Payload {
    /// A step of a clocked device.
    Execute,
    /// A timer requested by a device with the given parameter.
    Timer(u64),
    /// A delayed change of a line level.
    Propagate { line: LineId, level: Level },
}

#[derive(Debug)]
struct Slot {
    name: String,
    log_level: LevelFilter,
    device: Option<Box<dyn Device>>,
    exec: Exec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Deferred {
    device: DeviceId,
    pin: Pin,
    level: Level,
}

/// A composed, runnable machine.
pub struct Machine {
    queue: EventQueue<Payload>,
    slots: Vec<Slot>,
    device_names: HashMap<String, DeviceId>,
    spaces: Vec<AddressMap>,
    space_names: HashMap<String, SpaceId>,
    wiring: Wiring,
    deferred: VecDeque<Deferred>,
    sink: Box<dyn DiagnosticsSink>,
    host_log_level: LevelFilter,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
         .field("queue", &self.queue)
         .field("slots", &self.slots)
         .field("spaces", &self.spaces)
         .field("wiring", &self.wiring)
         .field("deferred", &self.deferred)
         .finish()
    }
}

impl Machine {
    /// Returns the current virtual time.
    #[inline]
    pub fn now(&self) -> VTime {
        self.queue.now()
    }
    /// Provides a read-only access to the event queue.
    pub fn queue(&self) -> &EventQueue<Payload> {
        &self.queue
    }
    /// Fires all events due up to and including `target`, then moves the clock to `target`.
    ///
    /// Returns the current time, which is never earlier than it was before the call.
    pub fn run_until(&mut self, target: VTime) -> VTime {
        loop {
            match self.queue.next_due() {
                Some(due) if due <= target => {
                    if let Some(fired) = self.queue.advance_to_next() {
                        self.dispatch(fired);
                    }
                }
                _ => break
            }
        }
        self.queue.advance_to(target);
        self.now()
    }
    /// Runs the machine for `duration` of virtual time.
    pub fn run_for(&mut self, duration: VDuration) -> VTime {
        let target = self.now().saturating_add(duration);
        self.run_until(target)
    }
    /// Fires the next pending event. Returns its fire time or `None` if nothing is pending.
    pub fn step(&mut self) -> Option<VTime> {
        let fired = self.queue.advance_to_next()?;
        let time = fired.fire_time;
        self.dispatch(fired);
        Some(time)
    }

    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.device_names.get(name).copied()
    }

    pub fn find_space(&self, name: &str) -> Option<SpaceId> {
        self.space_names.get(name).copied()
    }

    pub fn find_line(&self, name: &str) -> Option<LineId> {
        self.wiring.find(name)
    }

    pub fn device_name(&self, id: DeviceId) -> Option<&str> {
        if id.is_host() {
            return Some(HOST_NAME)
        }
        self.slots.get(id.index()).map(|slot| slot.name.as_str())
    }

    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    pub fn device(&self, id: DeviceId) -> Option<&dyn Device> {
        self.slots.get(id.index())?.device.as_deref()
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut (dyn Device + 'static)> {
        self.slots.get_mut(id.index())?.device.as_deref_mut()
    }
    /// Returns a reference to the device if it is of type `D`.
    pub fn device_as<D: Device + 'static>(&self, id: DeviceId) -> Option<&D> {
        self.slots.get(id.index())?.device.as_ref()?.downcast_ref::<D>()
    }
    /// Returns a mutable reference to the device if it is of type `D`.
    pub fn device_as_mut<D: Device + 'static>(&mut self, id: DeviceId) -> Option<&mut D> {
        self.slots.get_mut(id.index())?.device.as_mut()?.downcast_mut::<D>()
    }
    /// Returns a reference to the device named `name` if it is of type `D`.
    pub fn device_by_name<D: Device + 'static>(&self, name: &str) -> Option<&D> {
        self.device_as(self.find_device(name)?)
    }

    pub fn exec(&self, id: DeviceId) -> Option<&Exec> {
        self.slots.get(id.index()).map(|slot| &slot.exec)
    }

    pub fn space(&self, id: SpaceId) -> Option<&AddressMap> {
        self.spaces.get(id.index())
    }

    pub fn line(&self, id: LineId) -> Option<&SignalLine> {
        self.wiring.line(id)
    }

    pub fn line_level(&self, id: LineId) -> Option<Level> {
        self.wiring.line(id).map(SignalLine::value)
    }

    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }
    /// Replaces the diagnostics sink. The default sink is [LogSink].
    pub fn set_diagnostics<S: DiagnosticsSink + 'static>(&mut self, sink: S) {
        self.sink = Box::new(sink);
    }
    /// Sets the maximum level of diagnostics reported for accesses by the embedding program.
    pub fn set_host_log_level(&mut self, level: LevelFilter) {
        self.host_log_level = level;
    }
    /// Reads a byte from an address space on behalf of the embedding program.
    pub fn read(&mut self, space: SpaceId, address: u32) -> u8 {
        self.bus_read(DeviceId::HOST, space, address)
    }
    /// Writes a byte to an address space on behalf of the embedding program.
    pub fn write(&mut self, space: SpaceId, address: u32, data: u8) {
        self.bus_write(DeviceId::HOST, space, address, data)
    }

    pub fn read_wide(&mut self, space: SpaceId, address: u32, width: Width) -> u32 {
        self.bus_read_wide(DeviceId::HOST, space, address, width)
    }

    pub fn write_wide(&mut self, space: SpaceId, address: u32, width: Width, value: u32) {
        self.bus_write_wide(DeviceId::HOST, space, address, width, value)
    }
    /// Drives a line on behalf of the embedding program, e.g. a key press.
    pub fn drive_line(&mut self, line: LineId, level: Level) {
        self.drive_line_as(DeviceId::HOST, line, level)
    }
    /// Stops driving a line by the embedding program.
    pub fn release_line(&mut self, line: LineId) {
        self.release_line_as(DeviceId::HOST, line)
    }
    /// Changes the bank offset of a mapped range. Returns `false` if there is no such range.
    pub fn set_bank_offset(&mut self, space: SpaceId, entry: EntryId, offset: u32) -> bool {
        self.spaces.get_mut(space.index())
                   .map_or(false, |map| map.set_bank_offset(entry, offset))
    }
    /// Resets all devices in the order of their registration.
    pub fn reset(&mut self) {
        for n in 0..self.slots.len() {
            self.reset_device(DeviceId(n as u32));
        }
    }
    /// Resets a device: cancels its timers and its pending step, calls [Device::reset] and
    /// resumes its execution.
    ///
    /// Delayed line changes driven by the device are not cancelled.
    pub fn reset_device(&mut self, id: DeviceId) {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.exec.state() != ExecState::Destroyed => {
                slot.exec.set_event(None);
            }
            _ => return
        }
        self.queue.cancel_matching(|ev| {
            ev.owner == id && matches!(ev.payload, Payload::Execute | Payload::Timer(_))
        });
        self.with_device(id, id, |device, ctx| device.reset(ctx));
        self.run_device(id);
    }
    /// Suspends execution of a device. Returns `false` if the device isn't running.
    ///
    /// A suspended device still receives timer events and input changes.
    pub fn suspend(&mut self, id: DeviceId) -> bool {
        let queue = &mut self.queue;
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.exec.state() == ExecState::Running => {
                if let Some(event) = slot.exec.take_event() {
                    queue.cancel(event);
                }
                slot.exec.set_state(ExecState::Suspended);
                true
            }
            _ => false
        }
    }
    /// Resumes execution of a suspended or halted device at the current time. Returns `false`
    /// if the device isn't suspended.
    pub fn resume(&mut self, id: DeviceId) -> bool {
        match self.slots.get(id.index()) {
            Some(slot) if slot.exec.state() == ExecState::Suspended => {}
            _ => return false
        }
        self.run_device(id);
        true
    }
    /// Calls [Device::stop] of all devices and discards all pending events.
    ///
    /// The machine doesn't process any events afterwards.
    pub fn shutdown(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.exec.state() == ExecState::Destroyed {
                continue
            }
            if let Some(device) = slot.device.as_mut() {
                device.stop();
            }
            slot.exec.set_event(None);
            slot.exec.set_state(ExecState::Destroyed);
        }
        self.queue.clear();
        self.deferred.clear();
    }
    /// Puts the device in the running state and, if it's clocked, schedules its next step now.
    fn run_device(&mut self, id: DeviceId) {
        let now = self.queue.now();
        let queue = &mut self.queue;
        if let Some(slot) = self.slots.get_mut(id.index()) {
            let exec = &mut slot.exec;
            if let Some(event) = exec.take_event() {
                queue.cancel(event);
            }
            exec.set_state(ExecState::Running);
            if exec.is_clocked() {
                exec.anchor_at(now);
                let event = queue.schedule_after(VDuration::ZERO, id, Payload::Execute);
                exec.set_event(Some(event));
            }
        }
    }

    fn dispatch(&mut self, fired: Fired<Payload>) {
        match fired.payload {
            Payload::Execute => self.execute_step(fired.owner),
            Payload::Timer(param) => {
                self.with_device(fired.owner, fired.owner, |device, ctx| device.timer(param, ctx));
            }
            Payload::Propagate { line, level } => {
                let notify = self.wiring.line_mut(line)
                                        .and_then(|l| l.deliver(fired.handle, level));
                if let Some(level) = notify {
                    self.notify(line, level);
                }
            }
        }
    }

    fn execute_step(&mut self, id: DeviceId) {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.exec.state() == ExecState::Running => {
                slot.exec.set_event(None);
            }
            _ => return
        }
        let result = match self.with_device(id, id, |device, ctx| device.execute(ctx)) {
            Some(result) => result,
            None => return
        };
        let now = self.queue.now();
        let queue = &mut self.queue;
        let slot = match self.slots.get_mut(id.index()) {
            Some(slot) => slot,
            None => return
        };
        let exec = &mut slot.exec;
        if exec.state() != ExecState::Running || exec.event().is_some() {
            // suspended or resumed while executing
            if let Some(cycles) = result {
                exec.count_cycles(cycles);
            }
            return
        }
        match result {
            Some(cycles) => {
                let next = exec.complete_step(cycles);
                let delay = next.saturating_duration_since(now);
                exec.set_event(Some(queue.schedule_after(delay, id, Payload::Execute)));
            }
            None => {
                trace!("{} halted at {}", slot.name, now);
                exec.set_state(ExecState::Suspended);
            }
        }
    }
    /// Calls `f` with the device checked out of its slot.
    ///
    /// Returns `None` if there is no such device, it has been destroyed or it is already
    /// checked out.
    fn with_device<R, F>(&mut self, id: DeviceId, initiator: DeviceId, f: F) -> Option<R>
        where F: FnOnce(&mut dyn Device, &mut Context<'_>) -> R
    {
        let slot = self.slots.get_mut(id.index())?;
        if slot.exec.state() == ExecState::Destroyed {
            return None
        }
        let mut device = slot.device.take()?;
        let result = {
            let mut ctx = Context::new(self, id, initiator);
            f(&mut *device, &mut ctx)
        };
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.device = Some(device);
        }
        self.flush_deferred(id);
        Some(result)
    }

    fn is_checked_out(&self, id: DeviceId) -> bool {
        self.slots.get(id.index()).map_or(false, |slot| slot.device.is_none())
    }

    fn is_unstarted(&self, id: DeviceId) -> bool {
        self.slots.get(id.index()).map_or(false, |slot| slot.exec.state() == ExecState::Unstarted)
    }

    fn flush_deferred(&mut self, id: DeviceId) {
        while let Some(pos) = self.deferred.iter().position(|d| d.device == id) {
            if let Some(Deferred { pin, level, .. }) = self.deferred.remove(pos) {
                self.with_device(id, id, |device, ctx| device.input_changed(pin, level, ctx));
            }
        }
    }

    fn bus_read(&mut self, initiator: DeviceId, space: SpaceId, address: u32) -> u8 {
        let (hits, dual, unmapped) = match self.spaces.get(space.index()) {
            Some(map) => (map.decode(address, Access::READ), map.config().dual, map.config().unmapped),
            None => return 0xFF
        };
        let mut values = ArrayVec::<u8, MAX_HITS>::new();
        for hit in hits.iter() {
            let offset = hit.offset;
            match self.with_device(hit.handler, initiator, |device, ctx| device.read(offset, ctx)) {
                Some(value) => values.push(value),
                None if self.is_checked_out(hit.handler) => {
                    self.report_busy(initiator, space, address, hit.handler)
                }
                None => {}
            }
        }
        match dual.combine(values) {
            Some(value) => value,
            None => {
                if hits.is_empty() {
                    let address = address & self.spaces[space.index()].addr_mask();
                    let space = self.space_name(space);
                    self.report(initiator, &Diagnostic::UnmappedRead { space: &space, address });
                }
                unmapped
            }
        }
    }

    fn bus_write(&mut self, initiator: DeviceId, space: SpaceId, address: u32, data: u8) {
        let hits = match self.spaces.get(space.index()) {
            Some(map) => map.decode(address, Access::WRITE),
            None => return
        };
        if hits.is_empty() {
            let address = address & self.spaces[space.index()].addr_mask();
            let space = self.space_name(space);
            self.report(initiator, &Diagnostic::UnmappedWrite { space: &space, address, data });
        }
        for hit in hits.iter() {
            let offset = hit.offset;
            if self.with_device(hit.handler, initiator, |device, ctx| device.write(offset, data, ctx)).is_none()
                && self.is_checked_out(hit.handler)
            {
                self.report_busy(initiator, space, address, hit.handler);
            }
        }
    }

    fn bus_read_wide(&mut self, initiator: DeviceId, space: SpaceId, address: u32, width: Width) -> u32 {
        let endian = match self.spaces.get(space.index()) {
            Some(map) => map.config().endian,
            None => return u32::MAX
        };
        let bytes = (0..width.bytes()).map(|n| self.bus_read(initiator, space, address.wrapping_add(n)))
                                      .collect::<ArrayVec<u8, 4>>();
        endian.assemble(bytes)
    }

    fn bus_write_wide(&mut self, initiator: DeviceId, space: SpaceId, address: u32, width: Width, value: u32) {
        let endian = match self.spaces.get(space.index()) {
            Some(map) => map.config().endian,
            None => return
        };
        for (n, byte) in endian.split(value, width).into_iter().enumerate() {
            self.bus_write(initiator, space, address.wrapping_add(n as u32), byte);
        }
    }

    fn set_output(&mut self, device: DeviceId, pin: Pin, level: Level) {
        let lines = self.wiring.outputs_of(device, pin).to_vec();
        for line in lines {
            self.drive_line_as(device, line, level);
        }
    }

    fn drive_line_as(&mut self, driver: DeviceId, line: LineId, level: Level) {
        let queue = &mut self.queue;
        let propagation = match self.wiring.line_mut(line) {
            Some(l) => l.set_driver_value(driver, level, queue, |level| Payload::Propagate { line, level }),
            None => return
        };
        if let Propagation::Now(level) = propagation {
            self.notify(line, level);
        }
    }

    fn release_line_as(&mut self, driver: DeviceId, line: LineId) {
        let queue = &mut self.queue;
        let propagation = match self.wiring.line_mut(line) {
            Some(l) => l.release(driver, queue, |level| Payload::Propagate { line, level }),
            None => return
        };
        if let Propagation::Now(level) = propagation {
            self.notify(line, level);
        }
    }
    /// Notifies subscribers of a line in the order of subscription.
    fn notify(&mut self, line: LineId, level: Level) {
        let subscribers = match self.wiring.line(line) {
            Some(l) => l.subscribers().to_vec(),
            None => return
        };
        for sub in subscribers {
            if self.is_checked_out(sub.device) {
                self.deferred.push_back(Deferred { device: sub.device, pin: sub.pin, level });
                self.report_deferred(sub.device, sub.pin, level);
            }
            else if self.is_unstarted(sub.device) {
                // delivered when its start hook returns
                self.deferred.push_back(Deferred { device: sub.device, pin: sub.pin, level });
            }
            else {
                self.with_device(sub.device, sub.device, |device, ctx| {
                    device.input_changed(sub.pin, level, ctx)
                });
            }
        }
    }

    fn report(&mut self, origin: DeviceId, diagnostic: &Diagnostic<'_>) {
        let now = self.queue.now();
        let (name, max_level) = match self.slots.get(origin.index()) {
            Some(slot) => (slot.name.as_str(), slot.log_level),
            None => (HOST_NAME, self.host_log_level)
        };
        if diagnostic.level() <= max_level {
            self.sink.report(now, name, max_level, diagnostic);
        }
    }

    fn space_name(&self, space: SpaceId) -> String {
        self.spaces.get(space.index()).map(|map| map.name().to_string()).unwrap_or_default()
    }

    fn report_busy(&mut self, initiator: DeviceId, space: SpaceId, address: u32, target: DeviceId) {
        let space = self.space_name(space);
        let device = self.device_name(target).unwrap_or_default().to_string();
        self.report(initiator, &Diagnostic::BusyDevice { space: &space, address, device: &device });
    }

    fn report_deferred(&mut self, target: DeviceId, pin: Pin, level: Level) {
        let device = self.device_name(target).unwrap_or_default().to_string();
        self.report(target, &Diagnostic::DeferredInput { device: &device, pin, level });
    }

    fn set_clock(&mut self, id: DeviceId, rate: ClockRate) -> bool {
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.exec.is_clocked() => {
                slot.exec.set_clock(rate);
                true
            }
            _ => false
        }
    }
}
