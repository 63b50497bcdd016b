/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
use std::collections::{HashMap, VecDeque};

use log::LevelFilter;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::clock::{ClockRate, VDuration};
use crate::device::Device;
use crate::diag::{DiagnosticsSink, LogSink};
use crate::error::{ConfigError, ConfigErrors};
use crate::exec::{Exec, ExecState};
use crate::map::{AddressMap, MapRange, SpaceConfig};
use crate::queue::EventQueue;
use crate::signal::{LineConfig, Wiring};
use crate::{DeviceId, EntryId, LineId, SpaceId, Pin};

use super::{Machine, Payload, Slot};

/// The static description of a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// A unique name of the device.
    pub name: String,
    /// The clock frequency in Hz of a device executing instructions.
    pub clock: Option<u32>,
    /// The maximum level of diagnostics reported for the device.
    pub log_level: LevelFilter,
}

/// Describes a machine: its devices, address spaces and signal lines.
///
/// Devices, spaces and lines refer to each other by name. Names are resolved and the description
/// is validated by [MachineBuilder::finalize], which reports all errors found at once.
///
/// ```
/// use tickwire::prelude::*;
/// use tickwire::peripherals::{Ram, Rom};
///
/// let mut builder = MachineBuilder::new();
/// builder.add_space(SpaceConfig::new("program", 16));
/// builder.add_device(DeviceConfig::new("ram"), Ram::new(0x800).unwrap());
/// builder.add_device(DeviceConfig::new("rom"), Rom::blank(0x800).unwrap());
/// builder.map("program", "ram", MapRange::span(0x0000, 0x07ff).mirror(0x1800));
/// builder.map("program", "rom", MapRange::span(0xe000, 0xe7ff).mirror(0x1800).read_only());
/// let mut machine = builder.finalize().unwrap();
/// let program = machine.find_space("program").unwrap();
/// machine.write(program, 0x1801, 42);
/// assert_eq!(machine.read(program, 0x0001), 42);
/// assert_eq!(machine.read(program, 0xf800), 0xff);
/// ```
pub struct MachineBuilder {
    devices: Vec<(DeviceConfig, Box<dyn Device>)>,
    spaces: Vec<SpaceConfig>,
    ranges: Vec<RangeDecl>,
    lines: Vec<(String, LineConfig)>,
    bindings: Vec<Binding>,
    sink: Option<Box<dyn DiagnosticsSink>>,
}

#[derive(Clone, Debug)]
struct RangeDecl {
    space: String,
    device: String,
    range: MapRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Output,
    Input,
}

#[derive(Clone, Debug)]
struct Binding {
    line: String,
    device: String,
    pin: Pin,
    direction: Direction,
}

impl DeviceConfig {
    pub fn new<S: Into<String>>(name: S) -> Self {
        DeviceConfig { name: name.into(), clock: None, log_level: LevelFilter::Info }
    }
    /// Makes the device clocked, with the frequency in Hz.
    pub fn clock(mut self, hz: u32) -> Self {
        self.clock = Some(hz);
        self
    }

    pub fn log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }
}

impl Default for MachineBuilder {
    fn default() -> Self {
        MachineBuilder {
            devices: Vec::new(),
            spaces: Vec::new(),
            ranges: Vec::new(),
            lines: Vec::new(),
            bindings: Vec::new(),
            sink: None
        }
    }
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    /// Adds a device. Devices are started in the order they are added.
    pub fn add_device<D: Device + 'static>(&mut self, config: DeviceConfig, device: D) -> DeviceId {
        self.add_boxed_device(config, Box::new(device))
    }

    pub fn add_boxed_device(&mut self, config: DeviceConfig, device: Box<dyn Device>) -> DeviceId {
        let id = DeviceId(self.devices.len() as u32);
        self.devices.push((config, device));
        id
    }

    pub fn add_space(&mut self, config: SpaceConfig) -> SpaceId {
        let id = SpaceId(self.spaces.len() as u32);
        self.spaces.push(config);
        id
    }
    /// Maps a `range` of the address space named `space` to the device named `device`.
    ///
    /// Returns the identifier of the range, e.g. for changing its bank offset at run time.
    pub fn map(&mut self, space: &str, device: &str, range: MapRange) -> EntryId {
        let index = self.ranges.iter().filter(|decl| decl.space == space).count();
        self.ranges.push(RangeDecl { space: space.into(), device: device.into(), range });
        EntryId(index as u32)
    }

    pub fn add_line<S: Into<String>>(&mut self, name: S, config: LineConfig) -> LineId {
        let id = LineId(self.lines.len() as u32);
        self.lines.push((name.into(), config));
        id
    }
    /// Makes the output `pin` of `device` drive the line named `line`.
    pub fn bind_output(&mut self, line: &str, device: &str, pin: Pin) -> &mut Self {
        self.bind(line, device, pin, Direction::Output)
    }
    /// Makes the input `pin` of `device` listen to the line named `line`.
    pub fn bind_input(&mut self, line: &str, device: &str, pin: Pin) -> &mut Self {
        self.bind(line, device, pin, Direction::Input)
    }
    /// Connects an output of one device directly to an input of another one with a new line
    /// named `from.out_pin->to.in_pin`, propagating changes after `delay`.
    pub fn connect_signal(
            &mut self,
            (from, out_pin): (&str, Pin),
            (to, in_pin): (&str, Pin),
            delay: VDuration
        ) -> LineId
    {
        let name = format!("{}.{}->{}.{}", from, out_pin, to, in_pin);
        let id = self.add_line(name.clone(), LineConfig::new().delay(delay));
        self.bind_output(&name, from, out_pin);
        self.bind_input(&name, to, in_pin);
        id
    }
    /// Sets the diagnostics sink of the machine. The default is [LogSink].
    pub fn diagnostics<S: DiagnosticsSink + 'static>(&mut self, sink: S) -> &mut Self {
        self.sink = Some(Box::new(sink));
        self
    }

    fn bind(&mut self, line: &str, device: &str, pin: Pin, direction: Direction) -> &mut Self {
        self.bindings.push(Binding { line: line.into(), device: device.into(), pin, direction });
        self
    }
    /// Validates the description and creates the machine.
    ///
    /// All devices are started in the order of registration, then clocked devices are scheduled
    /// to execute at time zero.
    pub fn finalize(self) -> Result<Machine, ConfigErrors> {
        let MachineBuilder { devices, spaces, ranges, lines, bindings, sink } = self;
        let mut errors = Vec::new();

        let mut device_names = HashMap::new();
        let mut slots = Vec::with_capacity(devices.len());
        for (n, (config, device)) in devices.into_iter().enumerate() {
            if device_names.contains_key(&config.name) {
                errors.push(ConfigError::DuplicateDevice(config.name.clone()));
            }
            else {
                device_names.insert(config.name.clone(), DeviceId(n as u32));
            }
            let rate = match config.clock {
                Some(hz) => {
                    let rate = ClockRate::new(hz);
                    if rate.is_none() {
                        errors.push(ConfigError::ZeroPeriod { owner: config.name.clone() });
                    }
                    rate
                }
                None => None
            };
            slots.push(Slot {
                name: config.name,
                log_level: config.log_level,
                device: Some(device),
                exec: Exec::new(rate)
            });
        }

        let mut space_names = HashMap::new();
        let mut maps = Vec::with_capacity(spaces.len());
        for (n, config) in spaces.into_iter().enumerate() {
            if space_names.contains_key(&config.name) {
                errors.push(ConfigError::DuplicateSpace(config.name.clone()));
            }
            else {
                space_names.insert(config.name.clone(), SpaceId(n as u32));
            }
            match AddressMap::new(config) {
                Ok(map) => maps.push(Some(map)),
                Err(err) => {
                    errors.push(err);
                    maps.push(None);
                }
            }
        }

        for RangeDecl { space, device, range } in ranges {
            let handler = device_names.get(&device).copied();
            if handler.is_none() {
                errors.push(ConfigError::UnknownDevice {
                    name: device.clone(),
                    referenced_by: format!("address space {}", space)
                });
            }
            let map = match space_names.get(&space) {
                Some(id) => maps[id.index()].as_mut(),
                None => {
                    errors.push(ConfigError::UnknownSpace { name: space, referenced_by: device });
                    continue
                }
            };
            if let (Some(map), Some(handler)) = (map, handler) {
                if let Err(err) = map.register_owned(range.handler(handler), device) {
                    errors.push(err);
                }
            }
        }

        let mut wiring = Wiring::new();
        for (name, config) in lines {
            if wiring.add_line(name.clone(), config).is_none() {
                errors.push(ConfigError::DuplicateLine(name));
            }
        }
        for Binding { line, device, pin, direction } in bindings {
            let device_id = device_names.get(&device).copied();
            if device_id.is_none() {
                errors.push(ConfigError::UnknownDevice {
                    name: device.clone(),
                    referenced_by: format!("line {}", line)
                });
            }
            let line_id = wiring.find(&line);
            if line_id.is_none() {
                errors.push(ConfigError::UnknownLine { name: line, referenced_by: device });
            }
            if let (Some(line), Some(device)) = (line_id, device_id) {
                match direction {
                    Direction::Output => wiring.bind_output(line, device, pin),
                    Direction::Input => wiring.bind_input(line, device, pin)
                }
            }
        }

        if !errors.is_empty() {
            return Err(ConfigErrors(errors))
        }

        let mut machine = Machine {
            queue: EventQueue::new(),
            slots,
            device_names,
            spaces: maps.into_iter().flatten().collect(),
            space_names,
            wiring,
            deferred: VecDeque::new(),
            sink: sink.unwrap_or_else(|| Box::new(LogSink)),
            host_log_level: LevelFilter::Info
        };

        let count = machine.slots.len();
        for n in 0..count {
            let id = DeviceId(n as u32);
            machine.with_device(id, id, |device, ctx| device.start(ctx));
            machine.slots[n].exec.set_state(ExecState::Started);
        }
        for n in 0..count {
            let id = DeviceId(n as u32);
            if machine.slots[n].exec.state() == ExecState::Started {
                machine.run_device(id);
            }
        }
        debug!("machine started: {} devices, {} events pending", count, machine.queue.len());
        Ok(machine)
    }
}
