/*
    test_lifecycle: tests for the TICKWIRE library.
    Copyright (C) 2020-2022  Rafal Michalski

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
//! Tests execution control of devices and diagnostics reported while a machine runs.
use std::cell::RefCell;
use std::rc::Rc;

use log::LevelFilter;

use tickwire::prelude::*;
use tickwire::peripherals::Timer;

fn us(micros: u64) -> VTime {
    VTime::ZERO + VDuration::from_micros(micros)
}

/// Executes single cycle instructions, optionally changing its clock or halting after
/// a number of steps.
#[derive(Debug, Default)]
struct Cpu {
    steps: Vec<VTime>,
    speed_up_at: Option<usize>,
    halt_at: Option<usize>,
}

impl Device for Cpu {
    fn reset(&mut self, _ctx: &mut dyn Ctx) {
        self.steps.clear();
    }

    fn execute(&mut self, ctx: &mut dyn Ctx) -> Option<u32> {
        self.steps.push(ctx.now());
        if Some(self.steps.len()) == self.halt_at {
            return None
        }
        if Some(self.steps.len()) == self.speed_up_at {
            let rate = ctx.clock()?;
            ctx.set_clock(ClockRate::new(rate.hz() * 2)?);
        }
        Some(1)
    }
}

fn cpu_machine(cpu: Cpu) -> (Machine, DeviceId) {
    let mut builder = MachineBuilder::new();
    let id = builder.add_device(DeviceConfig::new("cpu").clock(1_000_000), cpu);
    (builder.finalize().unwrap(), id)
}

#[test]
fn test_clock_change_applies_after_step() {
    let (mut machine, cpu) = cpu_machine(Cpu { speed_up_at: Some(10), ..Default::default() });
    machine.run_until(us(12));
    let steps = &machine.device_as::<Cpu>(cpu).unwrap().steps;
    let expected = (0..10).map(us)
                          .chain((0..5).map(|n| us(10) + VDuration::from_nanos(n * 500)))
                          .collect::<Vec<_>>();
    assert_eq!(*steps, expected);
    let exec = machine.exec(cpu).unwrap();
    assert_eq!(exec.rate(), ClockRate::new(2_000_000));
    assert_eq!(exec.anchor(), us(10));
    assert_eq!(exec.total_cycles(), 15);
}

#[test]
fn test_suspend_and_resume_work() {
    let (mut machine, cpu) = cpu_machine(Cpu::default());
    machine.run_until(us(5));
    assert!(machine.suspend(cpu));
    assert!(!machine.suspend(cpu));
    assert_eq!(machine.exec(cpu).unwrap().state(), ExecState::Suspended);
    machine.run_until(us(10));
    assert_eq!(machine.device_as::<Cpu>(cpu).unwrap().steps.len(), 6);
    assert!(machine.queue().is_empty());
    assert!(machine.resume(cpu));
    assert!(!machine.resume(cpu));
    machine.run_until(us(12));
    let steps = &machine.device_as::<Cpu>(cpu).unwrap().steps;
    assert_eq!(steps[5..], [us(5), us(10), us(11), us(12)]);
    assert_eq!(machine.exec(cpu).unwrap().total_cycles(), 9);
}

#[test]
fn test_halted_device_resumes() {
    let (mut machine, cpu) = cpu_machine(Cpu { halt_at: Some(3), ..Default::default() });
    machine.run_until(us(100));
    assert_eq!(machine.device_as::<Cpu>(cpu).unwrap().steps, [us(0), us(1), us(2)]);
    assert_eq!(machine.exec(cpu).unwrap().state(), ExecState::Suspended);
    assert_eq!(machine.exec(cpu).unwrap().total_cycles(), 2);
    assert!(machine.resume(cpu));
    machine.run_until(us(101));
    assert_eq!(machine.device_as::<Cpu>(cpu).unwrap().steps[3..], [us(100), us(101)]);
}

#[test]
fn test_reset_restarts_devices() {
    let mut builder = MachineBuilder::new();
    let cpu = builder.add_device(DeviceConfig::new("cpu").clock(1_000_000), Cpu::default());
    let timer = builder.add_device(DeviceConfig::new("nmi"), Timer::one_shot(VDuration::from_micros(3), HIGH));
    let mut machine = builder.finalize().unwrap();
    machine.run_until(us(2));
    machine.reset();
    machine.run_until(us(4));
    assert_eq!(machine.device_as::<Cpu>(cpu).unwrap().steps, [us(2), us(3), us(4)]);
    assert_eq!(machine.device_as::<Timer>(timer).unwrap().output(), LOW);
    machine.run_until(us(5));
    let timer = machine.device_as::<Timer>(timer).unwrap();
    assert_eq!(timer.output(), HIGH);
    assert_eq!(timer.ticks(), 1);
    machine.shutdown();
    assert_eq!(machine.exec(cpu).unwrap().state(), ExecState::Destroyed);
    assert_eq!(machine.step(), None);
}

#[derive(Clone, Debug, Default)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl DiagnosticsSink for Recorder {
    fn report(&mut self, time: VTime, origin: &str, _max_level: LevelFilter, diagnostic: &Diagnostic<'_>) {
        self.0.borrow_mut().push(format!("{} {}: {}", time.as_nanos(), origin, diagnostic));
    }
}

/// Reads its own registers and toggles a line looped back to its own input.
#[derive(Debug, Default)]
struct Loopback {
    program: Option<SpaceId>,
    inputs: Vec<(VTime, Level)>,
}

impl Device for Loopback {
    fn start(&mut self, ctx: &mut dyn Ctx) {
        self.program = ctx.find_space("program");
        ctx.timer_after(VDuration::from_nanos(100), 0);
    }

    fn read(&mut self, offset: u32, ctx: &mut dyn Ctx) -> u8 {
        match (offset, self.program) {
            (0, Some(program)) => ctx.read(program, 0x0001),
            _ => 0x42
        }
    }

    fn input_changed(&mut self, _pin: Pin, level: Level, ctx: &mut dyn Ctx) {
        self.inputs.push((ctx.now(), level));
    }

    fn timer(&mut self, _param: u64, ctx: &mut dyn Ctx) {
        ctx.set_output(0, HIGH);
        assert!(self.inputs.is_empty());
        ctx.log(log::Level::Info, format_args!("loop {}", "closed"));
        ctx.log(log::Level::Trace, format_args!("verbose"));
    }
}

#[test]
fn test_diagnostics_are_reported() {
    let recorder = Recorder::default();
    let mut builder = MachineBuilder::new();
    builder.diagnostics(recorder.clone());
    builder.add_space(SpaceConfig::new("program", 16).unmapped(0x00));
    let lb = builder.add_device(DeviceConfig::new("lb").log_level(LevelFilter::Debug), Loopback::default());
    builder.map("program", "lb", MapRange::new(0, 2));
    builder.connect_signal(("lb", 0), ("lb", 3), VDuration::ZERO);
    let mut machine = builder.finalize().unwrap();
    let program = machine.find_space("program").unwrap();

    // the device reading itself is busy
    assert_eq!(machine.read(program, 0x0000), 0x00);
    assert_eq!(machine.read(program, 0x0001), 0x42);
    // host accesses are reported at the host log level
    assert_eq!(machine.read(program, 0x1000), 0x00);
    machine.set_host_log_level(LevelFilter::Debug);
    machine.write(program, 0x1000, 0x55);
    machine.run_until(VTime::ZERO + VDuration::from_nanos(100));
    assert_eq!(machine.device_as::<Loopback>(lb).unwrap().inputs,
               [(VTime::ZERO + VDuration::from_nanos(100), HIGH)]);
    machine.device_mut(lb).unwrap()
           .downcast_mut::<Loopback>().unwrap()
           .inputs.clear();

    let reports = recorder.0.borrow();
    assert_eq!(*reports, [
        "0 lb: re-entrant program access at 0x1 to the busy device lb",
        "0 host: unmapped program write of 0x55 at 0x1000",
        "100 lb: loop closed",
    ]);
}

#[test]
fn test_deferred_inputs_are_reported_at_trace_level() {
    let recorder = Recorder::default();
    let mut builder = MachineBuilder::new();
    builder.diagnostics(recorder.clone());
    builder.add_device(DeviceConfig::new("lb").log_level(LevelFilter::Trace), Loopback::default());
    builder.connect_signal(("lb", 0), ("lb", 3), VDuration::ZERO);
    let mut machine = builder.finalize().unwrap();
    machine.run_for(VDuration::from_nanos(100));
    assert_eq!(*recorder.0.borrow(), [
        "100 lb: deferred input 3 = 1 of the busy device lb",
        "100 lb: loop closed",
        "100 lb: verbose",
    ]);
}
