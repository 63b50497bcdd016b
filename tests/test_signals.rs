/*
    test_signals: tests for the TICKWIRE library.
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
//! Tests propagation of signals between devices.
use tickwire::prelude::*;
use tickwire::peripherals::{Port, Ttl74164};
use tickwire::peripherals::port::{DATA_REG, DDR_REG};
use tickwire::peripherals::ttl74164::{A, B, CLK, CLRQ, QA, QH};

fn ns(nanos: u64) -> VTime {
    VTime::ZERO + VDuration::from_nanos(nanos)
}

#[derive(Debug, Default)]
struct Probe {
    changes: Vec<(VTime, Pin, Level)>,
}

impl Device for Probe {
    fn input_changed(&mut self, pin: Pin, level: Level, ctx: &mut dyn Ctx) {
        self.changes.push((ctx.now(), pin, level));
    }
}

/// Drives `level` on its output pin `0` at `at`.
#[derive(Debug)]
struct Switch {
    at: VDuration,
    level: Level,
}

impl Device for Switch {
    fn start(&mut self, ctx: &mut dyn Ctx) {
        ctx.timer_after(self.at, 0);
    }

    fn timer(&mut self, _param: u64, ctx: &mut dyn Ctx) {
        ctx.set_output(0, self.level);
    }
}

fn glitch(config: LineConfig) -> Vec<(VTime, Pin, Level)> {
    let mut builder = MachineBuilder::new();
    let probe = builder.add_device(DeviceConfig::new("probe"), Probe::default());
    let line = builder.add_line("data", config);
    builder.bind_input("data", "probe", 5);
    let mut machine = builder.finalize().unwrap();
    machine.drive_line(line, HIGH);
    machine.run_until(ns(10));
    machine.drive_line(line, LOW);
    machine.run_until(ns(100));
    machine.drive_line(line, HIGH);
    machine.run_until(ns(200));
    let changes = machine.device_as::<Probe>(probe).unwrap().changes.clone();
    changes
}

#[test]
fn test_transport_delay_delivers_every_change() {
    let config = LineConfig::new().delay(VDuration::from_nanos(30));
    assert_eq!(config.mode, DelayMode::Transport);
    assert_eq!(glitch(config), [
        (ns(30), 5, HIGH),
        (ns(40), 5, LOW),
        (ns(130), 5, HIGH)
    ]);
}

#[test]
fn test_inertial_delay_swallows_short_pulses() {
    let config = LineConfig::new().delay(VDuration::from_nanos(30)).inertial();
    assert_eq!(glitch(config), [(ns(130), 5, HIGH)]);
}

#[test]
fn test_zero_delay_notifies_synchronously() {
    assert_eq!(glitch(LineConfig::new()), [
        (ns(0), 5, HIGH),
        (ns(10), 5, LOW),
        (ns(100), 5, HIGH)
    ]);
}

#[test]
fn test_retrigger_notifies_unchanged_levels() {
    let mut builder = MachineBuilder::new();
    let probe = builder.add_device(DeviceConfig::new("probe"), Probe::default());
    let plain = builder.add_line("plain", LineConfig::new());
    let level = builder.add_line("level", LineConfig::new().retrigger());
    builder.bind_input("plain", "probe", 0);
    builder.bind_input("level", "probe", 1);
    let mut machine = builder.finalize().unwrap();
    for _ in 0..3 {
        machine.drive_line(plain, HIGH);
        machine.drive_line(level, HIGH);
    }
    assert_eq!(machine.device_as::<Probe>(probe).unwrap().changes, [
        (ns(0), 0, HIGH),
        (ns(0), 1, HIGH),
        (ns(0), 1, HIGH),
        (ns(0), 1, HIGH)
    ]);
}

#[test]
fn test_open_collector_line_is_wired_and() {
    let mut builder = MachineBuilder::new();
    builder.add_device(DeviceConfig::new("pia1"), Switch { at: VDuration::from_nanos(10), level: LOW });
    builder.add_device(DeviceConfig::new("pia2"), Switch { at: VDuration::from_nanos(20), level: LOW });
    let probe = builder.add_device(DeviceConfig::new("cpu"), Probe::default());
    let irq = builder.add_line("irq", LineConfig::open_collector());
    builder.bind_output("irq", "pia1", 0)
           .bind_output("irq", "pia2", 0)
           .bind_input("irq", "cpu", 1);
    let mut machine = builder.finalize().unwrap();
    assert_eq!(machine.line_level(irq), Some(HIGH));
    machine.run_until(ns(15));
    assert_eq!(machine.line_level(irq), Some(LOW));
    // the host can't pull the line up while devices drive it low
    machine.drive_line(irq, HIGH);
    machine.run_until(ns(50));
    assert_eq!(machine.line_level(irq), Some(LOW));
    assert_eq!(machine.device_as::<Probe>(probe).unwrap().changes, [(ns(10), 1, LOW)]);
    let line = machine.line(irq).unwrap();
    assert_eq!(line.driver_level(machine.find_device("pia2").unwrap()), Some(LOW));
    assert_eq!(line.driver_level(DeviceId::HOST), Some(HIGH));
}

#[test]
fn test_ttl74164_shifts_through_delayed_lines() {
    let delay = VDuration::from_nanos(30);
    let mut builder = MachineBuilder::new();
    let sr = builder.add_device(DeviceConfig::new("ic5"), Ttl74164::new());
    let probe = builder.add_device(DeviceConfig::new("leds"), Probe::default());
    for (name, pin) in [("a", A), ("b", B), ("clk", CLK), ("clrq", CLRQ)] {
        builder.add_line(name, LineConfig::new().delay(delay));
        builder.bind_input(name, "ic5", pin);
    }
    builder.connect_signal(("ic5", QA), ("leds", 0), VDuration::ZERO);
    let qh = builder.connect_signal(("ic5", QH), ("leds", 7), delay);
    let mut machine = builder.finalize().unwrap();
    let line = |name: &str| machine.find_line(name).unwrap();
    let (a, b, clk, clrq) = (line("a"), line("b"), line("clk"), line("clrq"));

    machine.drive_line(clrq, HIGH);
    machine.drive_line(a, HIGH);
    machine.drive_line(b, HIGH);
    machine.drive_line(clk, HIGH);
    machine.run_until(ns(29));
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0);
    // data inputs settle before the clock edge, all changes arrive at the same moment
    machine.run_until(ns(30));
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0b1);

    for n in 1..8u64 {
        machine.run_until(ns(n * 100));
        if n == 4 {
            machine.drive_line(b, LOW);
        }
        machine.drive_line(clk, LOW);
        machine.run_until(ns(n * 100 + 50));
        machine.drive_line(clk, HIGH);
    }
    machine.run_until(ns(850));
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0b1111_0000);
    assert_eq!(machine.line_level(qh), Some(HIGH));
    // QH changes appear 30 ns after the clock edge reaches the register
    let changes = &machine.device_as::<Probe>(probe).unwrap().changes;
    assert_eq!(changes.iter().filter(|c| c.1 == 7).collect::<Vec<_>>(), [&(ns(810), 7, HIGH)]);
    let qa = changes.iter().filter(|c| c.1 == 0).map(|c| (c.0, c.2)).collect::<Vec<_>>();
    assert_eq!(qa, [(ns(30), HIGH), (ns(480), LOW)]);

    machine.drive_line(clrq, LOW);
    machine.run_until(ns(900));
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0);
    assert_eq!(machine.line_level(qh), Some(LOW));
}

#[test]
fn test_ttl74164_reset_forgets_clock_level() {
    let mut builder = MachineBuilder::new();
    let sr = builder.add_device(DeviceConfig::new("ic5"), Ttl74164::new());
    for (name, pin) in [("a", A), ("b", B), ("clk", CLK)] {
        builder.add_line(name, LineConfig::new());
        builder.bind_input(name, "ic5", pin);
    }
    let mut machine = builder.finalize().unwrap();
    let line = |name: &str| machine.find_line(name).unwrap();
    let (a, b, clk) = (line("a"), line("b"), line("clk"));

    machine.drive_line(a, HIGH);
    machine.drive_line(b, HIGH);
    machine.drive_line(clk, HIGH);
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0b1);
    // no clock edge without a reset
    machine.drive_line(a, LOW);
    machine.drive_line(a, HIGH);
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0b1);

    machine.drive_line(a, LOW);
    machine.reset_device(sr);
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0);
    // CLK is still high, the first input change after the reset shifts
    machine.drive_line(a, HIGH);
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0b1);
    machine.drive_line(clk, LOW);
    machine.drive_line(clk, HIGH);
    assert_eq!(machine.device_as::<Ttl74164>(sr).unwrap().data(), 0b11);
}

#[test]
fn test_port_reset_releases_outputs() {
    let mut builder = MachineBuilder::new();
    builder.add_space(SpaceConfig::new("io", 8));
    let pia = builder.add_device(DeviceConfig::new("pia"), Port::new());
    let probe = builder.add_device(DeviceConfig::new("leds"), Probe::default());
    builder.map("io", "pia", MapRange::new(0x10, 4));
    let led = builder.connect_signal(("pia", 3), ("leds", 3), VDuration::ZERO);
    let input = builder.connect_signal(("pia", 4), ("leds", 4), VDuration::ZERO);
    let mut machine = builder.finalize().unwrap();
    let io = machine.find_space("io").unwrap();

    machine.write(io, 0x10 + DDR_REG, 0b0000_1000);
    machine.write(io, 0x10 + DATA_REG, 0b0001_1000);
    assert_eq!(machine.device_as::<Port>(pia).unwrap().output(), 0b0000_1000);
    assert_eq!(machine.line_level(led), Some(HIGH));
    assert_eq!(machine.line_level(input), Some(LOW));

    machine.reset_device(pia);
    assert_eq!(machine.device_as::<Port>(pia).unwrap().output(), 0);
    assert_eq!(machine.device_as::<Port>(pia).unwrap().ddr(), 0);
    assert_eq!(machine.line_level(led), Some(LOW));
    let changes = &machine.device_as::<Probe>(probe).unwrap().changes;
    assert_eq!(changes.iter().map(|c| (c.1, c.2)).collect::<Vec<_>>(), [(3, HIGH), (3, LOW)]);
}
