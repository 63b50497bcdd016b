/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Save states of a running machine.
use core::fmt;
use std::error::Error;

use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use crate::clock::VTime;
use crate::error::{ScheduleError, StateError};
use crate::exec::{Exec, ExecState};
use crate::queue::{QueueCounters, ScheduledEvent};
use crate::signal::LineState;
use crate::EntryId;

use super::{Machine, Payload};

/// The dynamic state of a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub name: String,
    /// The data created by [Device::save_state][crate::device::Device::save_state].
    pub state: Vec<u8>,
}

/// The dynamic state of a machine.
///
/// A snapshot contains neither the devices nor the machine description, so it can only be
/// restored into a machine built from the same description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub now: VTime,
    /// Where the handles and the schedule order of new events continue from.
    pub counters: QueueCounters,
    /// Pending events with their handles and schedule order.
    pub events: Vec<ScheduledEvent<Payload>>,
    /// Line states in the order of [LineId][crate::LineId].
    pub lines: Vec<LineState>,
    /// Execution contexts in the order of [DeviceId][crate::DeviceId].
    pub execs: Vec<Exec>,
    /// Bank offsets of all mapped ranges for each address space.
    pub bank_offsets: Vec<Vec<u32>>,
    pub devices: Vec<DeviceState>,
}

/// An error returned by [Machine::restore].
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotError {
    /// The snapshot has been taken from a machine with a different composition.
    Mismatch(&'static str),
    /// The device at this position is named differently in the snapshot.
    DeviceMismatch { expected: String, found: String },
    /// A device refused its state.
    Device { name: String, error: StateError },
    /// The pending events are invalid.
    Schedule(ScheduleError),
    /// The machine has been shut down.
    Destroyed,
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SnapshotError::Device { error, .. } => Some(error),
            SnapshotError::Schedule(error) => Some(error),
            _ => None
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Mismatch(what) => write!(f, "snapshot mismatch: different number of {}", what),
            SnapshotError::DeviceMismatch { expected, found } => write!(f,
                "snapshot mismatch: expected device {}, found {}", expected, found),
            SnapshotError::Device { name, error } => write!(f, "{}: {}", name, error),
            SnapshotError::Schedule(error) => write!(f, "snapshot events: {}", error),
            SnapshotError::Destroyed => f.write_str("the machine has been shut down"),
        }
    }
}

impl From<ScheduleError> for SnapshotError {
    fn from(error: ScheduleError) -> Self {
        SnapshotError::Schedule(error)
    }
}

impl Machine {
    /// Captures the dynamic state of the machine.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            now: self.now(),
            counters: self.queue.counters(),
            events: self.queue.pending().into_iter().cloned().collect(),
            lines: self.wiring.iter().map(|(_, line)| line.state().clone()).collect(),
            execs: self.slots.iter().map(|slot| slot.exec.clone()).collect(),
            bank_offsets: self.spaces.iter().map(|map| {
                map.ranges().filter_map(|(entry, _)| map.bank_offset(entry)).collect()
            }).collect(),
            devices: self.slots.iter().map(|slot| DeviceState {
                name: slot.name.clone(),
                state: slot.device.as_ref().map(|d| d.save_state()).unwrap_or_default()
            }).collect()
        }
    }
    /// Restores the dynamic state of the machine from a snapshot.
    ///
    /// The composition of the snapshot is verified before anything is changed. If a device
    /// refuses its state, the machine is brought back to the state from before the call.
    pub fn restore(&mut self, snapshot: &MachineSnapshot) -> Result<(), SnapshotError> {
        if self.slots.iter().any(|slot| slot.exec.state() == ExecState::Destroyed) {
            return Err(SnapshotError::Destroyed)
        }
        if snapshot.devices.len() != self.slots.len() || snapshot.execs.len() != self.slots.len() {
            return Err(SnapshotError::Mismatch("devices"))
        }
        if snapshot.lines.len() != self.wiring.len() {
            return Err(SnapshotError::Mismatch("lines"))
        }
        if snapshot.bank_offsets.len() != self.spaces.len()
            || snapshot.bank_offsets.iter().zip(self.spaces.iter())
                                    .any(|(offsets, map)| offsets.len() != map.len())
        {
            return Err(SnapshotError::Mismatch("mapped ranges"))
        }
        for (slot, state) in self.slots.iter().zip(snapshot.devices.iter()) {
            if slot.name != state.name {
                return Err(SnapshotError::DeviceMismatch {
                    expected: slot.name.clone(),
                    found: state.name.clone()
                })
            }
        }

        let backup = self.snapshot();
        self.apply(snapshot).map_err(|err| {
            if let Err(rollback) = self.apply(&backup) {
                error!("can't roll back a failed restore: {}", rollback);
            }
            err
        })
    }

    fn apply(&mut self, snapshot: &MachineSnapshot) -> Result<(), SnapshotError> {
        self.queue.restore(snapshot.now, snapshot.counters, snapshot.events.iter().cloned())?;
        self.deferred.clear();
        for (n, state) in snapshot.lines.iter().enumerate() {
            if let Some(line) = self.wiring.line_mut(crate::LineId(n as u32)) {
                line.restore_state(state.clone());
            }
        }
        for (map, offsets) in self.spaces.iter_mut().zip(snapshot.bank_offsets.iter()) {
            for (n, &offset) in offsets.iter().enumerate() {
                map.set_bank_offset(EntryId(n as u32), offset);
            }
        }
        for (slot, (exec, state)) in self.slots.iter_mut()
                                       .zip(snapshot.execs.iter().zip(snapshot.devices.iter()))
        {
            slot.exec = exec.clone();
            if let Some(device) = slot.device.as_mut() {
                device.load_state(&state.state).map_err(|error| SnapshotError::Device {
                    name: slot.name.clone(),
                    error
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VDuration;
    use crate::device::{Ctx, Device};
    use crate::machine::{DeviceConfig, MachineBuilder};
    use crate::queue::EventHandle;

    #[derive(Debug, Default)]
    struct Counter(u8);

    impl Device for Counter {
        fn execute(&mut self, _ctx: &mut dyn Ctx) -> Option<u32> {
            self.0 = self.0.wrapping_add(1);
            Some(10)
        }

        fn save_state(&self) -> Vec<u8> {
            vec![self.0]
        }

        fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
            match state {
                &[value] => {
                    self.0 = value;
                    Ok(())
                }
                _ => Err(StateError(format!("expected 1 byte, got {}", state.len())))
            }
        }
    }

    #[derive(Debug, Default)]
    struct Blinker {
        early: Option<EventHandle>,
        later: Vec<(EventHandle, bool)>,
    }

    impl Device for Blinker {
        fn start(&mut self, ctx: &mut dyn Ctx) {
            ctx.timer_periodic(VDuration::from_nanos(100), 0).unwrap();
            self.early = Some(ctx.timer_after(VDuration::from_nanos(10), 1));
        }

        fn timer(&mut self, param: u64, ctx: &mut dyn Ctx) {
            if param == 0 {
                let fresh = ctx.timer_after(VDuration::from_nanos(500), 2);
                let cancelled = self.early.map_or(false, |early| ctx.cancel(early));
                self.later.push((fresh, cancelled));
            }
        }
    }

    fn machine(name: &str) -> Machine {
        let mut builder = MachineBuilder::new();
        builder.add_device(DeviceConfig::new(name).clock(1_000_000), Counter::default());
        builder.finalize().unwrap()
    }

    #[test]
    fn snapshot_restores_execution() {
        let mut machine = machine("cnt");
        let cnt = machine.find_device("cnt").unwrap();
        machine.run_for(VDuration::from_micros(25));
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.devices[0].state, [3]);
        machine.run_for(VDuration::from_micros(100));
        assert_eq!(machine.device_as::<Counter>(cnt).unwrap().0, 13);
        machine.restore(&snapshot).unwrap();
        assert_eq!(machine.now(), snapshot.now);
        assert_eq!(machine.device_as::<Counter>(cnt).unwrap().0, 3);
        machine.run_for(VDuration::from_micros(100));
        assert_eq!(machine.device_as::<Counter>(cnt).unwrap().0, 13);
        assert_eq!(machine.exec(cnt).unwrap().total_cycles(), 130);
    }

    #[test]
    fn snapshot_rejects_other_machines() {
        let snapshot = machine("cnt").snapshot();
        let mut other = machine("other");
        assert_eq!(other.restore(&snapshot), Err(SnapshotError::DeviceMismatch {
            expected: "other".into(), found: "cnt".into() }));
        let mut bad = snapshot.clone();
        bad.devices[0].state.clear();
        let mut same = machine("cnt");
        let cnt = same.find_device("cnt").unwrap();
        same.run_for(VDuration::from_micros(45));
        let before = same.snapshot();
        assert!(matches!(same.restore(&bad), Err(SnapshotError::Device { .. })));
        // nothing changes when a device refuses its state
        assert_eq!(same.snapshot(), before);
        assert_eq!(same.now(), VTime::ZERO + VDuration::from_micros(45));
        assert_eq!(same.device_as::<Counter>(cnt).unwrap().0, 5);
        bad.lines.push(Default::default());
        assert_eq!(same.restore(&bad), Err(SnapshotError::Mismatch("lines")));
        same.shutdown();
        assert_eq!(same.restore(&snapshot), Err(SnapshotError::Destroyed));
    }

    #[test]
    fn snapshot_keeps_fired_handles_retired() {
        let mut builder = MachineBuilder::new();
        let blinker = builder.add_device(DeviceConfig::new("blinker"), Blinker::default());
        let mut machine = builder.finalize().unwrap();
        machine.run_for(VDuration::from_nanos(50));
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.events.len(), 1);
        machine.restore(&snapshot).unwrap();
        machine.run_for(VDuration::from_nanos(100));
        let device = machine.device_as::<Blinker>(blinker).unwrap();
        let early = device.early.unwrap();
        assert_eq!(device.later.len(), 1);
        let (fresh, cancelled) = device.later[0];
        assert_ne!(fresh, early);
        assert!(!cancelled);
        assert!(machine.queue().is_pending(fresh));
    }
}
