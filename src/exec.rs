/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Execution contexts of devices.
//!
//! Every device has an [Exec] tracking its lifecycle. A device configured with a clock is also
//! executed: the machine keeps a single pending `Execute` event for it, firing when the device
//! is due to perform its next unit of work.
//!
//! Cycles are counted from an anchor time, set when the device starts running and whenever
//! its clock changes. The time of the next step is always computed from the anchor and the
//! total number of cycles since then, so no rounding error accumulates over long runs.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::clock::{ClockRate, VTime};
use crate::queue::EventHandle;

/// The lifecycle state of a device.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecState {
    /// Added to a machine which hasn't been finalized yet.
    Unstarted,
    /// The start hook has been called.
    Started,
    /// Executing (if clocked) and receiving events.
    Running,
    /// Execution stopped by a request or because the device halted.
    Suspended,
    /// The machine has been shut down.
    Destroyed,
}

/// The execution context of a device.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exec {
    state: ExecState,
    rate: Option<ClockRate>,
    new_rate: Option<ClockRate>,
    anchor: VTime,
    cycles: u64,
    total_cycles: u64,
    wait_states: u64,
    event: Option<EventHandle>,
}

impl Default for ExecState {
    fn default() -> Self {
        ExecState::Unstarted
    }
}

impl Exec {
    pub fn new(rate: Option<ClockRate>) -> Self {
        Exec {
            state: ExecState::Unstarted,
            rate,
            new_rate: None,
            anchor: VTime::ZERO,
            cycles: 0,
            total_cycles: 0,
            wait_states: 0,
            event: None
        }
    }

    #[inline]
    pub fn state(&self) -> ExecState {
        self.state
    }
    /// Returns the current clock rate. A clock change requested during the current step isn't
    /// reflected until the step completes.
    #[inline]
    pub fn rate(&self) -> Option<ClockRate> {
        self.rate
    }

    #[inline]
    pub fn is_clocked(&self) -> bool {
        self.rate.is_some()
    }
    /// Returns the number of cycles executed since the device was started, including
    /// wait states.
    #[inline]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }
    /// Returns the time from which the current cycles are counted.
    #[inline]
    pub fn anchor(&self) -> VTime {
        self.anchor
    }
    /// Returns the pending `Execute` event.
    #[inline]
    pub fn event(&self) -> Option<EventHandle> {
        self.event
    }

    pub(crate) fn set_state(&mut self, state: ExecState) {
        self.state = state;
    }

    pub(crate) fn set_event(&mut self, event: Option<EventHandle>) {
        self.event = event;
    }

    pub(crate) fn take_event(&mut self) -> Option<EventHandle> {
        self.event.take()
    }
    /// Requests a clock change at the end of the current step.
    pub(crate) fn set_clock(&mut self, rate: ClockRate) {
        self.new_rate = Some(rate);
    }

    pub(crate) fn add_wait_states(&mut self, cycles: u32) {
        self.wait_states += cycles as u64;
    }
    /// Restarts counting cycles from `now`, applying a pending clock change.
    pub(crate) fn anchor_at(&mut self, now: VTime) {
        if let Some(rate) = self.new_rate.take() {
            self.rate = Some(rate);
        }
        self.anchor = now;
        self.cycles = 0;
        self.wait_states = 0;
    }
    /// Accounts for a completed step of `cycles` (at least one) and returns the time at which
    /// the next step is due.
    pub(crate) fn complete_step(&mut self, cycles: u32) -> VTime {
        let cycles = cycles.max(1) as u64 + core::mem::replace(&mut self.wait_states, 0);
        self.cycles += cycles;
        self.total_cycles += cycles;
        let next = match self.rate {
            Some(rate) => self.anchor.saturating_add(rate.cycles_to_duration(self.cycles)),
            None => self.anchor
        };
        if self.new_rate.is_some() {
            self.anchor_at(next);
        }
        next
    }
    /// Accounts for `cycles` without scheduling the next step.
    pub(crate) fn count_cycles(&mut self, cycles: u32) {
        let cycles = cycles.max(1) as u64 + core::mem::replace(&mut self.wait_states, 0);
        self.total_cycles += cycles;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VDuration;

    #[test]
    fn exec_steps_without_drift() {
        // 3 MHz: a single cycle is not a whole number of attoseconds
        let mut exec = Exec::new(ClockRate::new(3_000_000));
        exec.anchor_at(VTime::ZERO);
        let mut next = VTime::ZERO;
        for _ in 0..3_000_000 {
            next = exec.complete_step(1);
        }
        assert_eq!(next, VTime::ZERO + VDuration::from_secs(1));
        assert_eq!(exec.total_cycles(), 3_000_000);
    }

    #[test]
    fn exec_zero_cycles_count_as_one() {
        let mut exec = Exec::new(ClockRate::new(1_000_000));
        exec.anchor_at(VTime::ZERO);
        assert_eq!(exec.complete_step(0), VTime::ZERO + VDuration::from_micros(1));
        exec.count_cycles(0);
        assert_eq!(exec.total_cycles(), 2);
    }

    #[test]
    fn exec_wait_states_stretch_step() {
        let mut exec = Exec::new(ClockRate::new(1_000_000));
        exec.anchor_at(VTime::ZERO);
        exec.add_wait_states(2);
        assert_eq!(exec.complete_step(4), VTime::ZERO + VDuration::from_micros(6));
        assert_eq!(exec.complete_step(4), VTime::ZERO + VDuration::from_micros(10));
    }

    #[test]
    fn exec_clock_change_reanchors() {
        let mut exec = Exec::new(ClockRate::new(1_000_000));
        exec.anchor_at(VTime::ZERO);
        assert_eq!(exec.complete_step(10), VTime::ZERO + VDuration::from_micros(10));
        exec.set_clock(ClockRate::new(2_000_000).unwrap());
        assert_eq!(exec.rate().unwrap().hz(), 1_000_000);
        // the step during which the clock changed still runs at the old rate
        let t = exec.complete_step(10);
        assert_eq!(t, VTime::ZERO + VDuration::from_micros(20));
        assert_eq!(exec.rate().unwrap().hz(), 2_000_000);
        assert_eq!(exec.anchor(), t);
        assert_eq!(exec.complete_step(10), t + VDuration::from_micros(5));
        assert_eq!(exec.total_cycles(), 30);
    }
}
