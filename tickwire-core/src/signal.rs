/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Logic lines connecting device outputs to device inputs.
//!
//! A [SignalLine] may be driven by any number of devices. The levels of all drivers are
//! combined into a single effective level with the line's [Resolve] policy. Subscribers are
//! notified once per change of the effective level, either immediately or after the line's
//! propagation delay. Delayed notifications are ordinary events of the [EventQueue], so they keep
//! the causal order with all other pending events.
use core::fmt;
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::clock::VDuration;
use crate::id::{DeviceId, LineId, Pin, Level, LOW, HIGH};
use crate::queue::{EventQueue, EventHandle};

/// Determines how the levels of multiple drivers combine into the effective level.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolve {
    /// Open-collector bus: any driver pulling a bit low wins (bitwise AND).
    WiredAnd,
    /// Any driver pulling a bit high wins (bitwise OR).
    WiredOr,
    /// The highest level wins, e.g. an interrupt priority.
    Highest,
    /// The most recently written driver wins.
    Latest,
}

/// Determines what happens to a pending delayed notification when a line is driven again.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayMode {
    /// Every change is delivered after the delay, in order.
    Transport,
    /// A change cancels the notification still in flight. Pulses shorter than the delay are
    /// never delivered.
    Inertial,
}

/// The declaration of a signal line.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineConfig {
    pub resolve: Resolve,
    /// The level of the line when nothing drives it.
    pub idle: Level,
    /// The propagation delay.
    pub delay: VDuration,
    pub mode: DelayMode,
    /// If `true` subscribers are notified on every write, even if the level doesn't change.
    pub retrigger: bool,
}

/// A device input attached to a line.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub device: DeviceId,
    pub pin: Pin,
}

/// The result of driving a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    /// Subscribers aren't affected.
    Unchanged,
    /// Subscribers must be notified now with the given level.
    Now(Level),
    /// A notification has been scheduled.
    Scheduled(EventHandle),
}

/// The dynamic state of a line.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineState {
    /// Drivers ordered from the least to the most recently written.
    pub drivers: Vec<(DeviceId, Level)>,
    pub value: Level,
    pub observed: Level,
    pub pending: Vec<(EventHandle, Level)>,
}

/// A named logic line.
#[derive(Clone, Debug)]
pub struct SignalLine {
    name: String,
    config: LineConfig,
    state: LineState,
    subscribers: Vec<Subscriber>,
}

/// The collection of all lines of a machine together with the output pin bindings.
#[derive(Clone, Debug, Default)]
pub struct Wiring {
    lines: Vec<SignalLine>,
    names: HashMap<String, LineId>,
    outputs: BTreeMap<(DeviceId, Pin), Vec<LineId>>,
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            resolve: Resolve::Latest,
            idle: LOW,
            delay: VDuration::ZERO,
            mode: DelayMode::Transport,
            retrigger: false
        }
    }
}

impl LineConfig {
    pub fn new() -> Self {
        Self::default()
    }
    /// An active-low line with a pull-up resistor: idles high, any driver can pull it low.
    pub fn open_collector() -> Self {
        LineConfig { resolve: Resolve::WiredAnd, idle: HIGH, ..Self::default() }
    }

    pub fn resolve(mut self, resolve: Resolve) -> Self {
        self.resolve = resolve;
        self
    }

    pub fn idle(mut self, idle: Level) -> Self {
        self.idle = idle;
        self
    }

    pub fn delay(mut self, delay: VDuration) -> Self {
        self.delay = delay;
        self
    }

    pub fn inertial(mut self) -> Self {
        self.mode = DelayMode::Inertial;
        self
    }

    pub fn retrigger(mut self) -> Self {
        self.retrigger = true;
        self
    }
}

impl Resolve {
    /// Combines levels of drivers ordered from the least to the most recently written.
    pub fn combine<I>(self, idle: Level, levels: I) -> Level
        where I: DoubleEndedIterator<Item=Level>
    {
        let mut levels = levels;
        match self {
            Resolve::WiredAnd => levels.fold(None, |acc, l| Some(acc.unwrap_or(!0) & l)),
            Resolve::WiredOr => levels.fold(None, |acc, l| Some(acc.unwrap_or(0) | l)),
            Resolve::Highest => levels.max(),
            Resolve::Latest => levels.next_back(),
        }.unwrap_or(idle)
    }
}

impl SignalLine {
    pub fn new<S: Into<String>>(name: S, config: LineConfig) -> Self {
        let state = LineState {
            drivers: Vec::new(),
            value: config.idle,
            observed: config.idle,
            pending: Vec::new()
        };
        SignalLine { name: name.into(), config, state, subscribers: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }
    /// Returns the current effective level.
    #[inline]
    pub fn value(&self) -> Level {
        self.state.value
    }
    /// Returns the level last delivered to subscribers. Differs from [SignalLine::value]
    /// while a delayed notification is in flight.
    #[inline]
    pub fn observed(&self) -> Level {
        self.state.observed
    }
    /// Returns the level written by `device` if it drives the line.
    pub fn driver_level(&self, device: DeviceId) -> Option<Level> {
        self.state.drivers.iter().find(|(d, _)| *d == device).map(|&(_, l)| l)
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }
    /// Attaches an input. Subscribers are notified in the order of subscription.
    pub fn subscribe(&mut self, device: DeviceId, pin: Pin) {
        let sub = Subscriber { device, pin };
        if !self.subscribers.contains(&sub) {
            self.subscribers.push(sub);
        }
    }
    /// Sets the level contributed by `device`, recomputes the effective level and propagates
    /// a change.
    ///
    /// When the line has a propagation delay the notification is scheduled in `queue` with the
    /// payload created by `payload`, owned by `device`. Pass the level and the returned handle to
    /// [SignalLine::deliver] when the event fires.
    pub fn set_driver_value<P, F>(
            &mut self,
            device: DeviceId,
            level: Level,
            queue: &mut EventQueue<P>,
            payload: F
        ) -> Propagation
        where F: FnOnce(Level) -> P
    {
        let drivers = &mut self.state.drivers;
        match drivers.iter().position(|(d, _)| *d == device) {
            Some(index) if index + 1 == drivers.len() => drivers[index].1 = level,
            Some(index) => {
                drivers.remove(index);
                drivers.push((device, level));
            }
            None => drivers.push((device, level))
        }
        self.update(device, queue, payload)
    }
    /// Removes `device` from the drivers of the line and propagates a change of the
    /// effective level.
    pub fn release<P, F>(&mut self, device: DeviceId, queue: &mut EventQueue<P>, payload: F) -> Propagation
        where F: FnOnce(Level) -> P
    {
        let count = self.state.drivers.len();
        self.state.drivers.retain(|(d, _)| *d != device);
        if count == self.state.drivers.len() {
            return Propagation::Unchanged
        }
        self.update(device, queue, payload)
    }
    /// Completes a delayed notification. Returns the level subscribers must be notified with,
    /// if any.
    pub fn deliver(&mut self, handle: EventHandle, level: Level) -> Option<Level> {
        let index = self.state.pending.iter().position(|&(h, _)| h == handle)?;
        self.state.pending.remove(index);
        let previous = core::mem::replace(&mut self.state.observed, level);
        if previous != level || self.config.retrigger {
            Some(level)
        }
        else {
            None
        }
    }
    /// Returns handles of the notifications in flight.
    pub fn pending(&self) -> impl Iterator<Item=EventHandle> + '_ {
        self.state.pending.iter().map(|&(h, _)| h)
    }

    pub fn state(&self) -> &LineState {
        &self.state
    }
    /// Replaces the dynamic state, e.g. when restoring a snapshot.
    pub fn restore_state(&mut self, state: LineState) {
        self.state = state;
    }

    fn update<P, F>(&mut self, owner: DeviceId, queue: &mut EventQueue<P>, payload: F) -> Propagation
        where F: FnOnce(Level) -> P
    {
        let value = self.config.resolve.combine(self.config.idle,
                                     self.state.drivers.iter().map(|&(_, l)| l));
        let changed = value != self.state.value;
        self.state.value = value;
        if !changed && !self.config.retrigger {
            return Propagation::Unchanged
        }
        if self.config.delay.is_zero() {
            self.state.observed = value;
            return Propagation::Now(value)
        }
        if self.config.mode == DelayMode::Inertial {
            for (handle, _) in self.state.pending.drain(..) {
                queue.cancel(handle);
            }
            if value == self.state.observed && !self.config.retrigger {
                return Propagation::Unchanged
            }
        }
        let handle = queue.schedule_after(self.config.delay, owner, payload(value));
        self.state.pending.push((handle, value));
        Propagation::Scheduled(handle)
    }
}

impl fmt::Display for SignalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.state.value)
    }
}

impl Wiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
    /// Adds a new line. Returns `None` if a line with the same name already exists.
    pub fn add_line<S: Into<String>>(&mut self, name: S, config: LineConfig) -> Option<LineId> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return None
        }
        let id = LineId(self.lines.len() as u32);
        self.names.insert(name.clone(), id);
        self.lines.push(SignalLine::new(name, config));
        Some(id)
    }

    pub fn find(&self, name: &str) -> Option<LineId> {
        self.names.get(name).copied()
    }

    pub fn line(&self, id: LineId) -> Option<&SignalLine> {
        self.lines.get(id.index())
    }

    pub fn line_mut(&mut self, id: LineId) -> Option<&mut SignalLine> {
        self.lines.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item=(LineId, &SignalLine)> {
        self.lines.iter().enumerate().map(|(n, line)| (LineId(n as u32), line))
    }
    /// Declares that the output `pin` of `device` drives the line `id`.
    pub fn bind_output(&mut self, id: LineId, device: DeviceId, pin: Pin) {
        let lines = self.outputs.entry((device, pin)).or_insert_with(Vec::new);
        if !lines.contains(&id) {
            lines.push(id);
        }
    }
    /// Declares that the input `pin` of `device` listens to the line `id`.
    pub fn bind_input(&mut self, id: LineId, device: DeviceId, pin: Pin) {
        if let Some(line) = self.lines.get_mut(id.index()) {
            line.subscribe(device, pin);
        }
    }
    /// Returns lines driven by the output `pin` of `device`.
    pub fn outputs_of(&self, device: DeviceId, pin: Pin) -> &[LineId] {
        self.outputs.get(&(device, pin)).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VTime;

    const A: DeviceId = DeviceId(0);
    const B: DeviceId = DeviceId(1);

    fn drive(line: &mut SignalLine, dev: DeviceId, level: Level, queue: &mut EventQueue<Level>) -> Propagation {
        line.set_driver_value(dev, level, queue, |l| l)
    }

    #[test]
    fn resolve_policies_work() {
        let levels = [0b1100u32, 0b1010];
        assert_eq!(Resolve::WiredAnd.combine(7, levels.iter().copied()), 0b1000);
        assert_eq!(Resolve::WiredOr.combine(7, levels.iter().copied()), 0b1110);
        assert_eq!(Resolve::Highest.combine(7, levels.iter().copied()), 0b1100);
        assert_eq!(Resolve::Latest.combine(7, levels.iter().copied()), 0b1010);
        assert_eq!(Resolve::WiredAnd.combine(7, core::iter::empty()), 7);
        assert_eq!(Resolve::Latest.combine(7, core::iter::empty()), 7);
    }

    #[test]
    fn subscribers_notified_once_per_effective_change() {
        let mut queue = EventQueue::new();
        let mut irq = SignalLine::new("irq", LineConfig::open_collector());
        assert_eq!(irq.value(), HIGH);
        assert_eq!(drive(&mut irq, A, HIGH, &mut queue), Propagation::Unchanged);
        assert_eq!(drive(&mut irq, A, LOW, &mut queue), Propagation::Now(LOW));
        // second driver pulling low doesn't change anything
        assert_eq!(drive(&mut irq, B, LOW, &mut queue), Propagation::Unchanged);
        assert_eq!(drive(&mut irq, A, HIGH, &mut queue), Propagation::Unchanged);
        assert_eq!(irq.release(B, &mut queue, |l| l), Propagation::Now(HIGH));
        assert_eq!(irq.release(B, &mut queue, |l| l), Propagation::Unchanged);
        assert_eq!(irq.driver_level(A), Some(HIGH));
        assert_eq!(irq.driver_level(B), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn latest_driver_wins() {
        let mut queue = EventQueue::new();
        let mut line = SignalLine::new("sel", LineConfig::new());
        assert_eq!(drive(&mut line, A, 3, &mut queue), Propagation::Now(3));
        assert_eq!(drive(&mut line, B, 5, &mut queue), Propagation::Now(5));
        assert_eq!(drive(&mut line, A, 3, &mut queue), Propagation::Now(3));
        assert_eq!(line.release(A, &mut queue, |l| l), Propagation::Now(5));
        assert_eq!(line.release(B, &mut queue, |l| l), Propagation::Now(LOW));
    }

    #[test]
    fn retrigger_notifies_every_write() {
        let mut queue = EventQueue::new();
        let mut line = SignalLine::new("strobe", LineConfig::new().retrigger());
        assert_eq!(drive(&mut line, A, HIGH, &mut queue), Propagation::Now(HIGH));
        assert_eq!(drive(&mut line, A, HIGH, &mut queue), Propagation::Now(HIGH));
    }

    #[test]
    fn transport_delay_delivers_every_change() {
        let mut queue = EventQueue::new();
        let delay = VDuration::from_nanos(30);
        let mut line = SignalLine::new("q", LineConfig::new().delay(delay));
        let h1 = match drive(&mut line, A, HIGH, &mut queue) {
            Propagation::Scheduled(h) => h,
            p => panic!("unexpected {:?}", p)
        };
        assert_eq!(line.value(), HIGH);
        assert_eq!(line.observed(), LOW);
        queue.schedule_at(VTime::ZERO + VDuration::from_nanos(10), B, 99).unwrap();
        queue.advance_to_next().unwrap();
        let h2 = match drive(&mut line, A, LOW, &mut queue) {
            Propagation::Scheduled(h) => h,
            p => panic!("unexpected {:?}", p)
        };
        let fired = queue.advance_to_next().unwrap();
        assert_eq!((fired.handle, fired.fire_time, fired.payload), (h1, VTime::ZERO + delay, HIGH));
        assert_eq!(line.deliver(fired.handle, fired.payload), Some(HIGH));
        let fired = queue.advance_to_next().unwrap();
        assert_eq!(fired.handle, h2);
        assert_eq!(fired.fire_time, VTime::ZERO + VDuration::from_nanos(40));
        assert_eq!(line.deliver(fired.handle, fired.payload), Some(LOW));
        assert_eq!(line.observed(), LOW);
        assert_eq!(line.pending().count(), 0);
    }

    #[test]
    fn inertial_delay_swallows_short_pulses() {
        let mut queue = EventQueue::new();
        let delay = VDuration::from_nanos(30);
        let mut line = SignalLine::new("q", LineConfig::new().delay(delay).inertial());
        let h1 = match drive(&mut line, A, HIGH, &mut queue) {
            Propagation::Scheduled(h) => h,
            p => panic!("unexpected {:?}", p)
        };
        // re-driven back before the delay elapses
        assert_eq!(drive(&mut line, A, LOW, &mut queue), Propagation::Unchanged);
        assert!(!queue.is_pending(h1));
        assert!(queue.advance_to_next().is_none());
        assert_eq!(line.observed(), LOW);
        // a superseding change replaces the stale notification
        let h2 = match drive(&mut line, A, 2, &mut queue) {
            Propagation::Scheduled(h) => h,
            p => panic!("unexpected {:?}", p)
        };
        let h3 = match drive(&mut line, A, 3, &mut queue) {
            Propagation::Scheduled(h) => h,
            p => panic!("unexpected {:?}", p)
        };
        assert!(!queue.is_pending(h2));
        let fired = queue.advance_to_next().unwrap();
        assert_eq!(fired.handle, h3);
        assert_eq!(line.deliver(fired.handle, fired.payload), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn wiring_binds_pins() {
        let mut wiring = Wiring::new();
        let irq = wiring.add_line("irq", LineConfig::open_collector()).unwrap();
        let nmi = wiring.add_line("nmi", LineConfig::open_collector()).unwrap();
        assert_eq!(wiring.add_line("irq", LineConfig::new()), None);
        assert_eq!(wiring.find("nmi"), Some(nmi));
        wiring.bind_output(irq, A, 0);
        wiring.bind_output(nmi, A, 0);
        wiring.bind_output(irq, A, 0);
        wiring.bind_input(irq, B, 3);
        wiring.bind_input(irq, B, 3);
        assert_eq!(wiring.outputs_of(A, 0), &[irq, nmi]);
        assert_eq!(wiring.outputs_of(A, 1), &[] as &[LineId]);
        assert_eq!(wiring.line(irq).unwrap().subscribers(), &[Subscriber { device: B, pin: 3 }]);
        assert_eq!(wiring.len(), 2);
    }
}
