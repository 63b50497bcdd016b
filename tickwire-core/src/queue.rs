/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! The time-ordered queue of scheduled events.
//!
//! [EventQueue] owns the virtual clock. The clock only moves forward, and only by jumping to
//! the fire time of the next due event (or to an explicit target with [EventQueue::advance_to]
//! when no event is due earlier).
//!
//! Events with an equal fire time fire in the order they were scheduled, so two runs of the same
//! machine produce identical sequences of events.
use core::cmp::Reverse;
use core::fmt;
use std::collections::{BinaryHeap, BTreeMap};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::clock::{VTime, VDuration};
use crate::error::ScheduleError;
use crate::id::DeviceId;

/// Stale heap entries are purged when their count exceeds the live count by this margin.
const COMPACT_THRESHOLD: usize = 64;

/// Identifies a scheduled event. Remains valid across firings of a recurring event.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EventHandle(u64);

/// A pending event.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledEvent<P> {
    pub handle: EventHandle,
    pub fire_time: VTime,
    /// The device that requested the event.
    pub owner: DeviceId,
    pub payload: P,
    /// `Some(period)` for recurring events.
    pub period: Option<VDuration>,
    /// The position in the schedule order, used to break ties between equal fire times.
    pub seq: u64,
}

/// An event returned by [EventQueue::advance_to_next].
#[derive(Clone, Debug, PartialEq)]
pub struct Fired<P> {
    pub handle: EventHandle,
    pub fire_time: VTime,
    pub owner: DeviceId,
    pub payload: P,
    /// `true` if the event has been re-armed for its next period.
    pub recurring: bool,
}

/// The counters from which a queue issues handles and schedule order positions.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounters {
    /// The raw value of the next handle.
    pub next_handle: u64,
    pub next_seq: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
struct Key {
    time: VTime,
    seq: u64,
    id: u64,
}

/// A priority queue of scheduled events together with the virtual clock.
///
/// Cancellation is lazy: a cancelled event is removed from the index immediately, while its heap
/// entry becomes a tombstone skipped when popped. This makes cancellation safe at any moment,
/// including from within a callback of another event.
#[derive(Clone)]
pub struct EventQueue<P> {
    now: VTime,
    next_id: u64,
    next_seq: u64,
    heap: BinaryHeap<Reverse<Key>>,
    live: BTreeMap<u64, ScheduledEvent<P>>,
}

impl EventHandle {
    /// Recreates a handle from its raw value, e.g. when restoring a device state.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        EventHandle(raw)
    }
    /// Returns the raw value of the handle.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event:{}", self.0)
    }
}

impl<P> Default for EventQueue<P> {
    fn default() -> Self {
        EventQueue {
            now: VTime::ZERO,
            next_id: 0,
            next_seq: 0,
            heap: BinaryHeap::new(),
            live: BTreeMap::new()
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for EventQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
         .field("now", &self.now)
         .field("pending", &self.live.len())
         .field("tombstones", &(self.heap.len() - self.live.len()))
         .finish()
    }
}

impl<P> EventQueue<P> {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns the current virtual time.
    #[inline]
    pub fn now(&self) -> VTime {
        self.now
    }
    /// Returns the number of pending events.
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
    /// Schedules an event at `fire_time`. When `period` is given the event recurs every `period`
    /// counted from `fire_time`.
    ///
    /// Returns an error if `period` is zero or if `fire_time` precedes the current time.
    pub fn schedule(
            &mut self,
            fire_time: VTime,
            owner: DeviceId,
            payload: P,
            period: Option<VDuration>
        ) -> Result<EventHandle, ScheduleError>
    {
        if period.map_or(false, VDuration::is_zero) {
            return Err(ScheduleError::ZeroPeriod)
        }
        if fire_time < self.now {
            return Err(ScheduleError::InPast { requested: fire_time, now: self.now })
        }
        let handle = EventHandle(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq();
        self.heap.push(Reverse(Key { time: fire_time, seq, id: handle.0 }));
        self.live.insert(handle.0, ScheduledEvent { handle, fire_time, owner, payload, period, seq });
        Ok(handle)
    }
    /// Schedules a one-shot event at `fire_time`.
    #[inline]
    pub fn schedule_at(&mut self, fire_time: VTime, owner: DeviceId, payload: P) -> Result<EventHandle, ScheduleError> {
        self.schedule(fire_time, owner, payload, None)
    }
    /// Schedules a one-shot event after `delay` from now. Saturates at [VTime::MAX].
    pub fn schedule_after(&mut self, delay: VDuration, owner: DeviceId, payload: P) -> EventHandle {
        let fire_time = self.now.saturating_add(delay);
        match self.schedule(fire_time, owner, payload, None) {
            Ok(handle) => handle,
            Err(_) => unreachable!("fire time is never in the past")
        }
    }
    /// Schedules an event firing every `period`, the first time one `period` from now.
    pub fn schedule_periodic(&mut self, period: VDuration, owner: DeviceId, payload: P) -> Result<EventHandle, ScheduleError> {
        let first = self.now.saturating_add(period);
        self.schedule(first, owner, payload, Some(period))
    }
    /// Cancels a pending event. Returns `true` if the event was pending.
    ///
    /// Cancelling an already fired or an unknown event is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let found = self.live.remove(&handle.0).is_some();
        if found {
            self.maybe_compact();
        }
        found
    }
    /// Cancels all events requested by `owner`. Returns the number of cancelled events.
    pub fn cancel_owned_by(&mut self, owner: DeviceId) -> usize {
        self.cancel_matching(|ev| ev.owner == owner)
    }
    /// Cancels all events for which `f` returns `true`. Returns the number of cancelled events.
    pub fn cancel_matching<F>(&mut self, mut f: F) -> usize
        where F: FnMut(&ScheduledEvent<P>) -> bool
    {
        let count = self.live.len();
        self.live.retain(|_, ev| !f(ev));
        let cancelled = count - self.live.len();
        if cancelled != 0 {
            self.maybe_compact();
        }
        cancelled
    }
    /// Moves a pending event to a new `fire_time`. The event is ordered as if it was scheduled now.
    ///
    /// Returns `Ok(false)` if the event is not pending.
    pub fn reschedule(&mut self, handle: EventHandle, fire_time: VTime) -> Result<bool, ScheduleError> {
        if fire_time < self.now {
            return Err(ScheduleError::InPast { requested: fire_time, now: self.now })
        }
        let seq = self.next_seq;
        match self.live.get_mut(&handle.0) {
            Some(ev) => {
                self.next_seq += 1;
                ev.fire_time = fire_time;
                ev.seq = seq;
                self.heap.push(Reverse(Key { time: fire_time, seq, id: handle.0 }));
                self.maybe_compact();
                Ok(true)
            }
            None => Ok(false)
        }
    }

    #[inline]
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.live.contains_key(&handle.0)
    }
    /// Returns the time at which a pending event will fire next.
    #[inline]
    pub fn fire_time(&self, handle: EventHandle) -> Option<VTime> {
        self.live.get(&handle.0).map(|ev| ev.fire_time)
    }

    #[inline]
    pub fn get(&self, handle: EventHandle) -> Option<&ScheduledEvent<P>> {
        self.live.get(&handle.0)
    }
    /// Returns the fire time of the earliest pending event.
    pub fn next_due(&mut self) -> Option<VTime> {
        self.drop_stale_head();
        self.heap.peek().map(|Reverse(key)| key.time)
    }
    /// Moves the clock to `time` without firing anything.
    ///
    /// Returns `false` and leaves the clock unchanged if `time` is in the past or if some
    /// event is due before `time`.
    pub fn advance_to(&mut self, time: VTime) -> bool {
        if time < self.now {
            return false
        }
        match self.next_due() {
            Some(due) if due < time => false,
            _ => {
                self.now = time;
                true
            }
        }
    }
    /// Returns all pending events in the order they will fire.
    pub fn pending(&self) -> Vec<&ScheduledEvent<P>> {
        let mut events: Vec<_> = self.live.values().collect();
        events.sort_by_key(|ev| (ev.fire_time, ev.seq));
        events
    }
    /// Removes all pending events. The clock is left unchanged.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
    /// Returns the counters needed to restore the queue with [EventQueue::restore].
    pub fn counters(&self) -> QueueCounters {
        QueueCounters { next_handle: self.next_id, next_seq: self.next_seq }
    }
    /// Replaces the state of the queue, e.g. when restoring a snapshot.
    ///
    /// Handles and schedule order of the restored events are preserved. New handles continue
    /// from `counters`, so handles of events which fired before the snapshot was taken are never
    /// issued again.
    pub fn restore<I>(&mut self, now: VTime, counters: QueueCounters, events: I) -> Result<(), ScheduleError>
        where I: IntoIterator<Item=ScheduledEvent<P>>
    {
        let mut live = BTreeMap::new();
        let mut next_id = counters.next_handle;
        let mut next_seq = counters.next_seq;
        for ev in events {
            if ev.fire_time < now {
                return Err(ScheduleError::InPast { requested: ev.fire_time, now })
            }
            if ev.period.map_or(false, VDuration::is_zero) {
                return Err(ScheduleError::ZeroPeriod)
            }
            next_id = next_id.max(ev.handle.0 + 1);
            next_seq = next_seq.max(ev.seq + 1);
            live.insert(ev.handle.0, ev);
        }
        self.now = now;
        self.next_id = next_id;
        self.next_seq = next_seq;
        self.live = live;
        self.rebuild_heap();
        Ok(())
    }

    #[inline]
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    #[inline]
    fn is_live(&self, key: &Key) -> bool {
        self.live.get(&key.id).map_or(false, |ev| ev.seq == key.seq)
    }

    fn drop_stale_head(&mut self) {
        while let Some(Reverse(key)) = self.heap.peek() {
            if self.is_live(key) {
                break
            }
            self.heap.pop();
        }
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() > 2 * self.live.len() + COMPACT_THRESHOLD {
            self.rebuild_heap();
        }
    }

    fn rebuild_heap(&mut self) {
        self.heap = self.live.values()
                        .map(|ev| Reverse(Key { time: ev.fire_time, seq: ev.seq, id: ev.handle.0 }))
                        .collect();
    }
}

impl<P: Clone> EventQueue<P> {
    /// Fires the earliest due event: moves the clock to its fire time and returns it.
    ///
    /// A recurring event is re-armed at its fire time plus its period before it is returned,
    /// so callback processing never causes a periodic drift.
    ///
    /// Returns `None` if there are no pending events.
    pub fn advance_to_next(&mut self) -> Option<Fired<P>> {
        let key = loop {
            let Reverse(key) = self.heap.pop()?;
            if self.is_live(&key) {
                break key
            }
        };
        debug_assert!(key.time >= self.now);
        self.now = key.time;
        let period = self.live.get(&key.id).and_then(|ev| ev.period);
        if let Some(next_time) = period.and_then(|p| key.time.checked_add(p)) {
            let seq = self.next_seq();
            let ev = self.live.get_mut(&key.id)?;
            ev.fire_time = next_time;
            ev.seq = seq;
            let fired = Fired {
                handle: ev.handle,
                fire_time: key.time,
                owner: ev.owner,
                payload: ev.payload.clone(),
                recurring: true
            };
            self.heap.push(Reverse(Key { time: next_time, seq, id: key.id }));
            Some(fired)
        }
        else {
            let ev = self.live.remove(&key.id)?;
            Some(Fired {
                handle: ev.handle,
                fire_time: key.time,
                owner: ev.owner,
                payload: ev.payload,
                recurring: false
            })
        }
    }
}
