/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Virtual time.
//!
//! The whole machine shares a single virtual clock. Time is measured in attoseconds since power-on,
//! so clocks of any realistic frequency and nanosecond scale propagation delays can be expressed
//! without losing precision.
use core::fmt;
use core::num::NonZeroU32;
use core::time::Duration;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

mod ops;

/// The number of attoseconds in one second.
pub const ATTOS_PER_SEC: u128 = 1_000_000_000_000_000_000;
/// The number of attoseconds in one millisecond.
pub const ATTOS_PER_MILLI: u128 = 1_000_000_000_000_000;
/// The number of attoseconds in one microsecond.
pub const ATTOS_PER_MICRO: u128 = 1_000_000_000_000;
/// The number of attoseconds in one nanosecond.
pub const ATTOS_PER_NANO: u128 = 1_000_000_000;
/// The number of attoseconds in one picosecond.
pub const ATTOS_PER_PICO: u128 = 1_000_000;

/// A point in virtual time, counted in attoseconds from the machine power-on.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct VTime(u128);

/// A span of virtual time in attoseconds.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct VDuration(u128);

/// A frequency of a device clock.
///
/// Converts between the number of device cycles and virtual time.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClockRate(NonZeroU32);

impl VTime {
    /// The moment of power-on.
    pub const ZERO: VTime = VTime(0);
    /// The largest representable point in time.
    pub const MAX: VTime = VTime(u128::MAX);

    #[inline]
    pub const fn from_attos(attos: u128) -> Self {
        VTime(attos)
    }

    #[inline]
    pub const fn as_attos(self) -> u128 {
        self.0
    }

    /// Returns the number of whole nanoseconds since power-on.
    #[inline]
    pub const fn as_nanos(self) -> u128 {
        self.0 / ATTOS_PER_NANO
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        (self.0 / ATTOS_PER_SEC) as f64 + (self.0 % ATTOS_PER_SEC) as f64 / ATTOS_PER_SEC as f64
    }

    /// Returns the time elapsed from power-on as a [VDuration].
    #[inline]
    pub const fn since_power_on(self) -> VDuration {
        VDuration(self.0)
    }

    #[inline]
    pub fn checked_add(self, delta: VDuration) -> Option<VTime> {
        self.0.checked_add(delta.0).map(VTime)
    }

    #[inline]
    pub fn saturating_add(self, delta: VDuration) -> VTime {
        VTime(self.0.saturating_add(delta.0))
    }

    /// Returns the span between `earlier` and `self` or `None` if `earlier` is later than `self`.
    #[inline]
    pub fn checked_duration_since(self, earlier: VTime) -> Option<VDuration> {
        self.0.checked_sub(earlier.0).map(VDuration)
    }

    /// Returns the span between `earlier` and `self`, or zero if `earlier` is later than `self`.
    #[inline]
    pub fn saturating_duration_since(self, earlier: VTime) -> VDuration {
        VDuration(self.0.saturating_sub(earlier.0))
    }
}

impl VDuration {
    pub const ZERO: VDuration = VDuration(0);
    pub const MAX: VDuration = VDuration(u128::MAX);

    #[inline]
    pub const fn from_attos(attos: u128) -> Self {
        VDuration(attos)
    }

    #[inline]
    pub const fn from_picos(picos: u64) -> Self {
        VDuration(picos as u128 * ATTOS_PER_PICO)
    }

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        VDuration(nanos as u128 * ATTOS_PER_NANO)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        VDuration(micros as u128 * ATTOS_PER_MICRO)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VDuration(millis as u128 * ATTOS_PER_MILLI)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VDuration(secs as u128 * ATTOS_PER_SEC)
    }

    /// Returns the period of the given frequency.
    ///
    /// A frequency of `0` gives [VDuration::ZERO] which is rejected when used as a period
    /// of a recurring event.
    #[inline]
    pub const fn from_hz(hz: u32) -> Self {
        if hz == 0 {
            VDuration::ZERO
        }
        else {
            VDuration(ATTOS_PER_SEC / hz as u128)
        }
    }

    #[inline]
    pub const fn as_attos(self) -> u128 {
        self.0
    }

    #[inline]
    pub const fn as_nanos(self) -> u128 {
        self.0 / ATTOS_PER_NANO
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn checked_add(self, other: VDuration) -> Option<VDuration> {
        self.0.checked_add(other.0).map(VDuration)
    }

    #[inline]
    pub fn checked_mul(self, rhs: u64) -> Option<VDuration> {
        self.0.checked_mul(rhs as u128).map(VDuration)
    }

    #[inline]
    pub fn saturating_sub(self, other: VDuration) -> VDuration {
        VDuration(self.0.saturating_sub(other.0))
    }
}

impl From<Duration> for VDuration {
    fn from(duration: Duration) -> Self {
        VDuration(duration.as_nanos() * ATTOS_PER_NANO)
    }
}

impl ClockRate {
    /// Creates a clock rate from the frequency in Hz. Returns `None` if `hz` is `0`.
    #[inline]
    pub fn new(hz: u32) -> Option<Self> {
        NonZeroU32::new(hz).map(ClockRate)
    }

    #[inline]
    pub fn hz(self) -> u32 {
        self.0.get()
    }

    /// Returns the duration of a single cycle (rounded down to an attosecond).
    #[inline]
    pub fn period(self) -> VDuration {
        VDuration::from_hz(self.hz())
    }

    /// Converts the number of `cycles` into virtual time.
    ///
    /// The result is exact up to the attosecond. Callers counting long runs of cycles should
    /// convert the whole count measured from a fixed anchor instead of summing the results,
    /// so rounding errors never accumulate.
    #[inline]
    pub fn cycles_to_duration(self, cycles: u64) -> VDuration {
        VDuration(cycles as u128 * ATTOS_PER_SEC / self.hz() as u128)
    }

    /// Returns the number of whole cycles that fit in `duration`.
    ///
    /// Saturates at `u64::MAX`.
    #[inline]
    pub fn duration_to_cycles(self, duration: VDuration) -> u64 {
        let cycles = (duration.0 / ATTOS_PER_SEC) * self.hz() as u128
                   + (duration.0 % ATTOS_PER_SEC) * self.hz() as u128 / ATTOS_PER_SEC;
        if cycles > u64::MAX as u128 {
            u64::MAX
        }
        else {
            cycles as u64
        }
    }
}

impl fmt::Display for VTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}s", self.0 / ATTOS_PER_SEC, self.0 % ATTOS_PER_SEC)
    }
}

impl fmt::Display for VDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % ATTOS_PER_NANO == 0 {
            write!(f, "{}ns", self.0 / ATTOS_PER_NANO)
        }
        else {
            write!(f, "{}as", self.0)
        }
    }
}

impl fmt::Display for ClockRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.hz())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rate_conversions_work() {
        let rate = ClockRate::new(4_000_000).unwrap();
        assert_eq!(rate.period(), VDuration::from_nanos(250));
        assert_eq!(rate.cycles_to_duration(4), VDuration::from_nanos(1000));
        assert_eq!(rate.duration_to_cycles(VDuration::from_secs(1)), 4_000_000);
        assert_eq!(rate.duration_to_cycles(VDuration::from_nanos(999)), 3);
        assert!(ClockRate::new(0).is_none());
        // an MP-68A style clock that doesn't divide a second evenly
        let rate = ClockRate::new(505_000).unwrap();
        let one = rate.cycles_to_duration(1);
        let many = rate.cycles_to_duration(505_000);
        assert_eq!(many, VDuration::from_secs(1));
        assert!(one.checked_mul(505_000).unwrap() < many);
        assert_eq!(rate.duration_to_cycles(many), 505_000);
    }

    #[test]
    fn vtime_arithmetic_works() {
        let t = VTime::ZERO + VDuration::from_micros(3);
        assert_eq!(t.as_nanos(), 3000);
        assert_eq!(t - VTime::ZERO, VDuration::from_nanos(3000));
        assert_eq!(t.checked_duration_since(t + VDuration::from_nanos(1)), None);
        assert_eq!(VTime::MAX.checked_add(VDuration::from_attos(1)), None);
        assert_eq!(VDuration::from_hz(0), VDuration::ZERO);
        assert_eq!(VDuration::from_hz(10), VDuration::from_millis(100));
        assert_eq!(VDuration::from(Duration::from_millis(2)), VDuration::from_millis(2));
        assert_eq!(format!("{}", VTime::ZERO + VDuration::from_millis(1500)), "1.500000000000000000s");
        assert_eq!(format!("{}", VDuration::from_nanos(30)), "30ns");
    }

    #[cfg(feature = "snapshot")]
    #[test]
    fn time_serde_works() {
        let time = VTime::ZERO + VDuration::from_secs(3) + VDuration::from_attos(7);
        let sertime = serde_json::to_string(&time).unwrap();
        assert_eq!(sertime, "3000000000000000007");
        assert_eq!(serde_json::from_str::<VTime>(&sertime).unwrap(), time);
        let encoded: Vec<u8> = bincode::serialize(&time).unwrap();
        assert_eq!(encoded.len(), 16);
        assert_eq!(bincode::deserialize::<VTime>(&encoded).unwrap(), time);
        let rate = ClockRate::new(505_000).unwrap();
        let serrate = serde_json::to_string(&rate).unwrap();
        assert_eq!(serde_json::from_str::<ClockRate>(&serrate).unwrap(), rate);
        assert!(serde_json::from_str::<ClockRate>("0").is_err());
    }
}
