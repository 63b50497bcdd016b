/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
use core::iter::Sum;
use core::ops::{Add, Sub, Mul, Div, AddAssign, SubAssign};

use super::{VTime, VDuration};

impl Add<VDuration> for VTime {
    type Output = VTime;
    /// # Panics
    /// Panics on overflow.
    #[inline]
    fn add(self, delta: VDuration) -> VTime {
        self.checked_add(delta).expect("virtual time overflow")
    }
}

impl AddAssign<VDuration> for VTime {
    #[inline]
    fn add_assign(&mut self, delta: VDuration) {
        *self = *self + delta
    }
}

impl Sub<VDuration> for VTime {
    type Output = VTime;
    /// # Panics
    /// Panics if the result would precede power-on.
    #[inline]
    fn sub(self, delta: VDuration) -> VTime {
        VTime::from_attos(self.as_attos().checked_sub(delta.as_attos())
                                         .expect("virtual time underflow"))
    }
}

impl SubAssign<VDuration> for VTime {
    #[inline]
    fn sub_assign(&mut self, delta: VDuration) {
        *self = *self - delta
    }
}

impl Sub<VTime> for VTime {
    type Output = VDuration;
    /// # Panics
    /// Panics if `other` is later than `self`.
    #[inline]
    fn sub(self, other: VTime) -> VDuration {
        self.checked_duration_since(other).expect("virtual time underflow")
    }
}

impl Add for VDuration {
    type Output = VDuration;
    #[inline]
    fn add(self, other: VDuration) -> VDuration {
        self.checked_add(other).expect("virtual duration overflow")
    }
}

impl AddAssign for VDuration {
    #[inline]
    fn add_assign(&mut self, other: VDuration) {
        *self = *self + other
    }
}

impl Sub for VDuration {
    type Output = VDuration;
    #[inline]
    fn sub(self, other: VDuration) -> VDuration {
        VDuration::from_attos(self.as_attos().checked_sub(other.as_attos())
                                             .expect("virtual duration underflow"))
    }
}

impl SubAssign for VDuration {
    #[inline]
    fn sub_assign(&mut self, other: VDuration) {
        *self = *self - other
    }
}

impl Mul<u64> for VDuration {
    type Output = VDuration;
    #[inline]
    fn mul(self, rhs: u64) -> VDuration {
        self.checked_mul(rhs).expect("virtual duration overflow")
    }
}

impl Div<u64> for VDuration {
    type Output = VDuration;
    /// # Panics
    /// Panics if `rhs` is `0`.
    #[inline]
    fn div(self, rhs: u64) -> VDuration {
        VDuration::from_attos(self.as_attos() / rhs as u128)
    }
}

impl Sum for VDuration {
    fn sum<I: Iterator<Item=VDuration>>(iter: I) -> VDuration {
        iter.fold(VDuration::ZERO, |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_ops_work() {
        let d = VDuration::from_nanos(100);
        assert_eq!(d * 3, VDuration::from_nanos(300));
        assert_eq!(d / 4, VDuration::from_nanos(25));
        assert_eq!(d - VDuration::from_nanos(40), VDuration::from_nanos(60));
        let total: VDuration = (1..=4).map(VDuration::from_nanos).sum();
        assert_eq!(total, VDuration::from_nanos(10));
        let mut t = VTime::ZERO;
        t += d;
        t += d;
        assert_eq!(t - d, VTime::ZERO + d);
    }
}
