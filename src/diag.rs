/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Diagnostics of a running machine.
//!
//! Runtime anomalies never stop the simulation: a read of an unmapped address returns the
//! unmapped value of the address space, a write is dropped. They are reported to the machine's
//! [DiagnosticsSink] instead, together with messages logged by devices.
use core::fmt;

use log::{Level, LevelFilter};

use crate::clock::VTime;
use crate::{Pin, Level as LineLevel};

/// A runtime event worth reporting.
#[derive(Clone, Copy, Debug)]
pub enum Diagnostic<'a> {
    /// A read of an address no device answers.
    UnmappedRead { space: &'a str, address: u32 },
    /// A write to an address no device accepts.
    UnmappedWrite { space: &'a str, address: u32, data: u8 },
    /// An access to a device currently handling another callback.
    BusyDevice { space: &'a str, address: u32, device: &'a str },
    /// A change of an input of a device currently handling another callback. It will be
    /// delivered as soon as that callback returns.
    DeferredInput { device: &'a str, pin: Pin, level: LineLevel },
    /// A message logged by a device.
    Message { level: Level, args: fmt::Arguments<'a> },
}

/// Receives diagnostics of a machine.
pub trait DiagnosticsSink {
    /// Reports a `diagnostic` caused by a device named `origin` at virtual `time`.
    ///
    /// `max_level` is the log level configured for the device.
    fn report(&mut self, time: VTime, origin: &str, max_level: LevelFilter, diagnostic: &Diagnostic<'_>);
}

/// Forwards diagnostics to the [log] facade with the name of the device as the log target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Diagnostic<'_> {
    /// Returns the severity of the diagnostic.
    pub fn level(&self) -> Level {
        match self {
            Diagnostic::UnmappedRead {..} |
            Diagnostic::UnmappedWrite {..} => Level::Debug,
            Diagnostic::BusyDevice {..} => Level::Warn,
            Diagnostic::DeferredInput {..} => Level::Trace,
            Diagnostic::Message { level, .. } => *level
        }
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnmappedRead { space, address } => write!(f,
                "unmapped {} read at {:#x}", space, address),
            Diagnostic::UnmappedWrite { space, address, data } => write!(f,
                "unmapped {} write of {:#04x} at {:#x}", space, data, address),
            Diagnostic::BusyDevice { space, address, device } => write!(f,
                "re-entrant {} access at {:#x} to the busy device {}", space, address, device),
            Diagnostic::DeferredInput { device, pin, level } => write!(f,
                "deferred input {} = {} of the busy device {}", pin, level, device),
            Diagnostic::Message { args, .. } => f.write_fmt(*args)
        }
    }
}

impl DiagnosticsSink for LogSink {
    fn report(&mut self, time: VTime, origin: &str, max_level: LevelFilter, diagnostic: &Diagnostic<'_>) {
        let level = diagnostic.level();
        if level <= max_level {
            log::log!(target: origin, level, "{}: {}", time, diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_display_works() {
        let diag = Diagnostic::UnmappedWrite { space: "program", address: 0x4000, data: 7 };
        assert_eq!(diag.to_string(), "unmapped program write of 0x07 at 0x4000");
        assert_eq!(diag.level(), Level::Debug);
        let text = Diagnostic::Message { level: Level::Error, args: format_args!("bad {}", 1) }.to_string();
        assert_eq!(text, "bad 1");
    }
}
