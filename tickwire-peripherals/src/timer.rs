//! Timers driving an output line: one-shot level changes and square wave clock generators.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use tickwire_core::{Pin, Level, LOW, level};
use tickwire_core::clock::VDuration;
use tickwire_core::device::{Ctx, Device};
use tickwire_core::error::StateError;
use tickwire_core::queue::EventHandle;

/// The timer output pin.
pub const OUTPUT_PIN: Pin = 0;
/// The gate input pin. While the gate is low the timer is stopped.
pub const GATE_PIN: Pin = 0;

const STATE_LEN: usize = 21;

/// The behaviour of a [Timer].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub enum TimerMode {
    /// Drives `level` on the output once, `delay` after the timer is started.
    OneShot { delay: VDuration, level: Level },
    /// Toggles the output every half `period`.
    SquareWave { period: VDuration },
}

/// A timer device.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Timer {
    mode: TimerMode,
    output: Level,
    ticks: u64,
    gate: bool,
    #[cfg_attr(feature = "snapshot", serde(skip))]
    handle: Option<EventHandle>,
}

impl Timer {
    pub fn new(mode: TimerMode) -> Self {
        Timer { mode, output: LOW, ticks: 0, gate: true, handle: None }
    }
    /// Creates a timer driving `level` on its output `delay` after start or reset.
    pub fn one_shot(delay: VDuration, level: Level) -> Self {
        Self::new(TimerMode::OneShot { delay, level })
    }
    /// Creates a clock generator with the frequency of `hz`.
    pub fn square_wave(hz: u32) -> Self {
        Self::new(TimerMode::SquareWave { period: VDuration::from_hz(hz) })
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }
    /// Returns the current output level.
    pub fn output(&self) -> Level {
        self.output
    }
    /// Returns how many times the timer has fired.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn arm(&mut self, ctx: &mut dyn Ctx) {
        if let Some(handle) = self.handle.take() {
            ctx.cancel(handle);
        }
        self.handle = match self.mode {
            TimerMode::OneShot { delay, .. } => Some(ctx.timer_after(delay, 0)),
            TimerMode::SquareWave { period } => {
                match ctx.timer_periodic(period / 2, 0) {
                    Ok(handle) => Some(handle),
                    Err(err) => {
                        ctx.log(log::Level::Error, format_args!("can't start the clock: {}", err));
                        None
                    }
                }
            }
        };
    }

    fn disarm(&mut self, ctx: &mut dyn Ctx) {
        if let Some(handle) = self.handle.take() {
            ctx.cancel(handle);
        }
    }

    fn set_output(&mut self, output: Level, ctx: &mut dyn Ctx) {
        self.output = output;
        ctx.set_output(OUTPUT_PIN, output);
    }
}

impl Device for Timer {
    fn start(&mut self, ctx: &mut dyn Ctx) {
        ctx.set_output(OUTPUT_PIN, self.output);
        if self.gate {
            self.arm(ctx);
        }
    }

    fn reset(&mut self, ctx: &mut dyn Ctx) {
        // pending timers are already cancelled by the machine
        self.handle = None;
        self.ticks = 0;
        self.set_output(LOW, ctx);
        if self.gate {
            self.arm(ctx);
        }
    }

    fn input_changed(&mut self, pin: Pin, level: Level, ctx: &mut dyn Ctx) {
        if pin != GATE_PIN {
            return
        }
        let gate = level != LOW;
        if gate != self.gate {
            self.gate = gate;
            if gate {
                self.arm(ctx);
            }
            else {
                self.disarm(ctx);
            }
        }
    }

    fn timer(&mut self, _param: u64, ctx: &mut dyn Ctx) {
        self.ticks += 1;
        match self.mode {
            TimerMode::OneShot { level, .. } => {
                self.handle = None;
                self.set_output(level, ctx);
            }
            TimerMode::SquareWave { .. } => {
                let toggled = level(self.output == LOW);
                self.set_output(toggled, ctx);
            }
        }
    }

    fn save_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(STATE_LEN);
        state.extend_from_slice(&self.output.to_le_bytes());
        state.extend_from_slice(&self.ticks.to_le_bytes());
        state.push(self.gate as u8);
        state.extend_from_slice(&self.handle.map_or(u64::MAX, EventHandle::get).to_le_bytes());
        state
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
        if state.len() != STATE_LEN {
            return Err(StateError("invalid timer state".into()))
        }
        let mut output = [0u8; 4];
        let mut ticks = [0u8; 8];
        let mut handle = [0u8; 8];
        output.copy_from_slice(&state[0..4]);
        ticks.copy_from_slice(&state[4..12]);
        handle.copy_from_slice(&state[13..21]);
        self.output = Level::from_le_bytes(output);
        self.ticks = u64::from_le_bytes(ticks);
        self.gate = state[12] != 0;
        self.handle = match u64::from_le_bytes(handle) {
            u64::MAX => None,
            raw => Some(EventHandle::from_raw(raw))
        };
        Ok(())
    }
}
