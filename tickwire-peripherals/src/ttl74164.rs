//! The 74164 8-bit serial-in, parallel-out shift register.
//!
//! ```text
//!        +---+--+---+
//!      A |1  +--+ 14| VCC
//!      B |2       13| QH
//!     QA |3       12| QG
//!     QB |4  7416 11| QF
//!     QC |5       10| QE
//!     QD |6        9| CLRQ
//!    GND |7        8| CLK
//!        +----------+
//! ```
//!
//! On every rising edge of `CLK` the outputs shift by one position, `QA` takes the value
//! of `A AND B`. A low `CLRQ` clears all outputs and inhibits shifting.
//!
//! Every input change compares `CLK` with the level seen at the previous change. A reset forgets
//! that level, so the first change after a reset with `CLK` high shifts the register.
//!
//! The propagation delay of the outputs (30 ns in the datasheet) is a property of the lines
//! bound to them.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use tickwire_core::{Pin, Level, LOW, level};
use tickwire_core::device::{Ctx, Device};
use tickwire_core::error::StateError;

pub const A: Pin = 0;
pub const B: Pin = 1;
pub const CLRQ: Pin = 2;
pub const CLK: Pin = 3;
/// Output pins `QA..=QH` are `0..=7`.
pub const QA: Pin = 0;
pub const QH: Pin = 7;

/// The shift register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Ttl74164 {
    a: bool,
    b: bool,
    clrq: bool,
    clk: bool,
    last_clk: bool,
    data: u8,
}

impl Default for Ttl74164 {
    fn default() -> Self {
        Ttl74164 { a: false, b: false, clrq: true, clk: false, last_clk: false, data: 0 }
    }
}

impl Ttl74164 {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns outputs as bits: `QA` in bit 0, `QH` in bit 7.
    pub fn data(&self) -> u8 {
        self.data
    }

    fn update_outputs(&self, ctx: &mut dyn Ctx) {
        for pin in QA..=QH {
            ctx.set_output(pin, level(self.data & (1 << pin) != 0));
        }
    }
}

impl Device for Ttl74164 {
    fn start(&mut self, ctx: &mut dyn Ctx) {
        self.update_outputs(ctx);
    }

    fn reset(&mut self, ctx: &mut dyn Ctx) {
        self.data = 0;
        self.last_clk = false;
        self.update_outputs(ctx);
    }

    fn input_changed(&mut self, pin: Pin, level: Level, ctx: &mut dyn Ctx) {
        let high = level != LOW;
        match pin {
            A => self.a = high,
            B => self.b = high,
            CLRQ => self.clrq = high,
            CLK => self.clk = high,
            _ => {
                debug!("no such 74164 input pin: {}", pin);
                return
            }
        }
        let data = if !self.clrq {
            0
        }
        else if self.clk && !self.last_clk {
            (self.data << 1) | (self.a && self.b) as u8
        }
        else {
            self.data
        };
        self.last_clk = self.clk;
        if data != self.data {
            self.data = data;
            self.update_outputs(ctx);
        }
    }

    fn save_state(&self) -> Vec<u8> {
        vec![self.a as u8, self.b as u8, self.clrq as u8, self.clk as u8, self.last_clk as u8, self.data]
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
        match state {
            &[a, b, clrq, clk, last_clk, data] => {
                *self = Ttl74164 {
                    a: a != 0, b: b != 0, clrq: clrq != 0, clk: clk != 0, last_clk: last_clk != 0, data
                };
                Ok(())
            }
            _ => Err(StateError("invalid 74164 state".into()))
        }
    }
}
