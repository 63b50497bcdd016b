//! A parallel I/O port with a data direction register and a strobe interrupt.
//!
//! The port is a simplified peripheral interface adapter with three registers:
//!
//! | offset | read                          | write               |
//! |--------|-------------------------------|---------------------|
//! | 0      | data: outputs and input pins  | output latch        |
//! | 1      | data direction (1 = output)   | data direction      |
//! | 2      | control                       | control             |
//!
//! Register offsets are decoded modulo 4. Reading the data register acknowledges the interrupt.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use tickwire_core::{Pin, Level, LOW, HIGH, level};
use tickwire_core::device::{Ctx, Device};
use tickwire_core::error::StateError;

pub const DATA_REG: u32 = 0;
pub const DDR_REG: u32 = 1;
pub const CONTROL_REG: u32 = 2;
/// The strobe input pin. The interrupt flag is set on its falling edge.
pub const STROBE_PIN: Pin = 8;
/// The active low interrupt request output pin.
pub const IRQ_PIN: Pin = 8;

bitflags! {
    /// The port control register.
    #[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "snapshot", serde(from = "u8", into = "u8"))]
    #[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
    pub struct PortControl: u8 {
        /// Enables driving the IRQ output when the interrupt flag is set.
        const IRQ_ENABLE = 0b0000_0001;
        /// Set on the strobe falling edge, read-only.
        const IRQ_FLAG   = 0b1000_0000;
    }
}

/// An 8-bit I/O port. Input pins `0..8` and output pins `0..8` correspond to the data bits.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Port {
    input: u8,
    output: u8,
    ddr: u8,
    control: PortControl,
    strobe: bool,
}

impl From<u8> for PortControl {
    fn from(control: u8) -> Self {
        PortControl::from_bits_truncate(control)
    }
}

impl From<PortControl> for u8 {
    fn from(control: PortControl) -> u8 {
        control.bits()
    }
}

impl Port {
    pub fn new() -> Self {
        Port { strobe: true, ..Default::default() }
    }
    /// Returns the levels of the input pins.
    pub fn input(&self) -> u8 {
        self.input
    }
    /// Returns the bits driven on the output pins.
    pub fn output(&self) -> u8 {
        self.output & self.ddr
    }

    pub fn ddr(&self) -> u8 {
        self.ddr
    }

    pub fn control(&self) -> PortControl {
        self.control
    }
    /// Returns `true` if the IRQ output is asserted.
    pub fn is_irq(&self) -> bool {
        self.control.contains(PortControl::IRQ_ENABLE | PortControl::IRQ_FLAG)
    }

    fn data(&self) -> u8 {
        (self.output & self.ddr) | (self.input & !self.ddr)
    }

    fn update_outputs(&self, ctx: &mut dyn Ctx) {
        for bit in 0..8 {
            if self.ddr & (1 << bit) != 0 {
                ctx.set_output(bit, level(self.output & (1 << bit) != 0));
            }
        }
    }

    fn update_irq(&self, ctx: &mut dyn Ctx) {
        ctx.set_output(IRQ_PIN, if self.is_irq() { LOW } else { HIGH });
    }
}

impl Device for Port {
    fn start(&mut self, ctx: &mut dyn Ctx) {
        self.update_outputs(ctx);
        self.update_irq(ctx);
    }

    /// Turns all data pins into inputs. Pins which were outputs are driven low.
    fn reset(&mut self, ctx: &mut dyn Ctx) {
        let outputs = self.ddr;
        self.output = 0;
        self.ddr = 0;
        self.control = PortControl::empty();
        for bit in 0..8 {
            if outputs & (1 << bit) != 0 {
                ctx.set_output(bit, LOW);
            }
        }
        self.update_irq(ctx);
    }

    fn read(&mut self, offset: u32, ctx: &mut dyn Ctx) -> u8 {
        match offset & 3 {
            DATA_REG => {
                let data = self.data();
                if self.control.intersects(PortControl::IRQ_FLAG) {
                    self.control.remove(PortControl::IRQ_FLAG);
                    self.update_irq(ctx);
                }
                data
            }
            DDR_REG => self.ddr,
            CONTROL_REG => self.control.bits(),
            _ => 0xFF
        }
    }

    fn write(&mut self, offset: u32, data: u8, ctx: &mut dyn Ctx) {
        match offset & 3 {
            DATA_REG => {
                self.output = data;
                self.update_outputs(ctx);
            }
            DDR_REG => {
                self.ddr = data;
                self.update_outputs(ctx);
            }
            CONTROL_REG => {
                let flag = self.control & PortControl::IRQ_FLAG;
                self.control = (PortControl::from(data) & PortControl::IRQ_ENABLE) | flag;
                self.update_irq(ctx);
            }
            _ => {}
        }
    }

    fn input_changed(&mut self, pin: Pin, level: Level, ctx: &mut dyn Ctx) {
        let high = level != LOW;
        match pin {
            0..=7 => {
                let mask = 1u8 << pin;
                if high { self.input |= mask } else { self.input &= !mask }
            }
            STROBE_PIN => {
                if self.strobe && !high {
                    self.control.insert(PortControl::IRQ_FLAG);
                    self.update_irq(ctx);
                }
                self.strobe = high;
            }
            _ => debug!("no such port input pin: {}", pin)
        }
    }

    fn save_state(&self) -> Vec<u8> {
        vec![self.input, self.output, self.ddr, self.control.bits(), self.strobe as u8]
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
        match state {
            &[input, output, ddr, control, strobe] => {
                self.input = input;
                self.output = output;
                self.ddr = ddr;
                self.control = control.into();
                self.strobe = strobe != 0;
                Ok(())
            }
            _ => Err(StateError("invalid port state".into()))
        }
    }
}
