//! A write-only bank-select latch switching a banked memory window.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use tickwire_core::{EntryId, SpaceId, Pin};
use tickwire_core::device::{Ctx, Device};
use tickwire_core::error::StateError;

/// The output pin carrying the selected bank number.
pub const BANK_PIN: Pin = 0;

/// Selects which bank of a memory chip is visible through a mapped window.
///
/// Writing a value to any offset of the latch selects bank `value % banks`, by setting the bank
/// offset of the window entry to `bank * bank_size`. The selected bank is also driven on
/// the [BANK_PIN] output.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct BankLatch {
    space: String,
    window: EntryId,
    bank_size: u32,
    banks: u8,
    bank: u8,
    #[cfg_attr(feature = "snapshot", serde(skip))]
    space_id: Option<SpaceId>,
}

impl BankLatch {
    /// Creates a latch controlling the `window` entry of the address space named `space`.
    pub fn new<S: Into<String>>(space: S, window: EntryId, bank_size: u32, banks: u8) -> Self {
        BankLatch {
            space: space.into(),
            window,
            bank_size,
            banks: banks.max(1),
            bank: 0,
            space_id: None
        }
    }
    /// Returns the selected bank.
    pub fn bank(&self) -> u8 {
        self.bank
    }

    fn select(&mut self, bank: u8, ctx: &mut dyn Ctx) {
        self.bank = bank % self.banks;
        match self.space_id {
            Some(space) => {
                if !ctx.set_bank_offset(space, self.window, self.bank as u32 * self.bank_size) {
                    ctx.log(log::Level::Error, format_args!("no window entry {:?}", self.window));
                }
            }
            None => ctx.log(log::Level::Error, format_args!("no address space: {}", self.space))
        }
        ctx.set_output(BANK_PIN, self.bank as u32);
    }
}

impl Device for BankLatch {
    fn start(&mut self, ctx: &mut dyn Ctx) {
        self.space_id = ctx.find_space(&self.space);
        self.select(self.bank, ctx);
    }

    fn reset(&mut self, ctx: &mut dyn Ctx) {
        self.select(0, ctx);
    }

    fn read(&mut self, _offset: u32, _ctx: &mut dyn Ctx) -> u8 {
        self.bank
    }

    fn write(&mut self, _offset: u32, data: u8, ctx: &mut dyn Ctx) {
        trace!("bank select: {}", data);
        self.select(data, ctx);
    }

    fn save_state(&self) -> Vec<u8> {
        vec![self.bank]
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
        match state {
            &[bank] if bank < self.banks => {
                self.bank = bank;
                Ok(())
            }
            _ => Err(StateError("invalid bank latch state".into()))
        }
    }
}
