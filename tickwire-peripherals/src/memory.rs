//! Random access and read-only memory devices.
//!
//! Both devices answer at offsets relative to their mapped range, so the same chip may be
//! mirrored or banked by the address map alone.
use core::fmt;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use rand::{Rng, SeedableRng};
use rand::rngs::SmallRng;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use tickwire_core::device::{Ctx, Device};
use tickwire_core::error::StateError;

/// The value read from offsets past the end of a memory chip.
pub const FLOATING_BUS: u8 = 0xFF;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// A memory chip can't be empty.
    InvalidSize,
    /// Data doesn't fit at the requested offset.
    OffsetOutOfRange,
}

/// A read/write memory chip.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Ram {
    mem: Vec<u8>,
}

/// A read-only memory chip. Writes are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
pub struct Rom {
    mem: Vec<u8>,
}

impl std::error::Error for MemoryError {}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemoryError::InvalidSize => "Memory size must be positive",
            MemoryError::OffsetOutOfRange => "Data doesn't fit in the memory at the given offset",
        })
    }
}

fn load_at(mem: &mut [u8], offset: usize, data: &[u8]) -> Result<(), MemoryError> {
    let end = offset.checked_add(data.len()).ok_or(MemoryError::OffsetOutOfRange)?;
    mem.get_mut(offset..end)
       .ok_or(MemoryError::OffsetOutOfRange)?
       .copy_from_slice(data);
    Ok(())
}

impl Ram {
    /// Creates a memory chip of `size` bytes filled with zeroes.
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize)
        }
        Ok(Ram { mem: vec![0; size] })
    }
    /// Creates a memory chip of `size` bytes filled with pseudo-random noise, as found in
    /// dynamic RAM after power on. The same `seed` always gives the same content.
    pub fn with_noise(size: usize, seed: u64) -> Result<Self, MemoryError> {
        let mut ram = Self::new(size)?;
        SmallRng::seed_from_u64(seed).fill(&mut ram.mem[..]);
        Ok(ram)
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mem
    }
    /// Copies `data` into the memory at `offset`.
    pub fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        load_at(&mut self.mem, offset, data)
    }
}

impl Device for Ram {
    fn read(&mut self, offset: u32, _ctx: &mut dyn Ctx) -> u8 {
        self.mem.get(offset as usize).copied().unwrap_or(FLOATING_BUS)
    }

    fn write(&mut self, offset: u32, data: u8, _ctx: &mut dyn Ctx) {
        match self.mem.get_mut(offset as usize) {
            Some(cell) => *cell = data,
            None => debug!("RAM write past the end: {:#x}", offset)
        }
    }

    fn save_state(&self) -> Vec<u8> {
        self.mem.clone()
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), StateError> {
        if state.len() != self.mem.len() {
            return Err(StateError(format!("RAM size mismatch: {} != {}", state.len(), self.mem.len())))
        }
        self.mem.copy_from_slice(state);
        Ok(())
    }
}

impl Rom {
    /// Creates a memory chip with the given content.
    pub fn new(mem: Vec<u8>) -> Result<Self, MemoryError> {
        if mem.is_empty() {
            return Err(MemoryError::InvalidSize)
        }
        Ok(Rom { mem })
    }
    /// Creates a memory chip of `size` bytes filled with `0xFF`, as an erased EPROM.
    pub fn blank(size: usize) -> Result<Self, MemoryError> {
        Self::new(vec![0xFF; size])
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }
    /// Programs the memory with `data` at `offset`.
    pub fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        load_at(&mut self.mem, offset, data)
    }
}

impl Device for Rom {
    fn read(&mut self, offset: u32, _ctx: &mut dyn Ctx) -> u8 {
        self.mem.get(offset as usize).copied().unwrap_or(FLOATING_BUS)
    }

    fn write(&mut self, offset: u32, data: u8, ctx: &mut dyn Ctx) {
        ctx.log(log::Level::Debug, format_args!("ignored ROM write {:#x} at {:#x}", data, offset));
    }
}
