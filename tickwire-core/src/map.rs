/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of TICKWIRE, a Rust library for building event-driven
    hardware simulations.

    For the full copyright notice, see the lib.rs file.
*/
//! Address spaces routing memory accesses to device handlers.
//!
//! An [AddressMap] is a list of [MapRange]s, each one assigning a canonical range of addresses
//! to a device. A range may be aliased over the whole space by its `mirror` bits: the address
//! bits set in `mirror` are ignored when decoding, so a chip with partial address decoding
//! responds at every combination of those bits.
//!
//! ```text
//! RAM  0x0000-0x07ff mirror 0x1800 -> responds at 0x0000-0x1fff
//! PIA  0xa000-0xa003 mirror 0x1ffc -> responds at 0xa000-0xbfff, every 4 bytes
//! ```
//!
//! Ranges declared as `dual` may share addresses. A read of such an address is answered by all
//! of them, and the results are combined by the space's [DualPolicy]; a write is delivered to
//! all of them.
use core::convert::TryFrom;
use core::fmt;

use arrayvec::ArrayVec;
use bitflags::bitflags;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::error::{ConfigError, RangeInfo};
use crate::id::{DeviceId, EntryId};

/// The maximum number of ranges answering a single address.
pub const MAX_HITS: usize = 8;

/// The value returned by default when reading addresses with no handler.
pub const UNMAPPED_DEFAULT: u8 = 0xFF;

bitflags! {
    /// The kind of accesses a range responds to.
    #[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "snapshot", serde(try_from = "u8", into = "u8"))]
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct Access: u8 {
        const READ       = 0b01;
        const WRITE      = 0b10;
        const READ_WRITE = 0b11;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryFromU8AccessError(pub u8);

/// The byte order of multi-byte accesses.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// The width of an access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
}

/// Determines how the results of reading an address answered by more than one range combine.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DualPolicy {
    /// Open-collector data bus: a low data line driven by any device wins.
    And,
    /// A high data line driven by any device wins.
    Or,
    /// The range registered first wins.
    First,
}

/// The declaration of an address space.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceConfig {
    pub name: String,
    /// The address width in bits: `1..=32`.
    pub addr_bits: u8,
    pub endian: Endian,
    /// The value read from addresses with no handler.
    pub unmapped: u8,
    pub dual: DualPolicy,
}

/// A range of addresses handled by a device.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapRange {
    /// The first address of the canonical range.
    pub base: u32,
    pub size: u32,
    /// Address bits ignored when decoding.
    pub mirror: u32,
    pub access: Access,
    /// The device handling the range. Assigned by the machine builder.
    pub handler: DeviceId,
    /// If `true` the range may share addresses with other dual ranges.
    pub dual: bool,
}

/// A range matching a decoded address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit {
    pub entry: EntryId,
    pub handler: DeviceId,
    /// The offset relative to the first address of the range, plus the bank offset.
    pub offset: u32,
}

/// Ranges matching a decoded address in registration order.
pub type Hits = ArrayVec<Hit, MAX_HITS>;

/// Receives accesses dispatched by [AddressMap::read] and [AddressMap::write].
pub trait MapHandler {
    /// Reads a byte from the device of the given `hit`.
    ///
    /// Returns `None` if the device can't answer, in which case the address is considered unmapped
    /// unless another range answers.
    fn read(&mut self, hit: &Hit) -> Option<u8>;
    /// Writes a byte to the device of the given `hit`. Returns `false` if the device can't accept it.
    fn write(&mut self, hit: &Hit, data: u8) -> bool;
    /// Called when reading an address with no handler.
    fn unmapped_read(&mut self, _address: u32) {}
    /// Called when writing to an address with no handler.
    fn unmapped_write(&mut self, _address: u32, _data: u8) {}
}

#[derive(Clone, Debug)]
struct Entry {
    range: MapRange,
    owner: String,
    bank_offset: u32,
}

/// An address space with its decoding table.
#[derive(Clone, Debug)]
pub struct AddressMap {
    config: SpaceConfig,
    addr_mask: u32,
    entries: Vec<Entry>,
}

/// A set of addresses matching `value` on all `care` bits.
#[derive(Clone, Copy, Debug)]
struct Pattern {
    value: u32,
    /// The bits varying within the canonical block.
    low: u32,
    care: u32,
}

impl std::error::Error for TryFromU8AccessError {}

impl fmt::Display for TryFromU8AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "converted integer (0x{:x}) contains extraneous bits for `Access`", self.0)
    }
}

impl TryFrom<u8> for Access {
    type Error = TryFromU8AccessError;
    fn try_from(access: u8) -> core::result::Result<Self, Self::Error> {
        Access::from_bits(access).ok_or(TryFromU8AccessError(access))
    }
}

impl From<Access> for u8 {
    fn from(access: Access) -> u8 {
        access.bits()
    }
}

impl Width {
    /// Returns the number of bytes of an access.
    #[inline]
    pub fn bytes(self) -> u32 {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U32 => 4,
        }
    }
}

impl Endian {
    /// Assembles a value from bytes ordered by ascending addresses.
    pub fn assemble<I: IntoIterator<Item=u8>>(self, bytes: I) -> u32 {
        let mut value = 0u32;
        for (n, byte) in bytes.into_iter().enumerate() {
            match self {
                Endian::Big => value = (value << 8) | byte as u32,
                Endian::Little => value |= (byte as u32) << (8 * n)
            }
        }
        value
    }
    /// Splits the `width` least significant bytes of `value` into bytes ordered by ascending
    /// addresses.
    pub fn split(self, value: u32, width: Width) -> ArrayVec<u8, 4> {
        let count = width.bytes();
        (0..count).map(|n| {
            let shift = match self {
                Endian::Big => 8 * (count - 1 - n),
                Endian::Little => 8 * n
            };
            (value >> shift) as u8
        }).collect()
    }
}

impl DualPolicy {
    /// Combines values read from all ranges answering an address.
    ///
    /// Returns `None` if `values` is empty.
    pub fn combine<I: IntoIterator<Item=u8>>(self, values: I) -> Option<u8> {
        let mut values = values.into_iter();
        match self {
            DualPolicy::And => values.fold(None, |acc, v| Some(acc.unwrap_or(!0) & v)),
            DualPolicy::Or => values.fold(None, |acc, v| Some(acc.unwrap_or(0) | v)),
            DualPolicy::First => values.next(),
        }
    }
}

impl Default for DualPolicy {
    fn default() -> Self {
        DualPolicy::And
    }
}

impl SpaceConfig {
    /// Creates a big endian space with the default unmapped value and [DualPolicy::And].
    pub fn new<S: Into<String>>(name: S, addr_bits: u8) -> Self {
        SpaceConfig {
            name: name.into(),
            addr_bits,
            endian: Endian::Big,
            unmapped: UNMAPPED_DEFAULT,
            dual: DualPolicy::And
        }
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    pub fn unmapped(mut self, unmapped: u8) -> Self {
        self.unmapped = unmapped;
        self
    }

    pub fn dual_policy(mut self, dual: DualPolicy) -> Self {
        self.dual = dual;
        self
    }
}

impl MapRange {
    /// Creates a read/write range of `size` addresses starting from `base`.
    pub fn new(base: u32, size: u32) -> Self {
        MapRange {
            base,
            size,
            mirror: 0,
            access: Access::READ_WRITE,
            handler: DeviceId(0),
            dual: false
        }
    }
    /// Creates a read/write range from `first` to `last` address inclusive.
    pub fn span(first: u32, last: u32) -> Self {
        Self::new(first, last.wrapping_sub(first).wrapping_add(1))
    }

    pub fn mirror(mut self, mirror: u32) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn read_only(self) -> Self {
        self.access(Access::READ)
    }

    pub fn write_only(self) -> Self {
        self.access(Access::WRITE)
    }

    pub fn dual(mut self) -> Self {
        self.dual = true;
        self
    }

    pub fn handler(mut self, handler: DeviceId) -> Self {
        self.handler = handler;
        self
    }
    /// Returns the offset of `address` relative to `base` if the range decodes it.
    ///
    /// `address` must already be masked to the width of the address space.
    #[inline]
    pub fn decode(&self, address: u32) -> Option<u32> {
        let effective = address & !self.mirror;
        let offset = effective.wrapping_sub(self.base & !self.mirror);
        if offset < self.size {
            Some(offset)
        }
        else {
            None
        }
    }

    fn info(&self, owner: &str) -> RangeInfo {
        RangeInfo {
            owner: owner.to_string(),
            base: self.base,
            last: self.base.wrapping_add(self.size.wrapping_sub(1)),
            mirror: self.mirror
        }
    }
    /// Decomposes the range, including all of its mirror images, into patterns.
    fn patterns(&self, addr_mask: u32) -> Vec<Pattern> {
        let mut patterns = Vec::new();
        let mut start = self.base as u64;
        let end = start + self.size as u64;
        while start < end {
            let mut block = if start == 0 { 1u64 << 32 } else { 1u64 << start.trailing_zeros() };
            while start + block > end {
                block >>= 1;
            }
            let low = (block - 1) as u32;
            patterns.push(Pattern {
                value: start as u32,
                low,
                care: !(low | self.mirror) & addr_mask
            });
            start += block;
        }
        patterns
    }
}

impl Pattern {
    #[inline]
    fn intersects(&self, other: &Pattern) -> bool {
        (self.value ^ other.value) & self.care & other.care == 0
    }
}

fn ranges_intersect(a: &[Pattern], b: &[Pattern]) -> bool {
    a.iter().any(|pa| b.iter().any(|pb| pa.intersects(pb)))
}

impl AddressMap {
    /// Creates an empty address space.
    pub fn new(config: SpaceConfig) -> Result<Self, ConfigError> {
        if !(1..=32).contains(&config.addr_bits) {
            return Err(ConfigError::InvalidSpaceWidth {
                space: config.name,
                addr_bits: config.addr_bits
            })
        }
        let addr_mask = u32::MAX >> (32 - config.addr_bits as u32);
        Ok(AddressMap { config, addr_mask, entries: Vec::new() })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    #[inline]
    pub fn addr_mask(&self) -> u32 {
        self.addr_mask
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Registers a range naming its handler in error messages by its id.
    pub fn register_range(&mut self, range: MapRange) -> Result<EntryId, ConfigError> {
        let owner = range.handler.to_string();
        self.register_owned(range, owner)
    }
    /// Registers a range naming its handler in error messages as `owner`.
    ///
    /// The range is validated against the space and all previously registered ranges.
    pub fn register_owned<S: Into<String>>(&mut self, range: MapRange, owner: S) -> Result<EntryId, ConfigError> {
        let owner = owner.into();
        let mut range = range;
        range.mirror &= self.addr_mask;
        let space = || self.config.name.clone();
        if range.size == 0 {
            return Err(ConfigError::EmptyRange { space: space(), range: range.info(&owner) })
        }
        if range.base as u64 + range.size as u64 > self.addr_mask as u64 + 1 {
            return Err(ConfigError::RangeOutOfSpace { space: space(), range: range.info(&owner) })
        }
        let patterns = range.patterns(self.addr_mask);
        if patterns.iter().any(|p| (p.value | p.low) & range.mirror != 0) {
            return Err(ConfigError::MirrorInsideRange { space: space(), range: range.info(&owner) })
        }
        let mut dual_overlaps = 0;
        for entry in self.entries.iter() {
            if !entry.range.access.intersects(range.access) {
                continue
            }
            if !ranges_intersect(&patterns, &entry.range.patterns(self.addr_mask)) {
                continue
            }
            if range.dual && entry.range.dual {
                dual_overlaps += 1;
                continue
            }
            return Err(ConfigError::OverlappingRanges {
                space: space(),
                first: entry.range.info(&entry.owner),
                second: range.info(&owner)
            })
        }
        if dual_overlaps >= MAX_HITS {
            return Err(ConfigError::TooManyDualRanges { space: space(), range: range.info(&owner) })
        }
        let id = EntryId(self.entries.len() as u32);
        self.entries.push(Entry { range, owner, bank_offset: 0 });
        Ok(id)
    }

    pub fn range(&self, entry: EntryId) -> Option<&MapRange> {
        self.entries.get(entry.index()).map(|e| &e.range)
    }

    pub fn owner(&self, entry: EntryId) -> Option<&str> {
        self.entries.get(entry.index()).map(|e| e.owner.as_str())
    }

    pub fn ranges(&self) -> impl Iterator<Item=(EntryId, &MapRange)> {
        self.entries.iter().enumerate().map(|(n, e)| (EntryId(n as u32), &e.range))
    }

    pub fn bank_offset(&self, entry: EntryId) -> Option<u32> {
        self.entries.get(entry.index()).map(|e| e.bank_offset)
    }
    /// Sets the value added to offsets decoded by the `entry`. Returns `false` if there is no
    /// such entry.
    pub fn set_bank_offset(&mut self, entry: EntryId, offset: u32) -> bool {
        match self.entries.get_mut(entry.index()) {
            Some(e) => {
                e.bank_offset = offset;
                true
            }
            None => false
        }
    }
    /// Returns ranges responding to `access` at `address`.
    pub fn decode(&self, address: u32, access: Access) -> Hits {
        let address = address & self.addr_mask;
        let mut hits = Hits::new();
        for (n, entry) in self.entries.iter().enumerate() {
            if !entry.range.access.intersects(access) {
                continue
            }
            if let Some(offset) = entry.range.decode(address) {
                let hit = Hit {
                    entry: EntryId(n as u32),
                    handler: entry.range.handler,
                    offset: offset.wrapping_add(entry.bank_offset)
                };
                if hits.try_push(hit).is_err() {
                    break
                }
            }
        }
        hits
    }
    /// Reads a byte, combining results of dual ranges.
    pub fn read_byte<H: MapHandler + ?Sized>(&self, address: u32, handler: &mut H) -> u8 {
        let address = address & self.addr_mask;
        let hits = self.decode(address, Access::READ);
        let values = hits.iter().filter_map(|hit| handler.read(hit)).collect::<ArrayVec<u8, MAX_HITS>>();
        match self.config.dual.combine(values) {
            Some(value) => value,
            None => {
                handler.unmapped_read(address);
                self.config.unmapped
            }
        }
    }
    /// Writes a byte to every range responding at `address`.
    pub fn write_byte<H: MapHandler + ?Sized>(&self, address: u32, data: u8, handler: &mut H) {
        let address = address & self.addr_mask;
        let mut accepted = false;
        for hit in self.decode(address, Access::WRITE).iter() {
            accepted |= handler.write(hit, data);
        }
        if !accepted {
            handler.unmapped_write(address, data);
        }
    }
    /// Reads a value of the given `width` in the byte order of the space.
    ///
    /// Multi-byte accesses wrap around at the end of the space.
    pub fn read<H: MapHandler + ?Sized>(&self, address: u32, width: Width, handler: &mut H) -> u32 {
        let bytes = (0..width.bytes()).map(|n| self.read_byte(address.wrapping_add(n), handler))
                                      .collect::<ArrayVec<u8, 4>>();
        self.config.endian.assemble(bytes)
    }
    /// Writes a value of the given `width` in the byte order of the space.
    pub fn write<H: MapHandler + ?Sized>(&self, address: u32, width: Width, value: u32, handler: &mut H) {
        for (n, byte) in self.config.endian.split(value, width).into_iter().enumerate() {
            self.write_byte(address.wrapping_add(n as u32), byte, handler);
        }
    }
}
