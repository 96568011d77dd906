// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The 50-bit SAMPA packet header: field accessors, the Hamming(43,6) +
//! parity protection, and the packet-type taxonomy.

use std::fmt;

use crate::error::{bad_argument, Result};

/// The fixed 50-bit value of the SAMPA sync header.
pub const SYNC_VALUE: u64 = 0x0001_5555_40F0_0113;

const HAMMING_CODE_OFFSET: u32 = 0;
const HAMMING_CODE_WIDTH: u32 = 6;
const HEADER_PARITY_OFFSET: u32 = 6;
const HEADER_PARITY_WIDTH: u32 = 1;
const PACKET_TYPE_OFFSET: u32 = 7;
const PACKET_TYPE_WIDTH: u32 = 3;
const NOF_10BIT_WORDS_OFFSET: u32 = 10;
const NOF_10BIT_WORDS_WIDTH: u32 = 10;
const CHIP_ADDRESS_OFFSET: u32 = 20;
const CHIP_ADDRESS_WIDTH: u32 = 4;
const CHANNEL_ADDRESS_OFFSET: u32 = 24;
const CHANNEL_ADDRESS_WIDTH: u32 = 5;
const BUNCH_CROSSING_OFFSET: u32 = 29;
const BUNCH_CROSSING_WIDTH: u32 = 20;
const PAYLOAD_PARITY_OFFSET: u32 = 49;
const PAYLOAD_PARITY_WIDTH: u32 = 1;

/// The SAMPA packet-type taxonomy, carried in bits `[7,9]` of the header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SampaPacketType {
    HeartBeat = 0,
    DataTruncated = 1,
    Sync = 2,
    DataTruncatedTriggerTooEarly = 3,
    Data = 4,
    DataNumWords = 5,
    DataTriggerTooEarly = 6,
    DataTriggerTooEarlyNumWords = 7,
}

impl SampaPacketType {
    /// True for every packet type that carries sample/charge-sum data
    /// (as opposed to `Sync` and `HeartBeat`, which carry none).
    pub fn carries_data(self) -> bool {
        !matches!(self, SampaPacketType::Sync | SampaPacketType::HeartBeat)
    }
}

impl TryFrom<u8> for SampaPacketType {
    type Error = crate::error::MchRawError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SampaPacketType::HeartBeat),
            1 => Ok(SampaPacketType::DataTruncated),
            2 => Ok(SampaPacketType::Sync),
            3 => Ok(SampaPacketType::DataTruncatedTriggerTooEarly),
            4 => Ok(SampaPacketType::Data),
            5 => Ok(SampaPacketType::DataNumWords),
            6 => Ok(SampaPacketType::DataTriggerTooEarly),
            7 => Ok(SampaPacketType::DataTriggerTooEarlyNumWords),
            _ => bad_argument(format!("{value} is not a valid 3-bit SAMPA packet type")),
        }
    }
}

impl fmt::Display for SampaPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampaPacketType::HeartBeat => "HeartBeat",
            SampaPacketType::DataTruncated => "DataTruncated",
            SampaPacketType::Sync => "Sync",
            SampaPacketType::DataTruncatedTriggerTooEarly => "DataTruncatedTriggerTooEarly",
            SampaPacketType::Data => "Data",
            SampaPacketType::DataNumWords => "DataNumWords",
            SampaPacketType::DataTriggerTooEarly => "DataTriggerTooEarly",
            SampaPacketType::DataTriggerTooEarlyNumWords => "DataTriggerTooEarlyNumWords",
        };
        f.write_str(name)
    }
}

/// The 50-bit SAMPA packet header (see field layout table in the spec).
///
/// Equality is full 50-bit equality; ordering, when needed, is by
/// `bunch_crossing` alone.
#[derive(Copy, Clone, Eq)]
pub struct SampaHeader {
    value: u64,
}

impl SampaHeader {
    /// An all-zero header.
    pub fn new() -> Self {
        Self { value: 0 }
    }

    /// Builds a header from its raw 50-bit wire value (bits above 49 are
    /// masked off).
    pub fn from_u64(value: u64) -> Self {
        Self { value: value & ((1u64 << 50) - 1) }
    }

    /// The raw 50-bit wire value.
    pub fn uint64(&self) -> u64 {
        self.value
    }

    fn field(&self, offset: u32, width: u32) -> u64 {
        (self.value >> offset) & ((1u64 << width) - 1)
    }

    fn set_field(&mut self, offset: u32, width: u32, value: u64) -> Result<()> {
        if value >= (1u64 << width) {
            return bad_argument(format!("value {value} does not fit in {width} bits"));
        }
        let mask = ((1u64 << width) - 1) << offset;
        self.value = (self.value & !mask) | (value << offset);
        Ok(())
    }

    pub fn hamming_code(&self) -> u8 {
        self.field(HAMMING_CODE_OFFSET, HAMMING_CODE_WIDTH) as u8
    }

    pub fn set_hamming_code(&mut self, v: u8) -> Result<()> {
        self.set_field(HAMMING_CODE_OFFSET, HAMMING_CODE_WIDTH, v as u64)
    }

    pub fn header_parity(&self) -> u8 {
        self.field(HEADER_PARITY_OFFSET, HEADER_PARITY_WIDTH) as u8
    }

    pub fn set_header_parity(&mut self, v: u8) -> Result<()> {
        self.set_field(HEADER_PARITY_OFFSET, HEADER_PARITY_WIDTH, v as u64)
    }

    pub fn packet_type(&self) -> SampaPacketType {
        // The field is 3 bits wide, so every possible value (0..=7) is a
        // valid variant; the conversion cannot fail.
        SampaPacketType::try_from(self.field(PACKET_TYPE_OFFSET, PACKET_TYPE_WIDTH) as u8)
            .expect("3-bit field always maps to a valid packet type")
    }

    pub fn set_packet_type(&mut self, pt: SampaPacketType) -> Result<()> {
        self.set_field(PACKET_TYPE_OFFSET, PACKET_TYPE_WIDTH, pt as u64)
    }

    pub fn nof_10bit_words(&self) -> u16 {
        self.field(NOF_10BIT_WORDS_OFFSET, NOF_10BIT_WORDS_WIDTH) as u16
    }

    pub fn set_nof_10bit_words(&mut self, v: u16) -> Result<()> {
        self.set_field(NOF_10BIT_WORDS_OFFSET, NOF_10BIT_WORDS_WIDTH, v as u64)
    }

    pub fn chip_address(&self) -> u8 {
        self.field(CHIP_ADDRESS_OFFSET, CHIP_ADDRESS_WIDTH) as u8
    }

    pub fn set_chip_address(&mut self, v: u8) -> Result<()> {
        self.set_field(CHIP_ADDRESS_OFFSET, CHIP_ADDRESS_WIDTH, v as u64)
    }

    pub fn channel_address(&self) -> u8 {
        self.field(CHANNEL_ADDRESS_OFFSET, CHANNEL_ADDRESS_WIDTH) as u8
    }

    pub fn set_channel_address(&mut self, v: u8) -> Result<()> {
        self.set_field(CHANNEL_ADDRESS_OFFSET, CHANNEL_ADDRESS_WIDTH, v as u64)
    }

    pub fn bunch_crossing(&self) -> u32 {
        self.field(BUNCH_CROSSING_OFFSET, BUNCH_CROSSING_WIDTH) as u32
    }

    pub fn set_bunch_crossing(&mut self, v: u32) -> Result<()> {
        self.set_field(BUNCH_CROSSING_OFFSET, BUNCH_CROSSING_WIDTH, v as u64)
    }

    pub fn payload_parity(&self) -> u8 {
        self.field(PAYLOAD_PARITY_OFFSET, PAYLOAD_PARITY_WIDTH) as u8
    }

    pub fn set_payload_parity(&mut self, v: u8) -> Result<()> {
        self.set_field(PAYLOAD_PARITY_OFFSET, PAYLOAD_PARITY_WIDTH, v as u64)
    }

    /// Sets `hamming_code`/`header_parity` to the values this header's
    /// content should carry, per [`compute_hamming_code`] and
    /// [`compute_header_parity`].
    pub fn sign(&mut self) -> Result<()> {
        let hamming = compute_hamming_code(self.value);
        let parity = compute_header_parity(self.value);
        self.set_hamming_code(hamming)?;
        self.set_header_parity(parity)
    }

    pub fn has_hamming_error(&self) -> bool {
        compute_hamming_code(self.value) != self.hamming_code()
    }

    pub fn has_parity_error(&self) -> bool {
        compute_header_parity(self.value) != self.header_parity()
    }

    pub fn has_error(&self) -> bool {
        self.has_hamming_error() || self.has_parity_error()
    }

    /// True if the header matches the fixed heartbeat bit pattern (packet
    /// type bits zero, word-count bits zero, and the channel-address bits
    /// set to the fixed `10101` pattern).
    pub fn is_heartbeat(&self) -> bool {
        let zero_range = |lo: u32, hi: u32| (lo..=hi).all(|i| (self.value >> i) & 1 == 0);
        let bit = |i: u32| (self.value >> i) & 1 != 0;
        zero_range(7, 9)
            && zero_range(10, 19)
            && bit(24)
            && !bit(25)
            && bit(26)
            && !bit(27)
            && bit(28)
            && !bit(49)
    }

    /// The canonical SAMPA sync header.
    pub fn sync() -> Self {
        Self::from_u64(SYNC_VALUE)
    }

    /// A canonical heartbeat header for the given chip and bunch crossing.
    pub fn heartbeat(chip_address: u8, bunch_crossing: u32) -> Result<Self> {
        let mut h = Self::new();
        h.set_packet_type(SampaPacketType::HeartBeat)?;
        h.set_nof_10bit_words(0)?;
        h.set_chip_address(chip_address)?;
        h.set_channel_address(0b10101)?;
        h.set_bunch_crossing(bunch_crossing)?;
        h.sign()?;
        Ok(h)
    }
}

impl Default for SampaHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SampaHeader {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for SampaHeader {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SampaHeader {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bunch_crossing().cmp(&other.bunch_crossing())
    }
}

impl fmt::Debug for SampaHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampaHeader")
            .field("packet_type", &self.packet_type())
            .field("nof_10bit_words", &self.nof_10bit_words())
            .field("chip_address", &self.chip_address())
            .field("channel_address", &self.channel_address())
            .field("bunch_crossing", &self.bunch_crossing())
            .field("error", &self.has_error())
            .finish()
    }
}

/// The bit-position conversion table between a Hamming-sense position (1
/// through 49, parity bits interleaved) and the data-bit position within
/// the 50-bit header value. `-1` marks a parity-bit position, which never
/// contributes a data bit.
const HAMMING_POSITION_TO_DATA_BIT: [i32; 49] = [
    -1, -1, 7, -1, 8, 9, 10, -1, 11, 12, 13, 14, 15, 16, 17, -1, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31, 32, -1, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47,
    48, 49,
];

fn partial_odd_parity(value: u64, pos: u32) -> bool {
    let test = 1u64 << pos;
    let mut n = 0u32;
    for (i, &data_bit) in HAMMING_POSITION_TO_DATA_BIT.iter().enumerate() {
        if data_bit < 0 {
            continue;
        }
        let hamming_pos = (i as u64) + 1;
        if hamming_pos & test != 0 && (value >> data_bit) & 1 != 0 {
            n += 1;
        }
    }
    (n + 1) % 2 == 0
}

/// Computes the 6-bit Hamming code over the 43 data bits of a 50-bit SAMPA
/// header value (bits `[7,49]` excluding the payload-parity bit position,
/// per the layout in the spec).
pub fn compute_hamming_code(value: u64) -> u8 {
    let mut hamming = 0u8;
    for i in 0..6u32 {
        if partial_odd_parity(value, i) {
            hamming |= 1 << i;
        }
    }
    hamming
}

/// Computes the header-parity bit over all 50 bits of `value` except the
/// header-parity bit itself (bit 6).
pub fn compute_header_parity(value: u64) -> u8 {
    let mut n = 0u32;
    for i in 0..50u32 {
        if i == 6 {
            continue;
        }
        if (value >> i) & 1 != 0 {
            n += 1;
        }
    }
    u8::from((n + 1) % 2 == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_value_matches_constant() {
        assert_eq!(SampaHeader::sync().uint64(), 0x1555540F00113);
    }

    #[test]
    fn hamming_reference_vectors() {
        assert_eq!(compute_hamming_code(0x3722E80103208), 0x08);
        assert_eq!(compute_hamming_code(0x1722E9F00327D), 0x3D);
        assert_eq!(compute_hamming_code(0x1722E8090322F), 0x2F);
    }

    #[test]
    fn is_heartbeat_matches_bitmask() {
        let h = SampaHeader::heartbeat(0x3, 0xAAAA).unwrap();
        assert!(h.is_heartbeat());
        assert!(!SampaHeader::sync().is_heartbeat());
    }

    #[test]
    fn sign_round_trips_through_has_error() {
        let mut h = SampaHeader::new();
        h.set_packet_type(SampaPacketType::Data).unwrap();
        h.set_nof_10bit_words(22).unwrap();
        h.set_chip_address(1).unwrap();
        h.set_channel_address(7).unwrap();
        h.set_bunch_crossing(123456).unwrap();
        h.sign().unwrap();
        assert!(!h.has_error());
        assert_eq!(compute_hamming_code(h.uint64()), h.hamming_code());
    }

    #[test]
    fn field_setter_rejects_oversized_value() {
        let mut h = SampaHeader::new();
        assert!(h.set_chip_address(0x10).is_err());
        assert!(h.set_bunch_crossing(1 << 20).is_err());
    }

    #[test]
    fn equality_is_full_value_equality() {
        let a = SampaHeader::from_u64(0x1234);
        let b = SampaHeader::from_u64(0x1234);
        let c = SampaHeader::from_u64(0x1235);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ordering_is_by_bunch_crossing() {
        let mut a = SampaHeader::new();
        a.set_bunch_crossing(10).unwrap();
        let mut b = SampaHeader::new();
        b.set_bunch_crossing(20).unwrap();
        assert!(a < b);
    }
}
