// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The 64-byte RDH v4 (Raw Data Header), little-endian on the wire.
//!
//! Field layout and semantics per spec §3.4/§6.1. `triggerType` and
//! `detectorField` are bit flags rather than opaque integers; both are
//! modeled with [`bitflags`] the way the teacher models its own
//! bit-packed header flags.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{rdh_invalid, Result};

/// Size in bytes of one RDH v4, fixed for the whole crate.
pub const RDH_SIZE: usize = 64;

/// Fixed RDH version this crate reads and writes (spec §1 Non-goals:
/// other RDH versions are out of scope).
pub const RDH_VERSION: u8 = 4;

bitflags::bitflags! {
    /// Bits of the RDH `triggerType` field this crate sets or inspects.
    /// Bit positions per the ALICE RDH v4 `triggerType` convention; only
    /// the two bits this codec ever touches (heartbeat, time-frame) are
    /// named, the rest pass through untouched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TriggerType: u32 {
        /// Set on every RDH belonging to a heartbeat-frame boundary.
        const HB = 1 << 3;
        /// Set on the first RDH of a time-frame.
        const TF = 1 << 4;
    }
}

/// The 64-byte RDH v4 wire header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rdh {
    pub version: u8,
    pub header_size: u8,
    pub block_length: u16,
    pub fee_id: u16,
    pub priority_bit: u8,
    pub offset_to_next: u16,
    pub memory_size: u16,
    pub link_id: u8,
    pub packet_counter: u8,
    pub cru_id: u16,
    pub endpoint: u8,
    pub trigger_orbit: u32,
    pub heartbeat_orbit: u32,
    pub trigger_bc: u16,
    pub heartbeat_bc: u16,
    pub trigger_type: TriggerType,
    pub detector_field: u16,
    pub par: u16,
    pub stop_bit: u8,
    pub page_counter: u16,
}

impl Rdh {
    /// Builds an all-default RDH with `version`/`header_size` already set
    /// to the fixed values this crate produces.
    pub fn new() -> Self {
        Self {
            version: RDH_VERSION,
            header_size: RDH_SIZE as u8,
            block_length: 0,
            fee_id: 0,
            priority_bit: 0,
            offset_to_next: 0,
            memory_size: 0,
            link_id: 0,
            packet_counter: 0,
            cru_id: 0,
            endpoint: 0,
            trigger_orbit: 0,
            heartbeat_orbit: 0,
            trigger_bc: 0,
            heartbeat_bc: 0,
            trigger_type: TriggerType::empty(),
            detector_field: 0,
            par: 0,
            stop_bit: 0,
            page_counter: 0,
        }
    }

    /// `linkId == 15` denotes UserLogic format; every other value is Bare.
    pub fn is_user_logic(&self) -> bool {
        self.link_id == 15
    }

    /// `(orbit, bc)` this RDH's heartbeat belongs to.
    pub fn heartbeat_ir(&self) -> (u32, u16) {
        (self.heartbeat_orbit, self.heartbeat_bc)
    }

    /// Serializes this RDH to exactly [`RDH_SIZE`] little-endian bytes.
    pub fn to_bytes(&self) -> [u8; RDH_SIZE] {
        let mut b = [0u8; RDH_SIZE];
        b[0] = self.version;
        b[1] = self.header_size;
        LittleEndian::write_u16(&mut b[2..4], self.block_length);
        LittleEndian::write_u16(&mut b[4..6], self.fee_id);
        b[6] = self.priority_bit;
        b[7] = 0; // reserved
        LittleEndian::write_u16(&mut b[8..10], self.offset_to_next);
        LittleEndian::write_u16(&mut b[10..12], self.memory_size);
        b[12] = self.link_id;
        b[13] = self.packet_counter;
        let cru_endpoint = (self.cru_id & 0x0FFF) | ((self.endpoint as u16 & 0xF) << 12);
        LittleEndian::write_u16(&mut b[14..16], cru_endpoint);
        LittleEndian::write_u32(&mut b[16..20], self.trigger_orbit);
        LittleEndian::write_u32(&mut b[20..24], self.heartbeat_orbit);
        // b[24..32] reserved
        let trigger_bc = self.trigger_bc & 0x0FFF;
        LittleEndian::write_u16(&mut b[32..34], trigger_bc);
        let heartbeat_bc = self.heartbeat_bc & 0x0FFF;
        LittleEndian::write_u16(&mut b[34..36], heartbeat_bc);
        LittleEndian::write_u32(&mut b[36..40], self.trigger_type.bits());
        // b[40..48] reserved
        LittleEndian::write_u16(&mut b[48..50], self.detector_field);
        LittleEndian::write_u16(&mut b[50..52], self.par);
        b[52] = self.stop_bit;
        LittleEndian::write_u16(&mut b[53..55], self.page_counter);
        // b[55..64] reserved
        b
    }

    /// Parses an RDH from a 64-byte little-endian span, validating
    /// `version`, `headerSize` and `memorySize <= page_size`.
    ///
    /// Fails with [`RdhInvalid`](crate::error::MchRawError::RdhInvalid) if
    /// any of those checks does not hold. The caller is responsible for
    /// slicing a well-formed 64-byte window before calling this.
    pub fn from_bytes(b: &[u8], page_size: usize) -> Result<Self> {
        if b.len() < RDH_SIZE {
            return rdh_invalid(format!("buffer too short for an RDH ({} bytes)", b.len()));
        }
        let version = b[0];
        let header_size = b[1];
        if version != RDH_VERSION {
            return rdh_invalid(format!("unsupported RDH version {version}"));
        }
        if header_size as usize != RDH_SIZE {
            return rdh_invalid(format!("unexpected RDH header size {header_size}"));
        }
        let cru_endpoint = LittleEndian::read_u16(&b[14..16]);
        let memory_size = LittleEndian::read_u16(&b[10..12]);
        if memory_size as usize > page_size {
            return rdh_invalid(format!(
                "memorySize {memory_size} exceeds page size {page_size}"
            ));
        }
        Ok(Self {
            version,
            header_size,
            block_length: LittleEndian::read_u16(&b[2..4]),
            fee_id: LittleEndian::read_u16(&b[4..6]),
            priority_bit: b[6],
            offset_to_next: LittleEndian::read_u16(&b[8..10]),
            memory_size,
            link_id: b[12],
            packet_counter: b[13],
            cru_id: cru_endpoint & 0x0FFF,
            endpoint: ((cru_endpoint >> 12) & 0xF) as u8,
            trigger_orbit: LittleEndian::read_u32(&b[16..20]),
            heartbeat_orbit: LittleEndian::read_u32(&b[20..24]),
            trigger_bc: LittleEndian::read_u16(&b[32..34]) & 0x0FFF,
            heartbeat_bc: LittleEndian::read_u16(&b[34..36]) & 0x0FFF,
            trigger_type: TriggerType::from_bits_truncate(LittleEndian::read_u32(&b[36..40])),
            detector_field: LittleEndian::read_u16(&b[48..50]),
            par: LittleEndian::read_u16(&b[50..52]),
            stop_bit: b[52],
            page_counter: LittleEndian::read_u16(&b[53..55]),
        })
    }
}

impl Default for Rdh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rdh() -> Rdh {
        let mut rdh = Rdh::new();
        rdh.fee_id = 968;
        rdh.link_id = 3;
        rdh.cru_id = 42;
        rdh.endpoint = 1;
        rdh.trigger_orbit = 12345;
        rdh.heartbeat_orbit = 12345;
        rdh.trigger_bc = 100;
        rdh.heartbeat_bc = 100;
        rdh.memory_size = 80;
        rdh.offset_to_next = 128;
        rdh.page_counter = 2;
        rdh.trigger_type = TriggerType::HB | TriggerType::TF;
        rdh
    }

    #[test]
    fn round_trips_through_bytes() {
        let rdh = sample_rdh();
        let bytes = rdh.to_bytes();
        assert_eq!(bytes.len(), RDH_SIZE);
        let back = Rdh::from_bytes(&bytes, 8192).unwrap();
        assert_eq!(rdh, back);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut bytes = sample_rdh().to_bytes();
        bytes[0] = 3;
        assert!(Rdh::from_bytes(&bytes, 8192).is_err());
    }

    #[test]
    fn rejects_memory_size_over_page_size() {
        let bytes = sample_rdh().to_bytes();
        assert!(Rdh::from_bytes(&bytes, 16).is_err());
    }

    #[test]
    fn is_user_logic_detects_link_15() {
        let mut rdh = sample_rdh();
        assert!(!rdh.is_user_logic());
        rdh.link_id = 15;
        assert!(rdh.is_user_logic());
    }

    #[test]
    fn rejects_buffer_too_short() {
        let bytes = [0u8; 10];
        assert!(Rdh::from_bytes(&bytes, 8192).is_err());
    }
}
