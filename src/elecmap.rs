// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Electronic addresses and the boundary towards the (externally
//! supplied) electronic-to-detector mapping.
//!
//! Everything in this module is pure and read-only from the core's point
//! of view: the actual mapping tables are owned by the embedding, never
//! by this crate (see spec §1 Non-goals).

use std::collections::HashSet;
use std::fmt;

use crate::error::{bad_argument, Result};

/// The electronic address of one e-link: a SOLAR board, the group of 5
/// e-links it belongs to on that board, and its index within the group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DsElecId {
    solar_id: u16,
    elink_group: u8,
    elink_index_in_group: u8,
}

impl DsElecId {
    /// Builds a `DsElecId`, validating `elink_group in [0,7]` and
    /// `elink_index_in_group in [0,4]`.
    pub fn new(solar_id: u16, elink_group: u8, elink_index_in_group: u8) -> Result<Self> {
        if elink_group > 7 {
            return bad_argument(format!("elink group {elink_group} is out of range [0,7]"));
        }
        if elink_index_in_group > 4 {
            return bad_argument(format!(
                "elink index in group {elink_index_in_group} is out of range [0,4]"
            ));
        }
        Ok(Self { solar_id, elink_group, elink_index_in_group })
    }

    pub fn solar_id(&self) -> u16 {
        self.solar_id
    }

    pub fn elink_group(&self) -> u8 {
        self.elink_group
    }

    pub fn elink_index_in_group(&self) -> u8 {
        self.elink_index_in_group
    }

    /// The flat e-link index within the SOLAR, in `[0,39]`.
    pub fn elink_index(&self) -> u8 {
        self.elink_group * 5 + self.elink_index_in_group
    }

    /// Builds a `DsElecId` from a SOLAR id and a flat e-link index in
    /// `[0,39]`.
    pub fn from_flat_index(solar_id: u16, elink_index: u8) -> Result<Self> {
        if elink_index > 39 {
            return bad_argument(format!("elink index {elink_index} is out of range [0,39]"));
        }
        Self::new(solar_id, elink_index / 5, elink_index % 5)
    }
}

impl fmt::Display for DsElecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}-J{}-DS{}", self.solar_id, self.elink_group, self.elink_index_in_group)
    }
}

/// Identifies a link within a CRU endpoint: `feeId = 2 * cruId + endpoint`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FeeLinkId {
    fee_id: u16,
    link_in_fee: u8,
}

impl FeeLinkId {
    /// Builds a `FeeLinkId`, validating `link_in_fee in [0,11]`.
    pub fn new(fee_id: u16, link_in_fee: u8) -> Result<Self> {
        if link_in_fee > 11 {
            return bad_argument(format!("link-in-fee {link_in_fee} is out of range [0,11]"));
        }
        Ok(Self { fee_id, link_in_fee })
    }

    pub fn fee_id(&self) -> u16 {
        self.fee_id
    }

    pub fn link_in_fee(&self) -> u8 {
        self.link_in_fee
    }
}

/// Decodes the two tokens packed into a `feeId`, per spec §3.5:
/// `cruId = feeId & 0xFF`, `chargeSumMode = (feeId & 0x100) != 0`.
pub fn fee_id_decode(fee_id: u16) -> (u8, bool) {
    ((fee_id & 0xFF) as u8, fee_id & 0x100 != 0)
}

/// The electronic-to-detector mapping boundary: a pair of pure, read-only
/// functions supplied by the embedding. Missing mappings are a
/// configuration error, not a data error, and the core never invents or
/// caches its own mapping tables.
pub trait ElectronicMapping {
    /// Resolves the SOLAR id multiplexed onto a given CRU link, if known.
    fn fee_link_to_solar(&self, fee_link: FeeLinkId) -> Option<u16>;

    /// The inverse of [`fee_link_to_solar`](Self::fee_link_to_solar):
    /// resolves which CRU link a given SOLAR is multiplexed onto, if
    /// known. Consulted by the page encoder, which is handed a
    /// `DsElecId` and must find the `feeId`/`linkInFee` pair to frame it
    /// under.
    fn solar_to_fee_link(&self, solar_id: u16) -> Option<FeeLinkId>;

    /// Resolves the `(detElemId, dualSampaId)` pair addressed by a given
    /// electronic id, if known.
    fn elec_to_det(&self, ds: DsElecId) -> Option<(u32, u32)>;
}

/// Wraps calls through an [`ElectronicMapping`] so that a given missing
/// key is logged once, not once per call — the lookups happen at every
/// block/page boundary and a by-call warning would flood the log for a
/// link that is simply absent from the mapping table.
#[derive(Default)]
pub struct MissingMappingLog {
    warned_fee_links: HashSet<FeeLinkId>,
    warned_solars: HashSet<u16>,
    warned_ds: HashSet<DsElecId>,
}

impl MissingMappingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `fee_link` through `map`, logging a warning the first time
    /// this particular key fails to resolve.
    pub fn fee_link_to_solar(
        &mut self,
        map: &dyn ElectronicMapping,
        fee_link: FeeLinkId,
    ) -> Option<u16> {
        let resolved = map.fee_link_to_solar(fee_link);
        if resolved.is_none() && self.warned_fee_links.insert(fee_link) {
            log::warn!(
                "no SOLAR mapped to fee_id={} link_in_fee={}",
                fee_link.fee_id(),
                fee_link.link_in_fee()
            );
        }
        resolved
    }

    /// Resolves `solar_id` through `map`, logging a warning the first
    /// time this particular key fails to resolve.
    pub fn solar_to_fee_link(
        &mut self,
        map: &dyn ElectronicMapping,
        solar_id: u16,
    ) -> Option<FeeLinkId> {
        let resolved = map.solar_to_fee_link(solar_id);
        if resolved.is_none() && self.warned_solars.insert(solar_id) {
            log::warn!("no fee/link mapped to solar_id={solar_id}");
        }
        resolved
    }

    /// Resolves `ds` through `map`, logging a warning the first time this
    /// particular key fails to resolve.
    pub fn elec_to_det(&mut self, map: &dyn ElectronicMapping, ds: DsElecId) -> Option<(u32, u32)> {
        let resolved = map.elec_to_det(ds);
        if resolved.is_none() && self.warned_ds.insert(ds) {
            log::warn!("no detector element mapped to electronic id {ds}");
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_index_round_trips() {
        let ds = DsElecId::new(42, 3, 2).unwrap();
        assert_eq!(ds.elink_index(), 17);
        let back = DsElecId::from_flat_index(42, 17).unwrap();
        assert_eq!(ds, back);
    }

    #[test]
    fn rejects_out_of_range_group_and_index() {
        assert!(DsElecId::new(0, 8, 0).is_err());
        assert!(DsElecId::new(0, 0, 5).is_err());
        assert!(DsElecId::from_flat_index(0, 40).is_err());
    }

    #[test]
    fn fee_link_rejects_out_of_range() {
        assert!(FeeLinkId::new(0, 12).is_err());
        assert!(FeeLinkId::new(0, 11).is_ok());
    }

    #[test]
    fn fee_id_decode_splits_cru_and_mode() {
        assert_eq!(fee_id_decode(0x0A), (0x0A, false));
        assert_eq!(fee_id_decode(0x10A), (0x0A, true));
    }

    #[test]
    fn display_matches_expected_format() {
        let ds = DsElecId::new(0, 0, 2).unwrap();
        assert_eq!(format!("{ds}"), "S0-J0-DS2");
    }

    struct EmptyMap;
    impl ElectronicMapping for EmptyMap {
        fn fee_link_to_solar(&self, _: FeeLinkId) -> Option<u16> {
            None
        }
        fn solar_to_fee_link(&self, _: u16) -> Option<FeeLinkId> {
            None
        }
        fn elec_to_det(&self, _: DsElecId) -> Option<(u32, u32)> {
            None
        }
    }

    struct OneLinkMap;
    impl ElectronicMapping for OneLinkMap {
        fn fee_link_to_solar(&self, fee_link: FeeLinkId) -> Option<u16> {
            if fee_link == FeeLinkId::new(968, 3).unwrap() {
                Some(42)
            } else {
                None
            }
        }
        fn solar_to_fee_link(&self, solar_id: u16) -> Option<FeeLinkId> {
            if solar_id == 42 {
                Some(FeeLinkId::new(968, 3).unwrap())
            } else {
                None
            }
        }
        fn elec_to_det(&self, _: DsElecId) -> Option<(u32, u32)> {
            None
        }
    }

    #[test]
    fn solar_to_fee_link_is_the_inverse_of_fee_link_to_solar() {
        let map = OneLinkMap;
        let solar_id = map.fee_link_to_solar(FeeLinkId::new(968, 3).unwrap()).unwrap();
        let back = map.solar_to_fee_link(solar_id).unwrap();
        assert_eq!(back, FeeLinkId::new(968, 3).unwrap());
    }

    #[test]
    fn missing_mapping_log_does_not_panic_on_repeated_lookups() {
        let mut log = MissingMappingLog::new();
        let map = EmptyMap;
        let fl = FeeLinkId::new(1, 2).unwrap();
        assert!(log.fee_link_to_solar(&map, fl).is_none());
        assert!(log.fee_link_to_solar(&map, fl).is_none());
    }
}
