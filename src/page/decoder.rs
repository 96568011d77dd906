// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The page decoder: walks a buffer of RDH-v4 pages, dispatches each
//! page's payload to the right GBT-mux decoder, and hands every decoded
//! cluster to a caller-supplied callback.

use std::collections::HashMap;

use crate::dispatch::{session_key, Dispatch, SessionKey};
use crate::elecmap::{fee_id_decode, DsElecId, ElectronicMapping, FeeLinkId, MissingMappingLog};
use crate::elink::LinkStatistics;
use crate::error::{bad_argument, rdh_invalid, Result};
use crate::gbt::{BareGbtDecoder, UserLogicGbtDecoder};
use crate::rdh::Rdh;

/// Decodes a buffer of consecutive RDH-v4 pages back into clusters.
///
/// One instance is meant to live for the duration of a decoding session
/// (spec §5: single-threaded, no concurrent calls on the same instance).
/// The format/mode for each `(cruId, linkId)` session it encounters is
/// fixed by the first valid RDH bearing that pair (spec §4.8); a later RDH
/// for the same session that contradicts it — including one that only
/// flips the `feeId & 0x100` charge-sum bit — fails the whole `decode`
/// call with `FormatMismatch`.
pub struct PageDecoder<'m> {
    config: crate::config::Config,
    map: &'m dyn ElectronicMapping,
    missing: MissingMappingLog,

    dispatch: HashMap<SessionKey, Dispatch>,
    bare: HashMap<SessionKey, BareGbtDecoder>,
    user_logic: HashMap<u8, UserLogicGbtDecoder>,

    last_heartbeat_orbit: HashMap<SessionKey, u32>,
    orbit_jump_counts: HashMap<SessionKey, u64>,
}

impl<'m> PageDecoder<'m> {
    pub fn new(map: &'m dyn ElectronicMapping, config: crate::config::Config) -> Self {
        Self {
            config,
            map,
            missing: MissingMappingLog::new(),
            dispatch: HashMap::new(),
            bare: HashMap::new(),
            user_logic: HashMap::new(),
            last_heartbeat_orbit: HashMap::new(),
            orbit_jump_counts: HashMap::new(),
        }
    }

    /// Walks `buffer` page by page (each page located by the previous
    /// one's `offsetToNext`), validating and dispatching every RDH and
    /// handing every decoded cluster to `on_cluster`.
    ///
    /// Stops and returns `Err` at the first invalid RDH or dispatch
    /// contradiction; the decoder instance remains usable for the next
    /// buffer (spec §7 `RdhInvalid` propagation policy).
    pub fn decode(
        &mut self,
        buffer: &[u8],
        on_cluster: &mut dyn FnMut(DsElecId, u8, crate::sampa::SampaCluster),
    ) -> Result<()> {
        let mut pos = 0usize;
        while pos + crate::rdh::RDH_SIZE <= buffer.len() {
            let rdh = match Rdh::from_bytes(&buffer[pos..], self.config.page_size()) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("invalid RDH at buffer offset {pos}: {e}");
                    return Err(e);
                }
            };
            let payload_len = (rdh.memory_size as usize).saturating_sub(crate::rdh::RDH_SIZE);
            let payload_start = pos + crate::rdh::RDH_SIZE;
            if payload_start + payload_len > buffer.len() {
                return rdh_invalid(format!(
                    "RDH at offset {pos} claims {payload_len} payload bytes past the buffer end"
                ));
            }
            let payload = &buffer[payload_start..payload_start + payload_len];
            self.process_page(&rdh, payload, on_cluster)?;

            if rdh.offset_to_next == 0 {
                break;
            }
            pos += rdh.offset_to_next as usize;
        }
        Ok(())
    }

    /// Per-link statistics for the e-link addressed by `ds`, if a session
    /// has been dispatched for it yet.
    pub fn statistics(&mut self, ds: DsElecId) -> Option<LinkStatistics> {
        let fee_link = self.missing.solar_to_fee_link(self.map, ds.solar_id())?;
        let cru_id = fee_id_decode(fee_link.fee_id()).0;
        let key = (cru_id, fee_link.link_in_fee());
        match self.dispatch.get(&key) {
            Some(d) if d.is_user_logic => {
                self.user_logic.get(&cru_id)?.link_statistics(fee_link.link_in_fee(), ds.elink_index())
            }
            Some(_) => self.bare.get(&key)?.link_statistics(ds.elink_index()),
            None => None,
        }
    }

    /// Number of orbit jumps (`|Δorbit| > 1`) observed on `(fee_id, link_id)`.
    pub fn orbit_jumps(&self, fee_id: u16, link_id: u8) -> u64 {
        let cru_id = fee_id_decode(fee_id).0;
        *self.orbit_jump_counts.get(&(cru_id, link_id)).unwrap_or(&0)
    }

    fn process_page(
        &mut self,
        rdh: &Rdh,
        payload: &[u8],
        on_cluster: &mut dyn FnMut(DsElecId, u8, crate::sampa::SampaCluster),
    ) -> Result<()> {
        let key = session_key(rdh);
        match self.dispatch.get(&key) {
            Some(d) => d.check(rdh)?,
            None => {
                let d = Dispatch::from_rdh(rdh);
                log::debug!(
                    "dispatch for fee_id={} link_id={}: user_logic={} charge_sum={}",
                    rdh.fee_id,
                    rdh.link_id,
                    d.is_user_logic,
                    d.charge_sum_mode
                );
                self.dispatch.insert(key, d);
            }
        }

        self.detect_orbit_jump(key, rdh.heartbeat_orbit);

        if payload.is_empty() {
            return Ok(());
        }

        let dispatch = *self.dispatch.get(&key).unwrap();
        if dispatch.is_user_logic {
            self.process_user_logic_page(rdh, payload, dispatch.charge_sum_mode, on_cluster)
        } else {
            self.process_bare_page(rdh, payload, dispatch.charge_sum_mode, on_cluster)
        }
    }

    fn detect_orbit_jump(&mut self, key: SessionKey, orbit: u32) {
        if let Some(&prev) = self.last_heartbeat_orbit.get(&key) {
            let delta = (orbit as i64 - prev as i64).abs();
            if delta > 1 {
                *self.orbit_jump_counts.entry(key).or_insert(0) += 1;
                log::warn!(
                    "orbit jump on cru_id={} link_id={}: {prev} -> {orbit}",
                    key.0,
                    key.1
                );
                if let Some(dec) = self.user_logic.get_mut(&key.0) {
                    dec.reset_all();
                }
                if let Some(dec) = self.bare.get_mut(&key) {
                    dec.reset_all();
                }
            }
        }
        self.last_heartbeat_orbit.insert(key, orbit);
    }

    fn process_bare_page(
        &mut self,
        rdh: &Rdh,
        payload: &[u8],
        charge_sum_mode: bool,
        on_cluster: &mut dyn FnMut(DsElecId, u8, crate::sampa::SampaCluster),
    ) -> Result<()> {
        let key = session_key(rdh);
        let fee_link = FeeLinkId::new(rdh.fee_id, rdh.link_id)?;
        let solar_id = match self.missing.fee_link_to_solar(self.map, fee_link) {
            Some(s) => s,
            None => return Ok(()),
        };
        if !self.bare.contains_key(&key) {
            self.bare.insert(key, BareGbtDecoder::new(solar_id, charge_sum_mode)?);
        }
        let clusters = self.bare.get_mut(&key).unwrap().append(payload)?;
        for (elink_index, decoded) in clusters {
            let ds = DsElecId::from_flat_index(solar_id, elink_index)?;
            on_cluster(ds, decoded.channel_address, decoded.cluster);
        }
        Ok(())
    }

    fn process_user_logic_page(
        &mut self,
        rdh: &Rdh,
        payload: &[u8],
        charge_sum_mode: bool,
        on_cluster: &mut dyn FnMut(DsElecId, u8, crate::sampa::SampaCluster),
    ) -> Result<()> {
        if payload.len() % 8 != 0 {
            return bad_argument(format!(
                "UserLogic payload length {} is not a multiple of 8",
                payload.len()
            ));
        }
        let cru_id = fee_id_decode(rdh.fee_id).0;
        if !self.user_logic.contains_key(&cru_id) {
            self.user_logic.insert(cru_id, UserLogicGbtDecoder::new(charge_sum_mode));
        }
        let words: Vec<u64> =
            payload.chunks_exact(8).map(|c| u64::from_le_bytes(c.try_into().unwrap())).collect();
        let clusters = self.user_logic.get_mut(&cru_id).unwrap().append_words(&words)?;
        for ((link_in_fee, elink_index), decoded) in clusters {
            let fee_link = FeeLinkId::new(rdh.fee_id, link_in_fee)?;
            let solar_id = match self.missing.fee_link_to_solar(self.map, fee_link) {
                Some(s) => s,
                None => continue,
            };
            let ds = DsElecId::from_flat_index(solar_id, elink_index)?;
            on_cluster(ds, decoded.channel_address, decoded.cluster);
        }
        Ok(())
    }
}
