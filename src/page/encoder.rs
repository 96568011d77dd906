// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The page encoder: aggregates channel data per `(feeId, linkInFee)`
//! (Bare) or per `feeId` (UserLogic, which multiplexes several links
//! into one tagged word stream) and frames each heartbeat's output as
//! RDH-v4 pages.

use std::collections::HashMap;

use crate::config::Config;
use crate::elecmap::{fee_id_decode, DsElecId, ElectronicMapping, FeeLinkId, MissingMappingLog};
use crate::error::{bad_argument, missing_mapping, Result};
use crate::gbt::{BareGbtEncoder, UserLogicGbtEncoder};
use crate::rdh::{Rdh, TriggerType, RDH_SIZE};
use crate::sampa::cluster::SampaCluster;

/// Which on-wire format a [`PageEncoder`] produces. Fixed for the
/// lifetime of the encoder — unlike the decoder, which discovers it from
/// the RDH, the encoder is told what to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bare,
    UserLogic,
}

/// Encodes channel data into RDH-v4-paged byte buffers.
///
/// Usage, per spec §6.2: call [`add_channel_data`](Self::add_channel_data)
/// any number of times, then [`start_heartbeat_frame`](Self::start_heartbeat_frame)
/// to align and frame everything accumulated so far, then
/// [`move_to_buffer`](Self::move_to_buffer) to drain the framed bytes out.
pub struct PageEncoder<'m> {
    format: Format,
    config: Config,
    map: &'m dyn ElectronicMapping,
    missing: MissingMappingLog,

    bare: HashMap<(u16, u8), BareGbtEncoder>,
    user_logic: HashMap<u16, UserLogicGbtEncoder>,

    packet_counters: HashMap<u16, u8>,
    pending: Vec<u8>,
    time_frame_open: bool,
}

impl<'m> PageEncoder<'m> {
    pub fn new(format: Format, config: Config, map: &'m dyn ElectronicMapping) -> Self {
        Self {
            format,
            config,
            map,
            missing: MissingMappingLog::new(),
            bare: HashMap::new(),
            user_logic: HashMap::new(),
            packet_counters: HashMap::new(),
            pending: Vec::new(),
            time_frame_open: true,
        }
    }

    /// Routes `clusters` to the e-link addressed by `ds`, on SAMPA
    /// channel `channel`. Resolves `ds`'s `feeId`/`linkInFee` through the
    /// electronic map, lazily creating the GBT-mux encoder for that
    /// session on first use.
    ///
    /// Fails with `BadArgument` if `clusters` is empty, or
    /// `MissingMapping` if `ds`'s SOLAR has no known `feeId`/`linkInFee`.
    pub fn add_channel_data(
        &mut self,
        ds: DsElecId,
        channel: u8,
        clusters: &[SampaCluster],
    ) -> Result<()> {
        if clusters.is_empty() {
            return bad_argument("add_channel_data requires a non-empty cluster slice");
        }
        let fee_link = match self.missing.solar_to_fee_link(self.map, ds.solar_id()) {
            Some(fl) => fl,
            None => {
                return missing_mapping(format!(
                    "no fee/link mapped to solar_id={}",
                    ds.solar_id()
                ))
            }
        };

        match self.format {
            Format::Bare => {
                let key = (fee_link.fee_id(), fee_link.link_in_fee());
                if !self.bare.contains_key(&key) {
                    let enc = BareGbtEncoder::new(
                        ds.solar_id(),
                        self.config.charge_sum_mode(),
                        self.config.force_no_phase(),
                    )?;
                    self.bare.insert(key, enc);
                }
                self.bare.get_mut(&key).unwrap().add_channel_data(
                    ds.elink_index(),
                    channel,
                    clusters,
                )
            }
            Format::UserLogic => {
                let fee_id = fee_link.fee_id();
                if !self.user_logic.contains_key(&fee_id) {
                    self.user_logic
                        .insert(fee_id, UserLogicGbtEncoder::new(self.config.charge_sum_mode()));
                }
                let chip_address = ds.elink_index() % 16;
                self.user_logic.get_mut(&fee_id).unwrap().add_channel_data(
                    fee_link.link_in_fee(),
                    ds.elink_index(),
                    chip_address,
                    channel,
                    clusters,
                )
            }
        }
    }

    /// Aligns every registered e-link to a common length, drains its
    /// accumulated payload, and frames it as RDH-v4 pages for
    /// `(orbit, bc)`, appending the result to the internal pending
    /// buffer. Sessions with nothing to send this heartbeat still get a
    /// single stop-only page, satisfying the "every registered feeId has
    /// a record at every heartbeat" invariant (spec §8).
    ///
    /// The time-frame bit is set on every page belonging to the first
    /// heartbeat frame this encoder ever emits.
    pub fn start_heartbeat_frame(&mut self, orbit: u32, bc: u16) -> Result<()> {
        let set_tf = self.time_frame_open;
        self.time_frame_open = false;

        let bare_keys: Vec<(u16, u8)> = self.bare.keys().copied().collect();
        for key in bare_keys {
            let mut payload = Vec::new();
            self.bare.get_mut(&key).unwrap().drain_to_bytes(&mut payload)?;
            self.emit_block(key.0, key.1, orbit, bc, set_tf, &payload);
        }

        let ul_keys: Vec<u16> = self.user_logic.keys().copied().collect();
        for fee_id in ul_keys {
            let mut words = Vec::new();
            self.user_logic.get_mut(&fee_id).unwrap().drain_to_words(&mut words);
            let mut payload = Vec::with_capacity(words.len() * 8);
            for w in words {
                payload.extend_from_slice(&w.to_le_bytes());
            }
            self.emit_block(fee_id, 15, orbit, bc, set_tf, &payload);
        }

        Ok(())
    }

    /// Moves every byte framed so far into `out`, clearing the internal
    /// buffer. Returns the number of bytes moved.
    pub fn move_to_buffer(&mut self, out: &mut Vec<u8>) -> usize {
        let n = self.pending.len();
        out.extend_from_slice(&self.pending);
        self.pending.clear();
        n
    }

    fn emit_block(&mut self, fee_id: u16, link_id: u8, orbit: u32, bc: u16, set_tf: bool, payload: &[u8]) {
        let (cru_id, _charge_sum_mode) = fee_id_decode(fee_id);
        let mut template = Rdh::new();
        template.fee_id = fee_id;
        template.link_id = link_id;
        template.cru_id = cru_id as u16;
        template.trigger_orbit = orbit;
        template.heartbeat_orbit = orbit;
        template.trigger_bc = bc;
        template.heartbeat_bc = bc;
        template.trigger_type = if set_tf { TriggerType::HB | TriggerType::TF } else { TriggerType::HB };

        let page_size = self.config.page_size();
        let padding_byte = self.config.padding_byte();
        let counter = self.packet_counters.entry(fee_id).or_insert(0);

        for (mut rdh, chunk) in split_into_pages(&template, payload, page_size) {
            rdh.packet_counter = *counter;
            *counter = counter.wrapping_add(1);
            self.pending.extend_from_slice(&rdh.to_bytes());
            self.pending.extend_from_slice(&chunk);
            let written = RDH_SIZE + chunk.len();
            if written < page_size {
                self.pending.resize(self.pending.len() + (page_size - written), padding_byte);
            }
        }
    }
}

/// Splits `payload` into `ceil(payload.len() / (page_size - RDH_SIZE))`
/// data pages followed by one empty stop page, per spec §4.7/§8
/// scenario 7. An empty `payload` produces zero data pages and just the
/// stop page.
fn split_into_pages(template: &Rdh, payload: &[u8], page_size: usize) -> Vec<(Rdh, Vec<u8>)> {
    let capacity = page_size - RDH_SIZE;
    let nof_data_pages = payload.len().div_ceil(capacity.max(1));
    let nof_data_pages = if payload.is_empty() { 0 } else { nof_data_pages };

    let mut pages = Vec::with_capacity(nof_data_pages + 1);
    for i in 0..nof_data_pages {
        let start = i * capacity;
        let end = (start + capacity).min(payload.len());
        let mut rdh = *template;
        rdh.memory_size = (RDH_SIZE + (end - start)) as u16;
        rdh.offset_to_next = page_size as u16;
        rdh.page_counter = i as u16;
        rdh.stop_bit = 0;
        pages.push((rdh, payload[start..end].to_vec()));
    }

    let mut stop = *template;
    stop.memory_size = RDH_SIZE as u16;
    stop.offset_to_next = page_size as u16;
    stop.page_counter = nof_data_pages as u16;
    stop.stop_bit = 1;
    pages.push((stop, Vec::new()));

    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elecmap::DsElecId;

    struct OneLinkMap;
    impl ElectronicMapping for OneLinkMap {
        fn fee_link_to_solar(&self, fee_link: FeeLinkId) -> Option<u16> {
            if fee_link == FeeLinkId::new(968, 3).unwrap() { Some(0) } else { None }
        }
        fn solar_to_fee_link(&self, solar_id: u16) -> Option<FeeLinkId> {
            if solar_id == 0 { Some(FeeLinkId::new(968, 3).unwrap()) } else { None }
        }
        fn elec_to_det(&self, _: DsElecId) -> Option<(u32, u32)> {
            None
        }
    }

    #[test]
    fn split_into_pages_matches_scenario_seven() {
        let mut template = Rdh::new();
        template.fee_id = 968;
        let payload = vec![0xAAu8; 16];
        let pages = split_into_pages(&template, &payload, 128);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].0.memory_size, 80);
        assert_eq!(pages[0].0.page_counter, 0);
        assert_eq!(pages[0].0.stop_bit, 0);
        assert_eq!(pages[1].0.memory_size, 64);
        assert_eq!(pages[1].0.page_counter, 1);
        assert_eq!(pages[1].0.stop_bit, 1);
    }

    #[test]
    fn split_into_pages_handles_empty_payload() {
        let template = Rdh::new();
        let pages = split_into_pages(&template, &[], 128);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].0.page_counter, 0);
        assert_eq!(pages[0].0.stop_bit, 1);
    }

    #[test]
    fn exact_capacity_payload_produces_one_data_page_and_one_stop_page() {
        let template = Rdh::new();
        let payload = vec![0u8; 128 - RDH_SIZE];
        let pages = split_into_pages(&template, &payload, 128);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].0.stop_bit, 0);
        assert_eq!(pages[1].0.stop_bit, 1);
    }

    #[test]
    fn end_to_end_heartbeat_frame_produces_padded_fixed_size_pages() {
        let map = OneLinkMap;
        let mut config = Config::new();
        config.with_page_size(128).with_padding_byte(0x00).with_force_no_phase(true);
        let mut enc = PageEncoder::new(Format::Bare, config, &map);

        let ds = DsElecId::new(0, 0, 2).unwrap();
        let cluster = SampaCluster::sample(345, 0, vec![123, 456]).unwrap();
        enc.add_channel_data(ds, 29, std::slice::from_ref(&cluster)).unwrap();
        enc.start_heartbeat_frame(0, 0).unwrap();

        let mut buf = Vec::new();
        let n = enc.move_to_buffer(&mut buf);
        assert_eq!(n, buf.len());
        assert_eq!(n % 128, 0);

        let first = Rdh::from_bytes(&buf, 128).unwrap();
        assert_eq!(first.fee_id, 968);
        assert_eq!(first.link_id, 3);
        assert!(first.trigger_type.contains(TriggerType::HB));
    }

    #[test]
    fn add_channel_data_rejects_empty_slice() {
        let map = OneLinkMap;
        let enc_config = Config::new();
        let mut enc = PageEncoder::new(Format::Bare, enc_config, &map);
        let ds = DsElecId::new(0, 0, 2).unwrap();
        assert!(enc.add_channel_data(ds, 63, &[]).is_err());
    }

    #[test]
    fn add_channel_data_reports_missing_mapping() {
        let map = OneLinkMap;
        let enc_config = Config::new();
        let mut enc = PageEncoder::new(Format::Bare, enc_config, &map);
        let ds = DsElecId::new(99, 0, 0).unwrap();
        let cluster = SampaCluster::sample(1, 0, vec![1]).unwrap();
        assert!(enc.add_channel_data(ds, 0, std::slice::from_ref(&cluster)).is_err());
    }
}
