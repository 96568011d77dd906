// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Bare on-wire format: one serial bitstream per e-link, fed two bits
//! at a time (the width of one e-link's slot within a GBT word).

use crate::elink::{DecodedCluster, LinkStatistics};
use crate::error::{bad_argument, Result};
use crate::sampa::cluster::SampaCluster;
use crate::sampa::header::{
    compute_hamming_code, compute_header_parity, SampaHeader, SampaPacketType, SYNC_VALUE,
};

const HEADER_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LookingForSync,
    LookingForHeader,
    ReadingNofSamples,
    ReadingTimestamp,
    ReadingSample,
    ReadingClusterSum,
}

/// Decodes one Bare-format e-link's bitstream into a sequence of
/// [`DecodedCluster`]s, fed two bits at a time as they arrive off the GBT.
pub struct BareElinkDecoder {
    link_id: u8,
    charge_sum_mode: bool,

    header: SampaHeader,
    state: State,
    bit_buffer: u64,
    mask: u64,
    checkpoint: u64,

    nof10_bit_words_to_read: u16,
    nof_samples: u16,
    timestamp: u16,
    samples: Vec<u16>,

    stats: LinkStatistics,
}

impl BareElinkDecoder {
    /// Builds a decoder for e-link `link_id` (`0..=39`).
    pub fn new(link_id: u8, charge_sum_mode: bool) -> Result<Self> {
        if link_id > 39 {
            return bad_argument(format!("link id {link_id} is out of range [0,39]"));
        }
        Ok(Self {
            link_id,
            charge_sum_mode,
            header: SampaHeader::default(),
            state: State::LookingForSync,
            bit_buffer: 0,
            mask: 1,
            checkpoint: 1u64 << HEADER_SIZE,
            nof10_bit_words_to_read: 0,
            nof_samples: 0,
            timestamp: 0,
            samples: Vec::new(),
            stats: LinkStatistics::new(),
        })
    }

    pub fn link_id(&self) -> u8 {
        self.link_id
    }

    pub fn statistics(&self) -> LinkStatistics {
        self.stats
    }

    /// Resets the decoder back to hunting for the sync pattern, discarding
    /// any in-flight cluster. Called on an orbit jump or any other
    /// condition where resynchronization from scratch is the safe choice.
    pub fn reset(&mut self) {
        self.soft_reset();
        self.state = State::LookingForSync;
        self.samples.clear();
    }

    fn soft_reset(&mut self) {
        self.clear(HEADER_SIZE);
    }

    fn clear(&mut self, checkpoint_bits: u32) {
        self.bit_buffer = 0;
        self.checkpoint = 1u64 << checkpoint_bits;
        self.mask = 1;
    }

    fn change_state(&mut self, new_state: State, checkpoint_bits: u32) {
        self.state = new_state;
        self.clear(checkpoint_bits);
    }

    /// Feeds the next two bits (the per-e-link slot of one GBT word) into
    /// the state machine, returning a cluster if one was just completed.
    pub fn append(&mut self, bit0: bool, bit1: bool) -> Option<DecodedCluster> {
        self.bit_buffer += (bit0 as u64) * self.mask + (bit1 as u64) * self.mask * 2;
        self.mask *= 4;
        if self.mask == self.checkpoint {
            return self.process();
        }
        None
    }

    fn process(&mut self) -> Option<DecodedCluster> {
        match self.state {
            State::LookingForSync => {
                self.find_sync();
                None
            }
            State::LookingForHeader => {
                self.handle_header();
                None
            }
            State::ReadingNofSamples => {
                self.handle_read_nof_samples();
                None
            }
            State::ReadingTimestamp => {
                self.handle_read_timestamp();
                None
            }
            State::ReadingSample => self.handle_read_sample(),
            State::ReadingClusterSum => self.handle_read_cluster_sum(),
        }
    }

    fn find_sync(&mut self) {
        if self.bit_buffer != SYNC_VALUE {
            self.bit_buffer >>= 1;
            self.mask /= 2;
            return;
        }
        self.change_state(State::LookingForHeader, HEADER_SIZE);
        self.stats.nof_sync_seen += 1;
    }

    fn handle_header(&mut self) {
        self.header = SampaHeader::from_u64(self.bit_buffer);
        self.stats.nof_header_seen += 1;
        if self.header.has_hamming_error() {
            self.stats.nof_hamming_errors += 1;
        }
        if self.header.has_parity_error() {
            self.stats.nof_header_parity_errors += 1;
        }

        match self.header.packet_type() {
            SampaPacketType::DataTruncated
            | SampaPacketType::DataTruncatedTriggerTooEarly
            | SampaPacketType::DataTriggerTooEarly
            | SampaPacketType::DataTriggerTooEarlyNumWords
            | SampaPacketType::DataNumWords
            | SampaPacketType::Data => {
                self.nof10_bit_words_to_read = self.header.nof_10bit_words();
                self.change_state(State::ReadingNofSamples, 10);
            }
            SampaPacketType::Sync => {
                self.stats.nof_sync_seen += 1;
                self.soft_reset();
            }
            SampaPacketType::HeartBeat => {
                log::debug!("link {}: heartbeat packet seen", self.link_id);
                self.soft_reset();
            }
        }
    }

    fn one_less_10bit_word(&mut self) {
        if self.nof10_bit_words_to_read > 0 {
            self.nof10_bit_words_to_read -= 1;
        }
    }

    fn handle_read_nof_samples(&mut self) {
        self.one_less_10bit_word();
        self.nof_samples = self.bit_buffer as u16;
        self.change_state(State::ReadingTimestamp, 10);
    }

    fn handle_read_timestamp_or_data(&mut self, is_timestamp: bool) {
        if is_timestamp {
            self.timestamp = self.bit_buffer as u16;
        }
        self.one_less_10bit_word();
        if self.charge_sum_mode {
            self.change_state(State::ReadingClusterSum, 20);
        } else {
            self.change_state(State::ReadingSample, 10);
        }
    }

    fn handle_read_timestamp(&mut self) {
        self.handle_read_timestamp_or_data(true);
    }

    fn handle_read_sample(&mut self) -> Option<DecodedCluster> {
        self.samples.push(self.bit_buffer as u16);
        if self.nof_samples > 0 {
            self.nof_samples -= 1;
        }
        self.one_less_10bit_word();
        if self.nof_samples > 0 {
            self.handle_read_timestamp_or_data(false);
            None
        } else {
            let cluster = self.take_cluster_sample();
            self.advance_after_cluster();
            cluster
        }
    }

    fn handle_read_cluster_sum(&mut self) -> Option<DecodedCluster> {
        let charge_sum = self.bit_buffer as u32;
        self.one_less_10bit_word();
        self.one_less_10bit_word();
        let cluster = self.take_cluster_charge_sum(charge_sum);
        self.advance_after_cluster();
        cluster
    }

    fn advance_after_cluster(&mut self) {
        if self.nof10_bit_words_to_read > 0 {
            self.change_state(State::ReadingNofSamples, 10);
        } else {
            self.change_state(State::LookingForHeader, HEADER_SIZE);
        }
    }

    fn take_cluster_sample(&mut self) -> Option<DecodedCluster> {
        let samples = std::mem::take(&mut self.samples);
        match SampaCluster::sample(self.timestamp, 0, samples) {
            Ok(cluster) => Some(DecodedCluster {
                chip_address: self.header.chip_address(),
                channel_address: self.header.channel_address(),
                cluster,
            }),
            Err(e) => {
                log::warn!("link {}: dropping malformed sample cluster: {e}", self.link_id);
                None
            }
        }
    }

    fn take_cluster_charge_sum(&mut self, charge_sum: u32) -> Option<DecodedCluster> {
        match SampaCluster::charge_sum(self.timestamp, 0, charge_sum, 0) {
            Ok(cluster) => Some(DecodedCluster {
                chip_address: self.header.chip_address(),
                channel_address: self.header.channel_address(),
                cluster,
            }),
            Err(e) => {
                log::warn!("link {}: dropping malformed charge-sum cluster: {e}", self.link_id);
                None
            }
        }
    }
}

/// Encodes a sequence of [`SampaCluster`]s for one channel of one e-link
/// into a Bare-format bitstream.
pub struct BareElinkEncoder {
    elink_id: u8,
    chip_address: u8,
    charge_sum_mode: bool,
    bits: crate::bitstream::BitStream,
    nof_sync: u64,
    sync_index: u32,
    local_bunch_crossing: u32,
    phase: u32,
}

impl BareElinkEncoder {
    /// Builds an encoder for e-link `elink_id` (`0..=39`), SAMPA chip
    /// `chip_address` (`0..=15`). `phase` pre-fills the stream with that
    /// many bits of sync pattern, simulating inter-elink timing skew.
    pub fn new(elink_id: u8, chip_address: u8, phase: u32, charge_sum_mode: bool) -> Result<Self> {
        if elink_id > 39 {
            return bad_argument(format!("elink id {elink_id} is out of range [0,39]"));
        }
        if chip_address > 15 {
            return bad_argument(format!("chip address {chip_address} is out of range [0,15]"));
        }
        let mut enc = Self {
            elink_id,
            chip_address,
            charge_sum_mode,
            bits: crate::bitstream::BitStream::new(),
            nof_sync: 0,
            sync_index: 0,
            local_bunch_crossing: 0,
            phase,
        };
        enc.bits.fill_with_sync(phase as usize)?;
        Ok(enc)
    }

    pub fn elink_id(&self) -> u8 {
        self.elink_id
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Reads the accumulated bit at index `i`.
    pub fn get(&self, i: usize) -> Result<bool> {
        self.bits.get(i)
    }

    /// Discards the accumulated bitstream, keeping the running counters.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Encodes one SAMPA header + its clusters for channel `channel_address`
    /// (`0..=31`), first emitting a fresh sync word if none is pending.
    pub fn add_channel_data(&mut self, channel_address: u8, data: &[SampaCluster]) -> Result<()> {
        if data.is_empty() {
            return bad_argument("cannot add an empty cluster list");
        }
        if channel_address > 31 {
            return bad_argument(format!("channel address {channel_address} is out of range [0,31]"));
        }
        let charge_sum_mode = data[0].is_charge_sum();
        for (i, c) in data.iter().enumerate() {
            if c.is_charge_sum() != charge_sum_mode {
                return bad_argument(format!(
                    "cluster {i} does not match this encoder's charge-sum mode"
                ));
            }
        }
        if charge_sum_mode != self.charge_sum_mode {
            return bad_argument("cluster mode does not match this encoder's configured mode");
        }

        self.assert_sync()?;

        let n10: u32 = data.iter().map(|c| 2 + c.nof_data_10bit_words() as u32).sum();
        if n10 > 0x3FF {
            return bad_argument(format!("nof10BitWords {n10} does not fit in 10 bits"));
        }

        let header = self.build_header(channel_address, n10 as u16)?;
        self.bits.append_u50(header.uint64())?;
        for c in data {
            self.append_cluster(c)?;
        }
        Ok(())
    }

    fn append_cluster(&mut self, c: &SampaCluster) -> Result<()> {
        match c {
            SampaCluster::Sample { timestamp, samples, .. } => {
                self.bits.append_u10(samples.len() as u16)?;
                self.bits.append_u10(*timestamp)?;
                for &s in samples {
                    self.bits.append_u10(s)?;
                }
            }
            SampaCluster::ChargeSum { timestamp, nof_samples, charge_sum, .. } => {
                self.bits.append_u10(*nof_samples)?;
                self.bits.append_u10(*timestamp)?;
                self.bits.append_u20(*charge_sum)?;
            }
        }
        Ok(())
    }

    fn build_header(&self, channel_address: u8, n10: u16) -> Result<SampaHeader> {
        let mut h = SampaHeader::default();
        h.set_packet_type(SampaPacketType::Data)?;
        h.set_chip_address(self.chip_address)?;
        h.set_channel_address(channel_address)?;
        h.set_bunch_crossing(self.local_bunch_crossing)?;
        h.set_nof_10bit_words(n10)?;
        h.set_hamming_code(compute_hamming_code(h.uint64()))?;
        h.set_header_parity(compute_header_parity(h.uint64()))?;
        Ok(h)
    }

    fn assert_sync(&mut self) -> Result<()> {
        let first_sync = self.nof_sync == 0;
        let pending_sync = self.sync_index != 0;
        if first_sync || pending_sync {
            let target = self.bits.len() + (50 - self.sync_index as usize);
            self.bits.fill_with_sync(target)?;
            self.sync_index = 0;
            if first_sync {
                self.nof_sync += 1;
            }
        }
        Ok(())
    }

    /// Pads the stream with sync-pattern bits until it reaches `upto` bits,
    /// used at the end of a heartbeat period to flush a partial e-link.
    pub fn fill_with_sync(&mut self, upto: usize) -> Result<()> {
        let before = self.bits.len();
        self.bits.fill_with_sync(upto)?;
        let d = self.bits.len() - before;
        self.sync_index = (self.sync_index + d as u32) % 50;
        self.nof_sync += (d / 50) as u64;
        Ok(())
    }

    pub fn reset_local_bunch_crossing(&mut self) {
        self.local_bunch_crossing = self.phase;
    }
}
