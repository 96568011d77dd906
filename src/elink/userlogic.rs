// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The UserLogic on-wire format: one 64-bit tagged word at a time, each
//! carrying a 50-bit SAMPA header or data payload as five 10-bit
//! sub-words.

use crate::elink::{data10, DecodedCluster, LinkStatistics};
use crate::error::{bad_argument, Result};
use crate::sampa::cluster::SampaCluster;
use crate::sampa::header::{
    compute_hamming_code, compute_header_parity, SampaHeader, SampaPacketType, SYNC_VALUE,
};

const LAST_SUBWORD_INDEX: usize = 4;
const MASK_50BIT: u64 = (1u64 << 50) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingSync,
    WaitingHeader,
    ReadingSize,
    WaitingData,
}

/// Decodes one UserLogic-format e-link, fed one 50-bit-payload word (as a
/// full 64-bit value once its tag bits have been stripped by the GBT
/// demultiplexer) at a time.
pub struct UserLogicElinkDecoder {
    link_id: u8,
    charge_sum_mode: bool,

    state: State,
    header: SampaHeader,
    nof10_bit_words: u16,
    cluster_size: u16,
    cluster_time: u16,
    word: u64,
    word_index: usize,
    samples: Vec<u16>,

    stats: LinkStatistics,
}

impl UserLogicElinkDecoder {
    /// Builds a decoder for e-link `link_id` (`0..=39`).
    pub fn new(link_id: u8, charge_sum_mode: bool) -> Result<Self> {
        if link_id > 39 {
            return bad_argument(format!("link id {link_id} is out of range [0,39]"));
        }
        Ok(Self {
            link_id,
            charge_sum_mode,
            state: State::WaitingSync,
            header: SampaHeader::default(),
            nof10_bit_words: 0,
            cluster_size: 0,
            cluster_time: 0,
            word: 0,
            word_index: 0,
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

    /// Resets the decoder back to hunting for the sync word.
    pub fn reset(&mut self) {
        self.state = State::WaitingSync;
        self.nof10_bit_words = 0;
        self.word_index = 0;
        self.samples.clear();
    }

    /// Feeds the next 50-bit-payload word (carried in the low 50 bits of
    /// `data`; any e-link/GBT tag bits must already have been stripped by
    /// the caller) into the state machine, returning every cluster that
    /// word completed (a single UserLogic word can complete more than one
    /// cluster, e.g. several charge-sum pairs back to back).
    pub fn append(&mut self, data: u64) -> Vec<DecodedCluster> {
        match self.state {
            State::WaitingSync => {
                self.on_waiting_sync(data);
                Vec::new()
            }
            State::WaitingHeader => {
                self.on_waiting_header(data);
                Vec::new()
            }
            State::ReadingSize => self.on_reading_size(data),
            State::WaitingData => self.on_waiting_data(data),
        }
    }

    fn on_waiting_sync(&mut self, data: u64) {
        if data == SYNC_VALUE {
            self.stats.nof_sync_seen += 1;
            self.state = State::WaitingHeader;
        }
    }

    fn on_waiting_header(&mut self, data: u64) {
        if data == SYNC_VALUE {
            self.stats.nof_sync_seen += 1;
            return;
        }
        self.header = SampaHeader::from_u64(data);
        self.stats.nof_header_seen += 1;
        if self.header.has_hamming_error() {
            self.stats.nof_hamming_errors += 1;
        }
        if self.header.has_parity_error() {
            self.stats.nof_header_parity_errors += 1;
        }
        match self.header.packet_type() {
            SampaPacketType::HeartBeat => {
                log::debug!("link {}: heartbeat packet seen", self.link_id);
            }
            _ => {
                self.nof10_bit_words = self.header.nof_10bit_words();
                self.state = State::ReadingSize;
            }
        }
    }

    fn on_reading_size(&mut self, data: u64) -> Vec<DecodedCluster> {
        self.word = data;
        self.word_index = 0;
        let n = data10(data, 0);
        if n == 0 || n >= 1024 {
            self.stats.nof_cluster_size_errors += 1;
            self.state = State::WaitingHeader;
            return Vec::new();
        }
        self.cluster_size = self.pop10();
        self.cluster_time = self.pop10();
        self.run_sample_loop()
    }

    fn on_waiting_data(&mut self, data: u64) -> Vec<DecodedCluster> {
        if self.nof10_bit_words == 0 {
            self.state = State::WaitingHeader;
            return Vec::new();
        }
        self.word = data;
        self.word_index = 0;
        self.run_sample_loop()
    }

    fn pop10(&mut self) -> u16 {
        let v = data10(self.word, self.word_index);
        self.nof10_bit_words = self.nof10_bit_words.saturating_sub(1);
        self.word_index = (self.word_index + 1).min(LAST_SUBWORD_INDEX);
        v
    }

    fn run_sample_loop(&mut self) -> Vec<DecodedCluster> {
        let mut out = Vec::new();
        loop {
            if self.charge_sum_mode {
                let a = self.pop10();
                let b = self.pop10();
                if let Some(c) = self.build_charge_sum(a, b) {
                    out.push(c);
                }
            } else {
                let s = self.pop10();
                if let Some(c) = self.add_sample(s) {
                    out.push(c);
                }
            }
            let more_data_in_word = self.word_index < LAST_SUBWORD_INDEX;
            let more_words_to_read = self.nof10_bit_words > 0;
            if !(more_data_in_word && more_words_to_read) {
                break;
            }
        }
        self.state =
            if self.nof10_bit_words > 0 { State::WaitingData } else { State::WaitingHeader };
        out
    }

    fn add_sample(&mut self, sample: u16) -> Option<DecodedCluster> {
        self.samples.push(sample);
        if self.samples.len() as u16 == self.cluster_size {
            let samples = std::mem::take(&mut self.samples);
            self.build(SampaCluster::sample(self.cluster_time, 0, samples))
        } else {
            None
        }
    }

    fn build_charge_sum(&mut self, a: u16, b: u16) -> Option<DecodedCluster> {
        let charge_sum = ((a as u32 & 0x3FF) << 10) | (b as u32 & 0x3FF);
        self.build(SampaCluster::charge_sum(self.cluster_time, 0, charge_sum, self.cluster_size))
    }

    fn build(&self, cluster: Result<SampaCluster>) -> Option<DecodedCluster> {
        match cluster {
            Ok(cluster) => Some(DecodedCluster {
                chip_address: self.header.chip_address(),
                channel_address: self.header.channel_address(),
                cluster,
            }),
            Err(e) => {
                log::warn!("link {}: dropping malformed cluster: {e}", self.link_id);
                None
            }
        }
    }
}

/// Encodes a sequence of [`SampaCluster`]s for one e-link into a sequence
/// of 50-bit UserLogic payload words.
///
/// Unlike [`BareElinkEncoder`](crate::elink::bare::BareElinkEncoder), this
/// encoder emits one SAMPA header per cluster rather than packing several
/// clusters under a shared header: [`UserLogicElinkDecoder`] (the
/// counterpart this encoder must stay paired with) tracks only a single
/// in-flight cluster's `clusterSize`/`clusterTime` per header cycle, so
/// grouping several clusters under one header would silently truncate
/// the emission on the decode side.
pub struct UserLogicElinkEncoder {
    elink_id: u8,
    charge_sum_mode: bool,
    local_bunch_crossing: u32,
    started: bool,
    pending: Vec<u16>,
    words: Vec<u64>,
}

impl UserLogicElinkEncoder {
    /// Builds an encoder for e-link `elink_id` (`0..=39`).
    pub fn new(elink_id: u8, charge_sum_mode: bool) -> Result<Self> {
        if elink_id > 39 {
            return bad_argument(format!("elink id {elink_id} is out of range [0,39]"));
        }
        Ok(Self {
            elink_id,
            charge_sum_mode,
            local_bunch_crossing: 0,
            started: false,
            pending: Vec::with_capacity(5),
            words: Vec::new(),
        })
    }

    pub fn elink_id(&self) -> u8 {
        self.elink_id
    }

    /// Takes ownership of every 50-bit payload word produced so far,
    /// leaving this encoder's queue empty.
    pub fn take_words(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.words)
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    fn push_word(&mut self, value: u64) {
        self.words.push(value & MASK_50BIT);
    }

    fn push10(&mut self, value: u16) {
        self.pending.push(value & 0x3FF);
        if self.pending.len() == 5 {
            self.flush();
        }
    }

    fn flush(&mut self) {
        while self.pending.len() < 5 {
            self.pending.push(0);
        }
        let v = (self.pending[0] as u64)
            | ((self.pending[1] as u64) << 10)
            | ((self.pending[2] as u64) << 20)
            | ((self.pending[3] as u64) << 30)
            | ((self.pending[4] as u64) << 40);
        self.push_word(v);
        self.pending.clear();
    }

    fn flush_partial(&mut self) {
        if !self.pending.is_empty() {
            self.flush();
        }
    }

    fn ensure_sync(&mut self) {
        if !self.started {
            self.push_word(SYNC_VALUE);
            self.started = true;
        }
    }

    fn build_header(&self, chip_address: u8, channel_address: u8, n10: u16) -> Result<SampaHeader> {
        let mut h = SampaHeader::default();
        h.set_packet_type(SampaPacketType::Data)?;
        h.set_chip_address(chip_address)?;
        h.set_channel_address(channel_address)?;
        h.set_bunch_crossing(self.local_bunch_crossing)?;
        h.set_nof_10bit_words(n10)?;
        h.set_hamming_code(compute_hamming_code(h.uint64()))?;
        h.set_header_parity(compute_header_parity(h.uint64()))?;
        Ok(h)
    }

    /// Encodes one SAMPA header plus its clusters for channel
    /// `channel_address` (`0..=31`) of chip `chip_address` (`0..=15`).
    pub fn add_channel_data(
        &mut self,
        chip_address: u8,
        channel_address: u8,
        data: &[SampaCluster],
    ) -> Result<()> {
        if data.is_empty() {
            return bad_argument("cannot add an empty cluster list");
        }
        if channel_address > 31 {
            return bad_argument(format!(
                "channel address {channel_address} is out of range [0,31]"
            ));
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

        self.ensure_sync();
        for c in data {
            let n10 = 2 + c.nof_data_10bit_words();
            let header = self.build_header(chip_address, channel_address, n10)?;
            self.push_word(header.uint64());
            match c {
                SampaCluster::Sample { timestamp, samples, .. } => {
                    self.push10(samples.len() as u16);
                    self.push10(*timestamp);
                    for &s in samples {
                        self.push10(s);
                    }
                }
                SampaCluster::ChargeSum { timestamp, nof_samples, charge_sum, .. } => {
                    self.push10(*nof_samples);
                    self.push10(*timestamp);
                    self.push10(((*charge_sum >> 10) & 0x3FF) as u16);
                    self.push10((*charge_sum & 0x3FF) as u16);
                }
            }
            self.flush_partial();
        }
        Ok(())
    }

    pub fn reset_local_bunch_crossing(&mut self) {
        self.local_bunch_crossing = 0;
    }
}
