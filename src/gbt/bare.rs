// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bare-format GBT multiplex/demultiplex: 40 e-links interleaved 2 bits
//! at a time into the low 80 bits of a 128-bit GBT word.

use crate::elink::{BareElinkDecoder, BareElinkEncoder, DecodedCluster};
use crate::error::{bad_argument, Result};
use crate::gbt::{GBT_WORD_SIZE, NOF_ELINKS_PER_SOLAR};
use crate::sampa::cluster::SampaCluster;

/// A cheap, dependency-free spread of 40 distinct per-e-link start phases
/// in `[0, 50)`, used so that e-links do not all re-synchronize in
/// lock-step. Not cryptographic and not the `rand` crate (a normal
/// dependency would be overkill for a handful of deterministic jitter
/// bits, and the core otherwise has no use for an RNG) — a fixed
/// splitmix64-style hash of `(solar_id, elink_index)` is enough to
/// de-correlate the 40 phases while remaining fully reproducible.
fn default_phase(solar_id: u16, elink_index: u8) -> u32 {
    let mut x = (solar_id as u64) << 8 | elink_index as u64;
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^= x >> 31;
    (x % 50) as u32
}

/// Encodes the 40 e-links of one SOLAR link into a Bare-format GBT word
/// stream.
pub struct BareGbtEncoder {
    solar_id: u16,
    links: Vec<BareElinkEncoder>,
}

impl BareGbtEncoder {
    /// Builds an encoder for `solar_id`, one [`BareElinkEncoder`] per
    /// e-link (`0..=39`), each pre-filled with [`default_phase`] bits of
    /// sync pattern unless `force_no_phase` is set.
    pub fn new(solar_id: u16, charge_sum_mode: bool, force_no_phase: bool) -> Result<Self> {
        let mut links = Vec::with_capacity(NOF_ELINKS_PER_SOLAR);
        for elink_index in 0..NOF_ELINKS_PER_SOLAR as u8 {
            let phase = if force_no_phase { 0 } else { default_phase(solar_id, elink_index) };
            let chip_address = elink_index % 16;
            links.push(BareElinkEncoder::new(elink_index, chip_address, phase, charge_sum_mode)?);
        }
        Ok(Self { solar_id, links })
    }

    pub fn solar_id(&self) -> u16 {
        self.solar_id
    }

    /// Routes `clusters` to the e-link addressed by `elink_index`
    /// (`0..=39`).
    pub fn add_channel_data(
        &mut self,
        elink_index: u8,
        channel_address: u8,
        clusters: &[SampaCluster],
    ) -> Result<()> {
        let link = self.links.get_mut(elink_index as usize).ok_or_else(|| {
            crate::error::MchRawError::BadArgument(format!(
                "elink index {elink_index} is out of range [0,{}]",
                NOF_ELINKS_PER_SOLAR - 1
            ))
        })?;
        link.add_channel_data(channel_address, clusters)
    }

    /// Pads every e-link with sync bits up to the longest one, then
    /// drains the resulting bit streams into 16-byte GBT words appended
    /// to `out`. Returns the number of bytes appended (always a multiple
    /// of [`GBT_WORD_SIZE`]).
    pub fn drain_to_bytes(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let max_len = self.links.iter().map(|l| l.len()).max().unwrap_or(0);
        let target = max_len.div_ceil(2) * 2;
        for link in &mut self.links {
            link.fill_with_sync(target)?;
        }

        let before = out.len();
        let nof_words = target / 2;
        for word_idx in 0..nof_words {
            let mut word = [0u8; GBT_WORD_SIZE];
            for (elink_index, link) in self.links.iter().enumerate() {
                let bit0 = link.get(word_idx * 2)?;
                let bit1 = link.get(word_idx * 2 + 1)?;
                let dst_bit = elink_index * 2;
                if bit0 {
                    word[dst_bit / 8] |= 1 << (dst_bit % 8);
                }
                if bit1 {
                    word[(dst_bit + 1) / 8] |= 1 << ((dst_bit + 1) % 8);
                }
            }
            out.extend_from_slice(&word);
        }
        for link in &mut self.links {
            link.clear();
        }
        Ok(out.len() - before)
    }
}

/// Demultiplexes a Bare-format GBT word stream into the 40 e-links of one
/// SOLAR link.
pub struct BareGbtDecoder {
    solar_id: u16,
    links: Vec<BareElinkDecoder>,
}

impl BareGbtDecoder {
    /// Builds a decoder for `solar_id`, one [`BareElinkDecoder`] per
    /// e-link (`0..=39`).
    pub fn new(solar_id: u16, charge_sum_mode: bool) -> Result<Self> {
        let mut links = Vec::with_capacity(NOF_ELINKS_PER_SOLAR);
        for elink_index in 0..NOF_ELINKS_PER_SOLAR as u8 {
            links.push(BareElinkDecoder::new(elink_index, charge_sum_mode)?);
        }
        Ok(Self { solar_id, links })
    }

    pub fn solar_id(&self) -> u16 {
        self.solar_id
    }

    /// Resets every e-link's state machine (used on an orbit jump).
    pub fn reset_all(&mut self) {
        for link in &mut self.links {
            link.reset();
        }
    }

    pub fn link_statistics(&self, elink_index: u8) -> Option<crate::elink::LinkStatistics> {
        self.links.get(elink_index as usize).map(|l| l.statistics())
    }

    /// Feeds `bytes` (a whole number of 16-byte GBT words) through the
    /// de-interleaver, returning every `(elink_index, DecodedCluster)`
    /// pair completed along the way, in the order the e-links complete
    /// them.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Vec<(u8, DecodedCluster)>> {
        if bytes.len() % GBT_WORD_SIZE != 0 {
            return bad_argument(format!(
                "bare GBT payload length {} is not a multiple of {GBT_WORD_SIZE}",
                bytes.len()
            ));
        }
        let mut out = Vec::new();
        for word in bytes.chunks_exact(GBT_WORD_SIZE) {
            for (elink_index, link) in self.links.iter_mut().enumerate() {
                let src_bit = elink_index * 2;
                let bit0 = (word[src_bit / 8] >> (src_bit % 8)) & 1 != 0;
                let bit1 = (word[(src_bit + 1) / 8] >> ((src_bit + 1) % 8)) & 1 != 0;
                if let Some(cluster) = link.append(bit0, bit1) {
                    out.push((elink_index as u8, cluster));
                }
            }
        }
        Ok(out)
    }
}
