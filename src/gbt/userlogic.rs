// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UserLogic-format GBT demultiplex: each 64-bit word is tagged with the
//! `(linkIndex, elinkIndex)` pair it belongs to, so — unlike the Bare
//! format — a single UserLogic word stream can carry more than one
//! SOLAR's e-links multiplexed together by the CRU firmware. E-link
//! decoders/encoders are therefore created lazily, keyed by that pair,
//! rather than fixed at 40 per instance.

use std::collections::BTreeMap;

use crate::elink::{DecodedCluster, LinkStatistics, UserLogicElinkDecoder, UserLogicElinkEncoder};
use crate::error::{bad_argument, Result};
use crate::gbt::USER_LOGIC_IDLE_WORD;
use crate::sampa::cluster::SampaCluster;

const MASK_50BIT: u64 = (1u64 << 50) - 1;
const ELINK_INDEX_SHIFT: u32 = 53;
const LINK_INDEX_SHIFT: u32 = 59;

fn tag_word(payload50: u64, elink_index: u8, link_index: u8) -> u64 {
    (payload50 & MASK_50BIT)
        | ((elink_index as u64) << ELINK_INDEX_SHIFT)
        | ((link_index as u64) << LINK_INDEX_SHIFT)
}

fn untag_word(word: u64) -> (u64, u8, u8) {
    let payload = word & MASK_50BIT;
    let elink_index = ((word >> ELINK_INDEX_SHIFT) & 0x3F) as u8;
    let link_index = ((word >> LINK_INDEX_SHIFT) & 0x1F) as u8;
    (payload, elink_index, link_index)
}

/// Encodes clusters for an arbitrary number of `(linkIndex, elinkIndex)`
/// e-links into a single tagged UserLogic 64-bit word stream.
pub struct UserLogicGbtEncoder {
    charge_sum_mode: bool,
    links: BTreeMap<(u8, u8), UserLogicElinkEncoder>,
}

impl UserLogicGbtEncoder {
    pub fn new(charge_sum_mode: bool) -> Self {
        Self { charge_sum_mode, links: BTreeMap::new() }
    }

    /// Routes `clusters` to the e-link `elinkIndex` (`0..=39`) of SOLAR
    /// link `link_index` (`0..=31`), creating its encoder on first use.
    pub fn add_channel_data(
        &mut self,
        link_index: u8,
        elink_index: u8,
        chip_address: u8,
        channel_address: u8,
        clusters: &[SampaCluster],
    ) -> Result<()> {
        if elink_index > 39 {
            return bad_argument(format!("elink index {elink_index} is out of range [0,39]"));
        }
        let charge_sum_mode = self.charge_sum_mode;
        let link = match self.links.entry((link_index, elink_index)) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(UserLogicElinkEncoder::new(elink_index, charge_sum_mode)?)
            }
        };
        link.add_channel_data(chip_address, channel_address, clusters)
    }

    /// Drains every e-link's queued payload words into `out` as tagged
    /// 64-bit UserLogic words, in `(linkIndex, elinkIndex)` order.
    /// Returns the number of words appended.
    pub fn drain_to_words(&mut self, out: &mut Vec<u64>) -> usize {
        let before = out.len();
        for (&(link_index, elink_index), link) in self.links.iter_mut() {
            for w in link.take_words() {
                out.push(tag_word(w, elink_index, link_index));
            }
        }
        out.len() - before
    }
}

/// Demultiplexes a tagged UserLogic 64-bit word stream, routing each
/// word's 50-bit payload to the e-link decoder its tag addresses.
pub struct UserLogicGbtDecoder {
    charge_sum_mode: bool,
    links: BTreeMap<(u8, u8), UserLogicElinkDecoder>,
}

impl UserLogicGbtDecoder {
    pub fn new(charge_sum_mode: bool) -> Self {
        Self { charge_sum_mode, links: BTreeMap::new() }
    }

    pub fn link_statistics(&self, link_index: u8, elink_index: u8) -> Option<LinkStatistics> {
        self.links.get(&(link_index, elink_index)).map(|l| l.statistics())
    }

    /// Resets every e-link decoder currently known (used on an orbit
    /// jump).
    pub fn reset_all(&mut self) {
        for link in self.links.values_mut() {
            link.reset();
        }
    }

    /// Feeds one tagged 64-bit UserLogic word, skipping filler
    /// (all-zero payload) and idle-marker words, and routing every other
    /// word to its `(linkIndex, elinkIndex)` e-link decoder.
    ///
    /// Fails with `BadArgument` if the word's `elinkIndex` tag is out of
    /// `[0,39]`.
    pub fn append_word(&mut self, word: u64) -> Result<Vec<((u8, u8), DecodedCluster)>> {
        if word == USER_LOGIC_IDLE_WORD {
            return Ok(Vec::new());
        }
        let (payload, elink_index, link_index) = untag_word(word);
        if payload == 0 {
            return Ok(Vec::new());
        }
        if elink_index > 39 {
            return bad_argument(format!("elink index {elink_index} is out of range [0,39]"));
        }
        let charge_sum_mode = self.charge_sum_mode;
        let link = match self.links.entry((link_index, elink_index)) {
            std::collections::btree_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(UserLogicElinkDecoder::new(elink_index, charge_sum_mode)?)
            }
        };
        Ok(link
            .append(payload)
            .into_iter()
            .map(|c| ((link_index, elink_index), c))
            .collect())
    }

    /// Feeds a whole buffer of tagged 64-bit words in order.
    pub fn append_words(&mut self, words: &[u64]) -> Result<Vec<((u8, u8), DecodedCluster)>> {
        let mut out = Vec::new();
        for &w in words {
            out.extend(self.append_word(w)?);
        }
        Ok(out)
    }
}
