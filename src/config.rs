// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Encoder/decoder configuration.

/// Tunables shared by the page encoder and decoder.
///
/// Construct with [`Config::new`] (equivalent to [`Default::default`])
/// and adjust fields with the `with_*` methods, which mutate in place
/// and return `&mut Self` for chaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    page_size: usize,
    padding_byte: u8,
    force_no_phase: bool,
    charge_sum_mode: bool,
    max_nof_crus: u16,
}

const DEFAULT_PAGE_SIZE: usize = 8192;
const DEFAULT_PADDING_BYTE: u8 = 0x42;
const DEFAULT_MAX_NOF_CRUS: u16 = 33;

impl Config {
    /// Builds a `Config` with every field at its documented default.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Sets the target page payload size in bytes, RDH included. Must be
    /// a positive multiple of the 16-byte GBT word width.
    pub fn with_page_size(&mut self, page_size: usize) -> &mut Self {
        self.page_size = page_size;
        self
    }

    pub fn padding_byte(&self) -> u8 {
        self.padding_byte
    }

    /// Sets the byte value used to pad the last GBT word of a page.
    pub fn with_padding_byte(&mut self, padding_byte: u8) -> &mut Self {
        self.padding_byte = padding_byte;
        self
    }

    pub fn force_no_phase(&self) -> bool {
        self.force_no_phase
    }

    /// Forces every e-link encoder to start at phase zero instead of a
    /// randomized timing offset. Useful for deterministic tests.
    pub fn with_force_no_phase(&mut self, force_no_phase: bool) -> &mut Self {
        self.force_no_phase = force_no_phase;
        self
    }

    pub fn charge_sum_mode(&self) -> bool {
        self.charge_sum_mode
    }

    /// Sets whether the encoder produces charge-sum-mode clusters instead
    /// of raw samples.
    pub fn with_charge_sum_mode(&mut self, charge_sum_mode: bool) -> &mut Self {
        self.charge_sum_mode = charge_sum_mode;
        self
    }

    pub fn max_nof_crus(&self) -> u16 {
        self.max_nof_crus
    }

    /// Sets the upper bound on the number of distinct CRU ids the
    /// embedding expects to see, used to size lookup tables up front.
    pub fn with_max_nof_crus(&mut self, max_nof_crus: u16) -> &mut Self {
        self.max_nof_crus = max_nof_crus;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            padding_byte: DEFAULT_PADDING_BYTE,
            force_no_phase: false,
            charge_sum_mode: false,
            max_nof_crus: DEFAULT_MAX_NOF_CRUS,
        }
    }
}
