// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RDH paging: groups channel data into `(orbit, bc, feeId)` data blocks,
//! splits them into fixed-size RDH-framed pages plus a trailing stop
//! page, and the decoder-side mirror that walks a buffer of such pages
//! back into clusters.

pub mod decoder;
pub mod encoder;

pub use decoder::PageDecoder;
pub use encoder::{Format, PageEncoder};

/// One channel-data burst destined for a single `(orbit, bc, feeId)`
/// heartbeat slot, as handed from the GBT-mux layer to the page encoder.
///
/// Exposed mainly for documentation/testing purposes: [`PageEncoder`]
/// builds and consumes these internally, one per registered session per
/// `start_heartbeat_frame` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub orbit: u32,
    pub bc: u16,
    pub fee_id: u16,
    pub payload: Vec<u8>,
}
