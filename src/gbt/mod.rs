// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GBT-level multiplex/demultiplex: aggregates the 40 e-links of one
//! SOLAR into the wire-level GBT word stream (Bare), or demultiplexes a
//! tagged 64-bit word stream by its embedded e-link address
//! (UserLogic).
//!
//! A GBT word is 128 bits wide on the wire; per spec §9's explicit
//! redesign flag against arbitrary-precision arithmetic, this crate
//! represents one as a `(u64, u64)` pair (`low`, `high`) rather than a
//! `u128` or a big-integer dependency.

pub mod bare;
pub mod userlogic;

pub use bare::{BareGbtDecoder, BareGbtEncoder};
pub use userlogic::{UserLogicGbtDecoder, UserLogicGbtEncoder};

/// Size in bytes of one GBT word on the wire.
pub const GBT_WORD_SIZE: usize = 16;

/// Number of e-links multiplexed into one SOLAR's GBT Bare stream.
pub const NOF_ELINKS_PER_SOLAR: usize = 40;

/// Reserved UserLogic word marking a link as idle (no data this cycle).
pub const USER_LOGIC_IDLE_WORD: u64 = 0xFEED_DEED_FEED_DEED;
