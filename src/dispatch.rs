// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Format/mode dispatch: on the first valid RDH of a session, the page
//! decoder picks the on-wire format (Bare or UserLogic) and the
//! charge-sum mode from the RDH's own fields, then holds the page
//! decoder to that choice for the rest of the session.

use crate::elecmap::fee_id_decode;
use crate::error::{format_mismatch, Result};
use crate::rdh::Rdh;

/// Identifies a page-stream session independently of its dispatch token:
/// `(cruId, linkId)`, deliberately excluding the `feeId & 0x100`
/// charge-sum bit that `Dispatch` reads. A session's identity must not
/// depend on the very field a later RDH might contradict, or a flipped
/// charge-sum bit would silently open a new session instead of tripping
/// `FormatMismatch`.
pub type SessionKey = (u8, u8);

/// The session key `(cruId, linkId)` an RDH belongs to, per spec §4.8.
pub fn session_key(rdh: &Rdh) -> SessionKey {
    (fee_id_decode(rdh.fee_id).0, rdh.link_id)
}

/// The `(format, mode)` pair selected from an RDH, per spec §4.8:
/// `linkId == 15` selects UserLogic, every other value selects Bare;
/// `feeId & 0x100` selects charge-sum mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub is_user_logic: bool,
    pub charge_sum_mode: bool,
}

impl Dispatch {
    /// Reads the dispatch token off `rdh`.
    pub fn from_rdh(rdh: &Rdh) -> Self {
        let (_, charge_sum_mode) = fee_id_decode(rdh.fee_id);
        Self { is_user_logic: rdh.is_user_logic(), charge_sum_mode }
    }

    /// Fails with `FormatMismatch` if `rdh` carries a different dispatch
    /// token than the one already established for this session.
    pub fn check(&self, rdh: &Rdh) -> Result<()> {
        let observed = Self::from_rdh(rdh);
        if observed != *self {
            return format_mismatch(format!(
                "fee_id={} link_id={}: dispatch changed from {self:?} to {observed:?}",
                rdh.fee_id, rdh.link_id
            ));
        }
        Ok(())
    }
}
