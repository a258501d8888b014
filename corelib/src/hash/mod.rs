/*
 * Created on Thu Mar 14 2024
 *
 * This file is a part of Basalt
 * Basalt is a free and open-source in-memory key/value datastore written
 * by Sayan Nandan ("the Author") with the vision to provide a lean,
 * predictable and memory-efficient foundation for structured data
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

mod sip;

pub use sip::{sip24, sip24_nocase};

/// The 128-bit key every keyed hash in the store derives from. One of these is
/// initialized per store (see [`crate::ctx::CoreCtx`]) before the first
/// dictionary is created and never changes afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SipSeed {
    k: [u8; 16],
}

impl SipSeed {
    pub const fn from_bytes(k: [u8; 16]) -> Self {
        Self { k }
    }
    /// A fresh random seed. Hosts that need hash values to be reproducible
    /// across runs (or shared with a peer) use [`Self::from_bytes`] instead
    pub fn random() -> Self {
        Self {
            k: rand::random::<[u8; 16]>(),
        }
    }
    /// Read the seed back, byte-for-byte as it was set
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.k
    }
    #[inline(always)]
    pub(crate) fn k0(&self) -> u64 {
        u64::from_le_bytes(unsafe {
            // UNSAFE(@ohsayan): in-bounds, fixed-size copy
            crate::mem::heap::memcpy(&self.k[..8])
        })
    }
    #[inline(always)]
    pub(crate) fn k1(&self) -> u64 {
        u64::from_le_bytes(unsafe {
            // UNSAFE(@ohsayan): in-bounds, fixed-size copy
            crate::mem::heap::memcpy(&self.k[8..])
        })
    }
}
