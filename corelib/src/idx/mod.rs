/*
 * Created on Thu Apr 11 2024
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

#![deny(unreachable_patterns)]

mod dict;
#[cfg(test)]
mod tests;

pub use dict::{Dict, DictIter, Iter};

use crate::hash::{self, SipSeed};

/// Per-dictionary key behavior: how keys hash (always seeded, see
/// [`crate::ctx::CoreCtx`]) and when two keys are the same key. This is the
/// static stand-in for a per-map vtable; key and value duplication and
/// destruction need no hooks of their own (`Clone` and `Drop` are those hooks)
pub trait DictConfig<K: ?Sized> {
    fn hash(seed: &SipSeed, key: &K) -> u64;
    fn eq(a: &K, b: &K) -> bool;
}

/// Byte-exact keys
pub struct Bin;
/// ASCII-case-insensitive keys
pub struct NoCase;

impl<K: AsRef<[u8]> + ?Sized> DictConfig<K> for Bin {
    #[inline(always)]
    fn hash(seed: &SipSeed, key: &K) -> u64 {
        hash::sip24(seed, key.as_ref())
    }
    #[inline(always)]
    fn eq(a: &K, b: &K) -> bool {
        a.as_ref() == b.as_ref()
    }
}

impl<K: AsRef<[u8]> + ?Sized> DictConfig<K> for NoCase {
    #[inline(always)]
    fn hash(seed: &SipSeed, key: &K) -> u64 {
        hash::sip24_nocase(seed, key.as_ref())
    }
    #[inline(always)]
    fn eq(a: &K, b: &K) -> bool {
        a.as_ref().eq_ignore_ascii_case(b.as_ref())
    }
}
