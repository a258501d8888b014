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

/*
    SipHash-2-4, one-shot over a byte slice. The output must stay bit-for-bit
    identical to the reference implementation (interop: peers hash the same keys
    with the same seed). That rules out "inspired by" shortcuts; the compression
    schedule below is the published one.
*/

use super::SipSeed;

// "somepseudorandomlygeneratedbytes"
const IV0: u64 = 0x736f6d6570736575;
const IV1: u64 = 0x646f72616e646f6d;
const IV2: u64 = 0x6c7967656e657261;
const IV3: u64 = 0x7465646279746573;

macro_rules! sipround {
    ($v0:ident, $v1:ident, $v2:ident, $v3:ident) => {
        $v0 = $v0.wrapping_add($v1);
        $v1 = $v1.rotate_left(13);
        $v1 ^= $v0;
        $v0 = $v0.rotate_left(32);
        $v2 = $v2.wrapping_add($v3);
        $v3 = $v3.rotate_left(16);
        $v3 ^= $v2;
        $v0 = $v0.wrapping_add($v3);
        $v3 = $v3.rotate_left(21);
        $v3 ^= $v0;
        $v2 = $v2.wrapping_add($v1);
        $v1 = $v1.rotate_left(17);
        $v1 ^= $v2;
        $v2 = $v2.rotate_left(32);
    };
}

/// Case-sensitive keyed SipHash-2-4
pub fn sip24(seed: &SipSeed, data: &[u8]) -> u64 {
    self::hash::<false>(seed, data)
}

/// ASCII-case-insensitive keyed SipHash-2-4: `b"FOO"` and `b"foo"` collide on
/// purpose. Pairs with the case-insensitive key equality of the nocase
/// dictionary config
pub fn sip24_nocase(seed: &SipSeed, data: &[u8]) -> u64 {
    self::hash::<true>(seed, data)
}

#[inline(always)]
fn word<const NOCASE: bool>(chunk: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(chunk);
    if NOCASE {
        b.iter_mut().for_each(|x| *x = x.to_ascii_lowercase());
    }
    u64::from_le_bytes(b)
}

fn hash<const NOCASE: bool>(seed: &SipSeed, data: &[u8]) -> u64 {
    let (k0, k1) = (seed.k0(), seed.k1());
    let mut v0 = IV0 ^ k0;
    let mut v1 = IV1 ^ k1;
    let mut v2 = IV2 ^ k0;
    let mut v3 = IV3 ^ k1;
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let m = word::<NOCASE>(chunk);
        v3 ^= m;
        sipround!(v0, v1, v2, v3);
        sipround!(v0, v1, v2, v3);
        v0 ^= m;
    }
    // final word: remaining bytes (LE) with the low byte of the total length on top
    let mut b = (data.len() as u64) << 56;
    for (i, byte) in chunks.remainder().iter().enumerate() {
        let byte = if NOCASE { byte.to_ascii_lowercase() } else { *byte };
        b |= (byte as u64) << (8 * i);
    }
    v3 ^= b;
    sipround!(v0, v1, v2, v3);
    sipround!(v0, v1, v2, v3);
    v0 ^= b;
    v2 ^= 0xff;
    sipround!(v0, v1, v2, v3);
    sipround!(v0, v1, v2, v3);
    sipround!(v0, v1, v2, v3);
    sipround!(v0, v1, v2, v3);
    v0 ^ v1 ^ v2 ^ v3
}
