/*
 * Created on Tue Apr 02 2024
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
    A string→string map packed into one contiguous blob, for maps so small that
    O(n) lookups are cheaper than any real table:

        <count><entry><entry>...<0xFF>

    where each entry is

        <klen><key bytes><vlen><free><value bytes><free slack bytes>

    Lengths encode in 1 byte when < 254, else as a 254 marker followed by a
    4-byte little-endian u32 (LE on every host: this layout travels). <count>
    saturates at 254; past that, counting means walking. <free> is slack left
    behind when a value shrank in place; it is capped (see MAX_FREE) so a blob
    can never accumulate more than a few dead bytes per entry.

    Every mutating call can move the blob, which is why the type owns the
    allocation and the pointer never escapes except as borrowed slices.
*/

use {
    crate::{
        error::{CoreError, CoreResult},
        mem::heap,
    },
    core::{fmt, ptr::NonNull, slice},
};

/// Counts and 1-byte lengths saturate here; 254 in a length position flags a
/// 4-byte length, 254 in the count byte means "walk and count"
const BIGLEN: u8 = 254;
/// Blob terminator
const END: u8 = 0xff;
/// Slack at or past this triggers compaction on update
const MAX_FREE: usize = 4;

pub struct Zipmap {
    p: NonNull<u8>,
    alloc: usize,
}

// owned buffer, no interior sharing
unsafe impl Send for Zipmap {}
unsafe impl Sync for Zipmap {}

impl Zipmap {
    /// An empty map: two bytes, a zero count and the terminator
    pub fn new() -> CoreResult<Self> {
        unsafe {
            // UNSAFE(@ohsayan): fresh 2-byte block, stamped before install
            let p = heap::alloc_block(2);
            if p.is_null() {
                return Err(CoreError::OutOfMemory);
            }
            *p = 0;
            *p.add(1) = END;
            Ok(Self {
                p: NonNull::new_unchecked(p),
                alloc: 2,
            })
        }
    }
    #[inline(always)]
    fn blob(&self) -> &[u8] {
        unsafe {
            // UNSAFE(@ohsayan): alloc tracks the live blob exactly
            slice::from_raw_parts(self.p.as_ptr(), self.alloc)
        }
    }
    #[inline(always)]
    fn blob_mut(&mut self) -> &mut [u8] {
        unsafe {
            // UNSAFE(@ohsayan): alloc tracks the live blob exactly
            slice::from_raw_parts_mut(self.p.as_ptr(), self.alloc)
        }
    }
    /// The raw blob, exactly as it would be persisted or shipped to a peer
    pub fn as_bytes(&self) -> &[u8] {
        self.blob()
    }
    /// Bytes held by the backing allocation
    pub fn memory_usage(&self) -> usize {
        self.alloc
    }
    /// Blob length by walking to the terminator
    pub fn blob_len(&self) -> usize {
        let b = self.blob();
        let mut off = 1;
        while b[off] != END {
            off += Self::raw_entry_len(b, off);
        }
        off + 1
    }
}

impl Zipmap {
    #[inline(always)]
    fn encoded_size(l: usize) -> usize {
        if l < BIGLEN as usize {
            1
        } else {
            5
        }
    }
    /// Bytes a fresh entry for this key/value needs: both length fields, the
    /// free byte, and both payloads
    #[inline(always)]
    fn required(klen: usize, vlen: usize) -> usize {
        Self::encoded_size(klen) + klen + Self::encoded_size(vlen) + 1 + vlen
    }
    /// Decode the length starting at `at`; returns `(length, field width)`
    #[inline(always)]
    fn decode_len(b: &[u8], at: usize) -> (usize, usize) {
        if b[at] < BIGLEN {
            (b[at] as usize, 1)
        } else {
            debug_assert_eq!(b[at], BIGLEN, "terminator in a length position");
            let mut le = [0u8; 4];
            le.copy_from_slice(&b[at + 1..at + 5]);
            (u32::from_le_bytes(le) as usize, 5)
        }
    }
    #[inline(always)]
    fn encode_len(b: &mut [u8], at: usize, l: usize) -> usize {
        if l < BIGLEN as usize {
            b[at] = l as u8;
            1
        } else {
            b[at] = BIGLEN;
            b[at + 1..at + 5].copy_from_slice(&(l as u32).to_le_bytes());
            5
        }
    }
    /// Total bytes the entry at `off` occupies, slack included
    fn raw_entry_len(b: &[u8], off: usize) -> usize {
        let (klen, ks) = Self::decode_len(b, off);
        let voff = off + ks + klen;
        let (vlen, vs) = Self::decode_len(b, voff);
        let free = b[voff + vs] as usize;
        ks + klen + vs + 1 + vlen + free
    }
    /// Offset of the entry holding `key`, if present
    fn lookup(&self, key: &[u8]) -> Option<usize> {
        let b = self.blob();
        let mut off = 1;
        while b[off] != END {
            let (klen, ks) = Self::decode_len(b, off);
            let koff = off + ks;
            if klen == key.len() && &b[koff..koff + klen] == key {
                return Some(off);
            }
            off += Self::raw_entry_len(b, off);
        }
        None
    }
    /// Reallocate the blob to exactly `newlen` bytes and re-seat the terminator
    fn resize(&mut self, newlen: usize) -> CoreResult<()> {
        unsafe {
            // UNSAFE(@ohsayan): live block
            let nb = heap::realloc_block(self.p.as_ptr(), newlen);
            if nb.is_null() {
                return Err(CoreError::OutOfMemory);
            }
            self.p = NonNull::new_unchecked(nb);
            self.alloc = newlen;
            *self.p.as_ptr().add(newlen - 1) = END;
        }
        Ok(())
    }
    fn write_entry(&mut self, off: usize, key: &[u8], val: &[u8], free: u8) {
        let b = self.blob_mut();
        let mut o = off;
        o += Self::encode_len(b, o, key.len());
        b[o..o + key.len()].copy_from_slice(key);
        o += key.len();
        o += Self::encode_len(b, o, val.len());
        b[o] = free;
        o += 1;
        b[o..o + val.len()].copy_from_slice(val);
    }
}

impl Zipmap {
    /// Map `key` to `val`, inserting or updating. Returns whether an existing
    /// entry was updated. An update rewrites the entry in place when it fits,
    /// recording the leftover bytes in the free field; leftovers at or past
    /// the cap are compacted away immediately, and a value that outgrew its
    /// slot shifts the whole tail back instead
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> CoreResult<bool> {
        let reqlen = Self::required(key.len(), val.len());
        match self.lookup(key) {
            None => {
                let tot = self.alloc;
                self.resize(tot + reqlen)?;
                // the entry lands where the old terminator sat
                self.write_entry(tot - 1, key, val, 0);
                let b = self.blob_mut();
                if b[0] < BIGLEN {
                    b[0] += 1;
                }
                Ok(false)
            }
            Some(off) => {
                let freelen = Self::raw_entry_len(self.blob(), off);
                if freelen < reqlen {
                    let tot = self.alloc;
                    self.resize(tot + reqlen - freelen)?;
                    self.blob_mut().copy_within(off + freelen..tot, off + reqlen);
                    self.write_entry(off, key, val, 0);
                } else {
                    let empty = freelen - reqlen;
                    if empty >= MAX_FREE {
                        let tot = self.alloc;
                        self.blob_mut().copy_within(off + freelen..tot, off + reqlen);
                        self.write_entry(off, key, val, 0);
                        self.resize(tot - empty)?;
                    } else {
                        self.write_entry(off, key, val, empty as u8);
                    }
                }
                Ok(true)
            }
        }
    }
    /// Remove `key`. Returns whether it was present
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<bool> {
        match self.lookup(key) {
            None => Ok(false),
            Some(off) => {
                let elen = Self::raw_entry_len(self.blob(), off);
                let tot = self.alloc;
                self.blob_mut().copy_within(off + elen..tot, off);
                let b = self.blob_mut();
                if b[0] < BIGLEN {
                    b[0] -= 1;
                }
                self.resize(tot - elen)?;
                Ok(true)
            }
        }
    }
    /// Borrow the value mapped to `key`. The slice aliases the blob: any
    /// mutation of the map invalidates it (the borrow checker enforces this)
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let off = self.lookup(key)?;
        let b = self.blob();
        let (klen, ks) = Self::decode_len(b, off);
        let voff = off + ks + klen;
        let (vlen, vs) = Self::decode_len(b, voff);
        let dataoff = voff + vs + 1;
        Some(&b[dataoff..dataoff + vlen])
    }
    pub fn exists(&self, key: &[u8]) -> bool {
        self.lookup(key).is_some()
    }
    /// Entry count: O(1) while the count byte is exact, O(n) once it has
    /// saturated. A walk that lands back under the saturation point re-stores
    /// the exact count
    pub fn len(&mut self) -> usize {
        if self.blob()[0] < BIGLEN {
            return self.blob()[0] as usize;
        }
        let n = self.iter().count();
        if n < BIGLEN as usize {
            self.blob_mut()[0] = n as u8;
        }
        n
    }
    pub fn is_empty(&self) -> bool {
        self.blob()[1] == END
    }
    /// Iterate entries in blob order. Yielded slices alias the blob
    pub fn iter(&self) -> ZipmapIter<'_> {
        ZipmapIter {
            b: self.blob(),
            off: 1,
        }
    }
    #[cfg(test)]
    /// Full structural walk: every entry parses in-bounds, slack is under the
    /// cap, and the terminator is the last byte
    pub(crate) fn check_integrity(&self) -> bool {
        let b = self.blob();
        let mut off = 1;
        while off < b.len() && b[off] != END {
            let (klen, ks) = Self::decode_len(b, off);
            let voff = off + ks + klen;
            if voff + 1 >= b.len() {
                return false;
            }
            let (vlen, vs) = Self::decode_len(b, voff);
            let free = b[voff + vs] as usize;
            if free >= MAX_FREE {
                return false;
            }
            off += ks + klen + vs + 1 + vlen + free;
        }
        off == b.len() - 1 && b[off] == END
    }
}

impl Drop for Zipmap {
    fn drop(&mut self) {
        unsafe {
            // UNSAFE(@ohsayan): live block
            heap::dealloc_block(self.p.as_ptr())
        }
    }
}

impl fmt::Debug for Zipmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k), String::from_utf8_lossy(v))),
            )
            .finish()
    }
}

pub struct ZipmapIter<'a> {
    b: &'a [u8],
    off: usize,
}

impl<'a> Iterator for ZipmapIter<'a> {
    type Item = (&'a [u8], &'a [u8]);
    fn next(&mut self) -> Option<Self::Item> {
        if self.b[self.off] == END {
            return None;
        }
        let (klen, ks) = Zipmap::decode_len(self.b, self.off);
        let koff = self.off + ks;
        let voff = koff + klen;
        let (vlen, vs) = Zipmap::decode_len(self.b, voff);
        let free = self.b[voff + vs] as usize;
        let dataoff = voff + vs + 1;
        self.off = dataoff + vlen + free;
        Some((&self.b[koff..koff + klen], &self.b[dataoff..dataoff + vlen]))
    }
}
