/*
 * Created on Thu Mar 21 2024
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

mod fmt;
pub(crate) mod hdr;

use {
    self::hdr::HdrTy,
    crate::{
        error::{CoreError, CoreResult},
        mem::heap,
    },
    core::{
        borrow::Borrow,
        cmp::Ordering,
        fmt as cfmt,
        hash::{Hash, Hasher},
        mem::MaybeUninit,
        ops::{Deref, DerefMut},
        ptr::{self, NonNull},
        slice,
    },
};

pub use fmt::FmtArg;

/// Once a string is this large, stop doubling on growth and preallocate in
/// fixed steps instead
const MAX_PREALLOC: usize = 1024 * 1024;

/// A dynamic byte string: binary safe, amortized O(1) appends, and a header
/// whose width is matched to the string it describes (a 5 byte string pays 1
/// byte of overhead, not 17).
///
/// The handle is an interior pointer to the first payload byte; the header
/// lives at a negative offset (see [`hdr`]). The payload always carries one
/// trailing `0x00` past its length, so C-style consumers can borrow it as long
/// as the content itself has no interior NULs; the structure itself never
/// cares.
///
/// Every operation that may allocate returns a [`CoreResult`]; on failure the
/// string is left exactly as it was.
pub struct Dbs {
    p: NonNull<u8>,
}

// owned buffer, no interior sharing
unsafe impl Send for Dbs {}
unsafe impl Sync for Dbs {}

impl Dbs {
    /// New string holding a copy of `d`
    pub fn new(d: &[u8]) -> CoreResult<Self> {
        unsafe {
            // UNSAFE(@ohsayan): len == d.len()
            Self::create(Some(d), d.len())
        }
    }
    pub fn empty() -> CoreResult<Self> {
        Self::new(b"")
    }
    /// New string of length `len` with undefined payload contents (the
    /// trailing sentinel is still set). The caller fills it via
    /// [`Self::as_mut_slice`]
    pub fn with_uninit(len: usize) -> CoreResult<Self> {
        unsafe {
            // UNSAFE(@ohsayan): no init source, len is the payload size
            Self::create(None, len)
        }
    }
    /// Fast integer-to-string construction (no `core::fmt`)
    pub fn from_int(v: i64) -> CoreResult<Self> {
        let mut buf = fmt::IntBuf::new();
        Self::new(buf.write_i64(v))
    }
    /// ## Safety
    /// `init`, when present, must be exactly `len` bytes
    unsafe fn create(init: Option<&[u8]>, len: usize) -> CoreResult<Self> {
        let mut ty = HdrTy::for_len(len);
        // empties are almost always appended to next, and tiny can't track slack
        if ty == HdrTy::Tiny && len == 0 {
            ty = HdrTy::U8;
        }
        let total = ty.size() + len + 1;
        let base = heap::alloc_block(total);
        if base.is_null() {
            return Err(CoreError::OutOfMemory);
        }
        let cap = match ty {
            HdrTy::Tiny => len,
            _ => Self::clamped_cap(ty, heap::usable_size(total) - ty.size() - 1),
        };
        let p = hdr::init(base, ty, len, cap);
        if let Some(d) = init {
            ptr::copy_nonoverlapping(d.as_ptr(), p, len);
        }
        *p.add(len) = 0;
        Ok(Self {
            p: NonNull::new_unchecked(p),
        })
    }
    #[inline(always)]
    const fn clamped_cap(ty: HdrTy, cap: usize) -> usize {
        let max = match ty {
            HdrTy::Tiny => hdr::TINY_MAX,
            HdrTy::U8 => u8::MAX as usize,
            HdrTy::U16 => u16::MAX as usize,
            HdrTy::U32 => u32::MAX as usize,
            HdrTy::U64 => usize::MAX,
        };
        if cap > max {
            max
        } else {
            cap
        }
    }
}

impl Dbs {
    #[inline(always)]
    pub fn len(&self) -> usize {
        unsafe {
            // UNSAFE(@ohsayan): live handle
            hdr::len(self.p.as_ptr())
        }
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        unsafe {
            // UNSAFE(@ohsayan): live handle
            hdr::cap(self.p.as_ptr())
        }
    }
    #[inline(always)]
    pub fn available(&self) -> usize {
        self.capacity() - self.len()
    }
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        unsafe {
            // UNSAFE(@ohsayan): payload is len live bytes
            slice::from_raw_parts(self.p.as_ptr(), self.len())
        }
    }
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe {
            // UNSAFE(@ohsayan): payload is len live bytes, exclusively ours
            slice::from_raw_parts_mut(self.p.as_ptr(), self.len())
        }
    }
    /// The uninitialized region past the current length. Fill a prefix, then
    /// publish it with [`Self::incr_len`]
    pub fn spare_capacity_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        unsafe {
            // UNSAFE(@ohsayan): the spare region is owned, just uninitialized
            slice::from_raw_parts_mut(
                self.p.as_ptr().add(self.len()) as *mut MaybeUninit<u8>,
                self.available(),
            )
        }
    }
    #[cfg(test)]
    pub(crate) fn header_kind(&self) -> HdrTy {
        unsafe { hdr::ty(self.p.as_ptr()) }
    }
    #[cfg(test)]
    pub(crate) fn sentinel(&self) -> u8 {
        unsafe { *self.p.as_ptr().add(self.len()) }
    }
}

impl Dbs {
    /// Ensure at least `addlen` spare bytes past the current length. Growth
    /// overshoots on purpose: double the needed size while small, then step by
    /// [`MAX_PREALLOC`]. A growing string never lands back on the tiny header
    /// (it has no room to record the slack this call just produced)
    pub fn make_room(&mut self, addlen: usize) -> CoreResult<()> {
        if self.available() >= addlen {
            return Ok(());
        }
        let len = self.len();
        let mut newlen = len.checked_add(addlen).expect("length overflow");
        if newlen < MAX_PREALLOC {
            newlen *= 2;
        } else {
            newlen = newlen.checked_add(MAX_PREALLOC).expect("length overflow");
        }
        let mut ty = HdrTy::for_len(newlen);
        if ty == HdrTy::Tiny {
            ty = HdrTy::U8;
        }
        let hdrlen = ty.size();
        let total = hdrlen + newlen + 1;
        unsafe {
            // UNSAFE(@ohsayan): header recovery on a live handle; fresh blocks
            // are fully stamped before install
            let oldty = hdr::ty(self.p.as_ptr());
            if oldty == ty {
                let nb = heap::realloc_block(hdr::base(self.p.as_ptr()), total);
                if nb.is_null() {
                    return Err(CoreError::OutOfMemory);
                }
                self.p = NonNull::new_unchecked(nb.add(hdrlen));
            } else {
                // header width changed: realloc can't shift the payload, go fresh
                let nb = heap::alloc_block(total);
                if nb.is_null() {
                    return Err(CoreError::OutOfMemory);
                }
                let np = hdr::init(nb, ty, len, 0);
                ptr::copy_nonoverlapping(self.p.as_ptr(), np, len + 1);
                heap::dealloc_block(hdr::base(self.p.as_ptr()));
                self.p = NonNull::new_unchecked(np);
            }
            hdr::set_cap(
                self.p.as_ptr(),
                Self::clamped_cap(ty, heap::usable_size(total) - hdrlen - 1),
            );
        }
        Ok(())
    }
    /// Append a copy of `d`
    pub fn append(&mut self, d: &[u8]) -> CoreResult<()> {
        self.make_room(d.len())?;
        let len = self.len();
        unsafe {
            // UNSAFE(@ohsayan): make_room guaranteed the spare capacity
            ptr::copy_nonoverlapping(d.as_ptr(), self.p.as_ptr().add(len), d.len());
            hdr::set_len(self.p.as_ptr(), len + d.len());
            *self.p.as_ptr().add(len + d.len()) = 0;
        }
        Ok(())
    }
    /// Destructive overwrite with a copy of `d`, growing first if it doesn't fit
    pub fn copy_from(&mut self, d: &[u8]) -> CoreResult<()> {
        if self.capacity() < d.len() {
            self.make_room(d.len() - self.len())?;
        }
        unsafe {
            // UNSAFE(@ohsayan): capacity verified above
            ptr::copy_nonoverlapping(d.as_ptr(), self.p.as_ptr(), d.len());
            hdr::set_len(self.p.as_ptr(), d.len());
            *self.p.as_ptr().add(d.len()) = 0;
        }
        Ok(())
    }
    /// Drop all content, keeping the allocation
    pub fn clear(&mut self) {
        unsafe {
            // UNSAFE(@ohsayan): shrinking the length is always in-capacity
            hdr::set_len(self.p.as_ptr(), 0);
            *self.p.as_ptr() = 0;
        }
    }
    /// Give back the slack: reallocate so that capacity == length, moving to a
    /// narrower header when the narrow shape is tiny-free (a mid-width header
    /// isn't worth a copy, only a realloc)
    pub fn shrink_to_fit(&mut self) -> CoreResult<()> {
        if self.available() == 0 {
            return Ok(());
        }
        let len = self.len();
        unsafe {
            // UNSAFE(@ohsayan): header recovery on a live handle
            let oldty = hdr::ty(self.p.as_ptr());
            let ty = HdrTy::for_len(len);
            if ty == oldty || ty > HdrTy::U8 {
                let oldhdr = oldty.size();
                let nb = heap::realloc_block(hdr::base(self.p.as_ptr()), oldhdr + len + 1);
                if nb.is_null() {
                    return Err(CoreError::OutOfMemory);
                }
                self.p = NonNull::new_unchecked(nb.add(oldhdr));
            } else {
                let total = ty.size() + len + 1;
                let nb = heap::alloc_block(total);
                if nb.is_null() {
                    return Err(CoreError::OutOfMemory);
                }
                let np = hdr::init(nb, ty, len, len);
                ptr::copy_nonoverlapping(self.p.as_ptr(), np, len + 1);
                heap::dealloc_block(hdr::base(self.p.as_ptr()));
                self.p = NonNull::new_unchecked(np);
            }
            if hdr::ty(self.p.as_ptr()) != HdrTy::Tiny {
                hdr::set_cap(self.p.as_ptr(), len);
            }
        }
        Ok(())
    }
    /// Raw length-field write; no sentinel, no capacity check beyond debug
    ///
    /// ## Safety
    /// `l` must not exceed the real capacity of the allocation
    pub unsafe fn set_len(&mut self, l: usize) {
        debug_assert!(match hdr::ty(self.p.as_ptr()) {
            HdrTy::Tiny => l <= hdr::TINY_MAX,
            _ => l <= self.capacity(),
        });
        hdr::set_len(self.p.as_ptr(), l)
    }
    /// "The caller just wrote (or unwrote) `delta` bytes at the end": move the
    /// length and re-seat the sentinel. Overrunning capacity (or underrunning
    /// zero) is API misuse and aborts
    pub fn incr_len(&mut self, delta: isize) {
        let len = self.len();
        if delta >= 0 {
            assert!(
                self.available() >= delta as usize,
                "length increment overruns capacity"
            );
        } else {
            assert!(len >= delta.unsigned_abs(), "length decrement underruns");
        }
        let newlen = (len as isize + delta) as usize;
        unsafe {
            // UNSAFE(@ohsayan): bounds asserted above
            hdr::set_len(self.p.as_ptr(), newlen);
            *self.p.as_ptr().add(newlen) = 0;
        }
    }
    /// Fallible deep copy
    pub fn duplicate(&self) -> CoreResult<Self> {
        Self::new(self.as_slice())
    }
}

impl Dbs {
    /// Strip every leading and trailing byte contained in `cset`
    pub fn trim(&mut self, cset: &[u8]) {
        let s = self.as_slice();
        let mut start = 0;
        let mut end = s.len();
        while start < end && cset.contains(&s[start]) {
            start += 1;
        }
        while end > start && cset.contains(&s[end - 1]) {
            end -= 1;
        }
        let newlen = end - start;
        unsafe {
            // UNSAFE(@ohsayan): [start, end) is in-payload
            if start != 0 && newlen != 0 {
                heap::memmove(self.p.as_ptr(), self.p.as_ptr().add(start), newlen);
            }
            hdr::set_len(self.p.as_ptr(), newlen);
            *self.p.as_ptr().add(newlen) = 0;
        }
    }
    /// Cut the string down to the inclusive index range `[start, end]`.
    /// Negative indices count back from the end (`-1` is the last byte).
    /// Out-of-range selections clamp; an inverted range empties the string
    pub fn range(&mut self, start: isize, end: isize) {
        let len = self.len();
        if len == 0 {
            return;
        }
        let mut start = if start < 0 {
            (len as isize + start).max(0) as usize
        } else {
            start as usize
        };
        let end = if end < 0 {
            (len as isize + end).max(0) as usize
        } else {
            end as usize
        };
        let mut newlen = if start > end { 0 } else { end - start + 1 };
        if newlen != 0 {
            if start >= len {
                newlen = 0;
            } else if end >= len {
                newlen = len - start;
            }
        } else {
            start = 0;
        }
        unsafe {
            // UNSAFE(@ohsayan): clamped to payload bounds
            if start != 0 && newlen != 0 {
                heap::memmove(self.p.as_ptr(), self.p.as_ptr().add(start), newlen);
            }
            hdr::set_len(self.p.as_ptr(), newlen);
            *self.p.as_ptr().add(newlen) = 0;
        }
    }
    /// In-place byte substitution: every occurrence of `from[i]` becomes `to[i]`
    pub fn map_chars(&mut self, from: &[u8], to: &[u8]) {
        assert_eq!(from.len(), to.len(), "substitution sets differ in length");
        for b in self.as_mut_slice() {
            for (f, t) in from.iter().zip(to) {
                if b == f {
                    *b = *t;
                    break;
                }
            }
        }
    }
}

impl Dbs {
    /// Split `d` at every exact occurrence of `sep`, returning the pieces as
    /// fresh strings (empty input yields an empty vector; an empty separator
    /// is refused)
    pub fn split(d: &[u8], sep: &[u8]) -> CoreResult<Vec<Dbs>> {
        if sep.is_empty() {
            return Err(CoreError::BadSeparator);
        }
        if d.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut start = 0;
        let mut j = 0;
        while j + sep.len() <= d.len() {
            if &d[j..j + sep.len()] == sep {
                out.push(Dbs::new(&d[start..j])?);
                j += sep.len();
                start = j;
            } else {
                j += 1;
            }
        }
        out.push(Dbs::new(&d[start..])?);
        Ok(out)
    }
    /// Inverse of [`Self::split`]
    pub fn join<S: AsRef<[u8]>>(parts: &[S], sep: &[u8]) -> CoreResult<Dbs> {
        let mut out = Dbs::empty()?;
        for (i, part) in parts.iter().enumerate() {
            if i != 0 {
                out.append(sep)?;
            }
            out.append(part.as_ref())?;
        }
        Ok(out)
    }
}

impl Drop for Dbs {
    fn drop(&mut self) {
        unsafe {
            // UNSAFE(@ohsayan): the flags tag recovers the allocation base
            heap::dealloc_block(hdr::base(self.p.as_ptr()))
        }
    }
}

impl Clone for Dbs {
    fn clone(&self) -> Self {
        self.duplicate().expect("heap exhausted")
    }
}

impl Deref for Dbs {
    type Target = [u8];
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for Dbs {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl AsRef<[u8]> for Dbs {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Borrow<[u8]> for Dbs {
    #[inline(always)]
    fn borrow(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Hash for Dbs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}

impl PartialEq for Dbs {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Dbs {}

impl PartialEq<[u8]> for Dbs {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Dbs {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.as_slice() == other
    }
}

impl PartialOrd for Dbs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// byte-lexicographic with the shorter string ordering first on a shared prefix
impl Ord for Dbs {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_slice().cmp(other.as_slice())
    }
}

impl cfmt::Debug for Dbs {
    fn fmt(&self, f: &mut cfmt::Formatter<'_>) -> cfmt::Result {
        cfmt::Debug::fmt(&String::from_utf8_lossy(self.as_slice()), f)
    }
}

impl From<&str> for Dbs {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes()).expect("heap exhausted")
    }
}
