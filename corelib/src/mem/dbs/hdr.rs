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

/*
    Header layout. A byte string is one allocation shaped like:

        [header][payload bytes][0x00]
                ^ the public handle points here

    The byte at handle-1 is the flags byte on every variant; its low 3 bits tag
    which of the five header shapes precedes the payload, so the header base (and
    with it, the whole allocation) is always recoverable from the handle alone.
    Multi-byte fields are byte-aligned and written unaligned, little to care
    about: the layout is private to this module pair.

        Tiny:  [flags(len<<3|tag)]                          1B,  len <= 31
        U8:    [len u8][cap u8][flags]                      3B,  len <= u8::MAX
        U16:   [len u16][cap u16][flags]                    5B,  len <= u16::MAX
        U32:   [len u32][cap u32][flags]                    9B,  len <= u32::MAX
        U64:   [len u64][cap u64][flags]                    17B

    Tiny has no capacity field: capacity == length, so it can never track slack
    and is therefore never produced by a growing reallocation (growth always
    lands on U8 or wider).
*/

use core::ptr;

pub const TY_MASK: u8 = 0b0000_0111;
pub const TY_BITS: u32 = 3;
pub const TINY_MAX: usize = (1 << 5) - 1;

assertions!(
    HdrTy::Tiny as u8 == 0,
    HdrTy::U64 as u8 == 4,
    TINY_MAX == 31,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum HdrTy {
    Tiny = 0,
    U8 = 1,
    U16 = 2,
    U32 = 3,
    U64 = 4,
}

impl HdrTy {
    #[inline(always)]
    pub const fn size(self) -> usize {
        match self {
            Self::Tiny => 1,
            Self::U8 => 1 + 2,
            Self::U16 => 1 + 4,
            Self::U32 => 1 + 8,
            Self::U64 => 1 + 16,
        }
    }
    /// The narrowest header that can describe a string of length (or capacity) `l`
    #[inline(always)]
    pub const fn for_len(l: usize) -> Self {
        if l <= TINY_MAX {
            Self::Tiny
        } else if l <= u8::MAX as usize {
            Self::U8
        } else if l as u64 <= u16::MAX as u64 {
            Self::U16
        } else if l as u64 <= u32::MAX as u64 {
            Self::U32
        } else {
            Self::U64
        }
    }
    #[inline(always)]
    pub fn from_flags(flags: u8) -> Self {
        match flags & TY_MASK {
            0 => Self::Tiny,
            1 => Self::U8,
            2 => Self::U16,
            3 => Self::U32,
            4 => Self::U64,
            _ => unreachable!("corrupted header tag"),
        }
    }
}

#[inline(always)]
pub unsafe fn flags(p: *const u8) -> u8 {
    *p.sub(1)
}

#[inline(always)]
pub unsafe fn ty(p: *const u8) -> HdrTy {
    HdrTy::from_flags(self::flags(p))
}

pub unsafe fn len(p: *const u8) -> usize {
    match self::ty(p) {
        HdrTy::Tiny => (self::flags(p) >> TY_BITS) as usize,
        HdrTy::U8 => *p.sub(3) as usize,
        HdrTy::U16 => ptr::read_unaligned(p.sub(5) as *const u16) as usize,
        HdrTy::U32 => ptr::read_unaligned(p.sub(9) as *const u32) as usize,
        HdrTy::U64 => ptr::read_unaligned(p.sub(17) as *const u64) as usize,
    }
}

pub unsafe fn cap(p: *const u8) -> usize {
    match self::ty(p) {
        // no capacity field; the tiny shape is always exactly full
        HdrTy::Tiny => (self::flags(p) >> TY_BITS) as usize,
        HdrTy::U8 => *p.sub(2) as usize,
        HdrTy::U16 => ptr::read_unaligned(p.sub(3) as *const u16) as usize,
        HdrTy::U32 => ptr::read_unaligned(p.sub(5) as *const u32) as usize,
        HdrTy::U64 => ptr::read_unaligned(p.sub(9) as *const u64) as usize,
    }
}

/// Raw length-field write. The caller owns capacity accounting and the
/// trailing sentinel
pub unsafe fn set_len(p: *mut u8, l: usize) {
    match self::ty(p) {
        HdrTy::Tiny => {
            debug_assert!(l <= TINY_MAX);
            *p.sub(1) = ((l as u8) << TY_BITS) | HdrTy::Tiny as u8;
        }
        HdrTy::U8 => *p.sub(3) = l as u8,
        HdrTy::U16 => ptr::write_unaligned(p.sub(5) as *mut u16, l as u16),
        HdrTy::U32 => ptr::write_unaligned(p.sub(9) as *mut u32, l as u32),
        HdrTy::U64 => ptr::write_unaligned(p.sub(17) as *mut u64, l as u64),
    }
}

pub unsafe fn set_cap(p: *mut u8, c: usize) {
    match self::ty(p) {
        // misuse: tiny never carries slack
        HdrTy::Tiny => unreachable!("capacity write on tiny header"),
        HdrTy::U8 => *p.sub(2) = c as u8,
        HdrTy::U16 => ptr::write_unaligned(p.sub(3) as *mut u16, c as u16),
        HdrTy::U32 => ptr::write_unaligned(p.sub(5) as *mut u32, c as u32),
        HdrTy::U64 => ptr::write_unaligned(p.sub(9) as *mut u64, c as u64),
    }
}

/// Stamp a full header at `base` and return the payload pointer. `cap` is
/// ignored for [`HdrTy::Tiny`]
pub unsafe fn init(base: *mut u8, ty: HdrTy, l: usize, c: usize) -> *mut u8 {
    let p = base.add(ty.size());
    match ty {
        HdrTy::Tiny => {
            *p.sub(1) = ((l as u8) << TY_BITS) | ty as u8;
        }
        _ => {
            *p.sub(1) = ty as u8;
            self::set_len(p, l);
            self::set_cap(p, c);
        }
    }
    p
}

/// The allocation base (header start) for the handle `p`
#[inline(always)]
pub unsafe fn base(p: *mut u8) -> *mut u8 {
    p.sub(self::ty(p).size())
}
