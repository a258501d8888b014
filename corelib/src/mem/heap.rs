/*
 * Created on Mon Mar 18 2024
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

/*!
    # Heap contract

    The one allocator surface every core structure goes through: allocate,
    reallocate, free, and size introspection. Failure is a null pointer; the
    caller propagates it (as [`crate::error::CoreError::OutOfMemory`]) and must
    leave its own state untouched. Nothing in this module panics on exhaustion.

    Raw byte blocks ride on the C heap because their free contract is
    size-less: a byte-string handle can legally shrink its recorded length in
    place (tiny headers have no separate capacity field), so the block's
    original size is not recoverable at free time. Typed cells and arrays have
    statically known layouts and use the Rust allocator directly.
*/

use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
};

/// Allocate `size` bytes (contents garbage). Null on failure
#[inline(always)]
pub unsafe fn alloc_block(size: usize) -> *mut u8 {
    libc::malloc(size) as *mut u8
}

/// Grow or shrink a live block, possibly relocating it. Null on failure, in
/// which case the original block is still live and unchanged
#[inline(always)]
pub unsafe fn realloc_block(ptr: *mut u8, new_size: usize) -> *mut u8 {
    libc::realloc(ptr as *mut libc::c_void, new_size) as *mut u8
}

/// Return a block obtained from [`alloc_block`]/[`realloc_block`]
#[inline(always)]
pub unsafe fn dealloc_block(ptr: *mut u8) {
    libc::free(ptr as *mut libc::c_void)
}

/// The number of usable bytes a request for `size` actually obtains. The
/// structures in this crate track capacity in-band, so this is the identity
/// policy; an allocator with cheap request introspection (jemalloc's
/// `nallocx`) can round requests up here and the callers will absorb the
/// extra bytes as capacity
#[inline(always)]
pub const fn usable_size(size: usize) -> usize {
    size
}

/// Allocate an aligned block for a single `T`, contents garbage. Null on failure
#[inline(always)]
pub unsafe fn alloc_cell<T>() -> *mut T {
    alloc::alloc(Layout::new::<T>()) as *mut T
}

/// Return a block obtained from [`alloc_cell`] without running any dtor
#[inline(always)]
pub unsafe fn dealloc_cell<T>(ptr: *mut T) {
    alloc::dealloc(ptr as *mut u8, Layout::new::<T>())
}

/// Allocate an array block for `l` elements of `T`, zeroed. Null on failure;
/// dangling (and fine to "free") when `l == 0`
#[inline(always)]
pub unsafe fn alloc_array_zeroed<T>(l: usize) -> *mut T {
    if l != 0 {
        alloc::alloc_zeroed(Layout::array::<T>(l).unwrap_unchecked()) as *mut T
    } else {
        NonNull::dangling().as_ptr()
    }
}

/// Return a block obtained from [`alloc_array_zeroed`]
#[inline(always)]
pub unsafe fn dealloc_array<T>(ptr: *mut T, l: usize) {
    if l != 0 {
        alloc::dealloc(ptr as *mut u8, Layout::array::<T>(l).unwrap_unchecked())
    }
}

/// Copy exactly `N` bytes from `src` into a fresh array
#[inline(always)]
pub unsafe fn memcpy<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut dst = [0u8; N];
    src.as_ptr().copy_to_nonoverlapping(dst.as_mut_ptr(), N);
    dst
}

#[inline(always)]
pub(crate) unsafe fn memmove(dst: *mut u8, src: *const u8, count: usize) {
    ptr::copy(src, dst, count)
}
