/*
 * Created on Tue Mar 12 2024
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

//! # Basalt core
//!
//! This crate is the substrate every higher-level Basalt type (strings, hashes,
//! lists) is built on. It has four load-bearing structures:
//! - [`mem::Dbs`]: a binary-safe dynamic byte string with a type-tagged,
//!   variable-width header and amortized O(1) appends
//! - [`idx::Dict`]: a chained hash table that rehashes incrementally, one
//!   bucket at a time, cooperatively driven by the operations themselves
//! - [`mem::Zipmap`]: a tightly packed string map for very small cardinalities
//! - [`list::List`]: the general purpose doubly-linked list
//!
//! Everything here assumes a single logical executor; the layers above this
//! crate serialize access. Nothing in this crate spawns background work: even
//! rehashing only ever advances inside an explicit call.

#![deny(unreachable_patterns)]

#[macro_use]
mod macros;
pub mod ctx;
pub mod data;
pub mod error;
pub mod hash;
pub mod idx;
pub mod list;
pub mod mem;

// the full server binary installs jemalloc; do the same for our own test runs
#[cfg(all(test, not(target_env = "msvc"), not(miri)))]
use jemallocator::Jemalloc;
#[cfg(all(test, not(target_env = "msvc"), not(miri)))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

pub use {
    ctx::{CoreCtx, Ctx},
    error::{CoreError, CoreResult},
};
