/*
 * Created on Mon Apr 22 2024
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
    Three ways to walk a dict:

    - Iter: a plain shared-borrow iterator. The borrow checker forbids mutation
      for its whole lifetime, so it needs no defenses at all.
    - DictIter in pinning mode (safe_iter): registers itself so that every
      cooperative rehash step becomes a no-op while it lives; in exchange the
      caller may insert and delete through [`DictIter::dict`] mid-walk.
    - DictIter in fingerprint mode (raw_iter): pays nothing, allows nothing. A
      structural digest is taken on the first advance and re-checked on drop;
      a caller that mutated anyway dies loudly instead of iterating garbage.

    Advancement always reads the successor *before* yielding an entry, which is
    what makes deleting the yielded entry legal in pinning mode.
*/

use {
    super::{Dict, DictEntry},
    core::{marker::PhantomData, ptr::NonNull},
};

/// Read-only iteration over every live entry (both tables mid-migration).
/// Entries come out in bucket-then-chain order; treat that order as arbitrary
pub struct Iter<'a, K, V, C> {
    d: &'a Dict<K, V, C>,
    table: usize,
    index: isize,
    entry: *mut DictEntry<K, V>,
}

impl<K, V, C> Dict<K, V, C> {
    pub fn iter(&self) -> Iter<'_, K, V, C> {
        Iter {
            d: self,
            table: 0,
            index: -1,
            entry: core::ptr::null_mut(),
        }
    }
}

impl<'a, K, V, C> Iterator for Iter<'a, K, V, C> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        unsafe {
            // UNSAFE(@ohsayan): the shared borrow keeps every table and chain alive
            loop {
                if self.entry.is_null() {
                    self.index += 1;
                    if self.index >= self.d.ht[self.table].size as isize {
                        if self.d.is_rehashing() && self.table == 0 {
                            self.table = 1;
                            self.index = 0;
                        } else {
                            return None;
                        }
                    }
                    if self.d.ht[self.table].size == 0 {
                        return None;
                    }
                    self.entry = self.d.ht[self.table].bucket(self.index as usize);
                } else {
                    self.entry = (*self.entry).n;
                }
                if !self.entry.is_null() {
                    let e = &*self.entry;
                    return Some((&e.k, &e.v));
                }
            }
        }
    }
}

/// The stateful cursor the store uses when iteration and mutation interleave.
/// Built by [`Dict::safe_iter`] (pinning) or [`Dict::raw_iter`] (fingerprint);
/// see the module notes for what each mode permits
pub struct DictIter<'a, K, V, C> {
    d: NonNull<Dict<K, V, C>>,
    table: usize,
    index: isize,
    entry: *mut DictEntry<K, V>,
    next: *mut DictEntry<K, V>,
    safe: bool,
    fingerprint: u64,
    _l: PhantomData<&'a mut Dict<K, V, C>>,
}

impl<K, V, C> Dict<K, V, C> {
    /// A pinning iterator: rehash holds still while it lives, and the dict
    /// stays reachable through [`DictIter::dict`] for mid-walk mutation.
    /// Every key present for the whole walk is yielded exactly once
    pub fn safe_iter(&mut self) -> DictIter<'_, K, V, C> {
        DictIter::new(self, true)
    }
    /// A fingerprint iterator: cheapest possible walk, but any structural
    /// mutation before release is a programmer error, detected (and aborted
    /// on) at drop
    pub fn raw_iter(&mut self) -> DictIter<'_, K, V, C> {
        DictIter::new(self, false)
    }
}

impl<'a, K, V, C> DictIter<'a, K, V, C> {
    fn new(d: &'a mut Dict<K, V, C>, safe: bool) -> Self {
        Self {
            d: NonNull::from(d),
            table: 0,
            index: -1,
            entry: core::ptr::null_mut(),
            next: core::ptr::null_mut(),
            safe,
            fingerprint: 0,
            _l: PhantomData,
        }
    }
    #[inline(always)]
    fn started(&self) -> bool {
        !(self.index == -1 && self.table == 0)
    }
    /// The dictionary this cursor walks. Mutating through this is legal for a
    /// pinning cursor; a fingerprint cursor will catch it at drop
    pub fn dict(&mut self) -> &mut Dict<K, V, C> {
        unsafe {
            // UNSAFE(@ohsayan): exclusive borrow of the dict is parked in self
            self.d.as_mut()
        }
    }
    /// Advance and yield. The successor was recorded on the previous call, so
    /// deleting the entry this returned (before the next call) is fine
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(&K, &V)> {
        unsafe {
            // UNSAFE(@ohsayan): exclusive borrow of the dict is parked in self;
            // chain/table walks mirror the shared iterator
            let d = self.d.as_mut();
            loop {
                if self.entry.is_null() {
                    if !self.started() {
                        // first advance: pin rehash, or snapshot the structure
                        if self.safe {
                            d.iterators += 1;
                        } else {
                            self.fingerprint = d.fingerprint();
                        }
                    }
                    self.index += 1;
                    if self.index >= d.ht[self.table].size as isize {
                        if d.is_rehashing() && self.table == 0 {
                            self.table = 1;
                            self.index = 0;
                        } else {
                            break;
                        }
                    }
                    if d.ht[self.table].size == 0 {
                        break;
                    }
                    self.entry = d.ht[self.table].bucket(self.index as usize);
                } else {
                    self.entry = self.next;
                }
                if !self.entry.is_null() {
                    self.next = (*self.entry).n;
                    let e = &*self.entry;
                    return Some((&e.k, &e.v));
                }
            }
            None
        }
    }
}

impl<'a, K, V, C> Drop for DictIter<'a, K, V, C> {
    fn drop(&mut self) {
        if !self.started() {
            return;
        }
        unsafe {
            // UNSAFE(@ohsayan): the dict outlives the iterator by construction
            let d = self.d.as_mut();
            if self.safe {
                d.iterators = d.iterators.saturating_sub(1);
            } else {
                assert_eq!(
                    self.fingerprint,
                    d.fingerprint(),
                    "dict mutated under a fingerprint iterator"
                );
            }
        }
    }
}
