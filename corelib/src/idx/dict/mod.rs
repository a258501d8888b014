/*
 * Created on Mon Apr 15 2024
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
    Chained-bucket hash table with incremental rehash. The headline design
    decision lives in the pair [t0, t1]: growth allocates the new bucket array
    as t1 and then *leaves the entries where they are*. Migration happens a
    bucket-chain at a time inside ordinary operations (rehash_step) or a
    time-budgeted helper (rehash_for_ms); nothing here runs in the background
    and a million-entry table never causes a stall. While migration is in
    flight, reads consult both tables and new entries land in t1; the moment t0
    drains, t1 is renamed t0 and the cursor parks at -1.

    The other thing worth knowing before touching this file: iterators and
    rehash are coupled. Any live pinning iterator (see iter.rs) makes
    rehash_step a no-op, because moving a chain mid-iteration would replay or
    drop entries. That is a correctness rule, not a tuning knob.
*/

mod iter;

pub use iter::{DictIter, Iter};

use {
    super::DictConfig,
    crate::{
        ctx::Ctx,
        error::{CoreError, CoreResult},
        mem::heap,
    },
    core::{borrow::Borrow, marker::PhantomData, mem, ptr},
    rand::Rng,
    std::time::Instant,
};

const INITIAL_SIZE: usize = 4;
/// With eager growth vetoed (see [`crate::ctx::ResizePolicy`]), a table this
/// overloaded expands anyway
const FORCE_RESIZE_RATIO: usize = 5;
/// A rehash burst visits at most this many empty buckets per requested step
const EMPTY_VISITS_PER_STEP: usize = 10;

pub struct DictEntry<K, V> {
    k: K,
    v: V,
    n: *mut Self,
}

struct Table<K, V> {
    t: *mut *mut DictEntry<K, V>,
    size: usize,
    mask: usize,
    used: usize,
}

impl<K, V> Table<K, V> {
    const fn null() -> Self {
        Self {
            t: ptr::null_mut(),
            size: 0,
            mask: 0,
            used: 0,
        }
    }
    fn alloc(size: usize) -> CoreResult<Self> {
        debug_assert!(size.is_power_of_two());
        unsafe {
            // UNSAFE(@ohsayan): zeroed array; null buckets are empty buckets
            let t = heap::alloc_array_zeroed::<*mut DictEntry<K, V>>(size);
            if t.is_null() {
                return Err(CoreError::OutOfMemory);
            }
            Ok(Self {
                t,
                size,
                mask: size - 1,
                used: 0,
            })
        }
    }
    #[inline(always)]
    unsafe fn bucket(&self, i: usize) -> *mut DictEntry<K, V> {
        debug_assert!(i < self.size);
        *self.t.add(i)
    }
    #[inline(always)]
    unsafe fn set_bucket(&mut self, i: usize, e: *mut DictEntry<K, V>) {
        debug_assert!(i < self.size);
        *self.t.add(i) = e
    }
}

enum Probe<K, V> {
    Occupied(*mut DictEntry<K, V>),
    Vacant { table: usize, bucket: usize },
}

/// The general purpose map of the store. `C` decides key hashing and equality
/// (see [`super::DictConfig`]); the [`super::Bin`] default treats keys as
/// exact byte strings
pub struct Dict<K, V, C = super::Bin> {
    ht: [Table<K, V>; 2],
    /// next t0 bucket to migrate; -1 when no migration is in flight
    rehash_idx: isize,
    /// live pinning iterators; while nonzero, rehash_step does nothing
    iterators: usize,
    ctx: Ctx,
    _c: PhantomData<C>,
}

// deliberately neither Send nor Sync: the context handle is shared (non-atomically)
// by every dict of a store, and this whole layer assumes one logical executor
impl<K, V, C> Dict<K, V, C> {
    pub fn new(ctx: Ctx) -> Self {
        Self {
            ht: [Table::null(), Table::null()],
            rehash_idx: -1,
            iterators: 0,
            ctx,
            _c: PhantomData,
        }
    }
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.ht[0].used + self.ht[1].used
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Total allocated buckets across both tables
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.ht[0].size + self.ht[1].size
    }
    #[inline(always)]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx != -1
    }
    pub fn ctx(&self) -> &Ctx {
        &self.ctx
    }
    fn next_size(size: usize) -> usize {
        let mut i = INITIAL_SIZE;
        while i < size {
            i <<= 1;
        }
        i
    }
    /// Structural identity of the table pair; see the unsafe iterator in
    /// [`iter`]
    fn fingerprint(&self) -> u64 {
        let integers = [
            self.ht[0].t as u64,
            self.ht[0].size as u64,
            self.ht[0].used as u64,
            self.ht[1].t as u64,
            self.ht[1].size as u64,
            self.ht[1].used as u64,
        ];
        let mut h = 0u64;
        for v in integers {
            h = mix64(h.wrapping_add(v));
        }
        h
    }
    #[cfg(test)]
    pub(crate) fn rehash_index(&self) -> isize {
        self.rehash_idx
    }
    #[cfg(test)]
    pub(crate) fn table_size(&self, i: usize) -> usize {
        self.ht[i].size
    }
    #[cfg(test)]
    pub(crate) fn table_used(&self, i: usize) -> usize {
        self.ht[i].used
    }
}

impl<K, V, C: DictConfig<K>> Dict<K, V, C> {
    /// Grow to at least `size` buckets (rounded to the next power of two,
    /// minimum 4). The new array becomes the migration target; entries move
    /// later, cooperatively. Refused mid-migration or when `size` can't hold
    /// the current population
    pub fn expand(&mut self, size: usize) -> CoreResult<()> {
        if self.is_rehashing() || self.ht[0].used > size {
            return Err(CoreError::IllegalState);
        }
        let realsize = Self::next_size(size);
        if realsize == self.ht[0].size {
            return Err(CoreError::IllegalState);
        }
        let nt = Table::alloc(realsize)?;
        if self.ht[0].t.is_null() {
            // very first allocation: no migration, just install
            self.ht[0] = nt;
        } else {
            log::trace!(
                "dict: expanding {} -> {} buckets, migration begins",
                self.ht[0].size,
                realsize
            );
            self.ht[1] = nt;
            self.rehash_idx = 0;
        }
        Ok(())
    }
    /// Consulted before every insert: bootstrap an empty table, and double an
    /// at-capacity one unless the resize policy is restricted and the overload
    /// is still mild
    fn expand_if_needed(&mut self) -> CoreResult<()> {
        if self.is_rehashing() {
            return Ok(());
        }
        if self.ht[0].size == 0 {
            return self.expand(INITIAL_SIZE);
        }
        if self.ht[0].used >= self.ht[0].size
            && (self.ctx.resize_allowed()
                || self.ht[0].used / self.ht[0].size > FORCE_RESIZE_RATIO)
        {
            return self.expand(self.ht[0].used * 2);
        }
        Ok(())
    }
    /// Contract to the smallest power of two holding the current population.
    /// The store calls this when a table has emptied out well below its
    /// allocated size
    pub fn shrink_to_fit(&mut self) -> CoreResult<()> {
        if !self.ctx.resize_allowed() || self.is_rehashing() {
            return Err(CoreError::IllegalState);
        }
        self.expand(self.ht[0].used.max(INITIAL_SIZE))
    }
    /// Migrate up to `n` bucket chains from t0 to t1, giving up after
    /// `10 * n` empty buckets so a sparse table can't stall the caller.
    /// Returns whether migration work remains
    pub fn rehash(&mut self, n: usize) -> bool {
        if !self.is_rehashing() {
            return false;
        }
        let mut empty_visits = n * EMPTY_VISITS_PER_STEP;
        let mut n = n;
        unsafe {
            // UNSAFE(@ohsayan): the cursor invariant (every chain below it
            // already migrated) bounds all accesses below
            while n > 0 && self.ht[0].used != 0 {
                n -= 1;
                debug_assert!((self.rehash_idx as usize) < self.ht[0].size);
                while self.ht[0].bucket(self.rehash_idx as usize).is_null() {
                    self.rehash_idx += 1;
                    empty_visits -= 1;
                    if empty_visits == 0 {
                        return true;
                    }
                }
                let mut de = self.ht[0].bucket(self.rehash_idx as usize);
                while !de.is_null() {
                    let nx = (*de).n;
                    let h = (C::hash(self.ctx.seed(), &(*de).k) & self.ht[1].mask as u64) as usize;
                    (*de).n = self.ht[1].bucket(h);
                    self.ht[1].set_bucket(h, de);
                    self.ht[0].used -= 1;
                    self.ht[1].used += 1;
                    de = nx;
                }
                self.ht[0].set_bucket(self.rehash_idx as usize, ptr::null_mut());
                self.rehash_idx += 1;
            }
            if self.ht[0].used == 0 {
                heap::dealloc_array(self.ht[0].t, self.ht[0].size);
                self.ht[0] = mem::replace(&mut self.ht[1], Table::null());
                self.rehash_idx = -1;
                log::trace!("dict: migration complete, {} buckets live", self.ht[0].size);
                return false;
            }
        }
        true
    }
    /// Run 100-bucket migration bursts until roughly `ms` milliseconds of wall
    /// clock have elapsed. Returns the number of steps performed. This is the
    /// hook the store drives from idle time
    pub fn rehash_for_ms(&mut self, ms: u64) -> usize {
        let start = Instant::now();
        let mut steps = 0;
        while self.rehash(100) {
            steps += 100;
            if start.elapsed().as_millis() as u64 > ms {
                break;
            }
        }
        steps
    }
    /// One cooperative migration step, suppressed while any pinning iterator
    /// is live
    fn rehash_step(&mut self) {
        if self.iterators == 0 && self.is_rehashing() {
            self.rehash(1);
        }
    }
}

impl<K, V, C: DictConfig<K>> Dict<K, V, C> {
    fn probe(&mut self, k: &K) -> CoreResult<Probe<K, V>> {
        self.rehash_step();
        self.expand_if_needed()?;
        let h = C::hash(self.ctx.seed(), k);
        let rehashing = self.is_rehashing();
        unsafe {
            // UNSAFE(@ohsayan): chain walks stay inside live, sized tables
            for ti in 0..2 {
                let tbl = &self.ht[ti];
                let idx = (h & tbl.mask as u64) as usize;
                let mut e = tbl.bucket(idx);
                while !e.is_null() {
                    if C::eq(&(*e).k, k) {
                        return Ok(Probe::Occupied(e));
                    }
                    e = (*e).n;
                }
                if !rehashing {
                    break;
                }
            }
        }
        // fresh entries land in the migration target when one exists
        let table = rehashing as usize;
        let bucket = (h & self.ht[table].mask as u64) as usize;
        Ok(Probe::Vacant { table, bucket })
    }
    fn link_new(&mut self, table: usize, bucket: usize, k: K, v: V) -> CoreResult<()> {
        unsafe {
            // UNSAFE(@ohsayan): fresh cell, fully written, then head-linked
            let e = heap::alloc_cell::<DictEntry<K, V>>();
            if e.is_null() {
                return Err(CoreError::OutOfMemory);
            }
            ptr::write(
                e,
                DictEntry {
                    k,
                    v,
                    n: self.ht[table].bucket(bucket),
                },
            );
            self.ht[table].set_bucket(bucket, e);
            self.ht[table].used += 1;
        }
        Ok(())
    }
    /// Insert, refusing duplicates. `Ok(true)` means the entry went in; new
    /// entries sit at the head of their chain (recently added, soonest found)
    pub fn insert(&mut self, k: K, v: V) -> CoreResult<bool> {
        match self.probe(&k)? {
            Probe::Occupied(_) => Ok(false),
            Probe::Vacant { table, bucket } => {
                self.link_new(table, bucket, k, v)?;
                Ok(true)
            }
        }
    }
    /// Insert or overwrite. `Ok(true)` means the key was new
    pub fn upsert(&mut self, k: K, v: V) -> CoreResult<bool> {
        match self.probe(&k)? {
            Probe::Occupied(e) => {
                unsafe {
                    // UNSAFE(@ohsayan): occupied entries are live. The new
                    // value is installed before the old one dies: with
                    // refcounted payloads the two may be the same object
                    let old = mem::replace(&mut (*e).v, v);
                    drop(old);
                }
                Ok(false)
            }
            Probe::Vacant { table, bucket } => {
                self.link_new(table, bucket, k, v)?;
                Ok(true)
            }
        }
    }
    fn find_entry<Q>(&mut self, k: &Q) -> *mut DictEntry<K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        if self.len() == 0 {
            return ptr::null_mut();
        }
        self.rehash_step();
        let h = <C as DictConfig<Q>>::hash(self.ctx.seed(), k);
        let rehashing = self.is_rehashing();
        unsafe {
            // UNSAFE(@ohsayan): chain walks stay inside live, sized tables
            for ti in 0..2 {
                let tbl = &self.ht[ti];
                if tbl.size != 0 {
                    let idx = (h & tbl.mask as u64) as usize;
                    let mut e = tbl.bucket(idx);
                    while !e.is_null() {
                        if <C as DictConfig<Q>>::eq((*e).k.borrow(), k) {
                            return e;
                        }
                        e = (*e).n;
                    }
                }
                if !rehashing {
                    break;
                }
            }
        }
        ptr::null_mut()
    }
    pub fn get<Q>(&mut self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        unsafe {
            // UNSAFE(@ohsayan): entry live; borrow tied to self
            self.find_entry(k).as_ref().map(|e| &e.v)
        }
    }
    pub fn get_mut<Q>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        unsafe {
            // UNSAFE(@ohsayan): entry live; borrow tied to self
            self.find_entry(k).as_mut().map(|e| &mut e.v)
        }
    }
    pub fn contains<Q>(&mut self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        !self.find_entry(k).is_null()
    }
    /// Detach the matching entry from its chain without destroying it
    fn unlink<Q>(&mut self, k: &Q) -> *mut DictEntry<K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        if self.len() == 0 {
            return ptr::null_mut();
        }
        self.rehash_step();
        let h = <C as DictConfig<Q>>::hash(self.ctx.seed(), k);
        let rehashing = self.is_rehashing();
        unsafe {
            // UNSAFE(@ohsayan): chain surgery on live tables
            for ti in 0..2 {
                let tbl = &mut self.ht[ti];
                if tbl.size != 0 {
                    let idx = (h & tbl.mask as u64) as usize;
                    let mut e = tbl.bucket(idx);
                    let mut prev: *mut DictEntry<K, V> = ptr::null_mut();
                    while !e.is_null() {
                        if <C as DictConfig<Q>>::eq((*e).k.borrow(), k) {
                            if prev.is_null() {
                                tbl.set_bucket(idx, (*e).n);
                            } else {
                                (*prev).n = (*e).n;
                            }
                            tbl.used -= 1;
                            return e;
                        }
                        prev = e;
                        e = (*e).n;
                    }
                }
                if !rehashing {
                    break;
                }
            }
        }
        ptr::null_mut()
    }
    /// Remove and destroy. Returns whether the key was present
    pub fn remove<Q>(&mut self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        let e = self.unlink(k);
        if e.is_null() {
            return false;
        }
        unsafe {
            // UNSAFE(@ohsayan): entry just detached, exclusively ours
            ptr::drop_in_place(e);
            heap::dealloc_cell(e);
        }
        true
    }
    /// Remove, handing the key and value back instead of destroying them.
    /// This is the one-lookup version of "get then delete"
    pub fn remove_entry<Q>(&mut self, k: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        C: DictConfig<Q>,
    {
        let e = self.unlink(k);
        if e.is_null() {
            return None;
        }
        unsafe {
            // UNSAFE(@ohsayan): entry just detached; move the payload out and
            // retire the shell without running dtors
            let k = ptr::read(&(*e).k);
            let v = ptr::read(&(*e).v);
            heap::dealloc_cell(e);
            Some((k, v))
        }
    }
}

impl<K, V, C: DictConfig<K>> Dict<K, V, C> {
    /// A fair-ish random entry: uniform over non-empty buckets, then uniform
    /// within the chosen chain. Mildly biased towards short chains; good
    /// enough for eviction sampling
    pub fn random_entry(&mut self) -> Option<(&K, &V)> {
        if self.len() == 0 {
            return None;
        }
        self.rehash_step();
        let mut rng = rand::thread_rng();
        unsafe {
            // UNSAFE(@ohsayan): bucket indices are range-bounded below
            let mut he;
            if self.is_rehashing() {
                let s0 = self.ht[0].size;
                let total = s0 + self.ht[1].size;
                let ri = self.rehash_idx as usize;
                loop {
                    // t0 buckets below the cursor are guaranteed empty
                    let h = ri + rng.gen_range(0..total - ri);
                    he = if h >= s0 {
                        self.ht[1].bucket(h - s0)
                    } else {
                        self.ht[0].bucket(h)
                    };
                    if !he.is_null() {
                        break;
                    }
                }
            } else {
                loop {
                    let h = rng.gen::<u64>() as usize & self.ht[0].mask;
                    he = self.ht[0].bucket(h);
                    if !he.is_null() {
                        break;
                    }
                }
            }
            let mut listlen = 0usize;
            let mut p = he;
            while !p.is_null() {
                listlen += 1;
                p = (*p).n;
            }
            let mut skip = rng.gen_range(0..listlen);
            while skip > 0 {
                he = (*he).n;
                skip -= 1;
            }
            let e = &*he;
            Some((&e.k, &e.v))
        }
    }
    /// Sample up to `count` entries by walking forward from a random bucket,
    /// bounded by `10 * count` bucket visits, with a random restart when a
    /// long run of empty buckets suggests a bad neighborhood. Best-effort:
    /// duplicates are possible and the distribution is not uniform
    pub fn some_entries(&mut self, count: usize) -> Vec<(&K, &V)> {
        let count = count.min(self.len());
        if count == 0 {
            return Vec::new();
        }
        for _ in 0..count {
            if self.is_rehashing() {
                self.rehash_step();
            } else {
                break;
            }
        }
        let tables = if self.is_rehashing() { 2 } else { 1 };
        let mut maxsizemask = self.ht[0].mask;
        if tables > 1 && self.ht[1].mask > maxsizemask {
            maxsizemask = self.ht[1].mask;
        }
        let mut steps = count * 10;
        let mut rng = rand::thread_rng();
        let mut i = rng.gen::<u64>() as usize & maxsizemask;
        let mut emptylen = 0usize;
        let mut out: Vec<(&K, &V)> = Vec::new();
        unsafe {
            // UNSAFE(@ohsayan): bucket indices masked/size-checked below
            while out.len() < count && steps > 0 {
                steps -= 1;
                for j in 0..tables {
                    // t0 below the migration cursor is a wasteland; hop over it
                    if tables == 2 && j == 0 && i < self.rehash_idx as usize {
                        if i >= self.ht[1].size {
                            i = self.rehash_idx as usize;
                        } else {
                            continue;
                        }
                    }
                    if i >= self.ht[j].size {
                        continue;
                    }
                    let mut he = self.ht[j].bucket(i);
                    if he.is_null() {
                        emptylen += 1;
                        if emptylen >= 5 && emptylen > count {
                            i = rng.gen::<u64>() as usize & maxsizemask;
                            emptylen = 0;
                        }
                    } else {
                        emptylen = 0;
                        while !he.is_null() {
                            let e = &*he;
                            out.push((&e.k, &e.v));
                            if out.len() == count {
                                return out;
                            }
                            he = e.n;
                        }
                    }
                }
                i = (i + 1) & maxsizemask;
            }
        }
        out
    }
    /// Reverse-binary cursor scan. Start at 0, feed the returned cursor back
    /// in, stop when it comes back as 0. Every key present for the whole scan
    /// is visited at least once even if the table grows, shrinks or migrates
    /// between calls; duplicates are possible. The trick: the cursor walks
    /// bucket indices by incrementing their *bit-reversed* form, so an index
    /// visited at one table size never needs revisiting at another (its
    /// expansions are bit-extensions, already covered in order)
    pub fn scan<F: FnMut(&K, &V)>(&mut self, cursor: u64, mut f: F) -> u64 {
        if self.len() == 0 {
            return 0;
        }
        let mut v = cursor;
        unsafe {
            // UNSAFE(@ohsayan): bucket indices are masked into table bounds
            if !self.is_rehashing() {
                let m0 = self.ht[0].mask as u64;
                Self::scan_bucket(&self.ht[0], (v & m0) as usize, &mut f);
                v |= !m0;
                v = v.reverse_bits().wrapping_add(1).reverse_bits();
            } else {
                // walk the smaller table's bucket, then every bucket of the
                // larger table it maps onto
                let (st, lt) = if self.ht[0].size > self.ht[1].size {
                    (1, 0)
                } else {
                    (0, 1)
                };
                let m0 = self.ht[st].mask as u64;
                let m1 = self.ht[lt].mask as u64;
                Self::scan_bucket(&self.ht[st], (v & m0) as usize, &mut f);
                loop {
                    Self::scan_bucket(&self.ht[lt], (v & m1) as usize, &mut f);
                    v |= !m1;
                    v = v.reverse_bits().wrapping_add(1).reverse_bits();
                    if v & (m0 ^ m1) == 0 {
                        break;
                    }
                }
            }
        }
        v
    }
    unsafe fn scan_bucket(t: &Table<K, V>, i: usize, f: &mut impl FnMut(&K, &V)) {
        let mut e = t.bucket(i);
        while !e.is_null() {
            f(&(*e).k, &(*e).v);
            e = (*e).n;
        }
    }
}

impl<K, V, C> Dict<K, V, C> {
    /// Drop every entry and both bucket arrays, keeping the handle reusable
    pub fn clear(&mut self) {
        for ti in 0..2 {
            Self::clear_table(&mut self.ht[ti]);
        }
        self.rehash_idx = -1;
        self.iterators = 0;
    }
    fn clear_table(t: &mut Table<K, V>) {
        if t.size == 0 {
            return;
        }
        unsafe {
            // UNSAFE(@ohsayan): sequential teardown, each entry dead after its hop
            for i in 0..t.size {
                let mut e = t.bucket(i);
                while !e.is_null() {
                    let nx = (*e).n;
                    ptr::drop_in_place(e);
                    heap::dealloc_cell(e);
                    e = nx;
                }
            }
            heap::dealloc_array(t.t, t.size);
        }
        *t = Table::null();
    }
}

impl<K, V, C> Drop for Dict<K, V, C> {
    fn drop(&mut self) {
        self.clear()
    }
}

/// 64-bit integer finalizer (Wang). Good avalanche for cheap; only the
/// fingerprint uses it
fn mix64(mut h: u64) -> u64 {
    h = (!h).wrapping_add(h << 21);
    h ^= h >> 24;
    h = h.wrapping_add(h << 3).wrapping_add(h << 8);
    h ^= h >> 14;
    h = h.wrapping_add(h << 2).wrapping_add(h << 4);
    h ^= h >> 28;
    h = h.wrapping_add(h << 31);
    h
}
