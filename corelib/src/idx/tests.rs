/*
 * Created on Mon May 13 2024
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

use {
    super::{Dict, NoCase},
    crate::{
        ctx::{CoreCtx, Ctx},
        error::CoreError,
        hash::SipSeed,
    },
    std::collections::HashSet,
};

#[cfg(not(miri))]
const SPAM_CNT: usize = 1000;
#[cfg(miri)]
const SPAM_CNT: usize = 48;

fn ctx() -> Ctx {
    // capture structural trace records in test output
    let _ = env_logger::builder().is_test(true).try_init();
    CoreCtx::new(SipSeed::from_bytes(*b"deterministicsee"))
}

fn key(i: usize) -> String {
    format!("k{i}")
}

mod crud {
    use super::*;

    #[test]
    fn empty_dict() {
        let mut d: Dict<String, u64> = Dict::new(ctx());
        assert_eq!(d.len(), 0);
        assert!(d.is_empty());
        assert!(d.get("nope").is_none());
        assert!(!d.remove("nope"));
        assert_eq!(d.capacity(), 0);
    }
    #[test]
    fn insert_get() {
        let mut d: Dict<String, u64> = Dict::new(ctx());
        assert!(d.insert(key(1), 100u64).unwrap());
        assert!(d.insert(key(2), 200).unwrap());
        assert_eq!(*d.get("k1").unwrap(), 100);
        assert_eq!(*d.get(&key(2)).unwrap(), 200);
        assert_eq!(d.len(), 2);
    }
    #[test]
    fn insert_refuses_duplicates() {
        let mut d: Dict<String, u64> = Dict::new(ctx());
        assert!(d.insert(key(1), 1u64).unwrap());
        assert!(!d.insert(key(1), 2).unwrap());
        assert_eq!(*d.get("k1").unwrap(), 1);
        assert_eq!(d.len(), 1);
    }
    #[test]
    fn upsert_overwrites() {
        let mut d: Dict<String, u64> = Dict::new(ctx());
        assert!(d.upsert(key(1), 1u64).unwrap());
        assert!(!d.upsert(key(1), 2).unwrap());
        assert_eq!(*d.get("k1").unwrap(), 2);
        assert_eq!(d.len(), 1);
    }
    #[test]
    fn get_mut_updates_in_place() {
        let mut d: Dict<String, Vec<u8>> = Dict::new(ctx());
        d.insert(key(1), vec![1u8]).unwrap();
        d.get_mut("k1").unwrap().push(2);
        assert_eq!(d.get("k1").unwrap(), &[1, 2]);
    }
    #[test]
    fn remove() {
        let mut d: Dict<String, u64> = Dict::new(ctx());
        d.insert(key(1), 1u64).unwrap();
        d.insert(key(2), 2).unwrap();
        assert!(d.remove("k1"));
        assert!(!d.remove("k1"));
        assert!(!d.contains("k1"));
        assert!(d.contains("k2"));
        assert_eq!(d.len(), 1);
    }
    #[test]
    fn remove_entry_hands_back_ownership() {
        let mut d: Dict<String, String> = Dict::new(ctx());
        d.insert(key(7), "payload".to_owned()).unwrap();
        let (k, v) = d.remove_entry("k7").unwrap();
        assert_eq!(k, "k7");
        assert_eq!(v, "payload");
        assert!(d.remove_entry("k7").is_none());
        assert!(d.is_empty());
    }
    #[test]
    fn clear_keeps_handle() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..100 {
            d.insert(key(i), i).unwrap();
        }
        d.clear();
        assert!(d.is_empty());
        assert_eq!(d.capacity(), 0);
        d.insert(key(1), 1).unwrap();
        assert_eq!(d.len(), 1);
    }
    #[test]
    fn nocase_config() {
        let mut d: Dict<String, u64, NoCase> = Dict::new(ctx());
        assert!(d.insert("Greeting".to_owned(), 1).unwrap());
        assert_eq!(*d.get("GREETING").unwrap(), 1);
        assert_eq!(*d.get("greeting").unwrap(), 1);
        // same key under this config
        assert!(!d.insert("GREETING".to_owned(), 2).unwrap());
        assert!(d.remove("gReEtInG"));
        assert!(d.is_empty());
    }
}

mod rehash {
    use super::*;

    /// Every insert is chased by lookups of every key inserted so far, so
    /// migration advances cooperatively underneath; nothing may go missing at
    /// any point
    #[test]
    fn incremental_migration_never_loses_keys() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..SPAM_CNT {
            assert!(d.insert(key(i), i).unwrap());
            for j in 0..=i {
                assert_eq!(*d.get(key(j).as_str()).unwrap(), j, "lost k{j} at {i}");
            }
        }
        // the lookups above drove migration to completion long ago
        assert_eq!(d.len(), SPAM_CNT);
        assert!(!d.is_rehashing());
        assert_eq!(d.rehash_index(), -1);
        assert_eq!(d.table_used(1), 0);
        assert_eq!(d.table_size(1), 0);
        for i in 0..SPAM_CNT {
            assert_eq!(*d.get(key(i).as_str()).unwrap(), i);
        }
    }
    #[test]
    fn expansion_starts_migration() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..4 {
            d.insert(key(i), i).unwrap();
        }
        assert_eq!(d.table_size(0), 4);
        // the trigger is consulted on the next insert: 2x the population
        d.insert(key(4), 4).unwrap();
        assert!(d.is_rehashing());
        assert_eq!(d.table_size(1), 8);
        assert!(d.rehash_index() >= 0);
        // and lookups still see both tables
        for i in 0..5 {
            assert_eq!(*d.get(key(i).as_str()).unwrap(), i);
        }
    }
    #[test]
    fn explicit_rehash_burst_finishes() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..5 {
            d.insert(key(i), i).unwrap();
        }
        assert!(d.is_rehashing());
        while d.rehash(100) {}
        assert!(!d.is_rehashing());
        assert_eq!(d.table_used(0), 5);
        assert_eq!(d.table_used(1), 0);
    }
    #[test]
    fn rehash_for_ms_makes_progress() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..SPAM_CNT {
            d.insert(key(i), i).unwrap();
        }
        while d.rehash(100) {}
        // manufacture a fresh migration with plenty of chains to move
        d.expand(d.capacity() * 2).unwrap();
        let steps = d.rehash_for_ms(50);
        assert!(steps >= 100);
        while d.rehash(100) {}
        assert_eq!(d.len(), SPAM_CNT);
    }
    #[test]
    fn expand_refused_mid_migration() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..5 {
            d.insert(key(i), i).unwrap();
        }
        assert!(d.is_rehashing());
        assert_eq!(d.expand(1024).unwrap_err(), CoreError::IllegalState);
    }
    #[test]
    fn expand_refused_below_population() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..100 {
            d.insert(key(i), i).unwrap();
        }
        while d.rehash(100) {}
        assert_eq!(d.expand(8).unwrap_err(), CoreError::IllegalState);
    }
    #[test]
    fn shrink_to_fit_after_mass_removal() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..SPAM_CNT {
            d.insert(key(i), i).unwrap();
        }
        while d.rehash(100) {}
        let fat = d.table_size(0);
        for i in 8..SPAM_CNT {
            assert!(d.remove(key(i).as_str()));
        }
        d.shrink_to_fit().unwrap();
        while d.rehash(100) {}
        assert!(d.table_size(0) < fat);
        assert_eq!(d.len(), 8);
        for i in 0..8 {
            assert_eq!(*d.get(key(i).as_str()).unwrap(), i);
        }
    }
    #[test]
    fn restricted_resize_defers_growth() {
        use crate::ctx::ResizePolicy;
        let c = ctx();
        let mut d: Dict<String, usize> = Dict::new(c.clone());
        for i in 0..4 {
            d.insert(key(i), i).unwrap();
        }
        c.set_resize_policy(ResizePolicy::Restricted);
        // overload up to 6x: no expansion while restricted
        for i in 4..24 {
            d.insert(key(i), i).unwrap();
        }
        assert_eq!(d.table_size(0), 4);
        assert!(!d.is_rehashing());
        // past the force ratio the expand fires anyway
        d.insert(key(24), 24).unwrap();
        assert!(d.capacity() > 4);
        c.set_resize_policy(ResizePolicy::Permissive);
        for i in 0..25 {
            assert_eq!(*d.get(key(i).as_str()).unwrap(), i);
        }
    }
}

mod iterators {
    use super::*;

    fn seeded(n: usize) -> Dict<String, usize> {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..n {
            d.insert(key(i), i).unwrap();
        }
        d
    }

    #[test]
    fn shared_iter_sees_everything() {
        let d = seeded(SPAM_CNT);
        let mut seen = HashSet::new();
        for (k, v) in d.iter() {
            assert_eq!(k, &key(*v));
            assert!(seen.insert(k.clone()), "duplicate {k}");
        }
        assert_eq!(seen.len(), SPAM_CNT);
    }
    #[test]
    fn shared_iter_mid_migration() {
        let mut d = seeded(SPAM_CNT);
        while d.rehash(100) {}
        d.expand(d.capacity() * 2).unwrap();
        d.rehash(4);
        assert!(d.is_rehashing());
        assert_eq!(d.iter().count(), SPAM_CNT);
    }
    #[test]
    fn pinning_iter_allows_insert_mid_walk() {
        let mut d: Dict<String, ()> = Dict::new(ctx());
        for k in ["a", "b", "c"] {
            d.insert(k.to_owned(), ()).unwrap();
        }
        let mut it = d.safe_iter();
        it.dict().insert("d".to_owned(), ()).unwrap();
        let mut seen = HashSet::new();
        while let Some((k, _)) = it.next() {
            assert!(seen.insert(k.clone()), "duplicate {k}");
        }
        drop(it);
        for k in ["a", "b", "c", "d"] {
            assert!(seen.contains(k), "missing {k}");
        }
        assert_eq!(seen.len(), 4);
    }
    #[test]
    fn pinning_iter_allows_deleting_yielded_entry() {
        let mut d = seeded(64);
        let mut it = d.safe_iter();
        while let Some((k, v)) = it.next() {
            if v % 2 == 0 {
                let k = k.clone();
                it.dict().remove(k.as_str());
            }
        }
        drop(it);
        assert_eq!(d.len(), 32);
        for i in 0..64 {
            assert_eq!(d.contains(key(i).as_str()), i % 2 == 1);
        }
    }
    #[test]
    fn pinning_iter_stalls_migration() {
        let mut d = seeded(5);
        assert!(d.is_rehashing());
        let cursor_before = d.rehash_index();
        let mut it = d.safe_iter();
        let mut walked = 0;
        while it.next().is_some() {
            walked += 1;
            // lookups would normally advance the cursor; pinned, they don't
            it.dict().get("k0");
        }
        drop(it);
        assert_eq!(walked, 5);
        assert_eq!(d.rehash_index(), cursor_before);
        // unpinned again: the next read advances migration
        d.get("k0");
        assert_ne!(d.rehash_index(), cursor_before);
    }
    #[test]
    fn fingerprint_iter_clean_walk() {
        let mut d = seeded(32);
        let mut it = d.raw_iter();
        let mut n = 0;
        while it.next().is_some() {
            n += 1;
        }
        drop(it);
        assert_eq!(n, 32);
    }
    #[test]
    #[should_panic(expected = "dict mutated under a fingerprint iterator")]
    fn fingerprint_iter_detects_mutation() {
        let mut d = seeded(32);
        let mut it = d.raw_iter();
        it.next();
        it.dict().insert(key(32), 32).unwrap();
        // release aborts
        drop(it);
    }
}

mod scan {
    use super::*;

    fn scan_all(d: &mut Dict<String, usize>) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut cursor = 0;
        loop {
            cursor = d.scan(cursor, |k, _| {
                seen.insert(k.clone());
            });
            if cursor == 0 {
                break;
            }
        }
        seen
    }

    #[test]
    fn full_coverage() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..SPAM_CNT {
            d.insert(key(i), i).unwrap();
        }
        let seen = scan_all(&mut d);
        assert_eq!(seen.len(), SPAM_CNT);
    }
    #[test]
    fn coverage_mid_migration() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..SPAM_CNT {
            d.insert(key(i), i).unwrap();
        }
        while d.rehash(100) {}
        d.expand(d.capacity() * 2).unwrap();
        d.rehash(3);
        assert!(d.is_rehashing());
        let seen = scan_all(&mut d);
        for i in 0..SPAM_CNT {
            assert!(seen.contains(&key(i)), "missing k{i}");
        }
    }
    /// keys present from start to finish must be seen even though the table
    /// grows (and migrates) between scan calls
    #[test]
    fn coverage_across_growth() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..64 {
            d.insert(key(i), i).unwrap();
        }
        let mut seen = HashSet::new();
        let mut cursor = 0;
        let mut extra = 64;
        loop {
            cursor = d.scan(cursor, |k, _| {
                seen.insert(k.clone());
            });
            if cursor == 0 {
                break;
            }
            // grow the table under the scanner's feet (bounded, so the walk
            // still terminates)
            while extra < 320 {
                d.insert(key(extra), extra).unwrap();
                extra += 1;
            }
        }
        for i in 0..64 {
            assert!(seen.contains(&key(i)), "missing original k{i}");
        }
    }
}

mod sampling {
    use super::*;

    #[test]
    fn random_entry_is_a_member() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        assert!(d.random_entry().is_none());
        for i in 0..100 {
            d.insert(key(i), i).unwrap();
        }
        for _ in 0..64 {
            let (k, v) = d.random_entry().unwrap();
            assert_eq!(k, &key(*v));
        }
    }
    #[test]
    fn random_entry_mid_migration() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..100 {
            d.insert(key(i), i).unwrap();
        }
        while d.rehash(100) {}
        d.expand(d.capacity() * 2).unwrap();
        assert!(d.is_rehashing());
        let (k, v) = d.random_entry().unwrap();
        assert_eq!(k, &key(*v));
    }
    #[test]
    fn some_entries_bounded_and_valid() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..100 {
            d.insert(key(i), i).unwrap();
        }
        let sample = d.some_entries(16);
        assert!(!sample.is_empty());
        assert!(sample.len() <= 16);
        for (k, v) in sample {
            assert_eq!(k, &key(*v));
        }
    }
    #[test]
    fn some_entries_caps_at_population() {
        let mut d: Dict<String, usize> = Dict::new(ctx());
        for i in 0..4 {
            d.insert(key(i), i).unwrap();
        }
        let sample = d.some_entries(64);
        assert!(sample.len() <= 4);
    }
}

mod payloads {
    use super::*;
    use crate::{data::Datacell, mem::Dbs};

    #[test]
    fn dbs_keys_with_cell_values() {
        let mut d: Dict<Dbs, Datacell> = Dict::new(ctx());
        d.insert(Dbs::new(b"visits").unwrap(), Datacell::from(42u64))
            .unwrap();
        d.insert(Dbs::new(b"ratio").unwrap(), Datacell::from(0.5f64))
            .unwrap();
        d.insert(
            Dbs::new(b"motd").unwrap(),
            Datacell::from(Dbs::new(b"hello").unwrap()),
        )
        .unwrap();
        // borrowed byte-slice lookups against owned keys
        assert_eq!(d.get(&b"visits"[..]).unwrap().unsigned_int(), Some(42));
        assert_eq!(d.get(&b"ratio"[..]).unwrap().float(), Some(0.5));
        assert_eq!(
            d.get(&b"motd"[..]).unwrap().bin().unwrap().as_slice(),
            b"hello"
        );
        assert!(d.get(&b"nope"[..]).is_none());
    }
    #[test]
    fn owned_values_drop_cleanly() {
        let mut d: Dict<String, Vec<u8>> = Dict::new(ctx());
        for i in 0..SPAM_CNT {
            d.insert(key(i), vec![0u8; 64]).unwrap();
        }
        for i in 0..SPAM_CNT / 2 {
            d.remove(key(i).as_str());
        }
        drop(d);
    }
}
