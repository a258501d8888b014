/*
 * Created on Thu May 09 2024
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

use crate::mem::Zipmap;

#[test]
fn fresh_map() {
    let zm = Zipmap::new().unwrap();
    assert_eq!(zm.as_bytes(), [0x00, 0xff]);
    assert!(zm.is_empty());
    assert_eq!(zm.blob_len(), 2);
    assert!(zm.check_integrity());
}

#[test]
fn exact_layout() {
    let mut zm = Zipmap::new().unwrap();
    assert!(!zm.set(b"foo", b"bar").unwrap());
    assert!(!zm.set(b"hello", b"world").unwrap());
    #[rustfmt::skip]
    let expected: &[u8] = &[
        0x02,
        0x03, b'f', b'o', b'o', 0x03, 0x00, b'b', b'a', b'r',
        0x05, b'h', b'e', b'l', b'l', b'o', 0x05, 0x00, b'w', b'o', b'r', b'l', b'd',
        0xff,
    ];
    assert_eq!(zm.as_bytes(), expected);
    assert!(zm.check_integrity());
}

#[test]
fn get_exists_miss() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"name", b"basalt").unwrap();
    zm.set(b"lang", b"rust").unwrap();
    assert_eq!(zm.get(b"name").unwrap(), b"basalt");
    assert_eq!(zm.get(b"lang").unwrap(), b"rust");
    assert!(zm.exists(b"name"));
    assert!(zm.get(b"nam").is_none());
    assert!(zm.get(b"names").is_none());
    assert!(!zm.exists(b"missing"));
}

#[test]
fn update_in_place_keeps_blob_size() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"k", b"0123456789").unwrap();
    let before = zm.blob_len();
    // two bytes smaller: slack is recorded, nothing moves
    assert!(zm.set(b"k", b"01234567").unwrap());
    assert_eq!(zm.blob_len(), before);
    // free byte sits right after the (1 byte) value length
    assert_eq!(zm.as_bytes()[4], 2);
    assert_eq!(zm.get(b"k").unwrap(), b"01234567");
    assert!(zm.check_integrity());
}

#[test]
fn update_with_large_residue_compacts() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"k", b"0123456789").unwrap();
    zm.set(b"tail", b"t").unwrap();
    let before = zm.blob_len();
    // eight bytes of residue crosses the cap: the tail moves up
    assert!(zm.set(b"k", b"01").unwrap());
    assert_eq!(zm.blob_len(), before - 8);
    assert_eq!(zm.as_bytes()[4], 0);
    assert_eq!(zm.get(b"k").unwrap(), b"01");
    assert_eq!(zm.get(b"tail").unwrap(), b"t");
    assert!(zm.check_integrity());
}

#[test]
fn update_grows_entry() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"a", b"1").unwrap();
    zm.set(b"b", b"2").unwrap();
    assert!(zm.set(b"a", b"a much longer value than before").unwrap());
    assert_eq!(zm.get(b"a").unwrap(), b"a much longer value than before");
    assert_eq!(zm.get(b"b").unwrap(), b"2");
    assert!(zm.check_integrity());
}

#[test]
fn reuse_exact_slack() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"k", b"0123456789").unwrap();
    zm.set(b"k", b"01234567").unwrap();
    // grows back into its own slack: no resize, slack returns to zero
    let before = zm.blob_len();
    zm.set(b"k", b"0123456789").unwrap();
    assert_eq!(zm.blob_len(), before);
    assert_eq!(zm.as_bytes()[4], 0);
    assert_eq!(zm.get(b"k").unwrap(), b"0123456789");
}

#[test]
fn delete() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"foo", b"bar").unwrap();
    zm.set(b"hello", b"world").unwrap();
    assert!(zm.delete(b"foo").unwrap());
    assert!(!zm.delete(b"foo").unwrap());
    assert!(!zm.exists(b"foo"));
    assert_eq!(zm.get(b"hello").unwrap(), b"world");
    // deleting down to one entry leaves exactly that entry's encoding
    let mut fresh = Zipmap::new().unwrap();
    fresh.set(b"hello", b"world").unwrap();
    assert_eq!(zm.as_bytes(), fresh.as_bytes());
    assert!(zm.delete(b"hello").unwrap());
    assert_eq!(zm.as_bytes(), [0x00, 0xff]);
}

#[test]
fn iter_in_blob_order() {
    let mut zm = Zipmap::new().unwrap();
    zm.set(b"one", b"1").unwrap();
    zm.set(b"two", b"2").unwrap();
    zm.set(b"three", b"3").unwrap();
    let entries: Vec<(&[u8], &[u8])> = zm.iter().collect();
    assert_eq!(
        entries,
        [
            (&b"one"[..], &b"1"[..]),
            (&b"two"[..], &b"2"[..]),
            (&b"three"[..], &b"3"[..]),
        ]
    );
}

#[test]
fn wide_length_encoding() {
    let mut zm = Zipmap::new().unwrap();
    let bigval = vec![b'v'; 500];
    zm.set(b"big", &bigval).unwrap();
    // 254 marker followed by the 4-byte little-endian length
    let b = zm.as_bytes();
    let voff = 1 + 1 + 3;
    assert_eq!(b[voff], 254);
    assert_eq!(&b[voff + 1..voff + 5], 500u32.to_le_bytes());
    assert_eq!(zm.get(b"big").unwrap(), &bigval[..]);
    let bigkey = vec![b'k'; 300];
    zm.set(&bigkey, b"x").unwrap();
    assert_eq!(zm.get(&bigkey).unwrap(), b"x");
    assert!(zm.check_integrity());
}

#[test]
fn count_saturates_then_rescans() {
    let mut zm = Zipmap::new().unwrap();
    let keys: Vec<Vec<u8>> = (0..300u32).map(|i| format!("k{i}").into_bytes()).collect();
    for k in &keys {
        zm.set(k, b"v").unwrap();
    }
    // the count byte is pinned at the saturation marker; a walk still counts
    assert_eq!(zm.as_bytes()[0], 254);
    assert_eq!(zm.len(), 300);
    assert_eq!(zm.as_bytes()[0], 254);
    for k in &keys[..60] {
        assert!(zm.delete(k).unwrap());
    }
    // dropping back under the marker lets the walk re-store the exact count
    assert_eq!(zm.len(), 240);
    assert_eq!(zm.as_bytes()[0], 240);
    assert_eq!(zm.len(), 240);
}

#[test]
fn update_and_delete_heavy() {
    let mut zm = Zipmap::new().unwrap();
    for i in 0..64u32 {
        zm.set(format!("key{i}").as_bytes(), format!("val{i}").as_bytes())
            .unwrap();
    }
    for i in (0..64u32).step_by(2) {
        zm.set(format!("key{i}").as_bytes(), b"rewritten-longer-value")
            .unwrap();
    }
    for i in (1..64u32).step_by(2) {
        assert!(zm.delete(format!("key{i}").as_bytes()).unwrap());
    }
    assert_eq!(zm.len(), 32);
    for i in (0..64u32).step_by(2) {
        assert_eq!(
            zm.get(format!("key{i}").as_bytes()).unwrap(),
            b"rewritten-longer-value"
        );
    }
    assert!(zm.check_integrity());
    assert_eq!(zm.blob_len(), zm.memory_usage());
}
