/*
 * Created on Mon Apr 29 2024
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

use {crate::mem::Dbs, core::fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DatacellKind {
    SignedInt,
    UnsignedInt,
    Float,
    Bin,
}

/// The tagged value cell heterogeneous containers hold: store-level dicts and
/// lists mix small scalars with byte-string payloads, and paying a heap
/// allocation for every integer would be silly
#[derive(Debug, Clone)]
pub enum Datacell {
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f64),
    Bin(Dbs),
}

enum_impls! {
    Datacell => {
        i64 as SignedInt,
        u64 as UnsignedInt,
        f64 as Float,
        Dbs as Bin,
    }
}

impl Datacell {
    pub fn kind(&self) -> DatacellKind {
        match self {
            Self::SignedInt(_) => DatacellKind::SignedInt,
            Self::UnsignedInt(_) => DatacellKind::UnsignedInt,
            Self::Float(_) => DatacellKind::Float,
            Self::Bin(_) => DatacellKind::Bin,
        }
    }
    pub fn signed_int(&self) -> Option<i64> {
        match self {
            Self::SignedInt(v) => Some(*v),
            _ => None,
        }
    }
    pub fn unsigned_int(&self) -> Option<u64> {
        match self {
            Self::UnsignedInt(v) => Some(*v),
            _ => None,
        }
    }
    pub fn float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
    pub fn bin(&self) -> Option<&Dbs> {
        match self {
            Self::Bin(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Datacell {
    fn from(s: &str) -> Self {
        Self::Bin(Dbs::from(s))
    }
}

// bitwise float equality: a value cell is storage, not arithmetic
impl PartialEq for Datacell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::SignedInt(a), Self::SignedInt(b)) => a == b,
            (Self::UnsignedInt(a), Self::UnsignedInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Bin(a), Self::Bin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Datacell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignedInt(v) => fmt::Display::fmt(v, f),
            Self::UnsignedInt(v) => fmt::Display::fmt(v, f),
            Self::Float(v) => fmt::Display::fmt(v, f),
            Self::Bin(v) => fmt::Display::fmt(&String::from_utf8_lossy(v.as_slice()), f),
        }
    }
}
