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

/*
    The split here is deliberate: runtime conditions (the heap says no; the caller
    handed us junk input) travel as values, while API misuse is a plain panic. Never
    collapse the two.
*/

use core::fmt;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Core structure errors
pub enum CoreError {
    // runtime
    /// The heap returned a null block. The structure the operation was called on
    /// is left exactly as it was
    OutOfMemory,
    /// The structure cannot service this request in its current state (for
    /// example, an expand issued mid-migration)
    IllegalState,
    // malformed input
    /// A zero-length separator was handed to a split routine
    BadSeparator,
    /// A quoted token was never closed (or a closing quote ran into trailing
    /// garbage)
    UnbalancedQuotes,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::IllegalState => f.write_str("illegal structure state for operation"),
            Self::BadSeparator => f.write_str("bad separator"),
            Self::UnbalancedQuotes => f.write_str("unbalanced quotes in input"),
        }
    }
}

impl std::error::Error for CoreError {}
