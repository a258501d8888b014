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

use {crate::hash::SipSeed, core::cell::Cell, std::rc::Rc};

/// Shared handle to the store-scoped context. Every dictionary in a store
/// holds one of these; the structures themselves are single-executor, so a
/// plain [`Rc`] is the honest choice
pub type Ctx = Rc<CoreCtx>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
/// Whether dictionaries may grow eagerly. While a child process is copying
/// pages (snapshots), the store flips to `Restricted` so that a mild overload
/// does not trigger a table-sized copy-on-write storm; a catastrophic load
/// factor still forces the expand (see the force ratio in [`crate::idx`])
pub enum ResizePolicy {
    Permissive,
    Restricted,
}

/// Store-scoped ambient state: the hash seed and the resize policy. The
/// original design kept both as process globals; carrying them on a context
/// keeps multiple stores in one process honest
#[derive(Debug)]
pub struct CoreCtx {
    seed: SipSeed,
    resize: Cell<ResizePolicy>,
}

impl CoreCtx {
    pub fn new(seed: SipSeed) -> Ctx {
        log::debug!("core context initialized");
        Rc::new(Self {
            seed,
            resize: Cell::new(ResizePolicy::Permissive),
        })
    }
    /// Context with a random seed, for hosts that don't need reproducible
    /// hash values
    pub fn init_random() -> Ctx {
        Self::new(SipSeed::random())
    }
    pub fn seed(&self) -> &SipSeed {
        &self.seed
    }
    pub fn resize_policy(&self) -> ResizePolicy {
        self.resize.get()
    }
    pub fn set_resize_policy(&self, p: ResizePolicy) {
        self.resize.set(p)
    }
    #[inline(always)]
    pub(crate) fn resize_allowed(&self) -> bool {
        self.resize.get() == ResizePolicy::Permissive
    }
}
