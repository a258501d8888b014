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

mod cell;

pub use cell::{Datacell, DatacellKind};
