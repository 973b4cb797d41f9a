// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Concurrent table of individually lockable rows.
//!
//! Each row sits behind its own [`Mutex`], so locking one row never blocks
//! work on another. The [`DashMap`] shard lock is only held long enough to
//! clone the row's [`Arc`]; blocking on a row lock never pins a shard.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::hash::Hash;
use std::sync::Arc;

pub(crate) type RowGuard<T> = ArcMutexGuard<RawMutex, T>;

#[derive(Debug)]
pub(crate) struct RowTable<K, T>
where
    K: Eq + Hash,
{
    rows: DashMap<K, Arc<Mutex<T>>>,
}

impl<K, T> RowTable<K, T>
where
    K: Eq + Hash + Ord + Copy,
    T: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Adds a row, failing if the key is taken.
    ///
    /// Uses the entry API so check-and-insert is atomic.
    pub(crate) fn insert(&self, key: K, row: T) -> bool {
        match self.rows.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(row)));
                true
            }
        }
    }

    /// Blocks until the row is exclusively held.
    pub(crate) fn lock(&self, key: &K) -> Option<RowGuard<T>> {
        let row = self.rows.get(key).map(|r| Arc::clone(r.value()))?;
        Some(row.lock_arc())
    }

    /// Committed copy of a row.
    pub(crate) fn snapshot(&self, key: &K) -> Option<T> {
        let row = self.rows.get(key).map(|r| Arc::clone(r.value()))?;
        let data = row.lock();
        Some((*data).clone())
    }

    /// Committed copies of every row matching `filter`, ordered by key.
    pub(crate) fn select<F>(&self, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut rows: Vec<(K, Arc<Mutex<T>>)> = self
            .rows
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();
        rows.sort_by_key(|(key, _)| *key);

        rows.into_iter()
            .filter_map(|(_, row)| {
                let data = row.lock();
                filter(&*data).then(|| (*data).clone())
            })
            .collect()
    }

    /// Keys of every row matching `filter`.
    pub(crate) fn keys_where<F>(&self, filter: F) -> Vec<K>
    where
        F: Fn(&T) -> bool,
    {
        self.select_keys()
            .into_iter()
            .filter(|key| self.snapshot(key).is_some_and(|row| filter(&row)))
            .collect()
    }

    fn select_keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.rows.iter().map(|r| *r.key()).collect();
        keys.sort();
        keys
    }

    pub(crate) fn remove(&self, key: &K) -> Option<T> {
        let (_, row) = self.rows.remove(key)?;
        let data = row.lock();
        Some((*data).clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}
