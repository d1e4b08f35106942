/* This file is part of Stornet (https://stornet.network)
 *
 * Copyright (C) 2024-2026 Stornet developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::sync::{Arc, OnceLock, Weak};

/// A weak parent pointer initialized right after the parent's `Arc` is
/// created. Lets a child struct hold a back-reference without
/// `Mutex<Option<Arc<Parent>>>` boilerplate:
///
/// ```ignore
/// let self_ = Arc::new(Parent { child: Child::new() });
/// self_.child.parent.init(self_.clone());
/// ```
pub struct LazyWeak<Parent>(OnceLock<Weak<Parent>>);

impl<Parent> LazyWeak<Parent> {
    /// Create an empty `LazyWeak`, which must immediately be followed by `init()`.
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Must be called within the same scope as `new()`.
    pub fn init(&self, parent: Arc<Parent>) {
        let parent = Arc::downgrade(&parent);
        assert!(self.0.set(parent).is_ok(), "LazyWeak initialized twice");
    }

    /// Access the `Arc<Parent>` pointer. Panics if the parent is gone,
    /// which means the caller outlived the object tree it belongs to.
    pub fn upgrade(&self) -> Arc<Parent> {
        self.0.get().expect("LazyWeak accessed before init").upgrade().unwrap()
    }
}

impl<Parent> Default for LazyWeak<Parent> {
    fn default() -> Self {
        Self::new()
    }
}
