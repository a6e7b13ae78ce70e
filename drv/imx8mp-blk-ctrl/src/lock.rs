// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two lock classes of a block controller.
//!
//! A domain transition holds that domain's [`DomainLock`] for its whole
//! multi-step sequence, and in the middle of it touches the shared control
//! register under the controller's [`RegisterLock`]. Resuming the bus rail
//! from inside a transition can also run the bus rail's event handlers, which
//! take the register lock again. That nesting looks like a cycle to anything
//! that only sees "a lock inside a lock", so the two classes are separate
//! types.
//!
//! The order is always `DomainLock` -> `RegisterLock`. The register lock is
//! only reachable through [`RegisterLock::with`], and its one owner,
//! `GateRegs`, keeps it private and only runs a register read-modify-write
//! inside the closure. Nothing in this crate calls out while holding it.
//! That is a convention of `gate.rs`, not something the closure type rules
//! out: a closure could still capture another lock.

use spin::{Mutex, MutexGuard};

/// Per-domain transition lock. Different domains never contend.
pub struct DomainLock<T>(Mutex<T>);

impl<T> DomainLock<T> {
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }
}

/// Controller-wide lock over the shared register block. Always innermost.
pub struct RegisterLock<T>(Mutex<T>);

impl<T> RegisterLock<T> {
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(value))
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.0.lock();
        f(&guard)
    }
}
