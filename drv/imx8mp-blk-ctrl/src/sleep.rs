// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! System sleep.
//!
//! Across a system suspend the platform powers domains down behind the
//! driver's back, bottom-up, and brings them back top-down. To keep our
//! upstream domains and the bus rail from being torn down in the wrong order
//! underneath a domain that is still on, the controller holds a reference on
//! all of them from `suspend` until `resume`.

use core::sync::atomic::Ordering;

use drv_blk_ctrl_api::{BlkCtrlError, Platform, PowerDevice};
use ringbuf::ringbuf_entry_root;

use crate::{BlkCtrl, Trace};

impl<P: Platform, const N: usize> BlkCtrl<'_, P, N> {
    /// Takes a reference on the bus rail and then on every domain's upstream
    /// domain, in index order. On failure the references already taken are
    /// dropped again in reverse.
    ///
    /// Suspending an already suspended controller does nothing, so a single
    /// `resume` always undoes it.
    pub fn suspend(&self) -> Result<(), BlkCtrlError> {
        if self.suspended.load(Ordering::Acquire) {
            return Ok(());
        }

        if let Err(e) = self.bus.resume_and_get() {
            ringbuf_entry_root!(Trace::SuspendBusFailed(e));
            return Err(BlkCtrlError::UpstreamUnavailable);
        }

        for (i, domain) in self.domains.iter().enumerate() {
            if let Err(e) = domain.upstream().resume_and_get() {
                ringbuf_entry_root!(Trace::SuspendDomainFailed(i, e));
                for (j, held) in self.domains[..i].iter().enumerate().rev() {
                    Self::put_upstream(j, held.upstream());
                }
                self.put_bus();
                return Err(BlkCtrlError::UpstreamAttachFailed);
            }
        }

        self.suspended.store(true, Ordering::Release);
        Ok(())
    }

    /// Drops the references taken by `suspend`. Does nothing if the last
    /// `suspend` failed or there was none.
    pub fn resume(&self) {
        if !self.suspended.swap(false, Ordering::AcqRel) {
            return;
        }

        for (i, domain) in self.domains.iter().enumerate() {
            Self::put_upstream(i, domain.upstream());
        }
        self.put_bus();
        ringbuf_entry_root!(Trace::Resumed);
    }

    fn put_upstream(index: usize, upstream: &P::Power) {
        if let Err(e) = upstream.put() {
            ringbuf_entry_root!(Trace::SuspendPutFailed(index, e));
        }
    }

    fn put_bus(&self) {
        if let Err(e) = self.bus.put() {
            ringbuf_entry_root!(Trace::SuspendBusPutFailed(e));
        }
    }
}
