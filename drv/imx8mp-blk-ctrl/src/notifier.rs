// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus rail handshake.
//!
//! On the HSIO block the USB controller takes part in the bus rail's own
//! power transitions (the ADB handshake): the handshake only proceeds while
//! the USB clock runs and its module-enable bit is set. That has nothing to
//! do with whether the USB domain is on, so it is driven from the bus rail's
//! power events rather than from the domain's transitions.

use core::sync::atomic::Ordering;

use drv_blk_ctrl_api::{Clock, NotifyBad, Platform, PowerEvent, PowerNotifier};
use embedded_hal::blocking::delay::DelayUs;
use ringbuf::ringbuf_entry_root;

use crate::config::BitAction;
use crate::{BlkCtrl, Trace};

impl<P: Platform, const N: usize> BlkCtrl<'_, P, N> {
    fn handshake(&self) -> Option<(&P::Clock, BitAction, u32)> {
        let hs = self.config.handshake?;
        let domain = self.domains.get(hs.domain)?;
        Some((domain.clock()?, domain.gate()?, hs.settle_us))
    }

    fn enable_handshake_clock(
        clk: &P::Clock,
        event: PowerEvent,
    ) -> Result<(), NotifyBad> {
        clk.enable().map_err(|e| {
            ringbuf_entry_root!(Trace::HandshakeClockFailed(event, e));
            NotifyBad
        })
    }
}

impl<P: Platform, const N: usize> PowerNotifier for BlkCtrl<'_, P, N> {
    fn notify(&self, event: PowerEvent) -> Result<(), NotifyBad> {
        let Some((clk, gate, settle_us)) = self.handshake() else {
            return Ok(());
        };
        ringbuf_entry_root!(Trace::Handshake(event));

        match event {
            PowerEvent::On => {
                // enable the clock for a moment so the power-on handshake
                // can proceed
                Self::enable_handshake_clock(clk, event)?;
                self.regs.set(gate);
                self.delay.lock().delay_us(settle_us);
                self.regs.clear(gate);
                clk.disable();

                // If we are being powered back up because a power-down was
                // called off after PreOff, drop the clock it left running.
                if self.handshake_held.swap(false, Ordering::AcqRel) {
                    clk.disable();
                }
            }
            PowerEvent::PreOff => {
                // the power-down handshake needs the clock running and the
                // bit set until the rail is actually off
                Self::enable_handshake_clock(clk, event)?;
                self.regs.set(gate);
                self.handshake_held.store(true, Ordering::Release);
            }
            PowerEvent::Off => {
                if self.handshake_held.swap(false, Ordering::AcqRel) {
                    clk.disable();
                }
            }
        }
        Ok(())
    }
}
