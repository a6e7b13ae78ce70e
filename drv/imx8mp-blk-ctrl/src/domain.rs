// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power sequencing of a single block-controller domain.
//!
//! Powering a domain on touches four resources in a fixed order:
//!
//! 1. the shared bus rail, which clocks and powers the register block;
//! 2. the domain's clock, if it has one;
//! 3. the domain's gate bit in the shared control register, if it has one;
//! 4. the domain's upstream (GPC) power domain.
//!
//! A failure at any step undoes the steps before it in reverse. Powering off
//! quiesces the gate bit and clock first, while the register block is still
//! powered, then lets go of the upstream domain and finally the bus rail.
//!
//! A strict parent/child power domain hierarchy can't express this ordering,
//! which is why the bus rail and upstream domain are driven as runtime-PM
//! references from inside the transition instead.

use core::sync::atomic::{AtomicU8, Ordering};

use drv_blk_ctrl_api::{BlkCtrlError, Clock, Platform, PowerDevice, PowerState};
use ringbuf::ringbuf_entry_root;

use crate::config::{BitAction, DomainDesc};
use crate::gate::GateRegs;
use crate::lock::DomainLock;
use crate::Trace;

pub struct Domain<P: Platform> {
    index: usize,
    desc: &'static DomainDesc,
    clk: Option<P::Clock>,
    power_dev: P::Power,
    /// Consumer references. The lock doubles as the transition lock.
    users: DomainLock<u32>,
    state: AtomicU8,
}

impl<P: Platform> Domain<P> {
    /// Looks up the resources named by `desc` and registers the domain with
    /// the generic power domain framework. On failure nothing is left held.
    pub(crate) fn attach(
        platform: &P,
        index: usize,
        desc: &'static DomainDesc,
    ) -> Result<Self, BlkCtrlError> {
        let clk = desc
            .clk_name
            .map(|name| platform.clock(name))
            .transpose()
            .map_err(|e| {
                ringbuf_entry_root!(Trace::ClockLookupFailed(index, e));
                BlkCtrlError::RegistrationFailed
            })?;

        let power_dev = platform.attach_domain(desc.gpc_name).map_err(|e| {
            ringbuf_entry_root!(Trace::DomainAttachFailed(index, e));
            BlkCtrlError::RegistrationFailed
        })?;

        if let Err(e) = platform.genpd_init(index, desc.name) {
            ringbuf_entry_root!(Trace::GenpdInitFailed(index, e));
            power_dev.detach();
            return Err(BlkCtrlError::RegistrationFailed);
        }

        Ok(Self {
            index,
            desc,
            clk,
            power_dev,
            users: DomainLock::new(0),
            state: AtomicU8::new(PowerState::Off as u8),
        })
    }

    /// Undoes `attach`. The clock handle is released on drop.
    pub(crate) fn release(self, platform: &P) {
        platform.genpd_remove(self.index);
        self.power_dev.detach();
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn state(&self) -> PowerState {
        match self.state.load(Ordering::Acquire) {
            s if s == PowerState::On as u8 => PowerState::On,
            s if s == PowerState::Transitioning as u8 => {
                PowerState::Transitioning
            }
            _ => PowerState::Off,
        }
    }

    fn set_state(&self, state: PowerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Number of outstanding `get` references. Waits out a transition in
    /// progress.
    pub fn users(&self) -> u32 {
        *self.users.lock()
    }

    pub(crate) fn clock(&self) -> Option<&P::Clock> {
        self.clk.as_ref()
    }

    pub(crate) fn gate(&self) -> Option<BitAction> {
        self.desc.gate
    }

    pub(crate) fn upstream(&self) -> &P::Power {
        &self.power_dev
    }

    pub(crate) fn power_on(
        &self,
        regs: &GateRegs<P::Regs>,
        bus: &P::Bus,
    ) -> Result<(), BlkCtrlError> {
        let _transition = self.users.lock();
        self.power_on_locked(regs, bus)
    }

    pub(crate) fn power_off(&self, regs: &GateRegs<P::Regs>, bus: &P::Bus) {
        let _transition = self.users.lock();
        self.power_off_locked(regs, bus)
    }

    /// Takes a consumer reference, powering on for the first one. A failed
    /// power-on leaves the count untouched.
    pub(crate) fn get(
        &self,
        regs: &GateRegs<P::Regs>,
        bus: &P::Bus,
    ) -> Result<(), BlkCtrlError> {
        let mut users = self.users.lock();
        if *users == 0 {
            self.power_on_locked(regs, bus)?;
        }
        *users += 1;
        Ok(())
    }

    /// Drops a consumer reference, powering off with the last one.
    pub(crate) fn put(&self, regs: &GateRegs<P::Regs>, bus: &P::Bus) {
        let mut users = self.users.lock();
        match *users {
            0 => ringbuf_entry_root!(Trace::UnbalancedPut(self.index)),
            1 => {
                *users = 0;
                self.power_off_locked(regs, bus);
            }
            _ => *users -= 1,
        }
    }

    /// Powers off and forgets any outstanding references. Used when the
    /// controller goes away underneath its consumers.
    pub(crate) fn shutdown(&self, regs: &GateRegs<P::Regs>, bus: &P::Bus) {
        let mut users = self.users.lock();
        *users = 0;
        self.power_off_locked(regs, bus);
    }

    fn power_on_locked(
        &self,
        regs: &GateRegs<P::Regs>,
        bus: &P::Bus,
    ) -> Result<(), BlkCtrlError> {
        if self.state() == PowerState::On {
            return Ok(());
        }

        ringbuf_entry_root!(Trace::PowerOn(self.index));
        self.set_state(PowerState::Transitioning);
        let result = self.sequence_on(regs, bus);
        self.set_state(match result {
            Ok(()) => PowerState::On,
            Err(_) => PowerState::Off,
        });
        result
    }

    fn sequence_on(
        &self,
        regs: &GateRegs<P::Regs>,
        bus: &P::Bus,
    ) -> Result<(), BlkCtrlError> {
        // make sure bus domain is awake
        if let Err(e) = bus.resume_and_get() {
            ringbuf_entry_root!(Trace::BusResumeFailed(self.index, e));
            return Err(BlkCtrlError::UpstreamUnavailable);
        }

        if let Some(clk) = &self.clk {
            if let Err(e) = clk.enable() {
                ringbuf_entry_root!(Trace::ClockEnableFailed(self.index, e));
                self.put_bus(bus);
                return Err(BlkCtrlError::ClockEnableFailed);
            }
        }

        if let Some(gate) = self.desc.gate {
            regs.set(gate);
        }

        if let Err(e) = self.power_dev.resume_and_get() {
            ringbuf_entry_root!(Trace::UpstreamResumeFailed(self.index, e));
            if let Some(gate) = self.desc.gate {
                regs.clear(gate);
            }
            if let Some(clk) = &self.clk {
                clk.disable();
            }
            self.put_bus(bus);
            return Err(BlkCtrlError::UpstreamAttachFailed);
        }

        Ok(())
    }

    /// Powering off can't fail: anything that goes wrong is recorded and
    /// the domain ends up Off regardless, so shutdown is never held up.
    fn power_off_locked(&self, regs: &GateRegs<P::Regs>, bus: &P::Bus) {
        if self.state() != PowerState::On {
            return;
        }

        ringbuf_entry_root!(Trace::PowerOff(self.index));
        self.set_state(PowerState::Transitioning);

        if let Some(gate) = self.desc.gate {
            regs.clear(gate);
        }
        if let Some(clk) = &self.clk {
            clk.disable();
        }
        if let Err(e) = self.power_dev.put() {
            ringbuf_entry_root!(Trace::UpstreamPutFailed(self.index, e));
        }
        self.put_bus(bus);

        self.set_state(PowerState::Off);
    }

    fn put_bus(&self, bus: &P::Bus) {
        if let Err(e) = bus.put() {
            ringbuf_entry_root!(Trace::BusPutFailed(self.index, e));
        }
    }
}
