// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the i.MX8MP HSIO block controller.
//!
//! The HSIO block controller is a small register block in front of the USB
//! and PCIe units. Each unit sits in its own power domain, but before any of
//! them can be used three other things have to happen in the right order:
//! the shared bus rail (which powers the register block) has to be up, the
//! unit's clock has to run, and the unit's module-enable bit in the shared
//! control register has to be set. Only then is the unit's upstream power
//! domain in the general power controller (GPC) brought up.
//!
//! [`BlkCtrl`] exposes one power domain per unit, each sequenced as described
//! in [`domain`](crate::Domain). Once subscribed, the controller also
//! listens to the bus rail's own power events, which the USB unit needs to
//! complete a handshake (see the `notifier` module).
//!
//! The driver is generic over a [`Platform`] that provides the register
//! block, clocks, power domains and the generic power domain framework, so
//! that it can be exercised on the host.

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicBool, Ordering};

use drv_blk_ctrl_api::{
    BlkCtrlError, BusRail, HwError, Platform, PowerDevice, PowerEvent,
    PowerState,
};
use ringbuf::*;

pub mod config;
mod domain;
mod gate;
mod lock;
mod notifier;
mod sleep;

#[cfg(test)]
mod fake;

pub use domain::Domain;

use config::BlkCtrlConfig;
use gate::GateRegs;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    InvalidConfig,
    TooManyDomains(usize),
    MapRegistersFailed(HwError),
    BusAttachFailed(HwError),
    ClockLookupFailed(usize, HwError),
    DomainAttachFailed(usize, HwError),
    GenpdInitFailed(usize, HwError),
    ProviderFailed(HwError),
    Unwind(usize),
    Probed(usize),
    NotifierFailed(HwError),
    Subscribed,
    Unsubscribed,

    PowerOn(usize),
    PowerOff(usize),
    BusResumeFailed(usize, HwError),
    ClockEnableFailed(usize, HwError),
    UpstreamResumeFailed(usize, HwError),
    UpstreamPutFailed(usize, HwError),
    BusPutFailed(usize, HwError),
    UnbalancedPut(usize),

    Handshake(PowerEvent),
    HandshakeClockFailed(PowerEvent, HwError),

    SuspendBusFailed(HwError),
    SuspendDomainFailed(usize, HwError),
    SuspendPutFailed(usize, HwError),
    SuspendBusPutFailed(HwError),
    Resumed,

    Removed,
}

ringbuf!(Trace, 64, Trace::None);

/// A probed block controller with up to `N` domains.
pub struct BlkCtrl<'a, P: Platform, const N: usize> {
    platform: &'a P,
    config: &'static BlkCtrlConfig,
    regs: GateRegs<P::Regs>,
    bus: P::Bus,
    domains: heapless::Vec<Domain<P>, N>,
    delay: spin::Mutex<P::Delay>,
    /// Set between a bus rail `PreOff` and the matching `Off` (or `On`),
    /// while the handshake clock is deliberately left running.
    handshake_held: AtomicBool,
    /// Set between `suspend` and `resume`.
    suspended: AtomicBool,
    /// Set while the bus rail delivers its events to us.
    subscribed: AtomicBool,
}

impl<'a, P: Platform, const N: usize> BlkCtrl<'a, P, N> {
    /// Acquires everything `config` describes and registers its domains.
    ///
    /// On failure, whatever had been acquired is released in reverse order
    /// and `RegistrationFailed` is returned.
    pub fn probe(
        platform: &'a P,
        config: &'static BlkCtrlConfig,
    ) -> Result<Self, BlkCtrlError> {
        if !config.is_valid() {
            ringbuf_entry!(Trace::InvalidConfig);
            return Err(BlkCtrlError::RegistrationFailed);
        }
        if config.domains.len() > N {
            ringbuf_entry!(Trace::TooManyDomains(config.domains.len()));
            return Err(BlkCtrlError::RegistrationFailed);
        }

        let regs = platform.map_registers().map_err(|e| {
            ringbuf_entry!(Trace::MapRegistersFailed(e));
            BlkCtrlError::RegistrationFailed
        })?;

        let bus = platform.attach_bus(config.bus_name).map_err(|e| {
            ringbuf_entry!(Trace::BusAttachFailed(e));
            BlkCtrlError::RegistrationFailed
        })?;

        let mut domains = heapless::Vec::new();
        for (index, desc) in config.domains.iter().enumerate() {
            let domain = match Domain::attach(platform, index, desc) {
                Ok(domain) => domain,
                Err(e) => {
                    Self::unwind(platform, domains, bus);
                    return Err(e);
                }
            };
            if let Err(domain) = domains.push(domain) {
                // Can't happen after the length check above, but the
                // domain still has to be let go of.
                domain.release(platform);
                Self::unwind(platform, domains, bus);
                return Err(BlkCtrlError::RegistrationFailed);
            }
        }

        if let Err(e) = platform.add_provider(domains.len()) {
            ringbuf_entry!(Trace::ProviderFailed(e));
            Self::unwind(platform, domains, bus);
            return Err(BlkCtrlError::RegistrationFailed);
        }

        ringbuf_entry!(Trace::Probed(domains.len()));
        Ok(Self {
            platform,
            config,
            regs: GateRegs::new(regs, config.regmap),
            bus,
            domains,
            delay: spin::Mutex::new(platform.delay()),
            handshake_held: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
        })
    }

    fn unwind(
        platform: &P,
        mut domains: heapless::Vec<Domain<P>, N>,
        bus: P::Bus,
    ) {
        while let Some(domain) = domains.pop() {
            ringbuf_entry!(Trace::Unwind(domain.index()));
            domain.release(platform);
        }
        bus.detach();
    }

    /// Tears the controller down. References still held for a `suspend`
    /// are dropped, then domains still on are powered off regardless of
    /// outstanding references.
    ///
    /// A controller subscribed to its bus rail is borrowed for `'static`
    /// and so can never be handed in here; there is no subscription left
    /// to drop.
    pub fn remove(self) {
        self.platform.del_provider();
        self.resume();

        let Self {
            platform,
            regs,
            bus,
            domains,
            ..
        } = self;
        for domain in &domains {
            domain.shutdown(&regs, &bus);
        }
        Self::unwind(platform, domains, bus);
        ringbuf_entry!(Trace::Removed);
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    /// Resolves a consumer's domain specifier, which must be exactly one
    /// cell holding the domain index.
    pub fn xlate(&self, args: &[u32]) -> Result<&Domain<P>, BlkCtrlError> {
        match args {
            [index] => self.domain(*index as usize),
            _ => Err(BlkCtrlError::BadDomain),
        }
    }

    pub fn domain(&self, index: usize) -> Result<&Domain<P>, BlkCtrlError> {
        self.domains.get(index).ok_or(BlkCtrlError::BadDomain)
    }

    pub fn state(&self, index: usize) -> Result<PowerState, BlkCtrlError> {
        Ok(self.domain(index)?.state())
    }

    /// Powers domain `index` on. A no-op if it is already on.
    pub fn power_on(&self, index: usize) -> Result<(), BlkCtrlError> {
        self.domain(index)?.power_on(&self.regs, &self.bus)
    }

    /// Powers domain `index` off. A no-op if it is already off; otherwise
    /// it cannot fail.
    pub fn power_off(&self, index: usize) -> Result<(), BlkCtrlError> {
        self.domain(index)?.power_off(&self.regs, &self.bus);
        Ok(())
    }

    /// Takes a consumer reference on domain `index`, powering it on if it
    /// is the first.
    pub fn get(&self, index: usize) -> Result<(), BlkCtrlError> {
        self.domain(index)?.get(&self.regs, &self.bus)
    }

    /// Drops a consumer reference on domain `index`.
    pub fn put(&self, index: usize) -> Result<(), BlkCtrlError> {
        self.domain(index)?.put(&self.regs, &self.bus);
        Ok(())
    }
}

impl<P: Platform, const N: usize> BlkCtrl<'static, P, N>
where
    Self: Sync + 'static,
{
    /// Has the bus rail deliver its power events to this controller, which
    /// runs the handshake on them. A no-op if already subscribed.
    pub fn subscribe(&'static self) -> Result<(), BlkCtrlError> {
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.bus.add_notifier(self) {
            self.subscribed.store(false, Ordering::Release);
            ringbuf_entry!(Trace::NotifierFailed(e));
            return Err(BlkCtrlError::RegistrationFailed);
        }
        ringbuf_entry!(Trace::Subscribed);
        Ok(())
    }

    /// Stops bus rail events reaching this controller.
    pub fn unsubscribe(&'static self) {
        if self.subscribed.swap(false, Ordering::AcqRel) {
            self.bus.remove_notifier(self);
            ringbuf_entry!(Trace::Unsubscribed);
        }
    }
}
