// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! API crate for block-controller power domain drivers.
//!
//! A block controller sits between a set of power-gated units and the rest of
//! the system. This crate defines what it looks like from both sides: the
//! errors it reports to power domain consumers, and the collaborators it is
//! built out of (a register block, clocks, upstream power domains, the bus
//! rail and the generic power domain framework that registers it).
//!
//! This crate works on both the host and embedded system, so it can be used in
//! host-side tests.

#![cfg_attr(not(test), no_std)]

use embedded_hal::blocking::delay::DelayUs;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

/// Errors reported by a block controller to its callers.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u32)]
pub enum BlkCtrlError {
    /// The shared bus rail could not be resumed.
    UpstreamUnavailable = 1,
    /// A domain clock refused to enable.
    ClockEnableFailed,
    /// A domain's upstream power domain could not be resumed.
    UpstreamAttachFailed,
    /// Probe failed part way; everything acquired so far has been released.
    RegistrationFailed,
    /// A bus rail power event handler failed.
    NotifyBad,
    /// Domain lookup with a bad index or argument count.
    BadDomain,
}

impl From<BlkCtrlError> for u32 {
    fn from(rc: BlkCtrlError) -> Self {
        rc as u32
    }
}

impl TryFrom<u32> for BlkCtrlError {
    type Error = ();

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_u32(code).ok_or(())
    }
}

/// Errors returned by the hardware collaborators (clocks, power domains,
/// register mappings). These are recorded for diagnosis but are translated
/// into a [`BlkCtrlError`] before reaching a caller.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u32)]
pub enum HwError {
    NotFound = 1,
    Busy,
    Timeout,
    Io,
    Rejected,
}

impl From<HwError> for u32 {
    fn from(rc: HwError) -> Self {
        rc as u32
    }
}

/// Power state of a single domain as seen from outside.
#[derive(Copy, Clone, Debug, FromPrimitive, Eq, PartialEq)]
#[repr(u8)]
pub enum PowerState {
    Off = 0,
    /// A power-on or power-off sequence is running.
    Transitioning = 1,
    On = 2,
}

/// Lifecycle events of a power domain, delivered to its listeners.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerEvent {
    /// The domain has just been powered.
    On,
    /// The domain is about to lose power.
    PreOff,
    /// The domain has lost power.
    Off,
}

/// Returned by a listener that cannot tolerate a power event. The event
/// source treats the transition that raised it as failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NotifyBad;

impl From<NotifyBad> for BlkCtrlError {
    fn from(_: NotifyBad) -> Self {
        BlkCtrlError::NotifyBad
    }
}

/// A listener on a power domain's lifecycle.
pub trait PowerNotifier {
    fn notify(&self, event: PowerEvent) -> Result<(), NotifyBad>;
}

/// An ordered list of listeners on one power domain.
///
/// Listeners are called in registration order. The list is copied out before
/// any listener runs, so a listener may (un)register without deadlocking.
pub struct NotifierChain<'a, const N: usize> {
    listeners: spin::Mutex<heapless::Vec<&'a (dyn PowerNotifier + Sync), N>>,
}

impl<'a, const N: usize> NotifierChain<'a, N> {
    pub const fn new() -> Self {
        Self {
            listeners: spin::Mutex::new(heapless::Vec::new()),
        }
    }

    /// Adds `nb` to the end of the chain. Fails with `Busy` when full.
    pub fn register(
        &self,
        nb: &'a (dyn PowerNotifier + Sync),
    ) -> Result<(), HwError> {
        self.listeners.lock().push(nb).map_err(|_| HwError::Busy)
    }

    /// Removes `nb`, returning whether it was registered.
    pub fn unregister(&self, nb: &'a (dyn PowerNotifier + Sync)) -> bool {
        let mut listeners = self.listeners.lock();
        let target = nb as *const _ as *const u8;
        let before = listeners.len();
        *listeners = listeners
            .iter()
            .copied()
            .filter(|l| !core::ptr::eq(*l as *const _ as *const u8, target))
            .collect();
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every listener, stopping at the first failure.
    pub fn call(&self, event: PowerEvent) -> Result<(), NotifyBad> {
        let listeners = self.listeners.lock().clone();
        for l in &listeners {
            l.notify(event)?;
        }
        Ok(())
    }

    /// Delivers `event`; if listener `i` fails, listeners `[0, i)` are sent
    /// `rollback` in reverse order before the failure is returned.
    pub fn call_robust(
        &self,
        event: PowerEvent,
        rollback: PowerEvent,
    ) -> Result<(), NotifyBad> {
        let listeners = self.listeners.lock().clone();
        for (i, l) in listeners.iter().enumerate() {
            if let Err(e) = l.notify(event) {
                for prev in listeners[..i].iter().rev() {
                    // Rollback is best effort; the original failure wins.
                    let _ = prev.notify(rollback);
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<const N: usize> Default for NotifierChain<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-layout block of 32-bit registers.
///
/// Block controllers only access this through their register lock.
pub trait RegisterBlock {
    fn read(&self, offset: u32) -> u32;
    fn write(&self, offset: u32, value: u32);
}

/// A reference-counted clock gate.
pub trait Clock {
    fn enable(&self) -> Result<(), HwError>;
    fn disable(&self);
}

/// An attachment to a power domain managed outside the block controller,
/// driven through runtime power management.
pub trait PowerDevice {
    /// Takes a usage reference, powering the domain up if it is the first.
    /// On failure no reference is held.
    fn resume_and_get(&self) -> Result<(), HwError>;

    /// Drops a usage reference taken by `resume_and_get`.
    fn put(&self) -> Result<(), HwError>;

    /// Detaches from the domain, consuming the handle.
    fn detach(self);
}

/// The shared bus rail.
///
/// Listeners live as long as the rail may call them, so only a `'static`
/// listener can be added.
pub trait BusRail: PowerDevice {
    /// Delivers the rail's power events to `nb` until it is removed again.
    fn add_notifier(
        &self,
        nb: &'static (dyn PowerNotifier + Sync),
    ) -> Result<(), HwError>;

    fn remove_notifier(&self, nb: &'static (dyn PowerNotifier + Sync));
}

/// Everything a block controller needs from the system it is probed on.
pub trait Platform {
    type Regs: RegisterBlock;
    type Clock: Clock;
    type Power: PowerDevice;
    type Bus: BusRail;
    type Delay: DelayUs<u32>;

    fn map_registers(&self) -> Result<Self::Regs, HwError>;
    fn clock(&self, name: &'static str) -> Result<Self::Clock, HwError>;
    fn attach_bus(&self, name: &'static str) -> Result<Self::Bus, HwError>;
    fn attach_domain(&self, name: &'static str)
        -> Result<Self::Power, HwError>;
    fn delay(&self) -> Self::Delay;

    /// Registers domain `index` with the generic power domain framework.
    fn genpd_init(&self, index: usize, name: &'static str)
        -> Result<(), HwError>;
    fn genpd_remove(&self, index: usize);

    /// Makes domains `0..count` addressable by index through the
    /// controller's `xlate`.
    fn add_provider(&self, count: usize) -> Result<(), HwError>;
    fn del_provider(&self);
}
