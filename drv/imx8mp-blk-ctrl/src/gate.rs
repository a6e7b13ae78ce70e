// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gate bits in the shared control register.

use drv_blk_ctrl_api::RegisterBlock;
use ringbuf::*;

use crate::config::{BitAction, RegmapConfig};
use crate::lock::RegisterLock;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Read(u32, u32),
    Write(u32, u32),
}
ringbuf!(Trace, 16, Trace::None);

/// A register block restricted to the window described by a
/// [`RegmapConfig`].
pub struct Regmap<R> {
    regs: R,
    config: RegmapConfig,
}

impl<R: RegisterBlock> Regmap<R> {
    pub fn new(regs: R, config: RegmapConfig) -> Self {
        Self { regs, config }
    }

    fn check(&self, offset: u32) {
        // Gate offsets are validated when the config is compiled, so getting
        // here with a bad one is a driver bug.
        assert!(self.config.contains(offset));
    }

    pub fn read(&self, offset: u32) -> u32 {
        self.check(offset);
        let v = self.regs.read(offset);
        ringbuf_entry!(Trace::Read(offset, v));
        v
    }

    pub fn write(&self, offset: u32, value: u32) {
        self.check(offset);
        ringbuf_entry!(Trace::Write(offset, value));
        self.regs.write(offset, value);
    }

    /// Read-modify-write of the bits in `mask`. Not atomic by itself; see
    /// [`GateRegs`].
    pub fn update_bits(&self, offset: u32, mask: u32, value: u32) {
        let old = self.read(offset);
        let new = (old & !mask) | (value & mask);
        if new != old {
            self.write(offset, new);
        }
    }
}

/// The controller's shared control register, behind its register lock.
///
/// Several domains keep bits in the same word, so each set/clear is a full
/// read-modify-write done under the lock; without it, two domains toggling
/// their bits at once could write back each other's stale value.
pub struct GateRegs<R> {
    map: RegisterLock<Regmap<R>>,
}

impl<R: RegisterBlock> GateRegs<R> {
    pub fn new(regs: R, config: RegmapConfig) -> Self {
        Self {
            map: RegisterLock::new(Regmap::new(regs, config)),
        }
    }

    pub fn set(&self, action: BitAction) {
        self.map
            .with(|m| m.update_bits(action.offset, action.mask, action.mask));
    }

    pub fn clear(&self, action: BitAction) {
        self.map.with(|m| m.update_bits(action.offset, action.mask, 0));
    }
}
