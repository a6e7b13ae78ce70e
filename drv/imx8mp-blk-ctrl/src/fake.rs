// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A recording host platform for the driver's tests.
//!
//! Every handle the driver gets from [`FakePlatform`] shares one [`World`],
//! which logs each call in order, counts the references held on each
//! resource, and can be told to fail any step.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use drv_blk_ctrl_api::{
    BusRail, Clock, HwError, NotifierChain, Platform, PowerDevice, PowerEvent,
    PowerNotifier, RegisterBlock,
};
use embedded_hal::blocking::delay::DelayUs;

use crate::config::{
    BitAction, BlkCtrlConfig, DomainDesc, HandshakeDesc, RegmapConfig,
};
use crate::BlkCtrl;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Call {
    RegRead(u32),
    RegWrite(u32, u32),
    ClkGet(&'static str),
    ClkEnable(&'static str),
    ClkDisable(&'static str),
    ClkPut(&'static str),
    BusAttach,
    BusGet,
    BusPut,
    BusDetach,
    AddNotifier,
    RemoveNotifier,
    DevAttach(&'static str),
    DevGet(&'static str),
    DevPut(&'static str),
    DevDetach(&'static str),
    GenpdInit(usize),
    GenpdRemove(usize),
    AddProvider(usize),
    DelProvider,
    Delay(u32),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Fault {
    MapRegisters,
    ClockGet(&'static str),
    ClockEnable(&'static str),
    BusAttach,
    BusResume,
    BusPut,
    DevAttach(&'static str),
    DevResume(&'static str),
    DevPut(&'static str),
    GenpdInit(usize),
    AddProvider,
    AddNotifier,
}

/// Something references are counted on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Res {
    Bus,
    Dev(&'static str),
    Clk(&'static str),
}

pub struct World {
    log: Mutex<Vec<Call>>,
    faults: Mutex<HashSet<Fault>>,
    registers: Mutex<HashMap<u32, u32>>,
    refs: Mutex<HashMap<Res, i64>>,
    /// Listeners on the bus rail, added through `BusRail::add_notifier`.
    pub bus_events: NotifierChain<'static, 2>,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(vec![]),
            faults: Mutex::new(HashSet::new()),
            registers: Mutex::new(HashMap::new()),
            refs: Mutex::new(HashMap::new()),
            bus_events: NotifierChain::new(),
        })
    }

    pub fn platform(self: &Arc<Self>) -> FakePlatform {
        FakePlatform {
            world: self.clone(),
        }
    }

    pub fn regs(self: &Arc<Self>) -> FakeRegs {
        FakeRegs {
            world: self.clone(),
        }
    }

    /// Register access that bypasses the log.
    pub fn poke(&self, offset: u32, value: u32) {
        self.registers.lock().unwrap().insert(offset, value);
    }

    pub fn peek(&self, offset: u32) -> u32 {
        *self.registers.lock().unwrap().get(&offset).unwrap_or(&0)
    }

    pub fn fail(&self, fault: Fault) {
        self.faults.lock().unwrap().insert(fault);
    }

    pub fn heal(&self, fault: Fault) {
        self.faults.lock().unwrap().remove(&fault);
    }

    fn failing(&self, fault: Fault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }

    pub fn take_log(&self) -> Vec<Call> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    /// The log without register reads.
    pub fn take_ops(&self) -> Vec<Call> {
        self.take_log()
            .into_iter()
            .filter(|c| !matches!(c, Call::RegRead(_)))
            .collect()
    }

    pub fn refs(&self, res: Res) -> i64 {
        *self.refs.lock().unwrap().get(&res).unwrap_or(&0)
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    /// Adjusts the count on `res`, returning the old value.
    fn adjust(&self, res: Res, by: i64) -> i64 {
        let mut refs = self.refs.lock().unwrap();
        let count = refs.entry(res).or_insert(0);
        let old = *count;
        *count += by;
        old
    }
}

pub struct FakePlatform {
    world: Arc<World>,
}

pub struct FakeRegs {
    world: Arc<World>,
}

impl RegisterBlock for FakeRegs {
    fn read(&self, offset: u32) -> u32 {
        self.world.record(Call::RegRead(offset));
        let v = self.world.peek(offset);
        // Widen the window between a read and the write that follows it.
        std::thread::yield_now();
        v
    }

    fn write(&self, offset: u32, value: u32) {
        self.world.record(Call::RegWrite(offset, value));
        self.world.poke(offset, value);
    }
}

pub struct FakeClock {
    world: Arc<World>,
    name: &'static str,
}

impl Clock for FakeClock {
    fn enable(&self) -> Result<(), HwError> {
        self.world.record(Call::ClkEnable(self.name));
        if self.world.failing(Fault::ClockEnable(self.name)) {
            return Err(HwError::Io);
        }
        self.world.adjust(Res::Clk(self.name), 1);
        Ok(())
    }

    fn disable(&self) {
        self.world.record(Call::ClkDisable(self.name));
        self.world.adjust(Res::Clk(self.name), -1);
    }
}

impl Drop for FakeClock {
    fn drop(&mut self) {
        self.world.record(Call::ClkPut(self.name));
    }
}

pub struct FakeDev {
    world: Arc<World>,
    name: &'static str,
}

impl PowerDevice for FakeDev {
    fn resume_and_get(&self) -> Result<(), HwError> {
        self.world.record(Call::DevGet(self.name));
        if self.world.failing(Fault::DevResume(self.name)) {
            return Err(HwError::Timeout);
        }
        self.world.adjust(Res::Dev(self.name), 1);
        Ok(())
    }

    fn put(&self) -> Result<(), HwError> {
        self.world.record(Call::DevPut(self.name));
        self.world.adjust(Res::Dev(self.name), -1);
        if self.world.failing(Fault::DevPut(self.name)) {
            return Err(HwError::Busy);
        }
        Ok(())
    }

    fn detach(self) {
        self.world.record(Call::DevDetach(self.name));
    }
}

/// The bus rail. Its first reference powers it up and its last one powers
/// it down, raising events on the world's chain as it goes.
pub struct FakeBus {
    world: Arc<World>,
}

impl PowerDevice for FakeBus {
    fn resume_and_get(&self) -> Result<(), HwError> {
        let world = &self.world;
        world.record(Call::BusGet);
        if world.failing(Fault::BusResume) {
            return Err(HwError::Timeout);
        }
        if world.adjust(Res::Bus, 1) == 0
            && world.bus_events.call(PowerEvent::On).is_err()
        {
            world.adjust(Res::Bus, -1);
            return Err(HwError::Rejected);
        }
        Ok(())
    }

    fn put(&self) -> Result<(), HwError> {
        let world = &self.world;
        world.record(Call::BusPut);
        let old = world.adjust(Res::Bus, -1);
        if world.failing(Fault::BusPut) {
            return Err(HwError::Busy);
        }
        if old == 1 {
            world
                .bus_events
                .call_robust(PowerEvent::PreOff, PowerEvent::On)
                .map_err(|_| HwError::Busy)?;
            world
                .bus_events
                .call(PowerEvent::Off)
                .map_err(|_| HwError::Busy)?;
        }
        Ok(())
    }

    fn detach(self) {
        self.world.record(Call::BusDetach);
    }
}

impl BusRail for FakeBus {
    fn add_notifier(
        &self,
        nb: &'static (dyn PowerNotifier + Sync),
    ) -> Result<(), HwError> {
        self.world.record(Call::AddNotifier);
        if self.world.failing(Fault::AddNotifier) {
            return Err(HwError::Busy);
        }
        self.world.bus_events.register(nb)
    }

    fn remove_notifier(&self, nb: &'static (dyn PowerNotifier + Sync)) {
        self.world.record(Call::RemoveNotifier);
        self.world.bus_events.unregister(nb);
    }
}

pub struct FakeDelay {
    world: Arc<World>,
}

impl DelayUs<u32> for FakeDelay {
    fn delay_us(&mut self, us: u32) {
        self.world.record(Call::Delay(us));
    }
}

impl Platform for FakePlatform {
    type Regs = FakeRegs;
    type Clock = FakeClock;
    type Power = FakeDev;
    type Bus = FakeBus;
    type Delay = FakeDelay;

    fn map_registers(&self) -> Result<FakeRegs, HwError> {
        if self.world.failing(Fault::MapRegisters) {
            return Err(HwError::Io);
        }
        Ok(self.world.regs())
    }

    fn clock(&self, name: &'static str) -> Result<FakeClock, HwError> {
        self.world.record(Call::ClkGet(name));
        if self.world.failing(Fault::ClockGet(name)) {
            return Err(HwError::NotFound);
        }
        Ok(FakeClock {
            world: self.world.clone(),
            name,
        })
    }

    fn attach_bus(&self, _name: &'static str) -> Result<FakeBus, HwError> {
        self.world.record(Call::BusAttach);
        if self.world.failing(Fault::BusAttach) {
            return Err(HwError::NotFound);
        }
        Ok(FakeBus {
            world: self.world.clone(),
        })
    }

    fn attach_domain(&self, name: &'static str) -> Result<FakeDev, HwError> {
        self.world.record(Call::DevAttach(name));
        if self.world.failing(Fault::DevAttach(name)) {
            return Err(HwError::NotFound);
        }
        Ok(FakeDev {
            world: self.world.clone(),
            name,
        })
    }

    fn delay(&self) -> FakeDelay {
        FakeDelay {
            world: self.world.clone(),
        }
    }

    fn genpd_init(
        &self,
        index: usize,
        _name: &'static str,
    ) -> Result<(), HwError> {
        self.world.record(Call::GenpdInit(index));
        if self.world.failing(Fault::GenpdInit(index)) {
            return Err(HwError::Io);
        }
        Ok(())
    }

    fn genpd_remove(&self, index: usize) {
        self.world.record(Call::GenpdRemove(index));
    }

    fn add_provider(&self, count: usize) -> Result<(), HwError> {
        self.world.record(Call::AddProvider(count));
        if self.world.failing(Fault::AddProvider) {
            return Err(HwError::Rejected);
        }
        Ok(())
    }

    fn del_provider(&self) {
        self.world.record(Call::DelProvider);
    }
}

/// Probes a controller that lives for the rest of the test and subscribes
/// it to the world's bus rail.
pub fn leak_probe<const N: usize>(
    world: &Arc<World>,
    config: &'static BlkCtrlConfig,
) -> &'static BlkCtrl<'static, FakePlatform, N> {
    let platform: &'static FakePlatform =
        Box::leak(Box::new(world.platform()));
    let bc: &'static BlkCtrl<'static, FakePlatform, N> =
        Box::leak(Box::new(BlkCtrl::probe(platform, config).unwrap()));
    bc.subscribe().unwrap();
    bc
}

//
// A block shaped to hit every corner: two clocked domains sharing a word, one
// with neither clock nor gate, one gated without a clock in another word, and
// one more clocked domain in the first word.
//

pub const TEST_NUM_DOMAINS: usize = 5;

pub const TEST_DOMAINS: [DomainDesc; TEST_NUM_DOMAINS] = [
    DomainDesc {
        name: "a",
        clk_name: Some("clk-a"),
        gpc_name: "pd-a",
        gate: Some(BitAction::new(0x0, 1 << 0)),
    },
    DomainDesc {
        name: "b",
        clk_name: Some("clk-b"),
        gpc_name: "pd-b",
        gate: Some(BitAction::new(0x0, 1 << 1)),
    },
    DomainDesc {
        name: "c",
        clk_name: None,
        gpc_name: "pd-c",
        gate: None,
    },
    DomainDesc {
        name: "d",
        clk_name: None,
        gpc_name: "pd-d",
        gate: Some(BitAction::new(0x4, 1 << 0)),
    },
    DomainDesc {
        name: "e",
        clk_name: Some("clk-e"),
        gpc_name: "pd-e",
        gate: Some(BitAction::new(0x0, 1 << 5)),
    },
];

pub const TEST_CONFIG: BlkCtrlConfig = BlkCtrlConfig {
    name: "test-blk-ctrl",
    bus_name: "bus",
    regmap: RegmapConfig {
        max_register: 0x24,
        stride: 4,
    },
    domains: &TEST_DOMAINS,
    handshake: Some(HandshakeDesc {
        domain: 0,
        settle_us: 5,
    }),
};

static_assertions::const_assert!(TEST_CONFIG.is_valid());
