// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compiled-in descriptions of the block controllers we know how to drive.
//!
//! There is no runtime configuration: each hardware variant is a
//! [`BlkCtrlConfig`] constant, and the invariants the driver relies on are
//! checked when the constant is compiled.

/// A single bit in the shared control register that gates a domain's clock
/// path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BitAction {
    pub offset: u32,
    pub mask: u32,
}

impl BitAction {
    pub const fn new(offset: u32, mask: u32) -> Self {
        Self { offset, mask }
    }

    const fn overlaps(&self, other: &BitAction) -> bool {
        self.offset == other.offset && self.mask & other.mask != 0
    }
}

/// One power domain exposed by a block controller.
#[derive(Copy, Clone, Debug)]
pub struct DomainDesc {
    /// Name the domain is registered under.
    pub name: &'static str,
    /// Clock to enable while the domain is on, if any.
    pub clk_name: Option<&'static str>,
    /// Upstream power domain this one hangs off.
    pub gpc_name: &'static str,
    /// Register bit to set while the domain is on, if any.
    pub gate: Option<BitAction>,
}

/// Shape of the register window.
#[derive(Copy, Clone, Debug)]
pub struct RegmapConfig {
    pub max_register: u32,
    pub stride: u32,
}

impl RegmapConfig {
    pub const fn contains(&self, offset: u32) -> bool {
        offset <= self.max_register && offset % self.stride == 0
    }
}

/// The domain whose hardware needs a clock/register pulse while the bus rail
/// itself changes state.
#[derive(Copy, Clone, Debug)]
pub struct HandshakeDesc {
    /// Index into the domain table. Its clock and gate bit are used.
    pub domain: usize,
    /// How long the gate bit is held during the power-up pulse.
    pub settle_us: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct BlkCtrlConfig {
    pub name: &'static str,
    /// Name of the shared bus power domain.
    pub bus_name: &'static str,
    pub regmap: RegmapConfig,
    pub domains: &'static [DomainDesc],
    pub handshake: Option<HandshakeDesc>,
}

impl BlkCtrlConfig {
    /// Every gate action is a single bit inside the register window.
    pub const fn gates_well_formed(&self) -> bool {
        let mut i = 0;
        while i < self.domains.len() {
            if let Some(g) = self.domains[i].gate {
                if !g.mask.is_power_of_two() || !self.regmap.contains(g.offset)
                {
                    return false;
                }
            }
            i += 1;
        }
        true
    }

    /// No two domains own the same gate bit.
    pub const fn gates_unique(&self) -> bool {
        let mut i = 0;
        while i < self.domains.len() {
            if let Some(a) = self.domains[i].gate {
                let mut j = i + 1;
                while j < self.domains.len() {
                    if let Some(b) = self.domains[j].gate {
                        if a.overlaps(&b) {
                            return false;
                        }
                    }
                    j += 1;
                }
            }
            i += 1;
        }
        true
    }

    /// The handshake domain, if any, exists and has both a clock and a gate.
    pub const fn handshake_well_formed(&self) -> bool {
        match self.handshake {
            None => true,
            Some(hs) => {
                hs.domain < self.domains.len()
                    && self.domains[hs.domain].clk_name.is_some()
                    && self.domains[hs.domain].gate.is_some()
            }
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.regmap.stride != 0
            && self.gates_well_formed()
            && self.gates_unique()
            && self.handshake_well_formed()
    }
}

//
// i.MX8MP HSIO block
//

pub const GPR_REG0: u32 = 0x0;
pub const PCIE_CLOCK_MODULE_EN: u32 = 1 << 0;
pub const USB_CLOCK_MODULE_EN: u32 = 1 << 1;

/// Domain indices of the HSIO block, as used by consumers' lookups.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum HsioDomain {
    Usb = 0,
    UsbPhy1 = 1,
    UsbPhy2 = 2,
    Pcie = 3,
    PciePhy = 4,
}

pub const HSIO_NUM_DOMAINS: usize = 5;

pub const HSIO_DOMAINS: [DomainDesc; HSIO_NUM_DOMAINS] = [
    DomainDesc {
        name: "hsioblk-usb",
        clk_name: Some("usb"),
        gpc_name: "usb",
        gate: Some(BitAction::new(GPR_REG0, USB_CLOCK_MODULE_EN)),
    },
    DomainDesc {
        name: "hsioblk-usb-phy1",
        clk_name: None,
        gpc_name: "usb-phy1",
        gate: None,
    },
    DomainDesc {
        name: "hsioblk-usb-phy2",
        clk_name: None,
        gpc_name: "usb-phy2",
        gate: None,
    },
    DomainDesc {
        name: "hsioblk-pcie",
        clk_name: Some("pcie"),
        gpc_name: "pcie",
        gate: Some(BitAction::new(GPR_REG0, PCIE_CLOCK_MODULE_EN)),
    },
    DomainDesc {
        name: "hsioblk-pcie-phy",
        clk_name: None,
        gpc_name: "pcie-phy",
        gate: None,
    },
];

pub const IMX8MP_HSIO: BlkCtrlConfig = BlkCtrlConfig {
    name: "imx8mp-hsio-blk-ctrl",
    bus_name: "bus",
    regmap: RegmapConfig {
        max_register: 0x24,
        stride: 4,
    },
    domains: &HSIO_DOMAINS,
    // The USB block runs its ADB handshake off the bus rail's power
    // transitions, whether or not the USB domain itself is on.
    handshake: Some(HandshakeDesc {
        domain: HsioDomain::Usb as usize,
        settle_us: 5,
    }),
};

static_assertions::const_assert!(IMX8MP_HSIO.is_valid());
