//! Device families and address resolution
//!
//! Families either occupy a contiguous block of slots (Xtender 1 to 9,
//! VarioTrack and VarioString 1 to 15) addressed as `XT1`, `VT12`, ... or a
//! single fixed address (`RCC`, `BSP`, `L1`, ...) addressed by the bare tag.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use xcom_core::{AggregationType, XcomError, XcomResult};

/// Family identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyId {
    Xt,
    L1,
    L2,
    L3,
    Rcc,
    Bsp,
    Bms,
    Vt,
    Vs,
}

impl FamilyId {
    /// Family whose datapoints this family's devices expose
    ///
    /// The phase groups are Xtenders and the BMS sits in the BSP slot.
    pub fn datapoint_family(self) -> FamilyId {
        match self {
            FamilyId::L1 | FamilyId::L2 | FamilyId::L3 => FamilyId::Xt,
            FamilyId::Bms => FamilyId::Bsp,
            other => other,
        }
    }

    pub fn family(self) -> &'static DeviceFamily {
        // Every FamilyId has exactly one entry in FAMILIES
        FAMILIES
            .iter()
            .find(|family| family.id == self)
            .unwrap_or(&FAMILIES[0])
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family().tag)
    }
}

/// Info numbers a family answers to during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityInfos {
    pub id_type: u16,
    pub id_hw: u16,
    pub id_soft_msb: u16,
    pub id_soft_lsb: u16,
}

/// Static description of a device family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFamily {
    pub id: FamilyId,
    /// Designator tag, upper case
    pub tag: &'static str,
    pub name: &'static str,
    /// Multicast address of all devices of the family
    pub group_address: Option<u32>,
    pub first_address: u32,
    pub last_address: u32,
    pub identity: Option<IdentityInfos>,
}

impl DeviceFamily {
    /// Number of addressable slots
    pub fn slot_count(&self) -> u32 {
        self.last_address - self.first_address + 1
    }

    pub fn is_single_address(&self) -> bool {
        self.first_address == self.last_address
    }

    /// Address of device `index` (1-based)
    ///
    /// Single-address families only accept `None` or `Some(1)`.
    pub fn address(&self, index: Option<u32>) -> XcomResult<u32> {
        let designator = match index {
            Some(i) => format!("{}{}", self.tag, i),
            None => self.tag.to_string(),
        };
        match index {
            None if self.is_single_address() => Ok(self.first_address),
            None => Err(XcomError::AddressOutOfRange {
                designator,
                reason: format!(
                    "{} has {} slots, an index 1..={} is required",
                    self.name,
                    self.slot_count(),
                    self.slot_count()
                ),
            }),
            Some(i) if (1..=self.slot_count()).contains(&i) => Ok(self.first_address + i - 1),
            Some(_) => Err(XcomError::AddressOutOfRange {
                designator,
                reason: if self.is_single_address() {
                    format!("{} has a single address", self.name)
                } else {
                    format!("valid indexes are 1..={}", self.slot_count())
                },
            }),
        }
    }

    /// Iterate over every device address of the family
    pub fn addresses(&self) -> impl Iterator<Item = u32> {
        self.first_address..=self.last_address
    }

    pub fn contains(&self, address: u32) -> bool {
        (self.first_address..=self.last_address).contains(&address)
    }

    /// Family a device address belongs to
    ///
    /// Where families share an address (BSP and BMS) the first listed wins.
    pub fn from_address(address: u32) -> Option<&'static DeviceFamily> {
        FAMILIES.iter().find(|family| family.contains(address))
    }

    /// Look a family up by designator tag, case-insensitive
    pub fn from_tag(tag: &str) -> XcomResult<&'static DeviceFamily> {
        FAMILIES
            .iter()
            .find(|family| family.tag.eq_ignore_ascii_case(tag))
            .ok_or_else(|| XcomError::UnknownFamily(tag.to_string()))
    }
}

/// All known device families
pub static FAMILIES: [DeviceFamily; 9] = [
    DeviceFamily {
        id: FamilyId::Xt,
        tag: "XT",
        name: "Xtender",
        group_address: Some(100),
        first_address: 101,
        last_address: 109,
        identity: Some(IdentityInfos {
            id_type: 3124,
            id_hw: 3129,
            id_soft_msb: 3130,
            id_soft_lsb: 3131,
        }),
    },
    DeviceFamily {
        id: FamilyId::L1,
        tag: "L1",
        name: "Xtender phase L1",
        group_address: None,
        first_address: 191,
        last_address: 191,
        identity: None,
    },
    DeviceFamily {
        id: FamilyId::L2,
        tag: "L2",
        name: "Xtender phase L2",
        group_address: None,
        first_address: 192,
        last_address: 192,
        identity: None,
    },
    DeviceFamily {
        id: FamilyId::L3,
        tag: "L3",
        name: "Xtender phase L3",
        group_address: None,
        first_address: 193,
        last_address: 193,
        identity: None,
    },
    DeviceFamily {
        id: FamilyId::Rcc,
        tag: "RCC",
        name: "RCC / Xcom gateway",
        group_address: None,
        first_address: 501,
        last_address: 501,
        identity: None,
    },
    DeviceFamily {
        id: FamilyId::Bsp,
        tag: "BSP",
        name: "Battery status processor",
        group_address: None,
        first_address: 601,
        last_address: 601,
        identity: Some(IdentityInfos {
            id_type: 7034,
            id_hw: 7036,
            id_soft_msb: 7037,
            id_soft_lsb: 7038,
        }),
    },
    DeviceFamily {
        id: FamilyId::Bms,
        tag: "BMS",
        name: "Xcom-CAN battery management system",
        group_address: None,
        first_address: 601,
        last_address: 601,
        identity: None,
    },
    DeviceFamily {
        id: FamilyId::Vt,
        tag: "VT",
        name: "VarioTrack",
        group_address: Some(300),
        first_address: 301,
        last_address: 315,
        identity: Some(IdentityInfos {
            id_type: 11047,
            id_hw: 11049,
            id_soft_msb: 11050,
            id_soft_lsb: 11051,
        }),
    },
    DeviceFamily {
        id: FamilyId::Vs,
        tag: "VS",
        name: "VarioString",
        group_address: Some(700),
        first_address: 701,
        last_address: 715,
        identity: Some(IdentityInfos {
            id_type: 15074,
            id_hw: 15076,
            id_soft_msb: 15077,
            id_soft_lsb: 15078,
        }),
    },
];

static DESIGNATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)(\d+)?$").expect("designator pattern is valid"));

/// A resolved device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub family: FamilyId,
    /// Device index within the family; `None` for single-address families
    pub index: Option<u32>,
    /// Protocol address
    pub value: u32,
}

impl Address {
    /// Resolve a designator such as `"XT1"`, `"vt12"`, `"RCC"` or `"L2"`
    pub fn resolve(designator: &str) -> XcomResult<Self> {
        let designator = designator.trim();

        // Tags ending in a digit ("L1") are matched whole first
        if let Ok(family) = DeviceFamily::from_tag(designator) {
            return Self::of(family, None);
        }

        let captures = DESIGNATOR
            .captures(designator)
            .ok_or_else(|| XcomError::UnknownFamily(designator.to_string()))?;
        let tag = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let family = DeviceFamily::from_tag(tag)?;
        let index = match captures.get(2) {
            Some(digits) => Some(digits.as_str().parse::<u32>().map_err(|e| {
                XcomError::AddressOutOfRange {
                    designator: designator.to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        Self::of(family, index)
    }

    fn of(family: &DeviceFamily, index: Option<u32>) -> XcomResult<Self> {
        let value = family.address(index)?;
        Ok(Self {
            family: family.id,
            index: if family.is_single_address() { None } else { index },
            value,
        })
    }

    /// Address of a device identified by its protocol address
    pub fn from_value(value: u32) -> XcomResult<Self> {
        let family = DeviceFamily::from_address(value).ok_or_else(|| {
            XcomError::AddressOutOfRange {
                designator: value.to_string(),
                reason: "no device family uses this address".to_string(),
            }
        })?;
        let index = if family.is_single_address() {
            None
        } else {
            Some(value - family.first_address + 1)
        };
        Ok(Self {
            family: family.id,
            index,
            value,
        })
    }

    /// Aggregation selecting this device in a multi-info request
    ///
    /// Devices of multi-slot families are selected by index; single-address
    /// families only have their master value.
    pub fn aggregation(&self) -> XcomResult<AggregationType> {
        match self.index {
            Some(index) => {
                let index = u8::try_from(index).map_err(|_| {
                    XcomError::InvalidRequest(format!("Device index {} too large", index))
                })?;
                AggregationType::device(index)
            }
            None => Ok(AggregationType::Master),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}{}", self.family, index),
            None => write!(f, "{}", self.family),
        }
    }
}
