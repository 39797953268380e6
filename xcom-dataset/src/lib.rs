//! Datapoint registry and device addressing for the Xcom/SCOM protocol
//!
//! [`Dataset`] holds the metadata of every user info and parameter of one
//! voltage configuration, loaded from the JSON tables embedded in this
//! crate (or any table with the same schema). [`Address`] turns designators
//! such as `"XT1"` or `"BSP"` into protocol addresses.

pub mod datapoints;
pub mod families;
pub mod messages;

pub use datapoints::{Datapoint, Dataset, Level, VoltageAc, VoltageDc};
pub use families::{Address, DeviceFamily, FamilyId, IdentityInfos, FAMILIES};
pub use messages::MessageTable;
pub use xcom_core::{XcomError, XcomResult};
