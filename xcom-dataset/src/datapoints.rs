//! Datapoint metadata and the dataset registry

use crate::families::FamilyId;
use crate::messages::MessageTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use xcom_core::{ObjectType, Value, ValueFormat, XcomError, XcomResult};

const DATAPOINTS_120V: &str = include_str!("../data/datapoints_120v.json");
const DATAPOINTS_240V: &str = include_str!("../data/datapoints_240v.json");

/// Access level of a datapoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// User info (measurement); read-only
    Info,
    /// View-only parameter
    #[serde(rename = "VO")]
    ViewOnly,
    Basic,
    Expert,
    #[serde(rename = "INST")]
    Installer,
    Qsp,
}

/// AC voltage configuration of the installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoltageAc {
    Ac120,
    Ac240,
}

/// DC (battery) voltage configuration of the installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoltageDc {
    Dc12,
    Dc24,
    Dc48,
}

impl VoltageDc {
    /// Factor applied to `Vdc` limits of the 48 V tables
    pub fn scale(self) -> f64 {
        match self {
            VoltageDc::Dc12 => 0.25,
            VoltageDc::Dc24 => 0.5,
            VoltageDc::Dc48 => 1.0,
        }
    }
}

/// Metadata of one datapoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub nr: u16,
    pub family: FamilyId,
    pub level: Level,
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub format: ValueFormat,
    /// Menu the datapoint is listed under; 0 is the root
    #[serde(default)]
    pub parent: Option<u16>,
    /// Text of each enum value
    #[serde(default)]
    pub options: Option<BTreeMap<u32, String>>,
    #[serde(default)]
    pub default: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Datapoint {
    /// User infos are read through the info object, everything else
    /// through the parameter object
    pub fn is_info(&self) -> bool {
        self.level == Level::Info
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self.level, Level::Info | Level::ViewOnly) && !self.format.is_menu()
    }

    pub fn object_type(&self) -> ObjectType {
        if self.is_info() {
            ObjectType::Info
        } else {
            ObjectType::Parameter
        }
    }

    /// Text of an enum value, or the raw number when it has none
    pub fn enum_value(&self, raw: u32) -> String {
        self.options
            .as_ref()
            .and_then(|options| options.get(&raw))
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Display form of a decoded value, mapping enums through `options`
    pub fn display_value(&self, value: &Value) -> String {
        let text = match value {
            Value::Enum(raw) => return self.enum_value(*raw),
            other => other.to_string(),
        };
        match &self.unit {
            Some(unit) => format!("{} {}", text, unit),
            None => text,
        }
    }

    /// Check a value against the datapoint's limits before writing it
    pub fn check_limits(&self, value: &Value) -> XcomResult<()> {
        let Some(v) = value.as_f64() else {
            return Ok(());
        };
        if self.min.is_some_and(|min| v < min) || self.max.is_some_and(|max| v > max) {
            return Err(XcomError::ValueOutOfRange(format!(
                "{} outside {}..={} for {} ({})",
                v,
                self.min.map(|m| m.to_string()).unwrap_or_default(),
                self.max.map(|m| m.to_string()).unwrap_or_default(),
                self.nr,
                self.name
            )));
        }
        Ok(())
    }

    fn scale_dc(&mut self, factor: f64) {
        if self.unit.as_deref() != Some("Vdc") || self.is_info() {
            return;
        }
        for limit in [&mut self.default, &mut self.min, &mut self.max] {
            if let Some(v) = limit.as_mut() {
                *v = (*v * factor * 100.0).round() / 100.0;
            }
        }
    }
}

impl fmt::Display for Datapoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}, {})", self.family, self.nr, self.name, self.format)
    }
}

#[derive(Deserialize)]
struct DatasetDocument {
    datapoints: Vec<Datapoint>,
}

/// Registry of every datapoint of one voltage configuration
///
/// Built once and then only read; pass it by reference (or `Arc`) to
/// whatever needs lookups.
#[derive(Debug, Clone)]
pub struct Dataset {
    datapoints: Vec<Datapoint>,
    by_nr: HashMap<u16, Vec<usize>>,
    messages: MessageTable,
}

impl Dataset {
    /// Build the dataset embedded for an AC / DC voltage combination
    pub fn create(ac: VoltageAc, dc: VoltageDc) -> XcomResult<Self> {
        let text = match ac {
            VoltageAc::Ac120 => DATAPOINTS_120V,
            VoltageAc::Ac240 => DATAPOINTS_240V,
        };
        let dataset = Self::from_json(text, dc)?;
        log::debug!(
            "Loaded {} datapoints for {:?}/{:?}",
            dataset.len(),
            ac,
            dc
        );
        Ok(dataset)
    }

    /// Build a dataset from a JSON table with the embedded tables' schema
    pub fn from_json(text: &str, dc: VoltageDc) -> XcomResult<Self> {
        let document: DatasetDocument = serde_json::from_str(text)
            .map_err(|e| XcomError::InvalidData(format!("Invalid dataset table: {}", e)))?;
        Self::from_datapoints(document.datapoints, dc)
    }

    /// Build a dataset from already parsed datapoints
    pub fn from_datapoints(mut datapoints: Vec<Datapoint>, dc: VoltageDc) -> XcomResult<Self> {
        let mut by_nr: HashMap<u16, Vec<usize>> = HashMap::new();
        for (index, datapoint) in datapoints.iter_mut().enumerate() {
            datapoint.scale_dc(dc.scale());
            by_nr.entry(datapoint.nr).or_default().push(index);
        }

        for (nr, entries) in &by_nr {
            for (i, &a) in entries.iter().enumerate() {
                if entries[i + 1..]
                    .iter()
                    .any(|&b| datapoints[a].family == datapoints[b].family)
                {
                    return Err(XcomError::InvalidData(format!(
                        "Duplicate datapoint {} for family {}",
                        nr, datapoints[a].family
                    )));
                }
            }
        }

        Ok(Self {
            datapoints,
            by_nr,
            messages: MessageTable::embedded()?,
        })
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Datapoint> {
        self.datapoints.iter()
    }

    /// Look a datapoint up by number
    ///
    /// `family_hint` picks between datapoints sharing a number. A hint that
    /// matches none of them is only logged; the first datapoint with that
    /// number is returned.
    pub fn get_by_nr(&self, nr: u16, family_hint: Option<FamilyId>) -> XcomResult<&Datapoint> {
        let candidates = self
            .by_nr
            .get(&nr)
            .filter(|entries| !entries.is_empty())
            .ok_or_else(|| XcomError::UnknownDatapoint {
                nr,
                family: family_hint.map(|f| f.to_string()),
            })?;
        let first = &self.datapoints[candidates[0]];

        let Some(hint) = family_hint else {
            return Ok(first);
        };
        let hint = hint.datapoint_family();
        match candidates
            .iter()
            .map(|&i| &self.datapoints[i])
            .find(|dp| dp.family == hint)
        {
            Some(datapoint) => Ok(datapoint),
            None => {
                log::warn!(
                    "Datapoint {} belongs to {}, not to the expected family {}",
                    nr,
                    first.family,
                    hint
                );
                Ok(first)
            }
        }
    }

    /// Entries of a menu in table order; 0 lists the root menus
    pub fn get_menu_items(&self, parent: u16) -> Vec<&Datapoint> {
        self.datapoints
            .iter()
            .filter(|dp| dp.parent == Some(parent))
            .collect()
    }

    /// Text of a device message number
    pub fn get_message(&self, nr: u32) -> String {
        self.messages.get(nr)
    }

    pub fn messages(&self) -> &MessageTable {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcom_core::FailureKind;

    fn dataset() -> Dataset {
        Dataset::create(VoltageAc::Ac240, VoltageDc::Dc48).unwrap()
    }

    #[test]
    fn test_embedded_tables_load() {
        let ds240 = dataset();
        let ds120 = Dataset::create(VoltageAc::Ac120, VoltageDc::Dc48).unwrap();
        assert!(!ds240.is_empty());
        assert_eq!(ds240.len(), ds120.len());
        assert_eq!(ds240.get_by_nr(1286, None).unwrap().default, Some(230.0));
        assert_eq!(ds120.get_by_nr(1286, None).unwrap().default, Some(120.0));
    }

    #[test]
    fn test_get_by_nr() {
        let ds = dataset();
        let dp = ds.get_by_nr(3023, Some(FamilyId::Xt)).unwrap();
        assert_eq!(dp.format, ValueFormat::Float);
        assert!(dp.is_info());
        assert!(!dp.is_writable());
        assert_eq!(dp.object_type(), ObjectType::Info);

        let err = ds.get_by_nr(9999, None).unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnknownDatapoint);
    }

    #[test]
    fn test_family_hint_is_advisory() {
        let ds = dataset();
        let dp = ds.get_by_nr(3000, Some(FamilyId::Bsp)).unwrap();
        assert_eq!(dp.family, FamilyId::Xt);
        let dp = ds.get_by_nr(3000, Some(FamilyId::L1)).unwrap();
        assert_eq!(dp.family, FamilyId::Xt);
    }

    #[test]
    fn test_menu_items() {
        let ds = dataset();
        let roots: Vec<u16> = ds.get_menu_items(0).iter().map(|dp| dp.nr).collect();
        assert!(roots.starts_with(&[1100, 1137]));
        let basic: Vec<u16> = ds.get_menu_items(1100).iter().map(|dp| dp.nr).collect();
        assert_eq!(basic, vec![1107, 1124, 1125, 1126, 1138, 1286]);
        assert!(ds.get_menu_items(3000).is_empty());
    }

    #[test]
    fn test_levels_and_writability() {
        let ds = dataset();
        assert!(ds.get_by_nr(1107, None).unwrap().is_writable());
        assert!(!ds.get_by_nr(1550, None).unwrap().is_writable());
        assert!(!ds.get_by_nr(1100, None).unwrap().is_writable());
        assert_eq!(ds.get_by_nr(5012, None).unwrap().level, Level::Basic);
    }

    #[test]
    fn test_enum_value() {
        let ds = dataset();
        let mode = ds.get_by_nr(3028, None).unwrap();
        assert_eq!(mode.enum_value(1), "Inverter");
        assert_eq!(mode.enum_value(42), "42");
        assert_eq!(mode.display_value(&Value::Enum(2)), "Charger");
        let ubat = ds.get_by_nr(3000, None).unwrap();
        assert_eq!(ubat.display_value(&Value::Float(51.5)), "51.5 Vdc");
    }

    #[test]
    fn test_dc_scaling() {
        let ds48 = dataset();
        let ds12 = Dataset::create(VoltageAc::Ac240, VoltageDc::Dc12).unwrap();
        let ds24 = Dataset::create(VoltageAc::Ac240, VoltageDc::Dc24).unwrap();
        assert_eq!(ds48.get_by_nr(1140, None).unwrap().default, Some(54.4));
        assert_eq!(ds24.get_by_nr(1140, None).unwrap().default, Some(27.2));
        assert_eq!(ds12.get_by_nr(1140, None).unwrap().default, Some(13.6));
        // Currents are not scaled
        assert_eq!(ds12.get_by_nr(1138, None).unwrap().default, Some(60.0));
    }

    #[test]
    fn test_check_limits() {
        let ds = dataset();
        let limit = ds.get_by_nr(1107, None).unwrap();
        assert!(limit.check_limits(&Value::Float(16.0)).is_ok());
        let err = limit.check_limits(&Value::Float(51.0)).unwrap_err();
        assert_eq!(err.kind(), FailureKind::ValueOutOfRange);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let text = r#"{"datapoints": [
            {"nr": 1, "family": "xt", "level": "INFO", "name": "a", "short_name": "a", "format": "FLOAT"},
            {"nr": 1, "family": "vt", "level": "INFO", "name": "b", "short_name": "b", "format": "FLOAT"},
            {"nr": 1, "family": "xt", "level": "INFO", "name": "c", "short_name": "c", "format": "FLOAT"}
        ]}"#;
        let err = Dataset::from_json(text, VoltageDc::Dc48).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidData);
    }

    #[test]
    fn test_shared_number_across_families() {
        let text = r#"{"datapoints": [
            {"nr": 1, "family": "xt", "level": "INFO", "name": "a", "short_name": "a", "format": "FLOAT"},
            {"nr": 1, "family": "vt", "level": "INFO", "name": "b", "short_name": "b", "format": "INT32"}
        ]}"#;
        let ds = Dataset::from_json(text, VoltageDc::Dc48).unwrap();
        assert_eq!(ds.get_by_nr(1, Some(FamilyId::Vt)).unwrap().format, ValueFormat::Int32);
        assert_eq!(ds.get_by_nr(1, None).unwrap().family, FamilyId::Xt);
    }

    #[test]
    fn test_invalid_table() {
        let err = Dataset::from_json("{", VoltageDc::Dc48).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidData);
        let bad_format = r#"{"datapoints": [
            {"nr": 1, "family": "xt", "level": "INFO", "name": "a", "short_name": "a", "format": "DOUBLE"}
        ]}"#;
        assert!(Dataset::from_json(bad_format, VoltageDc::Dc48).is_err());
    }
}
