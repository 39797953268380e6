//! Batch planning
//!
//! Turns a [`ValuesRequest`] into the exchanges needed to serve it. Planning
//! is pure: every rule violation is reported here, before any I/O.

use crate::values::{Target, ValuesItem, ValuesRequest};
use log::debug;
use xcom_core::{AggregationType, XcomError, XcomResult};
use xcom_dataset::FamilyId;
use xcom_protocol::{MultiInfoRequest, MULTI_INFO_MAX_ITEMS};

/// One exchange of a [`BatchPlan`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedExchange {
    /// Plain read or write of the item at `index`
    Single { index: usize },
    /// Multi-info read; `indexes[i]` is answered by the i-th request item
    MultiInfo {
        indexes: Vec<usize>,
        request: MultiInfoRequest,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    pub exchanges: Vec<PlannedExchange>,
}

impl BatchPlan {
    /// Plan `request`, at most `max_items` infos per multi-info exchange
    ///
    /// A request of one plain item bypasses batching. Infos of numbered
    /// devices (and of the battery manager) share multi-info exchanges;
    /// parameters, writes and everything else get a single exchange each.
    ///
    /// # Errors
    /// `InvalidRequest` when aggregation is mixed with writes, aggregation
    /// targets a parameter, a write targets a read-only datapoint or a
    /// datapoint is addressed to a device of another family.
    pub fn build(request: &ValuesRequest, max_items: usize) -> XcomResult<Self> {
        validate(request)?;
        if let [item] = request.items.as_slice() {
            if !item.is_aggregated() {
                return Ok(Self {
                    exchanges: vec![PlannedExchange::Single { index: 0 }],
                });
            }
        }

        let mut batched = Vec::new();
        let mut singles = Vec::new();
        for (index, item) in request.items.iter().enumerate() {
            match multi_info_aggregation(item)? {
                Some(aggregation) => batched.push((index, aggregation)),
                None => singles.push(PlannedExchange::Single { index }),
            }
        }

        let mut exchanges = chunk(request, &batched, max_items);
        exchanges.extend(singles);
        debug!(
            "Planned {} items into {} exchanges",
            request.len(),
            exchanges.len()
        );
        Ok(Self { exchanges })
    }

    /// Plan `request` as multi-info exchanges only
    ///
    /// # Errors
    /// `InvalidRequest` for any item a multi-info exchange cannot serve.
    pub fn build_multi_info(request: &ValuesRequest, max_items: usize) -> XcomResult<Self> {
        validate(request)?;
        let mut batched = Vec::with_capacity(request.len());
        for (index, item) in request.items.iter().enumerate() {
            let aggregation = multi_info_aggregation(item)?.ok_or_else(|| {
                XcomError::InvalidRequest(format!(
                    "{} at {} cannot be read through multi-info",
                    item.datapoint, item.target
                ))
            })?;
            batched.push((index, aggregation));
        }
        Ok(Self {
            exchanges: chunk(request, &batched, max_items),
        })
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

fn validate(request: &ValuesRequest) -> XcomResult<()> {
    if request.items.iter().any(ValuesItem::is_aggregated)
        && request.items.iter().any(ValuesItem::is_write)
    {
        return Err(XcomError::InvalidRequest(
            "Aggregated reads cannot be mixed with writes".to_string(),
        ));
    }
    for item in &request.items {
        let datapoint = &item.datapoint;
        if datapoint.format.is_menu() {
            return Err(XcomError::InvalidRequest(format!(
                "{} is a menu and carries no value",
                datapoint
            )));
        }
        if item.is_write() && !datapoint.is_writable() {
            return Err(XcomError::InvalidRequest(format!(
                "{} is read-only",
                datapoint
            )));
        }
        match item.target {
            Target::Aggregation(aggregation) => {
                aggregation.to_u8()?;
                if !datapoint.is_info() {
                    return Err(XcomError::InvalidRequest(format!(
                        "Aggregation {} only applies to infos, not to {}",
                        aggregation, datapoint
                    )));
                }
                if !aggregates(datapoint.family) {
                    return Err(XcomError::InvalidRequest(format!(
                        "{} infos cannot be aggregated",
                        datapoint.family
                    )));
                }
            }
            Target::Address(address) => {
                if address.family.datapoint_family() != datapoint.family {
                    return Err(XcomError::InvalidRequest(format!(
                        "{} does not belong to {}",
                        datapoint, address
                    )));
                }
            }
        }
    }
    Ok(())
}

fn aggregates(family: FamilyId) -> bool {
    matches!(
        family,
        FamilyId::Xt | FamilyId::Vt | FamilyId::Vs | FamilyId::Bsp
    )
}

/// Aggregation under which a multi-info exchange serves `item`, if it can
fn multi_info_aggregation(item: &ValuesItem) -> XcomResult<Option<AggregationType>> {
    if item.is_write() || !item.datapoint.is_info() {
        return Ok(None);
    }
    match item.target {
        Target::Aggregation(aggregation) => Ok(Some(aggregation)),
        Target::Address(address) => match (address.family, address.index) {
            (FamilyId::Xt | FamilyId::Vt | FamilyId::Vs, Some(_)) => {
                address.aggregation().map(Some)
            }
            (FamilyId::Bsp | FamilyId::Bms, _) => Ok(Some(AggregationType::Master)),
            _ => Ok(None),
        },
    }
}

fn chunk(
    request: &ValuesRequest,
    batched: &[(usize, AggregationType)],
    max_items: usize,
) -> Vec<PlannedExchange> {
    let max_items = max_items.clamp(1, MULTI_INFO_MAX_ITEMS);
    batched
        .chunks(max_items)
        .map(|chunk| {
            let mut multi_info = MultiInfoRequest::new();
            for &(index, aggregation) in chunk {
                multi_info.push(request.items[index].datapoint.nr, aggregation);
            }
            PlannedExchange::MultiInfo {
                indexes: chunk.iter().map(|&(index, _)| index).collect(),
                request: multi_info,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcom_core::{FailureKind, Value};
    use xcom_dataset::{Address, Dataset, VoltageAc, VoltageDc};

    fn dataset() -> Dataset {
        Dataset::create(VoltageAc::Ac240, VoltageDc::Dc48).unwrap()
    }

    fn at(designator: &str) -> Address {
        Address::resolve(designator).unwrap()
    }

    #[test]
    fn test_aggregation_mixed_with_write_rejected() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let charge_current = dataset.get_by_nr(1138, Some(FamilyId::Xt)).unwrap();
        let request = ValuesRequest::new(vec![
            ValuesItem::aggregated(ubat, AggregationType::Average),
            ValuesItem::write(charge_current, at("XT1"), Value::Float(20.0)),
        ]);
        let err = BatchPlan::build(&request, 76).unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidRequest);
        assert!(err.to_string().contains("mixed"));
    }

    #[test]
    fn test_aggregation_of_parameter_rejected() {
        let dataset = dataset();
        let charge_current = dataset.get_by_nr(1138, Some(FamilyId::Xt)).unwrap();
        let request = ValuesRequest::new(vec![ValuesItem::aggregated(
            charge_current,
            AggregationType::Sum,
        )]);
        assert_eq!(
            BatchPlan::build(&request, 76).unwrap_err().kind(),
            FailureKind::InvalidRequest
        );
    }

    #[test]
    fn test_device_aggregation_past_last_slot_rejected() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        for index in [0u8, 16, 200] {
            let request = ValuesRequest::new(vec![ValuesItem::aggregated(
                ubat,
                AggregationType::Device(index),
            )]);
            assert_eq!(
                BatchPlan::build(&request, 76).unwrap_err().kind(),
                FailureKind::InvalidRequest
            );
        }
    }

    #[test]
    fn test_write_to_info_rejected() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let request = ValuesRequest::new(vec![ValuesItem::write(ubat, at("XT1"), Value::Float(1.0))]);
        assert!(BatchPlan::build(&request, 76).is_err());
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let request = ValuesRequest::new(vec![ValuesItem::read(ubat, at("VT1"))]);
        assert!(BatchPlan::build(&request, 76).is_err());

        // Phase groups expose Xtender datapoints
        let request = ValuesRequest::new(vec![ValuesItem::read(ubat, at("L2"))]);
        assert!(BatchPlan::build(&request, 76).is_ok());
    }

    #[test]
    fn test_single_item_bypasses_batching() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let request = ValuesRequest::new(vec![ValuesItem::read(ubat, at("XT1"))]);
        let plan = BatchPlan::build(&request, 76).unwrap();
        assert_eq!(plan.exchanges, vec![PlannedExchange::Single { index: 0 }]);

        let request = ValuesRequest::new(vec![ValuesItem::aggregated(ubat, AggregationType::Sum)]);
        let plan = BatchPlan::build(&request, 76).unwrap();
        assert!(matches!(&plan.exchanges[..], [PlannedExchange::MultiInfo { indexes, .. }] if indexes == &[0]));
    }

    #[test]
    fn test_infos_batched_and_parameters_single() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let rcc_soft = dataset.get_by_nr(5101, Some(FamilyId::Rcc)).unwrap();
        let charge_current = dataset.get_by_nr(1138, Some(FamilyId::Xt)).unwrap();
        let bsp_voltage = dataset.get_by_nr(7000, Some(FamilyId::Bsp)).unwrap();
        let request = ValuesRequest::new(vec![
            ValuesItem::read(charge_current, at("XT1")),
            ValuesItem::read(ubat, at("XT1")),
            ValuesItem::read(rcc_soft, at("RCC")),
            ValuesItem::read(ubat, at("XT3")),
            ValuesItem::read(bsp_voltage, at("BSP")),
        ]);
        let plan = BatchPlan::build(&request, 76).unwrap();
        assert_eq!(plan.len(), 3);

        let PlannedExchange::MultiInfo { indexes, request } = &plan.exchanges[0] else {
            panic!("expected a multi-info exchange first");
        };
        assert_eq!(indexes, &[1, 3, 4]);
        let aggregations: Vec<_> = request.items.iter().map(|item| item.aggregation).collect();
        assert_eq!(
            aggregations,
            [AggregationType::Device(1), AggregationType::Device(3), AggregationType::Master]
        );
        assert_eq!(plan.exchanges[1], PlannedExchange::Single { index: 0 });
        assert_eq!(plan.exchanges[2], PlannedExchange::Single { index: 2 });
    }

    #[test]
    fn test_chunking_respects_item_limit() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let request: ValuesRequest = (0..80).map(|_| ValuesItem::read(ubat, at("XT2"))).collect();

        let plan = BatchPlan::build(&request, 200).unwrap();
        let sizes: Vec<_> = plan
            .exchanges
            .iter()
            .map(|exchange| match exchange {
                PlannedExchange::MultiInfo { indexes, .. } => indexes.len(),
                PlannedExchange::Single { .. } => 1,
            })
            .collect();
        assert_eq!(sizes, [76, 4]);

        let plan = BatchPlan::build(&request, 10).unwrap();
        assert_eq!(plan.len(), 8);
    }

    #[test]
    fn test_multi_info_only_plan() {
        let dataset = dataset();
        let ubat = dataset.get_by_nr(3000, Some(FamilyId::Xt)).unwrap();
        let charge_current = dataset.get_by_nr(1138, Some(FamilyId::Xt)).unwrap();
        let request = ValuesRequest::new(vec![ValuesItem::read(ubat, at("XT1"))]);
        let plan = BatchPlan::build_multi_info(&request, 76).unwrap();
        assert!(matches!(plan.exchanges[0], PlannedExchange::MultiInfo { .. }));

        let request = ValuesRequest::new(vec![
            ValuesItem::read(ubat, at("XT1")),
            ValuesItem::read(charge_current, at("XT1")),
        ]);
        assert!(BatchPlan::build_multi_info(&request, 76).is_err());
    }
}
