//! Aggregation of monthly normals over a subset of months.

use crate::dataset::data_set::DataSet;
use crate::dataset::error::DataSetError;
use crate::dataset::value::Value;
use crate::types::enums::{Month, Variable};

const MONTH_FIELD: &str = "month";

/// Summarizes a monthly normals data set over `months` into a single row.
///
/// Additive variables (precipitation) are summed; the others are averaged,
/// each month weighted by its number of days. Columns that are not normals
/// variables are dropped. Rows whose month is not requested are ignored; a
/// month that is not an integer fails the whole summary.
pub fn summarize_months(data_set: &DataSet, months: &[Month]) -> Result<DataSet, DataSetError> {
    let month_idx = data_set
        .field_index(MONTH_FIELD)
        .ok_or_else(|| DataSetError::FieldNotFound(MONTH_FIELD.to_string()))?;

    let variables: Vec<(usize, Variable)> = data_set
        .field_names()
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| Variable::from_field_name(name).map(|v| (idx, v)))
        .collect();

    let mut totals = vec![0.0; variables.len()];
    let mut total_days = 0.0;
    for (row, obs) in data_set.observations().iter().enumerate() {
        let number = match obs.get(month_idx) {
            Some(Value::Int(number)) => *number,
            other => {
                return Err(DataSetError::NonNumericValue {
                    field: MONTH_FIELD.to_string(),
                    row,
                    value: other.map(Value::to_string).unwrap_or_default(),
                })
            }
        };
        let Some(month) = Month::from_number(number).filter(|m| months.contains(m)) else {
            continue;
        };
        let weight = f64::from(month.nb_days());
        total_days += weight;
        for (total, (idx, variable)) in totals.iter_mut().zip(&variables) {
            let value = &obs.values()[*idx];
            let number = value.as_f64().ok_or_else(|| DataSetError::NonNumericValue {
                field: variable.field_name().to_string(),
                row,
                value: value.to_string(),
            })?;
            *total += if variable.is_additive() {
                number
            } else {
                number * weight
            };
        }
    }

    let mut summary = DataSet::new(variables.iter().map(|(_, v)| v.field_name()));
    let row = variables
        .iter()
        .zip(totals)
        .map(|((_, variable), total)| {
            if variable.is_additive() || total_days == 0.0 {
                Value::Float(total)
            } else {
                Value::Float(total / total_days)
            }
        })
        .collect();
    summary.append_values(row)?;
    summary.index_field_types();
    Ok(summary)
}
