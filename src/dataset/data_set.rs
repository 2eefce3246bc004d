//! The adaptive data set built from the server's textual replies.
//!
//! The wire format carries no column types, so values are typed in two passes:
//! each token is coerced on its own when the row is appended, then
//! [`DataSet::index_field_types`] settles one type per column once the last
//! row is in and reconciles the cells with it.

use crate::dataset::error::DataSetError;
use crate::dataset::value::{FieldType, Value};
use crate::reply::result_map::LocationResultMap;
use indexmap::map::Entry;
use indexmap::IndexMap;

/// Nested map produced by [`DataSet::to_map`].
pub type NestedMap = IndexMap<Value, MapEntry>;

/// A node of a [`NestedMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum MapEntry {
    Leaf(Value),
    Nested(NestedMap),
}

/// One row of a [`DataSet`], positionally aligned with its field names.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    values: Vec<Value>,
}

impl Observation {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A growable table of heterogeneous rows whose column types are inferred
/// after loading.
///
/// Two data sets are equal when their field names, inferred types and
/// observations are equal, in order.
///
/// # Examples
///
/// ```
/// use biosim::{DataSet, FieldType, Value};
///
/// let mut ds = DataSet::new(["month", "Tn", "Tx"]);
/// ds.append(["1", "-16.9", "-7.6"]).unwrap();
/// ds.index_field_types();
///
/// assert_eq!(ds.field_types(), [FieldType::Integer, FieldType::Double, FieldType::Double]);
/// assert_eq!(ds.value_at(0, 1), Some(&Value::Float(-16.9)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    field_names: Vec<String>,
    field_types: Vec<FieldType>,
    observations: Vec<Observation>,
}

impl DataSet {
    /// Creates an empty data set. A name already taken is suffixed with the
    /// first free index, so `["X", "X"]` becomes `["X", "X0"]`.
    pub fn new<I, S>(field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut data_set = Self::default();
        for name in field_names {
            data_set.add_field_name(name.as_ref());
        }
        data_set
    }

    fn add_field_name(&mut self, original: &str) {
        let mut name = original.to_string();
        let mut suffix = 0;
        while self.field_names.contains(&name) {
            name = format!("{original}{suffix}");
            suffix += 1;
        }
        self.field_names.push(name);
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Column types, empty until [`DataSet::index_field_types`] has run.
    pub fn field_types(&self) -> &[FieldType] {
        &self.field_types
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    pub fn nb_fields(&self) -> usize {
        self.field_names.len()
    }

    pub fn nb_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Appends one row of raw reply tokens, typing each one opportunistically.
    pub fn append<I, S>(&mut self, raw_values: I) -> Result<(), DataSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = raw_values
            .into_iter()
            .map(|token| Value::coerce(token.as_ref()))
            .collect();
        self.push_values(values)
    }

    /// Appends one row of values. Text values are re-typed like raw tokens.
    pub fn append_values(&mut self, values: Vec<Value>) -> Result<(), DataSetError> {
        let values = values
            .into_iter()
            .map(|value| match value {
                Value::Text(token) => Value::coerce(&token),
                number => number,
            })
            .collect();
        self.push_values(values)
    }

    fn push_values(&mut self, values: Vec<Value>) -> Result<(), DataSetError> {
        if values.len() != self.field_names.len() {
            return Err(DataSetError::FieldCountMismatch {
                expected: self.field_names.len(),
                found: values.len(),
            });
        }
        self.observations.push(Observation { values });
        Ok(())
    }

    /// Settles the type of every column and reconciles its cells.
    ///
    /// A column is `Integer` if every cell is an integer, `Double` if every
    /// cell is a number (integers are then widened), `String` otherwise
    /// (numbers are then turned back into text). Must run after the last
    /// append; running it again without new rows changes nothing.
    pub fn index_field_types(&mut self) {
        self.field_types.clear();
        for j in 0..self.field_names.len() {
            let field_type = self.infer_field_type(j);
            for obs in &mut self.observations {
                let value = std::mem::replace(&mut obs.values[j], Value::Int(0));
                obs.values[j] = match field_type {
                    FieldType::Integer => value,
                    FieldType::Double => value.widened(),
                    FieldType::String => value.stringified(),
                };
            }
            self.field_types.push(field_type);
        }
    }

    fn infer_field_type(&self, j: usize) -> FieldType {
        let column = || self.observations.iter().map(move |obs| &obs.values[j]);
        if column().all(|v| matches!(v, Value::Int(_))) {
            FieldType::Integer
        } else if column().all(Value::is_number) {
            FieldType::Double
        } else {
            FieldType::String
        }
    }

    /// Removes the column at `index` from every row, the field names and the type table.
    pub fn remove_field(&mut self, index: usize) -> Result<(), DataSetError> {
        if index >= self.field_names.len() {
            return Err(DataSetError::FieldIndexOutOfBounds {
                index,
                nb_fields: self.field_names.len(),
            });
        }
        for obs in &mut self.observations {
            obs.values.remove(index);
        }
        if index < self.field_types.len() {
            self.field_types.remove(index);
        }
        self.field_names.remove(index);
        Ok(())
    }

    pub fn value_at(&self, row: usize, col: usize) -> Option<&Value> {
        self.observations.get(row).and_then(|obs| obs.values.get(col))
    }

    /// All the values of one column, in row order.
    pub fn field_values(&self, col: usize) -> Result<Vec<&Value>, DataSetError> {
        if col >= self.field_names.len() {
            return Err(DataSetError::FieldIndexOutOfBounds {
                index: col,
                nb_fields: self.field_names.len(),
            });
        }
        Ok(self.observations.iter().map(|obs| &obs.values[col]).collect())
    }

    /// Folds the rows into nested maps: every column but the last two is a
    /// level of nesting, the second-to-last is the key and the last is the value.
    ///
    /// Fails if two rows share the same key path.
    pub fn to_map(&self) -> Result<NestedMap, DataSetError> {
        let nb_fields = self.field_names.len();
        if nb_fields < 2 {
            return Err(DataSetError::TooFewFieldsForMap(nb_fields));
        }
        let mut output = NestedMap::new();
        for (row, obs) in self.observations.iter().enumerate() {
            let (path, tail) = obs.values.split_at(nb_fields - 2);
            let mut current = &mut output;
            for key in path {
                let entry = current
                    .entry(key.clone())
                    .or_insert_with(|| MapEntry::Nested(NestedMap::new()));
                current = match entry {
                    MapEntry::Nested(inner) => inner,
                    MapEntry::Leaf(_) => return Err(DataSetError::DuplicateKeyPath { row }),
                };
            }
            match current.entry(tail[0].clone()) {
                Entry::Occupied(_) => return Err(DataSetError::DuplicateKeyPath { row }),
                Entry::Vacant(slot) => {
                    slot.insert(MapEntry::Leaf(tail[1].clone()));
                }
            }
        }
        Ok(output)
    }

    /// Flattens a per-location result into a single data set, prefixing each
    /// row with a one-based location id and the location coordinates.
    pub fn from_location_map(map: &LocationResultMap) -> Result<DataSet, DataSetError> {
        let mut field_names = vec![
            "InnerKeyID".to_string(),
            "Latitude".to_string(),
            "Longitude".to_string(),
            "Elevation".to_string(),
        ];
        if let Some(first) = map.values().next() {
            field_names.extend(first.field_names().iter().cloned());
        }
        let mut output = DataSet::new(field_names);
        for (key_id, (location, data_set)) in (1..).zip(map.iter()) {
            for obs in data_set.observations() {
                let mut values = Vec::with_capacity(obs.len() + 4);
                values.push(Value::Int(key_id));
                values.push(Value::Float(location.latitude));
                values.push(Value::Float(location.longitude));
                values.push(Value::Float(location.elevation));
                values.extend(obs.values().iter().cloned());
                output.append_values(values)?;
            }
        }
        output.index_field_types();
        Ok(output)
    }
}
