use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataSetError {
    #[error("Observation has {found} values but the data set has {expected} fields")]
    FieldCountMismatch { expected: usize, found: usize },

    #[error("Field index {index} is out of bounds for a data set with {nb_fields} fields")]
    FieldIndexOutOfBounds { index: usize, nb_fields: usize },

    #[error("Field '{0}' not found in the data set")]
    FieldNotFound(String),

    #[error("Duplicate key path at observation {row}: the data set cannot be folded into a map")]
    DuplicateKeyPath { row: usize },

    #[error("A data set needs at least two fields to be folded into a map, found {0}")]
    TooFewFieldsForMap(usize),

    #[error("Non numeric value '{value}' in field '{field}' at observation {row}")]
    NonNumericValue {
        field: String,
        row: usize,
        value: String,
    },
}
