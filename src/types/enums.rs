//! Enumerations understood by the BioSIM service: normals periods, emission
//! scenarios, climate models, calendar months and normals variables.

use std::fmt;

/// The 30-year period over which normals are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    FromNormals1951To1980,
    FromNormals1961To1990,
    FromNormals1971To2000,
    FromNormals1981To2010,
    FromNormals1991To2020,
    FromNormals2021To2050,
    FromNormals2051To2080,
    FromNormals2071To2100,
}

impl Period {
    pub(crate) fn query_segment(&self) -> &'static str {
        match self {
            Period::FromNormals1951To1980 => "period=1951_1980",
            Period::FromNormals1961To1990 => "period=1961_1990",
            Period::FromNormals1971To2000 => "period=1971_2000",
            Period::FromNormals1981To2010 => "period=1981_2010",
            Period::FromNormals1991To2020 => "period=1991_2020",
            Period::FromNormals2021To2050 => "period=2021_2050",
            Period::FromNormals2051To2080 => "period=2051_2080",
            Period::FromNormals2071To2100 => "period=2071_2100",
        }
    }
}

/// Representative concentration pathway. The server assumes RCP 4.5 when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rcp {
    Rcp45,
    Rcp85,
}

impl Rcp {
    pub(crate) fn url_segment(&self) -> &'static str {
        match self {
            Rcp::Rcp45 => "4_5",
            Rcp::Rcp85 => "8_5",
        }
    }
}

/// Climate model used for future periods. The server assumes RCM4 when none is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClimateModel {
    Rcm4,
    Gcm4,
    Hadley,
    Ensemble,
}

impl ClimateModel {
    pub(crate) fn url_segment(&self) -> &'static str {
        match self {
            ClimateModel::Rcm4 => "RCM4",
            ClimateModel::Gcm4 => "GCM4",
            ClimateModel::Hadley => "Hadley",
            ClimateModel::Ensemble => "Ensemble",
        }
    }
}

/// Calendar month, carrying the number of days used to weight monthly means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// Days in the month for a non-leap year.
    pub fn nb_days(&self) -> u32 {
        match self {
            Month::February => 28,
            Month::April | Month::June | Month::September | Month::November => 30,
            _ => 31,
        }
    }

    /// One-based month number as it appears in the `month` column of a normals reply.
    pub fn number(&self) -> i64 {
        *self as i64 + 1
    }

    pub fn from_number(number: i64) -> Option<Month> {
        usize::try_from(number - 1)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }
}

/// Climate variables reported in a normals reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    /// Minimum air temperature.
    Tn,
    /// Maximum air temperature.
    Tx,
    /// Precipitation.
    P,
    /// Dew point temperature.
    Td,
}

impl Variable {
    pub const NORMALS: [Variable; 4] = [Variable::Tn, Variable::Tx, Variable::P, Variable::Td];

    /// Column name in a normals reply.
    pub fn field_name(&self) -> &'static str {
        match self {
            Variable::Tn => "TMIN_MN",
            Variable::Tx => "TMAX_MN",
            Variable::P => "PRCP_TT",
            Variable::Td => "TDEX_MN",
        }
    }

    /// Additive variables are summed over months, the others are averaged.
    pub fn is_additive(&self) -> bool {
        matches!(self, Variable::P)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Variable::Tn => "min air temperature",
            Variable::Tx => "max air temperature",
            Variable::P => "precipitation",
            Variable::Td => "temperature dew point",
        }
    }

    pub fn from_field_name(name: &str) -> Option<Variable> {
        Self::NORMALS
            .into_iter()
            .find(|variable| variable.field_name() == name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_numbers_round_trip() {
        for month in Month::ALL {
            assert_eq!(Month::from_number(month.number()), Some(month));
        }
        assert_eq!(Month::from_number(0), None);
        assert_eq!(Month::from_number(13), None);
        assert_eq!(Month::ALL.iter().map(Month::nb_days).sum::<u32>(), 365);
    }

    #[test]
    fn test_normals_variable_lookup() {
        assert_eq!(Variable::from_field_name("PRCP_TT"), Some(Variable::P));
        assert_eq!(Variable::from_field_name("month"), None);
        assert!(Variable::P.is_additive());
        assert!(!Variable::Tn.is_additive());
    }
}
