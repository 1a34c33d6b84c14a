use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AtlasError;

/// Logical dataset names understood by the planner and executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Source {
    /// Purchase order status.
    Po,
    /// Sales order delivery status.
    So,
    /// On-hand inventory.
    Onhand,
    /// Internal requisitions.
    Ir,
    /// License plate numbers.
    Lpn,
    /// Serial numbers packed into license plates. Addressed as either
    /// `LPN_SERIALS` or `LPN_SERIAL`.
    LpnSerials,
    /// Serials aggregated per license plate.
    LpnSerialsAgg,
    /// Composite produced by a join; not loadable.
    All,
}

impl Source {
    /// Sources backed by a CSV file.
    pub const LOADABLE: [Source; 7] = [
        Source::Po,
        Source::So,
        Source::Onhand,
        Source::Ir,
        Source::Lpn,
        Source::LpnSerials,
        Source::LpnSerialsAgg,
    ];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Po => "PO",
            Source::So => "SO",
            Source::Onhand => "ONHAND",
            Source::Ir => "IR",
            Source::Lpn => "LPN",
            Source::LpnSerials => "LPN_SERIALS",
            Source::LpnSerialsAgg => "LPN_SERIALS_AGG",
            Source::All => "ALL",
        }
    }

    /// Whether a relation can be loaded for this source.
    pub fn is_loadable(self) -> bool {
        self != Source::All
    }

    /// Column counted when a grouping is requested without metrics.
    pub fn natural_key(self) -> &'static str {
        match self {
            Source::Po => "po_number",
            Source::So => "so_number",
            Source::Lpn | Source::LpnSerials | Source::LpnSerialsAgg => "lpn_number",
            Source::Onhand | Source::Ir | Source::All => "item",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "PO" => Ok(Source::Po),
            "SO" => Ok(Source::So),
            "ONHAND" | "ON_HAND" => Ok(Source::Onhand),
            "IR" => Ok(Source::Ir),
            "LPN" => Ok(Source::Lpn),
            "LPN_SERIALS" | "LPN_SERIAL" => Ok(Source::LpnSerials),
            "LPN_SERIALS_AGG" | "LPN_SERIAL_AGG" => Ok(Source::LpnSerialsAgg),
            "ALL" => Ok(Source::All),
            _ => Err(AtlasError::UnknownSource(s.to_string())),
        }
    }
}

impl TryFrom<String> for Source {
    type Error = AtlasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Source> for String {
    fn from(value: Source) -> Self {
        value.as_str().to_string()
    }
}
