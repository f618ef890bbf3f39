//! Canadian provinces and territories.

use serde::{Deserialize, Serialize};

/// Province or territory, identified by its two-letter postal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Province {
    /// Alberta
    AB,
    /// British Columbia
    BC,
    /// Manitoba
    MB,
    /// New Brunswick
    NB,
    /// Newfoundland and Labrador
    NL,
    /// Nova Scotia
    NS,
    /// Northwest Territories
    NT,
    /// Nunavut
    NU,
    /// Ontario
    ON,
    /// Prince Edward Island
    PE,
    /// Quebec
    QC,
    /// Saskatchewan
    SK,
    /// Yukon
    YT,
}

impl Province {
    /// Parse a two-letter code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        Self::all().iter().copied().find(|p| p.code() == code)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Province::AB => "AB",
            Province::BC => "BC",
            Province::MB => "MB",
            Province::NB => "NB",
            Province::NL => "NL",
            Province::NS => "NS",
            Province::NT => "NT",
            Province::NU => "NU",
            Province::ON => "ON",
            Province::PE => "PE",
            Province::QC => "QC",
            Province::SK => "SK",
            Province::YT => "YT",
        }
    }

    /// Full English name
    pub fn name(&self) -> &'static str {
        match self {
            Province::AB => "Alberta",
            Province::BC => "British Columbia",
            Province::MB => "Manitoba",
            Province::NB => "New Brunswick",
            Province::NL => "Newfoundland and Labrador",
            Province::NS => "Nova Scotia",
            Province::NT => "Northwest Territories",
            Province::NU => "Nunavut",
            Province::ON => "Ontario",
            Province::PE => "Prince Edward Island",
            Province::QC => "Quebec",
            Province::SK => "Saskatchewan",
            Province::YT => "Yukon",
        }
    }

    /// All provinces and territories in code order
    pub fn all() -> &'static [Province] {
        &[
            Province::AB,
            Province::BC,
            Province::MB,
            Province::NB,
            Province::NL,
            Province::NS,
            Province::NT,
            Province::NU,
            Province::ON,
            Province::PE,
            Province::QC,
            Province::SK,
            Province::YT,
        ]
    }
}

impl std::fmt::Display for Province {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Display name for a jurisdiction code, falling back to the code itself
pub fn display_name(code: &str) -> &str {
    match Province::from_code(code) {
        Some(p) => p.name(),
        None => code,
    }
}
