use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Form types the pipeline knows how to budget for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String", into = "String")]
pub enum FilingType {
    Form10Q,
    Form10K,
    Other(String),
}

/// Number of page markers scanned for statement tables in quarterly filings.
pub const QUARTERLY_SCAN_LIMIT: usize = 15;

impl FilingType {
    pub fn list_types() -> &'static str {
        &FILING_TYPES
    }

    /// How many page markers the table scan considers. `None` scans the whole filing.
    pub fn scan_limit(&self) -> Option<usize> {
        match self {
            FilingType::Form10K => None,
            FilingType::Form10Q | FilingType::Other(_) => Some(QUARTERLY_SCAN_LIMIT),
        }
    }
}

pub static FILING_TYPES: Lazy<String> = Lazy::new(|| {
    FilingType::iter()
        .filter(|t| !matches!(t, FilingType::Other(_)))
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilingType::Form10Q => write!(f, "10-Q"),
            FilingType::Form10K => write!(f, "10-K"),
            FilingType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for FilingType {
    type Err = String;

    fn from_str(s: &str) -> Result<FilingType, String> {
        match s.trim().to_uppercase().as_str() {
            "10-Q" | "10Q" => Ok(FilingType::Form10Q),
            "10-K" | "10K" => Ok(FilingType::Form10K),
            "" => Err("empty filing type".to_string()),
            _ => Ok(FilingType::Other(s.trim().to_string())),
        }
    }
}

impl TryFrom<String> for FilingType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        FilingType::from_str(&s)
    }
}

impl From<FilingType> for String {
    fn from(t: FilingType) -> String {
        t.to_string()
    }
}

impl Default for FilingType {
    fn default() -> Self {
        FilingType::Form10Q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_limits() {
        assert_eq!("10-q".parse::<FilingType>().unwrap(), FilingType::Form10Q);
        assert_eq!("10-K".parse::<FilingType>().unwrap(), FilingType::Form10K);
        assert_eq!(FilingType::Form10K.scan_limit(), None);
        assert_eq!(FilingType::Form10Q.scan_limit(), Some(15));
        assert_eq!(
            "S-1".parse::<FilingType>().unwrap(),
            FilingType::Other("S-1".to_string())
        );
        assert!("".parse::<FilingType>().is_err());
        assert_eq!(FilingType::list_types(), "10-Q, 10-K");
    }
}
