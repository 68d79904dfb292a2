use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::filing::report::FilingType;

pub const DEFAULT_WORK_DIR: &str = "data/table_raw_results";

#[derive(Clone, Debug)]
pub struct AutotagConfig {
    pub filing_type: FilingType,
    /// Page markers scanned for statement tables; `None` scans them all.
    pub scan_limit: Option<usize>,
    pub work_dir: PathBuf,
    pub cover_namespace: String,
    pub notes_namespace: String,
    pub table_namespace: String,
    /// Label appended to every table composite key before inference.
    pub placeholder_label: String,
    /// Exclusive bounds on the caption text that may precede a statement table.
    pub caption_min_len: usize,
    pub caption_max_len: usize,
    pub model_url: Option<String>,
}

impl Default for AutotagConfig {
    fn default() -> Self {
        Self::for_filing(FilingType::default())
    }
}

impl AutotagConfig {
    pub fn for_filing(filing_type: FilingType) -> Self {
        Self {
            scan_limit: filing_type.scan_limit(),
            filing_type,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            cover_namespace: "dei:".to_string(),
            notes_namespace: "us-gaap:".to_string(),
            table_namespace: String::new(),
            placeholder_label: "Others".to_string(),
            caption_min_len: 10,
            caption_max_len: 500,
            model_url: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let filing_type = match std::env::var("AUTOTAG_FILING_TYPE") {
            Ok(value) => value
                .parse::<FilingType>()
                .map_err(|e| anyhow!("Invalid AUTOTAG_FILING_TYPE: {}", e))?,
            Err(_) => FilingType::default(),
        };

        let mut config = Self::for_filing(filing_type);

        if let Ok(limit) = std::env::var("AUTOTAG_SCAN_LIMIT") {
            config.scan_limit = parse_scan_limit(&limit)?;
        }

        if let Ok(dir) = std::env::var("AUTOTAG_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }

        config.model_url = std::env::var("AUTOTAG_MODEL_URL").ok();

        Ok(config)
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn caption_fits(&self, caption_len: usize) -> bool {
        caption_len > self.caption_min_len && caption_len < self.caption_max_len
    }
}

/// `all` (or `0`) lifts the cap, any other value must be a positive count.
pub fn parse_scan_limit(value: &str) -> Result<Option<usize>> {
    match value.trim().to_lowercase().as_str() {
        "all" | "0" => Ok(None),
        other => other
            .parse::<usize>()
            .map(Some)
            .map_err(|_| anyhow!("Invalid scan limit: {}", value)),
    }
}
