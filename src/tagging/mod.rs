use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod bio;
pub mod http;
pub mod lexicon;

pub use self::http::HttpTagger;
pub use self::lexicon::LexiconTagger;

/// Which token model a batch of classification units is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTask {
    Cover,
    Notes,
}

impl fmt::Display for TokenTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenTask::Cover => write!(f, "cover"),
            TokenTask::Notes => write!(f, "notes"),
        }
    }
}

/// Per-token labels for one classification unit, `text` being its tokens joined by spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrediction {
    pub text: String,
    pub labels: Vec<String>,
}

/// The inference seam: token classification for prose, sequence classification for table cells.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// One prediction per unit, in input order.
    async fn tag_tokens(&self, task: TokenTask, units: &[Vec<String>]) -> Result<Vec<TokenPrediction>>;

    /// One label per composite key, in input order.
    async fn tag_cells(&self, composites: &[String]) -> Result<Vec<String>>;
}
