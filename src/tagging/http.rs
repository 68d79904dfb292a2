use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Tagger, TokenPrediction, TokenTask};

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    task: TokenTask,
    units: &'a [Vec<String>],
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    predictions: Vec<TokenPrediction>,
}

#[derive(Debug, Serialize)]
struct CellRequest<'a> {
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CellResponse {
    labels: Vec<String>,
}

/// Client for a model server exposing `POST /tokens` and `POST /cells`.
#[derive(Debug, Clone)]
pub struct HttpTagger {
    client: Client,
    base_url: String,
}

impl HttpTagger {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}/{}", self.base_url, path);
        log::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Model request to {} failed with status: {}",
                url,
                response.status()
            ));
        }
        Ok(response.json::<R>().await?)
    }
}

#[async_trait]
impl Tagger for HttpTagger {
    async fn tag_tokens(&self, task: TokenTask, units: &[Vec<String>]) -> Result<Vec<TokenPrediction>> {
        let response: TokenResponse = self.post("tokens", &TokenRequest { task, units }).await?;
        if response.predictions.len() != units.len() {
            return Err(anyhow!(
                "Model returned {} {} predictions for {} units",
                response.predictions.len(),
                task,
                units.len()
            ));
        }
        Ok(response.predictions)
    }

    async fn tag_cells(&self, composites: &[String]) -> Result<Vec<String>> {
        let response: CellResponse = self.post("cells", &CellRequest { inputs: composites }).await?;
        if response.labels.len() != composites.len() {
            return Err(anyhow!(
                "Model returned {} labels for {} cells",
                response.labels.len(),
                composites.len()
            ));
        }
        Ok(response.labels)
    }
}
