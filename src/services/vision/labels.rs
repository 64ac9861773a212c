//! ImageNet class index, loaded once at startup as a reference annotation.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{AppResult, ResultExt};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassLabel {
    pub wordnet_id: String,
    pub name: String,
}

/// `{"0": ["n01440764", "tench"], ...}`
#[derive(Debug, Default, Clone)]
pub struct ClassLabels {
    entries: HashMap<usize, ClassLabel>,
}

impl ClassLabels {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> AppResult<Self> {
        let raw: HashMap<String, (String, String)> =
            serde_json::from_slice(bytes).inference_err("invalid class index json")?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, (wordnet_id, name)) in raw {
            let idx = key
                .parse::<usize>()
                .inference_err("class index key is not a number")?;
            entries.insert(idx, ClassLabel { wordnet_id, name });
        }

        Ok(Self { entries })
    }

    /// Fetches the class index. Failures are logged and yield an empty index.
    pub async fn load(client: &reqwest::Client, url: &str) -> Self {
        if url.trim().is_empty() {
            tracing::debug!("Class index url not configured, skipping");
            return Self::empty();
        }

        match Self::fetch(client, url).await {
            Ok(labels) => {
                tracing::info!(count = labels.len(), "ImageNet labels loaded");
                labels
            }
            Err(err) => {
                tracing::error!(error = %err, url, "Failed to load ImageNet class labels");
                Self::empty()
            }
        }
    }

    async fn fetch(client: &reqwest::Client, url: &str) -> AppResult<Self> {
        let body = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Self::from_json(&body)
    }

    pub fn get(&self, idx: usize) -> Option<&ClassLabel> {
        self.entries.get(&idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
