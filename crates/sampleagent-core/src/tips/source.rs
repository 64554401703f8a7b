use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{TipsError, TipsSource};
use crate::models::TipEntry;
use crate::seed;

/// HTTP request timeout for the tips endpoint.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Built-in tips, served after a fixed delay in random order.
pub struct MockTipsSource {
    tips: Vec<TipEntry>,
    delay: Duration,
}

impl MockTipsSource {
    pub fn new(delay: Duration) -> Self {
        Self::with_tips(seed::tips(), delay)
    }

    pub fn with_tips(tips: Vec<TipEntry>, delay: Duration) -> Self {
        Self { tips, delay }
    }
}

impl TipsSource for MockTipsSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<TipEntry>, TipsError>> {
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut tips = self.tips.clone();
            tips.shuffle(&mut rand::thread_rng());
            Ok(tips)
        }
        .boxed()
    }
}

/// Endpoints answer either with a bare array or `{ "tips": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TipsPayload {
    Bare(Vec<TipEntry>),
    Wrapped { tips: Vec<TipEntry> },
}

pub struct HttpTipsSource {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTipsSource {
    pub fn new(url: String, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    async fn fetch_remote(&self) -> Result<Vec<TipEntry>, TipsError> {
        let mut request = self.client.get(&self.url);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TipsError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let tips = parse_tips(&body)?;
        debug!(count = tips.len(), "Fetched tips from remote source");
        Ok(tips)
    }
}

impl TipsSource for HttpTipsSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<TipEntry>, TipsError>> {
        self.fetch_remote().boxed()
    }
}

fn parse_tips(body: &str) -> Result<Vec<TipEntry>, TipsError> {
    match serde_json::from_str::<TipsPayload>(body) {
        Ok(TipsPayload::Bare(tips)) | Ok(TipsPayload::Wrapped { tips }) => Ok(tips),
        Err(e) => Err(TipsError::InvalidResponse(e.to_string())),
    }
}
