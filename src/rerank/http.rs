//! HTTP client for cross-encoder `/rerank` endpoints
//! (text-embeddings-inference and compatible servers).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Reranker;
use crate::embedder::openai::{is_retryable_error, retry_backoff, should_retry};
use crate::error::RerankError;

/// Cross-encoder reranker reached over HTTP.
#[derive(Clone)]
pub struct HttpReranker {
    client: Client,
    endpoint: String,
    max_retries: usize,
}

impl HttpReranker {
    /// Builds a client for `{base_url}/rerank`.
    pub fn new(base_url: &str, timeout: Duration, max_retries: usize) -> anyhow::Result<Self> {
        use anyhow::Context;

        anyhow::ensure!(!base_url.trim().is_empty(), "missing reranker URL");
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build reranker HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/rerank", base_url.trim().trim_end_matches('/')),
            max_retries: max_retries.max(1),
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>, RerankError> {
        let request = RerankRequest {
            query,
            texts: passages,
            truncate: true,
        };
        let mut attempt = 0usize;
        loop {
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let ranked: Vec<RankedPassage> = resp.json().await.map_err(|err| {
                        RerankError::Unavailable(format!("failed to parse response: {err}"))
                    })?;
                    return scores_in_passage_order(ranked, passages.len());
                }
                Ok(resp) => {
                    let status = resp.status();
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        debug!(%status, attempt, "retrying rerank request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    return Err(RerankError::Unavailable(format!("{status}: {body}")));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        debug!(error = %err, attempt, "retrying rerank request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(RerankError::Unavailable(err.to_string()));
                }
            }
        }
    }
}

/// Servers return passages sorted by score; map them back to input order.
fn scores_in_passage_order(
    ranked: Vec<RankedPassage>,
    expected: usize,
) -> Result<Vec<f64>, RerankError> {
    let mismatch = RerankError::ScoreCountMismatch {
        expected,
        returned: ranked.len(),
    };
    if ranked.len() != expected {
        return Err(mismatch);
    }
    let mut scores = vec![None; expected];
    for passage in ranked {
        match scores.get_mut(passage.index) {
            Some(slot) if slot.is_none() => *slot = Some(passage.score),
            _ => return Err(mismatch),
        }
    }
    scores
        .into_iter()
        .collect::<Option<Vec<f64>>>()
        .ok_or(mismatch)
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct RankedPassage {
    index: usize,
    score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_passage_order() {
        let ranked: Vec<RankedPassage> =
            serde_json::from_str(r#"[{"index":2,"score":0.9},{"index":0,"score":0.4},{"index":1,"score":0.1}]"#)
                .expect("valid json");
        assert_eq!(
            scores_in_passage_order(ranked, 3).expect("complete"),
            vec![0.4, 0.1, 0.9]
        );
    }

    #[test]
    fn rejects_missing_or_repeated_indexes() {
        let repeated = vec![
            RankedPassage { index: 0, score: 0.5 },
            RankedPassage { index: 0, score: 0.4 },
        ];
        assert!(matches!(
            scores_in_passage_order(repeated, 2),
            Err(RerankError::ScoreCountMismatch { .. })
        ));
        let short = vec![RankedPassage { index: 0, score: 0.5 }];
        assert!(scores_in_passage_order(short, 2).is_err());
    }
}
