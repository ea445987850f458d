/// Document store capability and its production adapter.
///
/// The pipeline only sees the `DocumentStore` trait, so its state machine is
/// testable against deterministic doubles without a live index.
use async_trait::async_trait;
use tracing::info;

use advisor_common::search::{SearchClient, SearchClientError, SearchDocument};

use crate::error::RetrievalError;
use crate::model::CandidateRecord;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Search for candidate records relevant to the query. Zero hits is an
    /// empty sequence, not an error.
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, RetrievalError>;
}

/// Production adapter over the managed search index.
pub struct SearchServiceStore {
    client: SearchClient,
}

impl SearchServiceStore {
    pub fn new(client: SearchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentStore for SearchServiceStore {
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, RetrievalError> {
        let documents = self
            .client
            .search(query, limit)
            .await
            .map_err(map_error)?;
        info!(hits = documents.len(), "search index responded");
        Ok(documents.into_iter().map(to_candidate).collect())
    }
}

fn to_candidate(doc: SearchDocument) -> CandidateRecord {
    // BM25-style scores are unbounded; s / (s + 1) maps them into (0, 1)
    // while preserving order.
    let score = if doc.score.is_finite() && doc.score > 0.0 {
        doc.score / (doc.score + 1.0)
    } else {
        0.0
    };
    CandidateRecord {
        id: doc.id,
        description: doc.content,
        score,
        metadata: doc.fields,
    }
}

fn map_error(error: SearchClientError) -> RetrievalError {
    match error {
        SearchClientError::Auth { status } => {
            RetrievalError::Auth(format!("status={status}"))
        }
        other => RetrievalError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn scores_map_into_unit_interval_preserving_order() {
        let high = to_candidate(doc("a", 9.0));
        let low = to_candidate(doc("b", 0.5));
        assert!(high.score > low.score);
        assert!(high.score > 0.0 && high.score < 1.0);
        assert!(low.score > 0.0 && low.score < 1.0);
    }

    #[test]
    fn negative_or_nan_scores_clamp_to_zero() {
        assert_eq!(to_candidate(doc("a", -2.0)).score, 0.0);
        assert_eq!(to_candidate(doc("b", f32::NAN)).score, 0.0);
    }

    fn doc(id: &str, score: f32) -> SearchDocument {
        SearchDocument {
            id: id.to_string(),
            content: "desc".to_string(),
            score,
            fields: BTreeMap::new(),
        }
    }
}
