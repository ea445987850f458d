//! End-to-end pipeline tests against deterministic service doubles.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;

use car_advisor::config::PipelineConfig;
use car_advisor::error::RetrievalError;
use car_advisor::generation::Generator;
use car_advisor::model::{
    CandidateRecord, ComposedPrompt, Preferences, RawGeneration, UserQuery, Warning,
};
use car_advisor::pipeline::Pipeline;
use car_advisor::retrieval::DocumentStore;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct InMemoryStore {
    candidates: Vec<CandidateRecord>,
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn search(
        &self,
        _query: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, RetrievalError> {
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

struct UnreachableStore;

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn search(
        &self,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<CandidateRecord>, RetrievalError> {
        Err(RetrievalError::Transport("dns failure".into()))
    }
}

/// Records the prompt it was handed and replies with a fixed text.
struct EchoingGenerator {
    reply: String,
    seen_prompts: Mutex<Vec<ComposedPrompt>>,
}

impl EchoingGenerator {
    fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            seen_prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for EchoingGenerator {
    async fn generate(
        &self,
        prompt: &ComposedPrompt,
    ) -> Result<RawGeneration, car_advisor::error::GenerationError> {
        self.seen_prompts.lock().await.push(prompt.clone());
        Ok(RawGeneration {
            text: self.reply.clone(),
            prompt: prompt.clone(),
            at: Utc::now(),
        })
    }
}

fn candidate(id: &str, score: f32, description: &str) -> CandidateRecord {
    CandidateRecord {
        id: id.to_string(),
        description: description.to_string(),
        score,
        metadata: Default::default(),
    }
}

fn family_query() -> UserQuery {
    UserQuery {
        utterance: "a safe car for school runs and holidays".to_string(),
        preferences: Preferences {
            age: Some(38),
            children: Some(3),
            max_budget: Some(35_000.0),
            ..Preferences::default()
        },
    }
}

fn reply_with(entries: usize) -> String {
    let items: Vec<_> = (0..entries)
        .map(|i| {
            json!({
                "brand": format!("Brand{i}"),
                "model": "Estate",
                "year": 2023,
                "price": 28_500,
                "interior_size": "large",
                "description": "Seven seats, good safety record.",
                "maintenance_rating": 6,
                "interior_rating": 9,
                "general_rating": 8,
            })
        })
        .collect();
    format!("Here you go:\n```json\n{}\n```", json!(items))
}

#[tokio::test]
async fn retrieved_context_flows_into_the_prompt_and_out_comes_advice() {
    init_tracing();
    let store = Arc::new(InMemoryStore {
        candidates: vec![
            candidate("suv-7", 0.92, "Seven-seat SUV, hybrid drivetrain."),
            candidate("estate-5", 0.71, "Mid-size estate with a huge boot."),
        ],
    });
    let generator = Arc::new(EchoingGenerator::new(reply_with(2)));
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        store,
        Arc::clone(&generator) as Arc<dyn Generator>,
    )
    .expect("pipeline");

    let advice = pipeline.recommend(&family_query()).await.expect("done");
    assert_eq!(advice.recommendations.len(), 2);
    assert!(advice.warnings.is_empty());
    assert_eq!(advice.recommendations.items()[0].brand, "Brand0");

    let prompts = generator.seen_prompts.lock().await;
    assert_eq!(prompts.len(), 1);
    let all_text: String = prompts[0]
        .turns()
        .iter()
        .map(|t| t.content.as_str())
        .collect();
    assert!(all_text.contains("Seven-seat SUV"));
    assert!(all_text.contains("children: 3"));
    assert!(all_text.contains("school runs"));
}

#[tokio::test]
async fn unreachable_store_still_yields_recommendations() {
    init_tracing();
    let generator = Arc::new(EchoingGenerator::new(reply_with(3)));
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::new(UnreachableStore),
        generator,
    )
    .expect("pipeline");

    let advice = pipeline.recommend(&family_query()).await.expect("done");
    assert_eq!(advice.recommendations.len(), 3);
    assert!(matches!(
        advice.warnings.as_slice(),
        [Warning::RetrievalDegraded { .. }]
    ));
}

#[tokio::test]
async fn overlong_reply_is_truncated_to_the_cap() {
    init_tracing();
    let generator = Arc::new(EchoingGenerator::new(reply_with(7)));
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        Arc::new(InMemoryStore { candidates: vec![] }),
        generator,
    )
    .expect("pipeline");

    let advice = pipeline.recommend(&family_query()).await.expect("done");
    assert_eq!(advice.recommendations.len(), 5);
    assert!(advice
        .warnings
        .contains(&Warning::SetTruncated { kept: 5, dropped: 2 }));
}
