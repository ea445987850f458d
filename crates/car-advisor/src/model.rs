use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation turn's worth of user input. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuery {
    /// Free-text request, e.g. "I need a family car for long trips".
    pub utterance: String,
    /// Structured profile fields; absent fields are simply not serialized
    /// into the prompt.
    pub preferences: Preferences,
}

impl UserQuery {
    pub fn new(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            preferences: Preferences::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    pub age: Option<u8>,
    pub height_cm: Option<u16>,
    pub weight_kg: Option<u16>,
    pub marital_status: Option<String>,
    pub children: Option<u8>,
    pub max_budget: Option<f64>,
}

/// One retrieved document from the search index. Read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub description: String,
    /// Relevance in [0, 1]; higher is more relevant.
    pub score: f32,
    /// Source-specific fields. A `BTreeMap` keeps prompt serialization
    /// byte-stable across runs.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

/// An ordered sequence of role-tagged turns, tagged with the budget it was
/// composed under. Built only by the composer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    turns: Vec<PromptTurn>,
    budget_chars: usize,
}

impl ComposedPrompt {
    pub(crate) fn new(turns: Vec<PromptTurn>, budget_chars: usize) -> Self {
        Self { turns, budget_chars }
    }

    pub fn turns(&self) -> &[PromptTurn] {
        &self.turns
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    /// Total content length in characters across all turns.
    pub fn len_chars(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }
}

/// Opaque model output, tagged with the prompt that produced it. Lives only
/// until parsing is done.
#[derive(Debug, Clone)]
pub struct RawGeneration {
    pub text: String,
    pub prompt: ComposedPrompt,
    pub at: DateTime<Utc>,
}

/// One validated recommendation. Ratings are integers in [0, 10]; price and
/// year are positive. The parser enforces both before constructing this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub price: f64,
    pub interior_size: Option<String>,
    /// Capped at the configured description length.
    pub description: String,
    pub maintenance_rating: u8,
    pub interior_rating: u8,
    pub general_rating: u8,
}

/// The final, immutable artifact returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    items: Vec<Recommendation>,
}

impl RecommendationSet {
    pub(crate) fn new(items: Vec<Recommendation>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Recommendation] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Non-fatal conditions accumulated during a run. Warnings never suppress a
/// successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Retrieval failed; generation proceeded without retrieved context.
    RetrievalDegraded { detail: String },
    /// The generation was empty; the result set is empty by construction.
    NoContent,
    /// The generation held more entries than the cap; extras were discarded.
    SetTruncated { kept: usize, dropped: usize },
    /// One entry failed validation and was dropped.
    EntryDropped { index: usize, reason: DropReason },
    /// A description exceeded the cap and was shortened.
    DescriptionTruncated { index: usize },
}

/// Why a single parsed entry was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    /// A required field is absent. Ratings are never invented to fill gaps.
    MissingField { field: String },
    RatingOutOfRange { field: String, value: i64 },
    NonPositive { field: String },
    Malformed { detail: String },
}
