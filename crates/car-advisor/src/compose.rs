/// Deterministic prompt construction.
///
/// The system turn pins the output contract (JSON array, field names, rating
/// semantics, description cap and language, no HTML). The user turn carries
/// the serialized profile and the utterance. Retrieved candidates, when
/// present, go into a second user turn and are truncated whole-candidate at a
/// time from the lowest-relevance end until the prompt fits the budget. The
/// system instruction is never truncated: if the zero-candidate prompt
/// already exceeds the budget, composition fails.
///
/// For identical inputs the output is byte-identical; nothing here reads a
/// clock or random source.
use std::fmt::Write as _;

use crate::config::PipelineConfig;
use crate::error::PromptTooLargeError;
use crate::model::{CandidateRecord, ComposedPrompt, PromptTurn, Role, UserQuery};

pub struct PromptComposer {
    budget_chars: usize,
    max_recommendations: usize,
    description_cap: usize,
    description_language: String,
}

impl PromptComposer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            budget_chars: config.prompt_budget_chars,
            max_recommendations: config.max_recommendations,
            description_cap: config.description_cap,
            description_language: config.description_language.clone(),
        }
    }

    pub fn compose(
        &self,
        query: &UserQuery,
        candidates: &[CandidateRecord],
    ) -> Result<ComposedPrompt, PromptTooLargeError> {
        let system = self.system_instruction();
        let user = render_user_turn(query);

        let base_chars = system.chars().count() + user.chars().count();
        if base_chars > self.budget_chars {
            return Err(PromptTooLargeError {
                budget: self.budget_chars,
                required: base_chars,
            });
        }

        let mut turns = vec![
            PromptTurn {
                role: Role::System,
                content: system,
            },
            PromptTurn {
                role: Role::User,
                content: user,
            },
        ];

        // Candidates arrive ordered most-relevant first; dropping from the
        // tail sheds the least useful context first.
        let mut kept = candidates.len();
        while kept > 0 {
            let context = render_context_turn(&candidates[..kept]);
            if base_chars + context.chars().count() <= self.budget_chars {
                turns.push(PromptTurn {
                    role: Role::User,
                    content: context,
                });
                break;
            }
            kept -= 1;
        }

        Ok(ComposedPrompt::new(turns, self.budget_chars))
    }

    fn system_instruction(&self) -> String {
        format!(
            "You are a car dealership assistant. Recommend up to {max} cars that fit \
             the customer profile.\n\
             Respond with a JSON array only. No HTML and no prose outside the array.\n\
             Each element must have exactly these fields:\n\
             \"brand\" (string), \"model\" (string), \"year\" (positive integer), \
             \"price\" (positive number), \"interior_size\" (string, optional), \
             \"description\" (string, at most {cap} characters, written in {lang}), \
             \"maintenance_rating\", \"interior_rating\" and \"general_rating\" \
             (integers from 0 to 10, where 0 is worst and 10 is best).\n\
             Omit any rating you cannot justify rather than guessing a value.",
            max = self.max_recommendations,
            cap = self.description_cap,
            lang = self.description_language,
        )
    }
}

fn render_user_turn(query: &UserQuery) -> String {
    let mut out = String::from("Customer profile:\n");
    let p = &query.preferences;
    if let Some(age) = p.age {
        let _ = writeln!(out, "  age: {age}");
    }
    if let Some(height) = p.height_cm {
        let _ = writeln!(out, "  height: {height} cm");
    }
    if let Some(weight) = p.weight_kg {
        let _ = writeln!(out, "  weight: {weight} kg");
    }
    if let Some(status) = &p.marital_status {
        let _ = writeln!(out, "  marital status: {status}");
    }
    if let Some(children) = p.children {
        let _ = writeln!(out, "  children: {children}");
    }
    if let Some(budget) = p.max_budget {
        let _ = writeln!(out, "  maximum budget: {budget}");
    }
    let _ = write!(out, "Request: {}", query.utterance);
    out
}

fn render_context_turn(candidates: &[CandidateRecord]) -> String {
    let mut out = String::from("Inventory notes that may be relevant, most relevant first:\n");
    for candidate in candidates {
        let _ = writeln!(out, "- [{}] {}", candidate.id, candidate.description);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Preferences;

    fn query() -> UserQuery {
        UserQuery {
            utterance: "I need a reliable family car".to_string(),
            preferences: Preferences {
                age: Some(41),
                height_cm: Some(172),
                weight_kg: None,
                marital_status: Some("married".to_string()),
                children: Some(2),
                max_budget: Some(30_000.0),
            },
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

    fn composer(budget: usize) -> PromptComposer {
        PromptComposer::new(&PipelineConfig {
            prompt_budget_chars: budget,
            ..PipelineConfig::default()
        })
    }

    #[test]
    fn identical_inputs_compose_identical_prompts() {
        let composer = composer(6_000);
        let candidates = vec![
            candidate("a", 0.9, "A roomy SUV with seven seats."),
            candidate("b", 0.5, "A compact city hatchback."),
        ];
        let first = composer.compose(&query(), &candidates).expect("compose");
        let second = composer.compose(&query(), &candidates).expect("compose");
        assert_eq!(first, second);
    }

    #[test]
    fn prompt_never_exceeds_budget() {
        let composer = composer(6_000);
        let candidates: Vec<_> = (0..20)
            .map(|i| candidate(&format!("c{i}"), 1.0 - i as f32 * 0.01, &"x".repeat(400)))
            .collect();
        let prompt = composer.compose(&query(), &candidates).expect("compose");
        assert!(prompt.len_chars() <= prompt.budget_chars());
    }

    #[test]
    fn truncation_drops_lowest_relevance_candidates_first() {
        // Budget sized so the skeleton plus roughly one candidate fits.
        let base = composer(6_000)
            .compose(&query(), &[])
            .expect("compose")
            .len_chars();
        let composer = composer(base + 120);
        let candidates = vec![
            candidate("best", 0.9, "Top pick, short note."),
            candidate("worst", 0.1, "Least relevant, also short."),
        ];
        let prompt = composer.compose(&query(), &candidates).expect("compose");
        let context = prompt
            .turns()
            .iter()
            .skip(2)
            .map(|t| t.content.as_str())
            .collect::<String>();
        assert!(context.contains("[best]"));
        assert!(!context.contains("[worst]"));
    }

    #[test]
    fn all_candidates_dropped_leaves_two_turns() {
        let base = composer(6_000)
            .compose(&query(), &[])
            .expect("compose")
            .len_chars();
        let composer = composer(base + 5);
        let candidates = vec![candidate("a", 0.9, "Far too long to fit in five chars.")];
        let prompt = composer.compose(&query(), &candidates).expect("compose");
        assert_eq!(prompt.turns().len(), 2);
    }

    #[test]
    fn skeleton_over_budget_fails_instead_of_truncating() {
        let composer = composer(50);
        let err = composer.compose(&query(), &[]).expect_err("must fail");
        assert_eq!(err.budget, 50);
        assert!(err.required > 50);
    }

    #[test]
    fn absent_preferences_are_omitted() {
        let composer = composer(6_000);
        let query = UserQuery::new("anything cheap");
        let prompt = composer.compose(&query, &[]).expect("compose");
        let user = &prompt.turns()[1].content;
        assert!(!user.contains("age:"));
        assert!(!user.contains("maximum budget:"));
        assert!(user.contains("Request: anything cheap"));
    }
}
