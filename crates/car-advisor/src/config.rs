use std::time::Duration;

use crate::error::ConfigError;

/// Pipeline tunables. The defaults are reasonable starting points, not
/// contracts; every value can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum entries in the final `RecommendationSet`.
    pub max_recommendations: usize,
    /// Character budget for the composed prompt.
    pub prompt_budget_chars: usize,
    /// Maximum description length per recommendation, in characters.
    pub description_cap: usize,
    /// Language the model is instructed to write descriptions in.
    pub description_language: String,
    /// How many candidate documents to request from the store.
    pub retrieval_limit: usize,
    /// Retries after the first failed generation call.
    pub max_generation_retries: u32,
    pub retry_base: Duration,
    pub retry_factor: u32,
    pub retry_max: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_recommendations: 5,
            prompt_budget_chars: 6_000,
            description_cap: 100,
            description_language: "English".to_string(),
            retrieval_limit: 5,
            max_generation_retries: 2,
            retry_base: Duration::from_millis(500),
            retry_factor: 2,
            retry_max: Duration::from_secs(8),
        }
    }
}

impl PipelineConfig {
    /// Load overrides from environment variables, falling back to defaults
    /// for anything absent or unparseable:
    ///
    /// - `ADVISOR_MAX_RECOMMENDATIONS`
    /// - `ADVISOR_PROMPT_BUDGET_CHARS`
    /// - `ADVISOR_DESCRIPTION_CAP`
    /// - `ADVISOR_DESCRIPTION_LANGUAGE`
    /// - `ADVISOR_RETRIEVAL_LIMIT`
    /// - `ADVISOR_MAX_GENERATION_RETRIES`
    /// - `ADVISOR_RETRY_BASE_MS`
    /// - `ADVISOR_RETRY_FACTOR`
    /// - `ADVISOR_RETRY_MAX_MS`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_recommendations: env_parse("ADVISOR_MAX_RECOMMENDATIONS")
                .unwrap_or(defaults.max_recommendations),
            prompt_budget_chars: env_parse("ADVISOR_PROMPT_BUDGET_CHARS")
                .unwrap_or(defaults.prompt_budget_chars),
            description_cap: env_parse("ADVISOR_DESCRIPTION_CAP")
                .unwrap_or(defaults.description_cap),
            description_language: std::env::var("ADVISOR_DESCRIPTION_LANGUAGE")
                .unwrap_or(defaults.description_language),
            retrieval_limit: env_parse("ADVISOR_RETRIEVAL_LIMIT")
                .unwrap_or(defaults.retrieval_limit),
            max_generation_retries: env_parse("ADVISOR_MAX_GENERATION_RETRIES")
                .unwrap_or(defaults.max_generation_retries),
            retry_base: env_parse("ADVISOR_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base),
            retry_factor: env_parse("ADVISOR_RETRY_FACTOR").unwrap_or(defaults.retry_factor),
            retry_max: env_parse("ADVISOR_RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_max),
        }
    }

    /// Reject configurations that cannot produce a working pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_recommendations == 0 {
            return Err(ConfigError::Invalid(
                "max_recommendations must be at least 1".into(),
            ));
        }
        if self.prompt_budget_chars == 0 {
            return Err(ConfigError::Invalid(
                "prompt_budget_chars must be positive".into(),
            ));
        }
        if self.description_cap == 0 {
            return Err(ConfigError::Invalid(
                "description_cap must be positive".into(),
            ));
        }
        if self.retry_factor == 0 {
            return Err(ConfigError::Invalid("retry_factor must be positive".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let config = PipelineConfig {
            prompt_budget_chars: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cap_is_rejected() {
        let config = PipelineConfig {
            max_recommendations: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_factor_is_overridable_from_the_environment() {
        std::env::set_var("ADVISOR_RETRY_FACTOR", "3");
        let config = PipelineConfig::from_env();
        std::env::remove_var("ADVISOR_RETRY_FACTOR");
        assert_eq!(config.retry_factor, 3);
    }
}
