use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineThresholds {
    pub species_min_confidence: f32,
    pub breed_min_confidence: f32,
    pub crossbreed_second_threshold: f32,
}

impl Default for PipelineThresholds {
    fn default() -> Self {
        Self {
            species_min_confidence: 0.25,
            breed_min_confidence: 0.10,
            crossbreed_second_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageLimits {
    pub max_bytes: usize,
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            min_dimension: 64,
            max_dimension: 8192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub classifier_url: String,
    pub knowledge_url: String,
    pub analysis_model_url: String,
    pub analysis_model_name: String,
    pub analysis_api_key: Option<String>,
    pub classifier_timeout: Duration,
    pub knowledge_timeout: Duration,
    pub analysis_timeout: Duration,
    pub thresholds: PipelineThresholds,
    pub image_limits: ImageLimits,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = PipelineThresholds::default();
        let limits = ImageLimits::default();

        Ok(Self {
            classifier_url: required_env("CLASSIFIER_URL")?,
            knowledge_url: required_env("KNOWLEDGE_URL")?,
            analysis_model_url: required_env("ANALYSIS_MODEL_URL")?,
            analysis_model_name: env::var("ANALYSIS_MODEL_NAME")
                .unwrap_or_else(|_| "pawscan-vision-1".to_string()),
            analysis_api_key: env::var("ANALYSIS_API_KEY").ok(),
            classifier_timeout: Duration::from_secs(parse_env("CLASSIFIER_TIMEOUT_SECS", 10)),
            knowledge_timeout: Duration::from_secs(parse_env("KNOWLEDGE_TIMEOUT_SECS", 5)),
            analysis_timeout: Duration::from_secs(parse_env("ANALYSIS_TIMEOUT_SECS", 30)),
            thresholds: PipelineThresholds {
                species_min_confidence: parse_env(
                    "SPECIES_MIN_CONFIDENCE",
                    defaults.species_min_confidence,
                ),
                breed_min_confidence: parse_env(
                    "BREED_MIN_CONFIDENCE",
                    defaults.breed_min_confidence,
                ),
                crossbreed_second_threshold: parse_env(
                    "CROSSBREED_SECOND_THRESHOLD",
                    defaults.crossbreed_second_threshold,
                ),
            },
            image_limits: ImageLimits {
                max_bytes: parse_env("MAX_IMAGE_BYTES", limits.max_bytes),
                min_dimension: parse_env("MIN_IMAGE_DIMENSION", limits.min_dimension),
                max_dimension: parse_env("MAX_IMAGE_DIMENSION", limits.max_dimension),
            },
        })
    }
}

fn required_env(key: &str) -> Result<String, Box<dyn std::error::Error>> {
    env::var(key).map_err(|_| format!("{} must be set", key).into())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_to_default() {
        assert_eq!(parse_env("PAWSCAN_TEST_UNSET_KEY", 0.25f32), 0.25);
    }

    #[test]
    fn parse_env_reads_value() {
        unsafe { env::set_var("PAWSCAN_TEST_PARSE_KEY", "0.4") };
        assert_eq!(parse_env("PAWSCAN_TEST_PARSE_KEY", 0.25f32), 0.4);
        unsafe { env::remove_var("PAWSCAN_TEST_PARSE_KEY") };
    }

    #[test]
    fn parse_env_ignores_garbage() {
        unsafe { env::set_var("PAWSCAN_TEST_GARBAGE_KEY", "not-a-number") };
        assert_eq!(parse_env("PAWSCAN_TEST_GARBAGE_KEY", 7u64), 7);
        unsafe { env::remove_var("PAWSCAN_TEST_GARBAGE_KEY") };
    }

    #[test]
    fn required_env_reports_missing_key() {
        let err = required_env("PAWSCAN_TEST_REQUIRED_MISSING").unwrap_err();
        assert!(err.to_string().contains("PAWSCAN_TEST_REQUIRED_MISSING"));
    }

    #[test]
    fn default_thresholds_match_deployment_defaults() {
        let thresholds = PipelineThresholds::default();
        assert_eq!(thresholds.species_min_confidence, 0.25);
        assert_eq!(thresholds.breed_min_confidence, 0.10);
        assert_eq!(thresholds.crossbreed_second_threshold, 0.05);
    }
}
