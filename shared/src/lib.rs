use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Species {
    Dog,
    Cat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreedProbability {
    pub breed: String,
    pub probability: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossbreedAnalysis {
    pub detected_breeds: [String; 2],
    pub common_name: Option<String>,
    pub confidence_reasoning: String,
}

// Invariant: `is_likely_crossbreed` holds exactly when `crossbreed_analysis`
// is present, and `breed_probabilities` is ordered descending by probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreedAnalysis {
    pub primary_breed: String,
    pub confidence: f32,
    pub is_likely_crossbreed: bool,
    pub breed_probabilities: Vec<BreedProbability>,
    pub crossbreed_analysis: Option<CrossbreedAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeContext {
    pub breed: Option<String>,
    pub parent_breeds: Option<Vec<String>>,
    pub description: String,
    pub care_summary: String,
    pub health_info: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitProfile {
    pub size: String,
    pub energy_level: String,
    pub temperament: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub species: Species,
    pub breed_analysis: BreedAnalysis,
    pub description: String,
    pub traits: TraitProfile,
    pub health_observations: Vec<String>,
    pub enriched_info: Option<KnowledgeContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
            timestamp: Utc::now(),
        }
    }
}
