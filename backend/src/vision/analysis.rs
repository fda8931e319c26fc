use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use shared::{BreedAnalysis, KnowledgeContext, Species, TraitProfile};

use crate::vision::knowledge::display_breed;
use crate::vision::validator::ImagePayload;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisModelError {
    #[error("Analysis model unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),
}

// The payload the model is contractually required to return: one JSON
// object with exactly these keys. Anything else fails the parse boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelObservations {
    pub description: String,
    pub traits: TraitProfile,
    pub health_observations: Vec<String>,
}

#[async_trait]
pub trait AnalysisModel: Send + Sync {
    async fn analyze(
        &self,
        image: &ImagePayload,
        species: Species,
        breed_analysis: &BreedAnalysis,
        context: Option<&KnowledgeContext>,
    ) -> Result<ModelObservations, AnalysisModelError>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

const SYSTEM_PROMPT: &str = "You are a veterinary vision assistant. You describe the animal in the submitted photo, grounded in the provided breed context. You respond with a single JSON object and nothing else.";

#[derive(Clone)]
pub struct AnalysisService {
    http: reqwest::Client,
    base_url: String,
    model_name: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl AnalysisService {
    pub fn new(
        base_url: String,
        model_name: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            model_name,
            api_key,
            timeout,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AnalysisModel for AnalysisService {
    async fn analyze(
        &self,
        image: &ImagePayload,
        species: Species,
        breed_analysis: &BreedAnalysis,
        context: Option<&KnowledgeContext>,
    ) -> Result<ModelObservations, AnalysisModelError> {
        let prompt = build_prompt(species, breed_analysis, context);
        let data_url = format!(
            "data:{};base64,{}",
            image.mime_type(),
            BASE64.encode(&image.bytes)
        );

        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text { text: prompt },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_url },
                        },
                    ]),
                },
            ],
            temperature: 0.2,
        };

        let mut req = self
            .http
            .post(self.completions_url())
            .timeout(self.timeout)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisModelError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisModelError::ServiceUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisModelError::MalformedResponse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| {
                AnalysisModelError::MalformedResponse("response contained no choices".to_string())
            })?;

        parse_observations(content)
    }
}

// Prompt layout: identification line, breed context section (or the
// "(unavailable)" marker), then the visual-grounding instruction and the
// output contract.
pub fn build_prompt(
    species: Species,
    breed_analysis: &BreedAnalysis,
    context: Option<&KnowledgeContext>,
) -> String {
    let mut sections = Vec::new();

    let identification = match &breed_analysis.crossbreed_analysis {
        Some(cross) => {
            let parents = format!(
                "{} and {}",
                display_breed(&cross.detected_breeds[0]),
                display_breed(&cross.detected_breeds[1]),
            );
            match &cross.common_name {
                Some(name) => format!(
                    "The photo shows a {} identified as a likely {} / {} cross, commonly called a {} (classifier confidence {:.0}%).",
                    species,
                    display_breed(&cross.detected_breeds[0]),
                    display_breed(&cross.detected_breeds[1]),
                    name,
                    breed_analysis.confidence * 100.0,
                ),
                None => format!(
                    "The photo shows a {} identified as a likely mix of {} (classifier confidence {:.0}%).",
                    species,
                    parents,
                    breed_analysis.confidence * 100.0,
                ),
            }
        }
        None => format!(
            "The photo shows a {} identified as a {} (classifier confidence {:.0}%).",
            species,
            display_breed(&breed_analysis.primary_breed),
            breed_analysis.confidence * 100.0,
        ),
    };
    sections.push(identification);

    let context_section = match context {
        Some(ctx) => {
            let mut lines = vec!["Breed context:".to_string()];
            if !ctx.description.is_empty() {
                lines.push(ctx.description.clone());
            }
            if !ctx.care_summary.is_empty() {
                lines.push(format!("Care: {}", ctx.care_summary));
            }
            if !ctx.health_info.is_empty() {
                lines.push(format!("Health considerations: {}", ctx.health_info));
            }
            lines.join("\n")
        }
        None => "Breed context: (unavailable)".to_string(),
    };
    sections.push(context_section);

    sections.push(
        "Describe only what is visually observable in this specific image: coat and body condition, approximate age cues, and individual-level traits. Do not recite generic breed knowledge as if it were observed."
            .to_string(),
    );

    sections.push(
        "Reply with a single JSON object with exactly these keys: \"description\" (string), \"traits\" (object with \"size\", \"energy_level\", \"temperament\"), and \"health_observations\" (array of strings)."
            .to_string(),
    );

    sections.join("\n\n")
}

// Parse boundary for untrusted model output. A fenced code block around
// the object is tolerated; any other deviation is an error, never a
// default value.
pub fn parse_observations(content: &str) -> Result<ModelObservations, AnalysisModelError> {
    let trimmed = content.trim();
    let unfenced = strip_code_fence(trimmed);
    serde_json::from_str(unfenced)
        .map_err(|e| AnalysisModelError::MalformedResponse(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
