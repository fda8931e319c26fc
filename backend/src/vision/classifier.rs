use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use shared::{BreedAnalysis, BreedProbability, CrossbreedAnalysis, Species};

use crate::vision::validator::ImagePayload;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classification service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Classification service returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResult {
    pub is_safe: bool,
    pub nsfw_probability: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesPrediction {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesResult {
    pub species: String,
    pub confidence: f32,
    pub top_predictions: Vec<SpeciesPrediction>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn check_content(&self, image: &ImagePayload) -> Result<SafetyResult, ClassifierError>;

    async fn detect_species(&self, image: &ImagePayload) -> Result<SpeciesResult, ClassifierError>;

    async fn detect_breed(
        &self,
        image: &ImagePayload,
        species: Species,
        top_k: usize,
    ) -> Result<BreedAnalysis, ClassifierError>;
}

#[derive(Serialize)]
struct ContentSafetyRequest<'a> {
    image: &'a str,
}

#[derive(Serialize)]
struct SpeciesRequest<'a> {
    image: &'a str,
    top_k: usize,
}

#[derive(Serialize)]
struct BreedRequest<'a> {
    image: &'a str,
    species: String,
    top_k: usize,
}

#[derive(Deserialize)]
struct BreedPredictionsResponse {
    predictions: Vec<BreedProbability>,
}

#[derive(Clone)]
pub struct ClassifierService {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    crossbreed_second_threshold: f32,
}

impl ClassifierService {
    pub fn new(base_url: String, timeout: Duration, crossbreed_second_threshold: f32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            timeout,
            crossbreed_second_threshold,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, ClassifierError>
    where
        Req: Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint(path))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| ClassifierError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::ServiceUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Classifier for ClassifierService {
    async fn check_content(&self, image: &ImagePayload) -> Result<SafetyResult, ClassifierError> {
        let encoded = BASE64.encode(&image.bytes);
        self.post_json("v1/content-safety", &ContentSafetyRequest { image: &encoded })
            .await
    }

    async fn detect_species(&self, image: &ImagePayload) -> Result<SpeciesResult, ClassifierError> {
        let encoded = BASE64.encode(&image.bytes);
        self.post_json(
            "v1/species",
            &SpeciesRequest {
                image: &encoded,
                top_k: 3,
            },
        )
        .await
    }

    async fn detect_breed(
        &self,
        image: &ImagePayload,
        species: Species,
        top_k: usize,
    ) -> Result<BreedAnalysis, ClassifierError> {
        let encoded = BASE64.encode(&image.bytes);
        let response: BreedPredictionsResponse = self
            .post_json(
                "v1/breeds",
                &BreedRequest {
                    image: &encoded,
                    species: species.to_string(),
                    top_k,
                },
            )
            .await?;

        analyze_breed_distribution(response.predictions, self.crossbreed_second_threshold)
    }
}

/// Flags a likely crossbreed when the runner-up probability is itself
/// non-trivial. A purebred hit concentrates mass in the top prediction;
/// a mix spreads it across the parent breeds, so the top two land close
/// together at low absolute values.
pub fn analyze_breed_distribution(
    mut predictions: Vec<BreedProbability>,
    second_threshold: f32,
) -> Result<BreedAnalysis, ClassifierError> {
    predictions.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
    });

    let top = predictions
        .first()
        .cloned()
        .ok_or_else(|| ClassifierError::InvalidResponse("empty breed predictions".to_string()))?;

    let second = predictions.get(1).cloned();
    match second {
        Some(second) if second.probability >= second_threshold => {
            let blended = (top.probability + second.probability) / 2.0;
            let reasoning = format!(
                "Top predictions {} ({:.1}%) and {} ({:.1}%) are both non-trivial and close in magnitude, which indicates mixed ancestry rather than a single dominant breed",
                top.breed,
                top.probability * 100.0,
                second.breed,
                second.probability * 100.0,
            );
            Ok(BreedAnalysis {
                primary_breed: top.breed.clone(),
                confidence: blended,
                is_likely_crossbreed: true,
                crossbreed_analysis: Some(CrossbreedAnalysis {
                    detected_breeds: [top.breed, second.breed],
                    common_name: common_crossbreed_name(
                        &predictions[0].breed,
                        &predictions[1].breed,
                    ),
                    confidence_reasoning: reasoning,
                }),
                breed_probabilities: predictions,
            })
        }
        _ => Ok(BreedAnalysis {
            primary_breed: top.breed,
            confidence: top.probability,
            is_likely_crossbreed: false,
            crossbreed_analysis: None,
            breed_probabilities: predictions,
        }),
    }
}

// Colloquial names for frequently seen deliberate mixes.
fn common_crossbreed_name(a: &str, b: &str) -> Option<String> {
    const KNOWN_MIXES: &[(&str, &str, &str)] = &[
        ("labrador_retriever", "poodle", "Labradoodle"),
        ("golden_retriever", "poodle", "Goldendoodle"),
        ("cocker_spaniel", "poodle", "Cockapoo"),
        ("maltese", "poodle", "Maltipoo"),
        ("cavalier_king_charles_spaniel", "poodle", "Cavapoo"),
        ("pug", "beagle", "Puggle"),
        ("chihuahua", "dachshund", "Chiweenie"),
        ("siberian_husky", "pomeranian", "Pomsky"),
    ];

    KNOWN_MIXES
        .iter()
        .find(|(x, y, _)| {
            (a.eq_ignore_ascii_case(x) && b.eq_ignore_ascii_case(y))
                || (a.eq_ignore_ascii_case(y) && b.eq_ignore_ascii_case(x))
        })
        .map(|(_, _, name)| (*name).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs(pairs: &[(&str, f32)]) -> Vec<BreedProbability> {
        pairs
            .iter()
            .map(|(breed, probability)| BreedProbability {
                breed: (*breed).to_string(),
                probability: *probability,
            })
            .collect()
    }

    #[test]
    fn close_top_two_flags_crossbreed_with_blended_confidence() {
        let analysis =
            analyze_breed_distribution(probs(&[("breed_a", 0.47), ("breed_b", 0.36)]), 0.05)
                .unwrap();

        assert!(analysis.is_likely_crossbreed);
        assert!((analysis.confidence - 0.415).abs() < 1e-6);
        let cross = analysis.crossbreed_analysis.unwrap();
        assert_eq!(cross.detected_breeds[0], "breed_a");
        assert_eq!(cross.detected_breeds[1], "breed_b");
    }

    #[test]
    fn dominant_top_prediction_stays_purebred() {
        let analysis = analyze_breed_distribution(
            probs(&[("golden_retriever", 0.89), ("labrador_retriever", 0.04)]),
            0.05,
        )
        .unwrap();

        assert!(!analysis.is_likely_crossbreed);
        assert!(analysis.crossbreed_analysis.is_none());
        assert_eq!(analysis.primary_breed, "golden_retriever");
        assert_eq!(analysis.confidence, 0.89);
    }

    #[test]
    fn diffuse_low_probabilities_flag_crossbreed() {
        let analysis = analyze_breed_distribution(
            probs(&[("breed_a", 0.0886), ("breed_b", 0.0845), ("breed_c", 0.03)]),
            0.05,
        )
        .unwrap();

        assert!(analysis.is_likely_crossbreed);
        assert!((analysis.confidence - 0.08655).abs() < 1e-6);
    }

    #[test]
    fn second_probability_at_threshold_counts() {
        let analysis =
            analyze_breed_distribution(probs(&[("breed_a", 0.50), ("breed_b", 0.05)]), 0.05)
                .unwrap();
        assert!(analysis.is_likely_crossbreed);
    }

    #[test]
    fn unsorted_input_is_reordered_before_analysis() {
        let analysis = analyze_breed_distribution(
            probs(&[("breed_low", 0.10), ("breed_top", 0.60)]),
            0.05,
        )
        .unwrap();

        assert_eq!(analysis.primary_breed, "breed_top");
        assert_eq!(analysis.breed_probabilities[0].breed, "breed_top");
        assert_eq!(analysis.breed_probabilities[1].breed, "breed_low");
    }

    #[test]
    fn single_prediction_stays_purebred() {
        let analysis =
            analyze_breed_distribution(probs(&[("siamese", 0.72)]), 0.05).unwrap();
        assert!(!analysis.is_likely_crossbreed);
        assert_eq!(analysis.confidence, 0.72);
    }

    #[test]
    fn empty_predictions_are_invalid() {
        let err = analyze_breed_distribution(Vec::new(), 0.05).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidResponse(_)));
    }

    #[test]
    fn known_mix_resolves_common_name_in_either_order() {
        assert_eq!(
            common_crossbreed_name("labrador_retriever", "poodle").as_deref(),
            Some("Labradoodle")
        );
        assert_eq!(
            common_crossbreed_name("poodle", "labrador_retriever").as_deref(),
            Some("Labradoodle")
        );
        assert_eq!(common_crossbreed_name("beagle", "whippet"), None);
    }

    #[test]
    fn crossbreed_reasoning_names_both_breeds() {
        let analysis =
            analyze_breed_distribution(probs(&[("pug", 0.32), ("beagle", 0.29)]), 0.05).unwrap();
        let cross = analysis.crossbreed_analysis.unwrap();
        assert!(cross.confidence_reasoning.contains("pug"));
        assert!(cross.confidence_reasoning.contains("beagle"));
        assert_eq!(cross.common_name.as_deref(), Some("Puggle"));
    }

    mod http {
        use super::*;
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn payload() -> ImagePayload {
            ImagePayload {
                bytes: vec![0x89, 0x50, 0x4e, 0x47],
                format: image::ImageFormat::Png,
                width: 64,
                height: 64,
            }
        }

        fn service(uri: String) -> ClassifierService {
            ClassifierService::new(uri, Duration::from_secs(2), 0.05)
        }

        #[tokio::test]
        async fn check_content_round_trip() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/content-safety"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "is_safe": true,
                    "nsfw_probability": 0.02
                })))
                .mount(&server)
                .await;

            let result = service(server.uri()).check_content(&payload()).await.unwrap();
            assert!(result.is_safe);
            assert!((result.nsfw_probability - 0.02).abs() < 1e-6);
        }

        #[tokio::test]
        async fn detect_species_round_trip() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/species"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "species": "cat",
                    "confidence": 0.91,
                    "top_predictions": [
                        {"label": "cat", "confidence": 0.91},
                        {"label": "dog", "confidence": 0.06}
                    ]
                })))
                .mount(&server)
                .await;

            let result = service(server.uri()).detect_species(&payload()).await.unwrap();
            assert_eq!(result.species, "cat");
            assert_eq!(result.top_predictions.len(), 2);
        }

        #[tokio::test]
        async fn detect_breed_flags_crossbreed_from_diffuse_predictions() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/breeds"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "predictions": [
                        {"breed": "labrador_retriever", "probability": 0.0886},
                        {"breed": "poodle", "probability": 0.0845},
                        {"breed": "beagle", "probability": 0.021}
                    ]
                })))
                .mount(&server)
                .await;

            let analysis = service(server.uri())
                .detect_breed(&payload(), Species::Dog, 5)
                .await
                .unwrap();
            assert!(analysis.is_likely_crossbreed);
            assert!((analysis.confidence - 0.08655).abs() < 1e-6);
            assert_eq!(
                analysis.crossbreed_analysis.unwrap().common_name.as_deref(),
                Some("Labradoodle")
            );
        }

        #[tokio::test]
        async fn server_error_surfaces_as_unavailable() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/content-safety"))
                .respond_with(ResponseTemplate::new(500).set_body_string("worker crashed"))
                .mount(&server)
                .await;

            let err = service(server.uri()).check_content(&payload()).await.unwrap_err();
            assert!(matches!(err, ClassifierError::ServiceUnavailable(_)));
            assert!(err.to_string().contains("500"));
        }

        #[tokio::test]
        async fn malformed_body_is_an_invalid_response() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/content-safety"))
                .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
                .mount(&server)
                .await;

            let err = service(server.uri()).check_content(&payload()).await.unwrap_err();
            assert!(matches!(err, ClassifierError::InvalidResponse(_)));
        }

        #[tokio::test]
        async fn unreachable_service_is_unavailable() {
            let err = service("http://127.0.0.1:1".to_string())
                .check_content(&payload())
                .await
                .unwrap_err();
            assert!(matches!(err, ClassifierError::ServiceUnavailable(_)));
        }
    }
}
