use std::str::FromStr;
use std::sync::Arc;

use log::{error, info, warn};
use shared::{AnalysisOutcome, BreedAnalysis, KnowledgeContext, Species};

use crate::config::PipelineThresholds;
use crate::vision::analysis::{AnalysisModel, AnalysisModelError};
use crate::vision::classifier::{Classifier, ClassifierError};
use crate::vision::error::PipelineError;
use crate::vision::knowledge::KnowledgeStore;
use crate::vision::validator::ImageValidator;

const BREED_TOP_K: usize = 5;

// One sequential, gated pass per request: validate, content safety,
// species, breed, best-effort knowledge enrichment, grounded description.
// No stage after a failed gate runs, and knowledge retrieval never fails
// the request.
pub struct VisionPipeline {
    validator: ImageValidator,
    classifier: Arc<dyn Classifier>,
    knowledge: Arc<dyn KnowledgeStore>,
    model: Arc<dyn AnalysisModel>,
    thresholds: PipelineThresholds,
}

impl VisionPipeline {
    pub fn new(
        validator: ImageValidator,
        classifier: Arc<dyn Classifier>,
        knowledge: Arc<dyn KnowledgeStore>,
        model: Arc<dyn AnalysisModel>,
        thresholds: PipelineThresholds,
    ) -> Self {
        Self {
            validator,
            classifier,
            knowledge,
            model,
            thresholds,
        }
    }

    pub async fn analyze(&self, raw_image: &[u8]) -> Result<AnalysisOutcome, PipelineError> {
        let image = self.validator.validate(raw_image)?;
        info!(
            "Validated {} image ({}x{}, {} bytes)",
            image.mime_type(),
            image.width,
            image.height,
            image.bytes.len()
        );

        let safety = self
            .classifier
            .check_content(&image)
            .await
            .map_err(classifier_failure)?;
        if !safety.is_safe {
            info!(
                "Image rejected by content policy (nsfw probability {:.3})",
                safety.nsfw_probability
            );
            return Err(PipelineError::ContentPolicyViolation {
                nsfw_probability: safety.nsfw_probability,
            });
        }

        let species_result = self
            .classifier
            .detect_species(&image)
            .await
            .map_err(classifier_failure)?;
        let species = Species::from_str(&species_result.species).map_err(|_| {
            info!("Unsupported species detected: {}", species_result.species);
            PipelineError::UnsupportedSpecies {
                detected: species_result.species.clone(),
            }
        })?;
        if species_result.confidence < self.thresholds.species_min_confidence {
            return Err(PipelineError::SpeciesDetectionFailed {
                confidence: species_result.confidence,
                threshold: self.thresholds.species_min_confidence,
            });
        }
        info!(
            "Species detected: {} (confidence {:.2})",
            species, species_result.confidence
        );

        let breed_analysis = self
            .classifier
            .detect_breed(&image, species, BREED_TOP_K)
            .await
            .map_err(classifier_failure)?;
        if breed_analysis.confidence < self.thresholds.breed_min_confidence {
            return Err(PipelineError::BreedDetectionFailed {
                confidence: breed_analysis.confidence,
                threshold: self.thresholds.breed_min_confidence,
            });
        }
        info!(
            "Breed detected: {} (confidence {:.2}, crossbreed: {})",
            breed_analysis.primary_breed, breed_analysis.confidence,
            breed_analysis.is_likely_crossbreed
        );

        // Best effort: any retrieval failure degrades to an un-enriched
        // result rather than rejecting the request.
        let enriched_info = match self.lookup_context(&breed_analysis).await {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("Knowledge retrieval failed, continuing without context: {e}");
                None
            }
        };

        let observations = self
            .model
            .analyze(&image, species, &breed_analysis, enriched_info.as_ref())
            .await
            .map_err(|e| match e {
                AnalysisModelError::ServiceUnavailable(detail) => {
                    error!("Analysis model unavailable: {detail}");
                    PipelineError::ServiceUnavailable {
                        service: "analysis model",
                    }
                }
                AnalysisModelError::MalformedResponse(detail) => {
                    error!("Analysis model returned a malformed response: {detail}");
                    PipelineError::MalformedModelResponse(detail)
                }
            })?;

        Ok(AnalysisOutcome {
            species,
            breed_analysis,
            description: observations.description,
            traits: observations.traits,
            health_observations: observations.health_observations,
            enriched_info,
        })
    }

    async fn lookup_context(
        &self,
        breed_analysis: &BreedAnalysis,
    ) -> Result<KnowledgeContext, crate::vision::knowledge::KnowledgeError> {
        match &breed_analysis.crossbreed_analysis {
            Some(cross) => {
                self.knowledge
                    .crossbreed_context(&cross.detected_breeds)
                    .await
            }
            None => {
                self.knowledge
                    .breed_context(&breed_analysis.primary_breed)
                    .await
            }
        }
    }
}

fn classifier_failure(e: ClassifierError) -> PipelineError {
    match e {
        ClassifierError::ServiceUnavailable(detail) => {
            error!("Classification service unavailable: {detail}");
            PipelineError::ServiceUnavailable {
                service: "classification",
            }
        }
        ClassifierError::InvalidResponse(detail) => {
            error!("Classification service returned an invalid response: {detail}");
            PipelineError::Internal(detail)
        }
    }
}
