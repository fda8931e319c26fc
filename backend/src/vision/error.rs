use actix_web::http::StatusCode;

use crate::vision::validator::ValidationError;

// Rejections are business outcomes with a specific, user-explainable code;
// infrastructure failures are the retryable 5xx class.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Image rejected by content policy (nsfw probability {nsfw_probability:.2})")]
    ContentPolicyViolation { nsfw_probability: f32 },
    #[error("Unsupported species: {detected}")]
    UnsupportedSpecies { detected: String },
    #[error("Species detection confidence {confidence:.2} is below the threshold {threshold:.2}")]
    SpeciesDetectionFailed { confidence: f32, threshold: f32 },
    #[error("Breed detection confidence {confidence:.2} is below the threshold {threshold:.2}")]
    BreedDetectionFailed { confidence: f32, threshold: f32 },
    #[error("{service} service unavailable")]
    ServiceUnavailable { service: &'static str },
    #[error("Analysis model returned a malformed response: {0}")]
    MalformedModelResponse(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(ValidationError::InvalidFormat) => "INVALID_IMAGE_FORMAT",
            PipelineError::Validation(ValidationError::TooLarge) => "IMAGE_TOO_LARGE",
            PipelineError::Validation(ValidationError::TooSmall) => "IMAGE_TOO_SMALL",
            PipelineError::ContentPolicyViolation { .. } => "CONTENT_POLICY_VIOLATION",
            PipelineError::UnsupportedSpecies { .. } => "UNSUPPORTED_SPECIES",
            PipelineError::SpeciesDetectionFailed { .. } => "SPECIES_DETECTION_FAILED",
            PipelineError::BreedDetectionFailed { .. } => "BREED_DETECTION_FAILED",
            PipelineError::ServiceUnavailable { .. }
            | PipelineError::MalformedModelResponse(_) => "SERVICE_UNAVAILABLE",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::ContentPolicyViolation { .. }
            | PipelineError::UnsupportedSpecies { .. }
            | PipelineError::SpeciesDetectionFailed { .. }
            | PipelineError::BreedDetectionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::ServiceUnavailable { .. }
            | PipelineError::MalformedModelResponse(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Message safe to hand to an end user. Rejections explain themselves;
    // infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::ServiceUnavailable { .. }
            | PipelineError::MalformedModelResponse(_) => {
                "The analysis service is temporarily unavailable, please try again later"
                    .to_string()
            }
            PipelineError::Internal(_) => "An unexpected internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}
