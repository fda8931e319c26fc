use actix_web::{web, Error, HttpResponse};
use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use log::{error, info};
use serde_json::json;
use shared::{AnalysisOutcome, ApiResponse};
use std::io::Write;
use uuid::Uuid;

use crate::vision::pipeline::VisionPipeline;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/analysis").route(web::post().to(handle_analysis)))
        .service(web::resource("/api/health").route(web::get().to(health)));
}

async fn handle_analysis(
    pipeline: web::Data<VisionPipeline>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4();
    let mut image_data = Vec::new();

    while let Ok(Some(mut field)) = payload.try_next().await {
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            image_data.write_all(&data)?;
        }
        if !image_data.is_empty() {
            break;
        }
    }

    if image_data.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<AnalysisOutcome>::error(
            "INVALID_IMAGE_FORMAT",
            "Request contained no image data",
        )));
    }

    info!(
        "[{}] Received analysis request ({} bytes)",
        request_id,
        image_data.len()
    );

    match pipeline.analyze(&image_data).await {
        Ok(outcome) => {
            info!(
                "[{}] Analysis complete: {} {}",
                request_id, outcome.species, outcome.breed_analysis.primary_breed
            );
            Ok(HttpResponse::Ok().json(ApiResponse::ok(outcome)))
        }
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!("[{}] Analysis failed: {}", request_id, err);
            } else {
                info!("[{}] Analysis rejected: {}", request_id, err);
            }
            let body = ApiResponse::<AnalysisOutcome>::error(err.code(), &err.public_message());
            Ok(HttpResponse::build(status).json(body))
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(json!({ "status": "ok" })))
}
