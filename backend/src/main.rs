mod config;
mod routes;
mod vision;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::AppConfig;
use routes::configure_routes;
use std::env;
use std::sync::Arc;
use vision::analysis::AnalysisService;
use vision::classifier::ClassifierService;
use vision::knowledge::KnowledgeService;
use vision::pipeline::VisionPipeline;
use vision::validator::ImageValidator;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Configuration error: {}", e),
        )
    })?;

    let classifier = Arc::new(ClassifierService::new(
        config.classifier_url.clone(),
        config.classifier_timeout,
        config.thresholds.crossbreed_second_threshold,
    ));
    let knowledge = Arc::new(KnowledgeService::new(
        config.knowledge_url.clone(),
        config.knowledge_timeout,
    ));
    let model = Arc::new(AnalysisService::new(
        config.analysis_model_url.clone(),
        config.analysis_model_name.clone(),
        config.analysis_api_key.clone(),
        config.analysis_timeout,
    ));
    let validator = ImageValidator::new(config.image_limits.clone());

    let pipeline = web::Data::new(VisionPipeline::new(
        validator,
        classifier,
        knowledge,
        model,
        config.thresholds.clone(),
    ));

    log::info!(
        "Vision pipeline wired (classifier: {}, knowledge: {}, model: {})",
        config.classifier_url,
        config.knowledge_url,
        config.analysis_model_url
    );

    let port = env::var("PORT").unwrap_or_else(|_| "8081".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
