mod config;
mod inference;
mod intake;
mod nutrition;
mod pipeline;
mod report;
mod routes;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use config::Settings;
use intake::IntakeLimits;
use nutrition::table::NutritionTable;
use pipeline::AppContext;
use report::ReportRenderer;
use routes::configure_routes;
use std::env;
use std::io;
use std::path::PathBuf;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, err);
    io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let settings = Settings::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let predictor = inference::load_predictor(&settings.model_descriptor)
        .map_err(|e| startup_error("Model loading failed", e))?;
    let descriptor = predictor.descriptor();
    log::info!(
        "Loaded {:?} model v{} from {} with {} labels",
        descriptor.format,
        descriptor.version,
        descriptor.model_path.display(),
        descriptor.num_classes()
    );

    let table = match &settings.nutrition_table {
        Some(path) => NutritionTable::load(path),
        None => NutritionTable::builtin(),
    }
    .map_err(|e| startup_error("Nutrition table loading failed", e))?;
    log::info!("Nutrition table v{} with {} entries", table.version(), table.len());

    let missing = table.missing_labels(predictor.labels());
    if !missing.is_empty() {
        log::warn!(
            "No nutrition data for {} label(s): {} (policy: {})",
            missing.len(),
            missing.join(", "),
            settings.unknown_category_policy
        );
    }

    std::fs::create_dir_all(&settings.scratch_dir)
        .map_err(|e| startup_error("Scratch directory unavailable", e))?;

    let renderer = ReportRenderer::new().map_err(|e| startup_error("Template setup failed", e))?;

    let context = web::Data::new(AppContext::new(
        predictor,
        table,
        renderer,
        settings.unknown_category_policy,
        IntakeLimits {
            scratch_dir: settings.scratch_dir.clone(),
            max_upload_bytes: settings.max_upload_bytes,
        },
        settings.max_concurrent_inferences,
    ));

    let static_dir: PathBuf = settings.static_dir.clone();
    let bind_address = settings.socket_address();
    log::info!(
        "Starting server on {} (max {} concurrent inferences)",
        bind_address,
        settings.max_concurrent_inferences
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(context.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
