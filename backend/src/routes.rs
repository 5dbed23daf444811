use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use shared::{AnalysisResponse, ErrorResponse, LabelsResponse};
use std::path::PathBuf;
use uuid::Uuid;

use crate::intake::{self, parse_quantity};
use crate::nutrition::needs::{daily_needs, Profile};
use crate::pipeline::{Analysis, AppContext, PipelineError};

#[derive(Debug, Deserialize)]
struct AnalyzeQuery {
    quantity: Option<String>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/analyze").route(web::post().to(analyze_page)))
        .service(
            web::scope("/api")
                .service(web::resource("/analyze").route(web::post().to(analyze_json)))
                .service(web::resource("/labels").route(web::get().to(labels)))
                .service(web::resource("/needs").route(web::get().to(needs))),
        );

    if static_dir.is_dir() {
        cfg.service(Files::new("/static", static_dir));
    } else {
        log::warn!("Static directory {} not found; /static is disabled", static_dir.display());
    }
}

async fn run_pipeline(
    ctx: &AppContext,
    query: &AnalyzeQuery,
    payload: Multipart,
    request_id: Uuid,
) -> Result<Analysis, PipelineError> {
    let fallback_quantity = query.quantity.as_deref().map(parse_quantity).transpose()?;
    let upload = intake::receive(payload, &ctx.limits).await?;
    // `upload` owns the scratch file; it is removed when this scope ends.
    ctx.analyze(&upload, fallback_quantity, request_id).await
}

fn error_page(ctx: &AppContext, err: &PipelineError) -> HttpResponse {
    let body = ctx
        .renderer
        .render_error(err.title(), &err.public_message())
        .unwrap_or_else(|e| {
            error!("{}", e);
            err.public_message()
        });
    HttpResponse::build(err.status_code())
        .content_type("text/html; charset=utf-8")
        .body(body)
}

async fn index(ctx: web::Data<AppContext>) -> HttpResponse {
    match ctx
        .renderer
        .render_index(ctx.predictor.labels(), ctx.limits.max_upload_bytes)
    {
        Ok(body) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body),
        Err(e) => error_page(&ctx, &PipelineError::from(e)),
    }
}

async fn analyze_page(
    ctx: web::Data<AppContext>,
    query: web::Query<AnalyzeQuery>,
    payload: Multipart,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let result = run_pipeline(&ctx, &query, payload, request_id)
        .await
        .and_then(|analysis| {
            ctx.renderer
                .render_report(
                    &analysis.report,
                    &analysis.generated_at,
                    &analysis.request_id.to_string(),
                )
                .map_err(PipelineError::from)
        });

    match result {
        Ok(body) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body),
        Err(e) => {
            e.log(&request_id);
            error_page(&ctx, &e)
        }
    }
}

async fn analyze_json(
    ctx: web::Data<AppContext>,
    query: web::Query<AnalyzeQuery>,
    payload: Multipart,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    match run_pipeline(&ctx, &query, payload, request_id).await {
        Ok(analysis) => {
            let response = AnalysisResponse {
                request_id: analysis.request_id.to_string(),
                label: analysis.report.label,
                display_name: analysis.report.display_name,
                confidence: analysis.classification.confidence,
                top_predictions: analysis.classification.top,
                image_sha256: analysis.image_sha256,
                nutrition: analysis.report.facts,
                generated_at: analysis.generated_at,
            };
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            e.log(&request_id);
            HttpResponse::build(e.status_code()).json(ErrorResponse {
                error: e.public_message(),
            })
        }
    }
}

async fn labels(ctx: web::Data<AppContext>) -> HttpResponse {
    let descriptor = ctx.predictor.descriptor();
    HttpResponse::Ok().json(LabelsResponse {
        version: descriptor.version,
        labels: descriptor.labels.clone(),
    })
}

async fn needs(profile: web::Query<Profile>) -> HttpResponse {
    match daily_needs(&profile) {
        Ok(needs) => HttpResponse::Ok().json(needs),
        Err(e) => {
            info!("Rejected daily needs request: {}", e);
            HttpResponse::BadRequest().json(ErrorResponse { error: e.to_string() })
        }
    }
}

async fn health(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "uptime_seconds": ctx.uptime_seconds(),
        "model_version": ctx.predictor.descriptor().version,
        "labels": ctx.predictor.labels().len(),
        "nutrition_entries": ctx.table.len(),
    }))
}
