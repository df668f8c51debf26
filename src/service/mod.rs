//service/mod.rs
pub mod gc_worker;
pub mod trigger;

use actix_web::http::header::{HttpDate, LastModified};
use actix_web::{web, Error, HttpMessage, HttpRequest, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::logging::with_request_context;
use crate::storage::listing::render;
use crate::storage::ReadOutcome;
use crate::telemetry::RequestBodySize;

/// Query accepted by DELETE
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    pub recursive: Option<String>,
}

/// Parses a boolean the way the recursive flag has always been read:
/// 1, t, T, TRUE, true, True are true; anything else is false
pub fn parse_flag(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "t" | "T" | "TRUE" | "true" | "True"))
}

fn request_label(req: &HttpRequest) -> String {
    format!("{} {}", req.method(), req.path())
}

pub async fn get_service(path: String, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let label = request_label(&req);
    let storage = app_state.storage.clone();
    let outcome = web::block(move || with_request_context(label, || storage.read(&path))).await??;

    match outcome {
        ReadOutcome::Object { content, modified } => {
            debug!("Serving {} bytes for {}", content.len(), req.path());
            Ok(HttpResponse::Ok()
                .content_type("application/octet-stream")
                .insert_header(LastModified(HttpDate::from(modified)))
                .body(content))
        }
        ReadOutcome::Listing(names) => Ok(HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(render(&names))),
    }
}

pub async fn put_service(
    path: String,
    mut payload: web::Payload,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let limit = app_state.config.server.max_payload_size;
    let mut bytes = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if bytes.len() + chunk.len() > limit {
            warn!("Payload for {} exceeds {} bytes", req.path(), limit);
            req.extensions_mut().insert(RequestBodySize((bytes.len() + chunk.len()) as u64));
            return Ok(HttpResponse::PayloadTooLarge().body("Payload too large\n"));
        }
        bytes.extend_from_slice(&chunk);
    }
    debug!("Total received data size: {} bytes", bytes.len());
    req.extensions_mut().insert(RequestBodySize(bytes.len() as u64));

    let label = request_label(&req);
    let storage = app_state.storage.clone();
    web::block(move || with_request_context(label, || storage.write(&path, &bytes))).await??;
    Ok(HttpResponse::Ok().finish())
}

pub async fn delete_service(
    path: String,
    params: DeleteParams,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let recursive = parse_flag(params.recursive.as_deref());
    let label = request_label(&req);
    let storage = app_state.storage.clone();
    web::block(move || with_request_context(label, || storage.delete(&path, recursive))).await??;

    info!("Delete accepted for {} (recursive={})", req.path(), recursive);
    Ok(HttpResponse::Ok().finish())
}
