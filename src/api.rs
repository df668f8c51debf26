//! HTTP routes
//!
//! Every path below `/` addresses the data directory. GET reads an object or
//! lists a directory, PUT replaces an object, DELETE soft-deletes.

use actix_web::{web, Error, HttpRequest, HttpResponse};

use crate::app_state::AppState;
use crate::service::{delete_service, get_service, put_service, DeleteParams};

pub async fn get(path: web::Path<String>, req: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    get_service(path.into_inner(), req, app_state).await
}

pub async fn put(
    path: web::Path<String>,
    payload: web::Payload,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    put_service(path.into_inner(), payload, req, app_state).await
}

pub async fn delete(
    path: web::Path<String>,
    query: web::Query<DeleteParams>,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    delete_service(path.into_inner(), query.into_inner(), req, app_state).await
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().body("Method Not Allowed\n")
}

/// Registers the object routes on an app or scope
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/{path:.*}")
            .route(web::get().to(get))
            .route(web::head().to(get))
            .route(web::put().to(put))
            .route(web::delete().to(delete))
            .default_service(web::to(method_not_allowed)),
    );
}
