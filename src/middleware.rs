//! Request middleware: CORS and request metrics
//!
//! Both are plain async functions wrapped with `from_fn` when the app is
//! assembled. CORS settings are read from app data; without them, or with an
//! empty origin list, requests pass straight through.

use crate::config::CorsConfig;
use crate::telemetry::{self, RequestBodySize};
use actix_web::body::{BodySize, EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::Method;
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, HttpRequest, HttpResponse};
use std::time::Instant;

const ALLOWED_METHODS: &str = "GET, PUT, DELETE";

impl CorsConfig {
    pub fn enabled(&self) -> bool {
        !self.origins.is_empty()
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }
}

fn allowed_origin(req: &ServiceRequest) -> Option<(HeaderValue, web::Data<CorsConfig>)> {
    let cors = req.app_data::<web::Data<CorsConfig>>()?.clone();
    if !cors.enabled() {
        return None;
    }
    let origin = req.headers().get(header::ORIGIN)?;
    let origin_str = origin.to_str().ok()?;
    if cors.allows(origin_str) {
        Some((origin.clone(), cors))
    } else {
        None
    }
}

fn is_preflight(req: &ServiceRequest) -> bool {
    req.method() == Method::OPTIONS && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// Answers preflight requests and tags responses for allowed origins
pub async fn cors<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some((origin, config)) = allowed_origin(&req) else {
        return Ok(next.call(req).await?.map_into_left_body());
    };

    if is_preflight(&req) {
        let requested = req
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_METHOD)
            .and_then(|m| m.to_str().ok())
            .unwrap_or_default();
        let mut response = HttpResponse::Ok();
        if ALLOWED_METHODS.split(", ").any(|m| m.eq_ignore_ascii_case(requested)) {
            response
                .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin))
                .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS))
                .insert_header((header::ACCESS_CONTROL_MAX_AGE, config.max_age.to_string()));
            if let Some(headers) = req.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
                response.insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, headers.clone()));
            }
        }
        response.insert_header((header::VARY, "Origin"));
        return Ok(req.into_response(response.finish()).map_into_right_body());
    }

    let mut res = next.call(req).await?;
    let headers = res.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    Ok(res.map_into_left_body())
}

/// Bytes the handler read from the body, or `declared` if it did not say
fn consumed_body_size(req: &HttpRequest, declared: u64) -> u64 {
    req.extensions()
        .get::<RequestBodySize>()
        .map_or(declared, |consumed| consumed.0)
}

/// Records request count, latency and sizes per method
pub async fn request_metrics(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let method = req.method().to_string();
    let declared_size = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let start = Instant::now();

    let res = next.call(req).await?;

    let request_size = consumed_body_size(res.request(), declared_size);
    let response_size = match res.response().body().size() {
        BodySize::Sized(n) => n,
        _ => 0,
    };
    telemetry::record_request(&method, res.status().as_u16(), start.elapsed(), request_size, response_size);
    Ok(res)
}
