use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::middleware::Next;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::metrics::{
    self, QUEUE_DELETES_TOTAL, QUEUE_RESETS_TOTAL, STORAGE_ERRORS_TOTAL, TICKETS_ISSUED_TOTAL,
};
use crate::ticket_engine::{TicketEngine, TicketError};
use crate::ticket_number::TicketNumber;

static QUEUE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("valid queue id pattern"));

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TicketIssued {
    queue_id: String,
    ticket: TicketNumber,
}

#[derive(Debug, Serialize)]
struct QueueReset {
    queue_id: String,
    current: TicketNumber,
}

#[derive(Debug, Serialize)]
struct QueueDeleted {
    queue_id: String,
    deleted: bool,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    backend: &'static str,
}

impl ResponseError for TicketError {
    fn status_code(&self) -> StatusCode {
        match self {
            TicketError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TicketError::NotFound(_) => StatusCode::NOT_FOUND,
            TicketError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::failure(self.to_string()))
    }
}

fn validate_queue_id(queue_id: String) -> Result<String, TicketError> {
    if QUEUE_ID_PATTERN.is_match(&queue_id) {
        Ok(queue_id)
    } else {
        Err(TicketError::InvalidArgument(
            "queue id must be 1-50 characters of letters, digits, '-' or '_'".to_string(),
        ))
    }
}

fn observe(err: TicketError) -> TicketError {
    if let TicketError::StorageUnavailable(source) = &err {
        STORAGE_ERRORS_TOTAL.inc();
        tracing::error!(error = %source, "counter store unavailable");
    }
    err
}

async fn issue_ticket(
    engine: web::Data<TicketEngine>,
    queue_id: web::Path<String>,
) -> Result<HttpResponse, TicketError> {
    let queue_id = validate_queue_id(queue_id.into_inner())?;
    let ticket = engine.issue_next(&queue_id).await.map_err(observe)?;
    TICKETS_ISSUED_TOTAL.inc();
    Ok(HttpResponse::Ok().json(ApiResponse::success(TicketIssued { queue_id, ticket })))
}

async fn queue_status(
    engine: web::Data<TicketEngine>,
    queue_id: web::Path<String>,
) -> Result<HttpResponse, TicketError> {
    let queue_id = validate_queue_id(queue_id.into_inner())?;
    let status = engine.queue_status(&queue_id).await.map_err(observe)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(status)))
}

async fn reset_queue(
    engine: web::Data<TicketEngine>,
    queue_id: web::Path<String>,
) -> Result<HttpResponse, TicketError> {
    let queue_id = validate_queue_id(queue_id.into_inner())?;
    engine.reset_queue(&queue_id).await.map_err(observe)?;
    QUEUE_RESETS_TOTAL.inc();
    Ok(HttpResponse::Ok().json(ApiResponse::success(QueueReset {
        queue_id,
        current: TicketNumber::default(),
    })))
}

async fn delete_queue(
    engine: web::Data<TicketEngine>,
    queue_id: web::Path<String>,
) -> Result<HttpResponse, TicketError> {
    let queue_id = validate_queue_id(queue_id.into_inner())?;
    if !engine.delete_queue(&queue_id).await.map_err(observe)? {
        return Err(TicketError::NotFound(queue_id));
    }
    QUEUE_DELETES_TOTAL.inc();
    Ok(HttpResponse::Ok().json(ApiResponse::success(QueueDeleted {
        queue_id,
        deleted: true,
    })))
}

async fn health(engine: web::Data<TicketEngine>) -> HttpResponse {
    let backend = engine.backend();
    match engine.health_check().await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::success(HealthStatus {
            status: "ok",
            backend,
        })),
        Err(e) => {
            tracing::warn!(error = %e, backend, "health check failed");
            HttpResponse::ServiceUnavailable().json(ApiResponse {
                success: false,
                data: Some(HealthStatus {
                    status: "unavailable",
                    backend,
                }),
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            })
        }
    }
}

async fn prometheus_metrics() -> HttpResponse {
    match metrics::gather() {
        Ok(text) => HttpResponse::Ok()
            .content_type(prometheus::TEXT_FORMAT)
            .body(text),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            HttpResponse::InternalServerError().json(ApiResponse::<()>::failure(e.to_string()))
        }
    }
}

/// Tags each response with a request id, logs it, and records HTTP metrics
/// under the matched route pattern.
pub async fn track_request(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().to_string();

    let mut res = next.call(req).await?;

    let route = res
        .request()
        .match_pattern()
        .unwrap_or_else(|| "unmatched".to_string());
    let status = res.status().as_u16();
    let elapsed = started.elapsed();
    metrics::record_http_request(&method, &route, status, elapsed);
    tracing::info!(
        request_id = %request_id,
        method = %method,
        route = %route,
        status,
        latency_ms = elapsed.as_secs_f64() * 1000.0,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    Ok(res)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(prometheus_metrics))
        .service(
            web::scope("/api/queues")
                .service(
                    web::resource("/{queue_id}")
                        .route(web::get().to(queue_status))
                        .route(web::delete().to(delete_queue)),
                )
                .route("/{queue_id}/tickets", web::post().to(issue_ticket))
                .route("/{queue_id}/reset", web::post().to(reset_queue)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::{CounterStore, InMemoryCounterStore};
    use crate::ticket_engine::tests::UnavailableStore;
    use actix_web::middleware::from_fn;
    use actix_web::{test, App};
    use serde_json::Value;
    use std::sync::Arc;

    fn engine_data(store: Arc<dyn CounterStore>) -> web::Data<TicketEngine> {
        web::Data::new(TicketEngine::new(store))
    }

    macro_rules! app {
        ($store:expr) => {
            test::init_service(
                App::new()
                    .app_data(engine_data($store))
                    .wrap(from_fn(track_request))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_issue_status_reset_flow() {
        let app = app!(Arc::new(InMemoryCounterStore::new()));

        for expected in ["0000", "0001", "0002"] {
            let req = test::TestRequest::post()
                .uri("/api/queues/checkout/tickets")
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], true);
            assert_eq!(body["data"]["queue_id"], "checkout");
            assert_eq!(body["data"]["ticket"], expected);
        }

        let req = test::TestRequest::get().uri("/api/queues/checkout").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["current"], "0002");
        assert_eq!(body["data"]["exists"], true);

        let req = test::TestRequest::post()
            .uri("/api/queues/checkout/reset")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["current"], "0000");

        let req = test::TestRequest::get().uri("/api/queues/checkout").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["current"], "0000");
        assert_eq!(body["data"]["exists"], true);

        let req = test::TestRequest::post()
            .uri("/api/queues/checkout/tickets")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["ticket"], "0000");
    }

    #[actix_web::test]
    async fn test_status_of_unknown_queue() {
        let app = app!(Arc::new(InMemoryCounterStore::new()));
        let req = test::TestRequest::get().uri("/api/queues/other").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["current"], "0000");
        assert_eq!(body["data"]["exists"], false);
    }

    #[actix_web::test]
    async fn test_delete_queue() {
        let app = app!(Arc::new(InMemoryCounterStore::new()));

        let req = test::TestRequest::delete().uri("/api/queues/pharmacy").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);

        let req = test::TestRequest::post()
            .uri("/api/queues/pharmacy/tickets")
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::delete().uri("/api/queues/pharmacy").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["deleted"], true);
    }

    #[actix_web::test]
    async fn test_invalid_queue_ids_are_rejected() {
        let app = app!(Arc::new(InMemoryCounterStore::new()));
        let too_long = "q".repeat(51);
        for uri in [
            "/api/queues/bad%20id/tickets".to_string(),
            "/api/queues/semi;colon/tickets".to_string(),
            format!("/api/queues/{}/tickets", too_long),
        ] {
            let req = test::TestRequest::post().uri(&uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["success"], false);
        }
    }

    #[actix_web::test]
    async fn test_storage_failure_maps_to_503() {
        let app = app!(Arc::new(UnavailableStore));
        let req = test::TestRequest::post()
            .uri("/api/queues/checkout/tickets")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("Storage unavailable"));
    }

    #[actix_web::test]
    async fn test_health() {
        let app = app!(Arc::new(InMemoryCounterStore::new()));
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["backend"], "memory");

        let app = app!(Arc::new(UnavailableStore));
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "unavailable");
    }

    #[actix_web::test]
    async fn test_metrics_endpoint() {
        let app = app!(Arc::new(InMemoryCounterStore::new()));
        let req = test::TestRequest::post()
            .uri("/api/queues/metered/tickets")
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ticket_tickets_issued_total"));
        assert!(text.contains("/api/queues/{queue_id}/tickets"));
    }
}
