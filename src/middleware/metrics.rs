//! Metrics middleware: counts requests and errors per endpoint and feeds the
//! latency accumulators surfaced by `/api/v1/metrics`.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let endpoint = format!("{} {}", req.method(), req.uri().path());

        // Grabbed up front so a failed service call still gets accounted
        let app_state = req.app_data::<web::Data<AppState>>().cloned();
        if let Some(app_state) = &app_state {
            app_state.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };
            if let Some(app_state) = &app_state {
                app_state.record_endpoint_request(&endpoint, duration_ms, is_error);
                if is_error {
                    app_state.increment_error_count();
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::events::LogEventSink;
    use crate::speech::RemoteSpeechProvider;
    use crate::storage::InMemoryConversationStore;
    use actix_web::body::BoxBody;
    use actix_web::error::ErrorInternalServerError;
    use actix_web::test::TestRequest;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    /// Stands in for a handler chain that fails outright instead of
    /// producing an error response.
    struct FailingService;

    impl Service<ServiceRequest> for FailingService {
        type Response = ServiceResponse<BoxBody>;
        type Error = Error;
        type Future = Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&self, _ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&self, _req: ServiceRequest) -> Self::Future {
            ready(Err(ErrorInternalServerError("boom")))
        }
    }

    #[actix_web::test]
    async fn test_failed_service_call_counts_as_error() {
        let state = web::Data::new(AppState::new(
            AppConfig::default(),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(LogEventSink),
            Arc::new(RemoteSpeechProvider::new("ws://127.0.0.1:9090/recognize", 3)),
        ));

        let service = MetricsMiddleware
            .new_transform(FailingService)
            .await
            .unwrap();
        let req = TestRequest::get()
            .uri("/api/v1/conversations")
            .app_data(state.clone())
            .to_srv_request();
        assert!(service.call(req).await.is_err());

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.error_count, 1);
        let metric = &snapshot.endpoint_metrics["GET /api/v1/conversations"];
        assert_eq!(metric.request_count, 1);
        assert_eq!(metric.error_count, 1);
    }
}
