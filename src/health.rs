use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "audiohook-server",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "active_sessions": state.registry.len()
        },
        "memory": get_memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let config = state.get_config();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_sessions": state.registry.len(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "sessions": {
            "max_concurrent": config.performance.max_concurrent_sessions,
            "active_ids": state.registry.active_session_ids()
        }
    }))
}

/// Process memory usage, read from procfs where available.
fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = std::process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let field_kb = |name: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
            };

            return json!({
                "resident_memory_bytes": field_kb("VmRSS:") * 1024,
                "virtual_memory_bytes": field_kb("VmSize:") * 1024,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false
    })
}
