use axum::http::StatusCode;
use axum::{routing, Router};
use metrics_exporter_prometheus::PrometheusHandle;

/// Routes for probes and metrics scraping.
///
/// `liveness` is asked on every probe, a consumer stuck outside of a fetch for
/// longer than its health check timeout fails it.
pub fn app<F>(liveness: F, metrics: Option<PrometheusHandle>) -> Router
where
    F: Fn() -> bool + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", routing::get(index))
        .route(
            "/_liveness",
            routing::get(move || std::future::ready(probe(liveness()))),
        )
        .route(
            "/metrics",
            routing::get(move || match metrics {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
}

pub async fn index() -> &'static str {
    "batch worker"
}

fn probe(healthy: bool) -> (StatusCode, &'static str) {
    if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "stalled")
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn index_names_the_service() {
        let (status, body) = get(app(|| true, None), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "batch worker");
    }

    #[tokio::test]
    async fn liveness_follows_the_consumer() {
        let (status, _) = get(app(|| true, None), "/_liveness").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(app(|| false, None), "/_liveness").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "stalled");
    }

    #[tokio::test]
    async fn metrics_without_recorder() {
        let (status, body) = get(app(|| true, None), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "no metrics recorder installed");
    }
}
