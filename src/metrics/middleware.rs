/// HTTP middleware recording request counts and durations.
///
/// Requests are labelled by the matched route template so path parameters
/// (search ids) do not explode label cardinality.

use super::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};
use axum::{
    extract::{MatchedPath, Request},
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Tower layer for metrics collection
#[derive(Clone)]
pub struct MetricsLayer {
    excluded_paths: Arc<Vec<String>>,
}

impl MetricsLayer {
    pub fn new() -> Self {
        Self::excluding(["/metrics", "/health"])
    }

    /// Skip requests whose path starts with any of `paths`
    pub fn excluding<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded_paths: Arc::new(paths.into_iter().map(Into::into).collect()),
        }
    }
}

impl Default for MetricsLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            excluded_paths: self.excluded_paths.clone(),
        }
    }
}

/// Tower service for metrics collection
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    excluded_paths: Arc<Vec<String>>,
}

impl<S> MetricsService<S> {
    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl<S> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().to_string();
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        if self.is_excluded(&path) {
            return Box::pin(self.inner.call(req));
        }

        let start = Instant::now();
        let future = self.inner.call(req);

        Box::pin(async move {
            let response = future.await?;
            let status = response.status().as_u16().to_string();

            HTTP_REQUESTS_TOTAL
                .with_label_values(&[&method, &path, &status])
                .inc();
            HTTP_REQUEST_DURATION_SECONDS
                .with_label_values(&[&method, &path])
                .observe(start.elapsed().as_secs_f64());

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_requests_are_counted_by_route() {
        let app = Router::new()
            .route("/items/:id", get(|| async { "ok" }))
            .layer(MetricsLayer::new());

        let before = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/items/:id", "200"])
            .get();

        let response = app
            .oneshot(Request::builder().uri("/items/42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let after = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/items/:id", "200"])
            .get();
        assert_eq!(after, before + 1);
    }
}
