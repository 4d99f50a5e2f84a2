//! Request admission and response hardening

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::warn;

use super::AppState;
use crate::error::AppError;
use crate::metrics::ADMISSION_DECISIONS_TOTAL;
use crate::throttle::Admission;

pub const RATE_LIMIT_MESSAGE: &str = "Too many search requests. Please try again later.";

/// Admit search API requests against the caller's address bucket.
///
/// Requests without a known remote address pass through.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.security.rate_limiting.enabled {
        return next.run(request).await;
    }

    let Some(ConnectInfo(addr)) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .copied()
    else {
        return next.run(request).await;
    };

    match state.admission.check(&addr.ip()) {
        Admission::Admitted => {
            ADMISSION_DECISIONS_TOTAL
                .with_label_values(&["admitted"])
                .inc();
            next.run(request).await
        }
        Admission::Rejected { retry_after } => {
            ADMISSION_DECISIONS_TOTAL
                .with_label_values(&["rejected"])
                .inc();
            warn!(
                remote_addr = %addr.ip(),
                path = %request.uri().path(),
                "Search request rejected by rate limiter"
            );

            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            let mut response = AppError::RateLimit(RATE_LIMIT_MESSAGE.to_string()).into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds.max(1)));
            response
        }
    }
}

/// Attach the configured security headers to every response
pub async fn security_headers(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let options = &state.config.security.headers;
    let mut response = next.run(request).await;

    if !options.enabled {
        return response;
    }

    let headers = response.headers_mut();

    let configured = [
        (header::CONTENT_SECURITY_POLICY, &options.content_security_policy),
        (header::STRICT_TRANSPORT_SECURITY, &options.strict_transport_security),
        (
            HeaderName::from_static("public-key-pins"),
            &options.public_key_pins,
        ),
    ];
    for (name, value) in configured {
        let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(e) => warn!(header = %name, error = %e, "Invalid security header value"),
        }
    }

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));

    response
}
