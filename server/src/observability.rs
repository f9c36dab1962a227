use std::{
    sync::Arc,
    task::{Context as TaskContext, Poll},
    time::Duration,
};

use anyhow::{Result as AnyResult, anyhow};
use axum::{
    extract::MatchedPath,
    http::{HeaderValue, Request, Response, header::HeaderName},
};
use tower::{Layer, Service};
use tower_http::trace::{MakeSpan, OnResponse};
use tracing::{Level, Span, event, field, info_span};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_LOG_FILTER: &str = "lessonroom_server=info,lessonroom_core=info,tower_http=info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() -> AnyResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .map_err(|err| anyhow!("invalid log filter: {err}"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|err| anyhow!("install tracing subscriber: {err}"))
}

/// Custom response logger that escalates log level for 4xx/5xx responses.
pub fn response_logger() -> ResponseLogger {
    ResponseLogger
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseLogger;

impl<B> OnResponse<B> for ResponseLogger {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status();
        span.record(
            "http.response.status_code",
            field::display(status.as_u16()),
        );

        let latency_ms = latency.as_millis() as u64;
        if status.is_server_error() {
            event!(
                parent: span,
                Level::ERROR,
                http.response.status_code = status.as_u16(),
                latency_ms,
                "request completed"
            );
        } else if status.is_client_error() {
            event!(
                parent: span,
                Level::WARN,
                http.response.status_code = status.as_u16(),
                latency_ms,
                "request completed"
            );
        } else {
            event!(
                parent: span,
                Level::INFO,
                http.response.status_code = status.as_u16(),
                latency_ms,
                "request completed"
            );
        }
    }
}

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone, Debug)]
pub struct RequestContext {
    request_id: Arc<str>,
}

impl RequestContext {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

pub fn request_context_layer() -> RequestContextLayer {
    RequestContextLayer
}

#[derive(Clone, Default)]
pub struct RequestContextLayer;

#[derive(Clone)]
pub struct RequestContextMiddleware<S> {
    inner: S,
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextMiddleware { inner }
    }
}

impl<S, B> Service<Request<B>> for RequestContextMiddleware<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let request_id = match request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        {
            Some(value) => value.to_string(),
            None => {
                let generated = Uuid::new_v4().to_string();
                if let Ok(header_value) = HeaderValue::from_str(&generated) {
                    request
                        .headers_mut()
                        .insert(REQUEST_ID_HEADER.clone(), header_value);
                }
                generated
            }
        };

        request.extensions_mut().insert(RequestContext {
            request_id: request_id.into(),
        });
        self.inner.call(request)
    }
}

pub fn http_make_span() -> HttpMakeSpan {
    HttpMakeSpan
}

#[derive(Clone, Default)]
pub struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.request_id().to_owned())
            .unwrap_or_else(|| "unknown".to_string());
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|mp| mp.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        info_span!(
            "http_request",
            http.request.method = %request.method(),
            http.route = %route,
            request_id = %request_id,
            http.response.status_code = field::Empty,
            user_id = field::Empty,
        )
    }
}

/// Attaches the authenticated caller to the current request span.
pub fn record_authenticated_identity(user_id: &str) {
    let span = Span::current();
    if span.is_disabled() {
        return;
    }
    span.record("user_id", field::display(user_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn request_id_is_generated_when_missing_and_kept_when_present() {
        let app = Router::new()
            .route(
                "/echo",
                get(|request: Request<Body>| async move {
                    request
                        .extensions()
                        .get::<RequestContext>()
                        .map(|ctx| ctx.request_id().to_owned())
                        .unwrap_or_default()
                }),
            )
            .layer(request_context_layer());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"req-42");

        let response = app
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(Uuid::parse_str(std::str::from_utf8(&body).unwrap()).is_ok());
    }
}
