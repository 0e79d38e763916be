use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::client_id::{ClientContext, ResolvedClientId};
use crate::error::Error;
use crate::request::GenerationRequest;
use crate::response::{GenerateReplyResponse, TonesResponse, UsageResponse};
use crate::server::AppState;
use crate::usage_tracker::UsageSnapshot;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Reads the identifier the logging middleware stored; resolves it from the
/// headers and peer address only when the middleware did not run.
#[async_trait]
impl FromRequestParts<AppState> for ResolvedClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<ResolvedClientId>() {
            return Ok(resolved.clone());
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let context = ClientContext::new(parts.headers.clone(), peer);
        Ok(ResolvedClientId(state.service.client_id(&context)))
    }
}

/// Attach the usage headers clients use to pace themselves.
pub(crate) fn with_usage_headers(mut response: Response, usage: &UsageSnapshot) -> Response {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(usage.max_calls));
    headers.insert(REMAINING_HEADER, HeaderValue::from(usage.remaining_calls));
    response
}

/// Draft a reply, charging the caller's daily quota
pub async fn generate_reply(
    State(state): State<AppState>,
    ResolvedClientId(client_id): ResolvedClientId,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(request) = payload.map_err(|rejection| Error::Validation(rejection.body_text()))?;
    let generated = state.service.generate_reply_for(client_id, request).await?;

    let usage = generated.usage.clone();
    Ok(with_usage_headers(
        Json(GenerateReplyResponse::from(generated)).into_response(),
        &usage,
    ))
}

/// Current usage for the caller; never consumes quota
pub async fn usage(
    State(state): State<AppState>,
    ResolvedClientId(client_id): ResolvedClientId,
) -> Response {
    let usage = state.service.usage_of(client_id);
    let snapshot = usage.usage.clone();
    with_usage_headers(Json(UsageResponse::from(usage)).into_response(), &snapshot)
}

/// Charge one call without generating anything
pub async fn consume(
    State(state): State<AppState>,
    ResolvedClientId(client_id): ResolvedClientId,
) -> Result<Response, Error> {
    let usage = state.service.consume_for(client_id)?;
    let snapshot = usage.usage.clone();
    Ok(with_usage_headers(
        Json(UsageResponse::from(usage)).into_response(),
        &snapshot,
    ))
}

pub async fn supported_tones() -> impl IntoResponse {
    Json(TonesResponse::current())
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}
