//! `POST /apirequest`: run a batch of operations.

use axum::{
    body::{self, Body},
    extract::{FromRequestParts, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::api_auth::AuthenticatedAccount;
use super::error::{ApiError, ResultExt};
use crate::AppState;

/// largest batch body accepted, in bytes.
pub const MAX_BATCH_BYTES: usize = 2 * 1024 * 1024;

/// run the json batch in the body as the authenticated account.
///
/// the body is buffered before authentication, so a request whose body never
/// arrives does not use up a bootstrap token. the batch runs on the blocking
/// pool since signing is cpu-bound.
pub async fn apirequest(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();
    let body = read_batch(body).await?;
    let AuthenticatedAccount(account) =
        AuthenticatedAccount::from_request_parts(&mut parts, &state).await?;

    let engine = state.engine.clone();
    let principal = account.principal.clone();

    let output = tokio::task::spawn_blocking(move || engine.invoke_batch_json(account, &body))
        .await
        .map_internal()?
        .map_err(|err| {
            warn!(%principal, error = %err, "api request failed");
            ApiError::from(err)
        })?;

    Ok(([(header::CONTENT_TYPE, "application/json")], output).into_response())
}

async fn read_batch(body: Body) -> Result<bytes::Bytes, ApiError> {
    body::to_bytes(body, MAX_BATCH_BYTES).await.map_err(|err| {
        warn!(error = %err, "failed to read api request body");
        ApiError::BadRequest
    })
}
