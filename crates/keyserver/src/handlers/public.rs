//! unauthenticated downloads: authority public keys and static files.

use axum::extract::{Path, State};
use bytes::Bytes;
use tracing::warn;

use super::error::{ApiError, OptionExt};
use crate::AppState;

/// `GET /pub/{authority}`: the authority's public material.
pub async fn public_key(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Bytes, ApiError> {
    let authority = state
        .authorities
        .get(&name)
        .or_not_found(&format!("no such authority {name}"))
        .inspect_err(|_| warn!(authority = %name, "public key request for unknown authority"))?;
    Ok(Bytes::copy_from_slice(authority.public_key()))
}

/// `GET /static/{name}`: a configured static file.
pub async fn static_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Bytes, ApiError> {
    let path = state
        .static_files
        .get(&name)
        .or_not_found(&format!("no such static file {name}"))
        .inspect_err(|_| warn!(%name, "request for unconfigured static file"))?;

    let contents = tokio::fs::read(path).await.map_err(|err| {
        warn!(%name, ?path, error = %err, "static file became unreadable");
        ApiError::not_found(format!("cannot read static file {name}"))
    })?;
    Ok(Bytes::from(contents))
}
