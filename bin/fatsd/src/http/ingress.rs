//! Management endpoints: archive upload and secret upsert. The upload
//! handler streams the body to disk, hands off to the builder, and
//! triggers an early reconciliation pass once the project is committed.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

use fats_core::{IngressError, ToolError};

use super::AppState;

/// `POST /mgmt/tar-upload`.
pub async fn upload_archive(
    State(state): State<AppState>,
    body: Body,
) -> Result<(StatusCode, &'static str), (StatusCode, String)> {
    tokio::fs::create_dir_all(&state.scratch_dir)
        .await
        .map_err(internal_error)?;

    let archive_path = state.scratch_dir.join(format!("upload-{}.tar.gz", upload_id()));
    let mut file = tokio::fs::File::create(&archive_path).await.map_err(internal_error)?;

    let byte_stream = body
        .into_data_stream()
        .map_err(|err| std::io::Error::other(err.to_string()));
    let mut reader = StreamReader::new(byte_stream);
    tokio::io::copy(&mut reader, &mut file).await.map_err(internal_error)?;
    file.flush().await.map_err(internal_error)?;

    let result = fats_core::build_from_archive(&state.store, &state.builder_config, &archive_path).await;
    let _ = tokio::fs::remove_file(&archive_path).await;

    match result {
        Ok(project) => {
            tracing::info!(name = %project.name, version = %project.version, "Upload received");
            state.scheduler.request_early("Create Desired Application Containers").await;
            Ok((StatusCode::OK, "Upload received"))
        }
        Err(err) => Err(classify_build_error(err)),
    }
}

/// `POST /mgmt/secret/{name}`.
pub async fn upsert_secret(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, &'static str), (StatusCode, String)> {
    if body.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Secret value must not be empty".to_string()));
    }

    let value = String::from_utf8(body.to_vec())
        .map_err(|_| (StatusCode::BAD_REQUEST, "Secret value must be valid UTF-8".to_string()))?;

    fats_core::secrets::upsert(&state.store, &name, &value)
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::OK, "Secret uploaded"))
}

fn upload_id() -> String {
    use rand::Rng;
    let n: u64 = rand::rng().random();
    format!("{n:016x}")
}

fn internal_error(err: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Invalid input surfaces as 400 with the `IngressError` message; external
/// tool failures surface as 502; anything else is a 500.
fn classify_build_error(err: anyhow::Error) -> (StatusCode, String) {
    for cause in err.chain() {
        if let Some(ingress) = cause.downcast_ref::<IngressError>() {
            return (StatusCode::BAD_REQUEST, ingress.to_string());
        }
        if let Some(tool) = cause.downcast_ref::<ToolError>() {
            return (StatusCode::BAD_GATEWAY, tool.to_string());
        }
    }
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
