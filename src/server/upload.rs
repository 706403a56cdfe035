// 文件上传接口
// multipart 字段 file 流式写入暂存区，返回 handle 供后续传输使用

use std::path::Path;

use anyhow::Result;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::models::StagedFile;
use crate::services::staging::StagingArea;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub handle: String,
    pub filename: String,
    pub size: u64,
    pub message: String,
}

pub async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("[HTTP] Malformed upload: {}", e);
                return reject(StatusCode::BAD_REQUEST, e.to_string());
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = display_name(field.file_name());
        return match stage_field(state.staging(), field).await {
            Ok(staged) => {
                info!(
                    "[HTTP] Received upload {:?} as {} ({} bytes)",
                    filename, staged.handle, staged.byte_size
                );
                Json(UploadResponse {
                    success: true,
                    handle: staged.handle,
                    filename,
                    size: staged.byte_size,
                    message: "File uploaded to server. Use transfer to send it to the remote host."
                        .to_string(),
                })
                .into_response()
            }
            Err(e) => {
                error!("[HTTP] Failed to stage upload {:?}: {:#}", filename, e);
                reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
    }

    reject(StatusCode::BAD_REQUEST, "No file uploaded".to_string())
}

fn reject(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

/// 只保留文件名部分，去掉浏览器可能带上的目录
fn display_name(raw: Option<&str>) -> String {
    raw.and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

async fn stage_field(staging: &StagingArea, mut field: Field<'_>) -> Result<StagedFile> {
    let mut writer = staging.writer().await?;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = writer.write_chunk(&chunk).await {
                    writer.abort().await;
                    return Err(e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                writer.abort().await;
                return Err(e.into());
            }
        }
    }
    writer.finish().await
}
