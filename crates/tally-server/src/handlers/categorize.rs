//! Statement categorization endpoint

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use serde::Deserialize;
use tally_core::{ExportFormat, Table, TableFormat};
use tracing::info;

use crate::{AppError, AppState, MAX_UPLOAD_SIZE};

#[derive(Debug, Default, Deserialize)]
pub struct CategorizeQuery {
    pub format: Option<String>,
}

/// POST /api/categorize - Categorize an uploaded statement
///
/// Multipart form fields:
/// - file: Statement as CSV or spreadsheet (required)
/// - format: json (default) or csv; overrides the `format` query parameter
pub async fn categorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CategorizeQuery>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut format = query.format;

    // Extract fields from multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read file data"))?;

                // Check file size limit
                if bytes.len() > MAX_UPLOAD_SIZE {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} MB",
                        MAX_UPLOAD_SIZE / 1024 / 1024
                    )));
                }

                file_data = Some(bytes.to_vec());
            }
            "format" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read format"))?;
                format = Some(value);
            }
            _ => {}
        }
    }

    let file_data = file_data.ok_or_else(|| AppError::bad_request("No file uploaded."))?;
    let format: ExportFormat = match format.as_deref() {
        Some(value) => value.parse().map_err(AppError::from_core)?,
        None => ExportFormat::default(),
    };

    // Trust a recognizable extension, otherwise look at the bytes
    let table_format = file_name
        .as_deref()
        .and_then(|name| TableFormat::from_path(Path::new(name)).ok())
        .unwrap_or_else(|| TableFormat::sniff(&file_data));

    let rows = Table::read_bytes(&file_data, table_format, &state.read_options)
        .map_err(AppError::from_core)?
        .to_transactions();

    let categorized = state
        .pipeline
        .categorize(rows)
        .await
        .map_err(AppError::from_core)?;
    info!(
        "Categorized {} transactions from {}",
        categorized.len(),
        file_name.as_deref().unwrap_or("upload")
    );

    let body = format
        .render(&categorized, &state.export)
        .map_err(AppError::from_core)?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type());
    if format == ExportFormat::Csv {
        response = response.header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"data.csv\"",
        );
    }
    response
        .body(Body::from(body))
        .map_err(|e| AppError::internal(&e.to_string()))
}
