//! Gallery upload endpoints.
//!
//! Originals and previews are posted as multipart forms. The preview request
//! carries the item's upload key as `Idempotency-Key`, so a retried request
//! after a lost response never creates a second preview.

use async_trait::async_trait;
use bytes::Bytes;
use proofsheet_core::{
    until_cancelled, CancellationToken, OriginalUploader, PipelineError, PreviewMetadata,
    PreviewUploader, SourceFile, UploadResult,
};
use reqwest::multipart::{Form, Part};
use uuid::Uuid;

use crate::ApiClient;

/// Response of `POST /galleries/{id}/originals`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct OriginalResponse {
    pub storage_path: String,
}

impl ApiClient {
    pub fn originals_path(gallery_id: Uuid) -> String {
        format!("/galleries/{}/originals", gallery_id)
    }

    pub fn previews_path(gallery_id: Uuid) -> String {
        format!("/galleries/{}/previews", gallery_id)
    }
}

/// The part shares `data`'s buffer, so a retried upload does not copy the
/// blob. The known length keeps the request out of chunked encoding.
fn file_part(data: &Bytes, filename: &str, content_type: &str) -> Result<Part, PipelineError> {
    Part::stream_with_length(reqwest::Body::from(data.clone()), data.len() as u64)
        .file_name(filename.to_string())
        .mime_str(content_type)
        .map_err(|e| {
            PipelineError::permanent(format!("invalid content type {}: {}", content_type, e))
        })
}

#[async_trait]
impl OriginalUploader for ApiClient {
    #[tracing::instrument(skip(self, file, cancel), fields(filename = %file.name, size = file.size()))]
    async fn upload_original(
        &self,
        file: &SourceFile,
        gallery_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let form = Form::new().part(
            "file",
            file_part(&file.data, &file.name, &file.content_type)?,
        );

        let path = Self::originals_path(gallery_id);
        let response: OriginalResponse =
            until_cancelled(cancel, self.post_multipart(&path, form, None)).await?;

        tracing::debug!(storage_path = %response.storage_path, "Original stored");
        Ok(response.storage_path)
    }
}

#[async_trait]
impl PreviewUploader for ApiClient {
    #[tracing::instrument(
        skip(self, blob, metadata, cancel),
        fields(
            gallery_id = %metadata.gallery_id,
            filename = %metadata.filename,
            size = blob.len()
        )
    )]
    async fn upload_preview(
        &self,
        blob: Bytes,
        metadata: &PreviewMetadata,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, PipelineError> {
        let form = Form::new()
            .part(
                "file",
                file_part(&blob, &metadata.filename, &metadata.content_type)?,
            )
            .text("filename", metadata.filename.clone())
            .text("width", metadata.width.to_string())
            .text("height", metadata.height.to_string())
            .text("skip_quota", metadata.skip_quota.to_string());

        let path = Self::previews_path(metadata.gallery_id);
        let result: UploadResult = until_cancelled(
            cancel,
            self.post_multipart(&path, form, Some(&metadata.idempotency_key)),
        )
        .await?;

        tracing::debug!(preview_id = %result.id, storage_key = %result.storage_key, "Preview stored");
        Ok(result)
    }
}
