//! Write the finished Markdown object.

use crate::config::MARKDOWN_CONTENT_TYPE;
use crate::error::OcrLambdaError;
use crate::storage::object_path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::info;

/// Put `markdown` at `key`, tagged `text/markdown; charset=utf-8` when the
/// store supports object attributes.
pub async fn put_markdown(
    store: &dyn ObjectStore,
    key: &str,
    uri: &str,
    markdown: String,
    with_content_type: bool,
) -> Result<(), OcrLambdaError> {
    let mut attributes = Attributes::new();
    if with_content_type {
        attributes.insert(Attribute::ContentType, MARKDOWN_CONTENT_TYPE.into());
    }
    let size = markdown.len();
    let opts = PutOptions {
        attributes,
        ..Default::default()
    };

    let location = object_path(key)?;
    store
        .put_opts(&location, PutPayload::from(markdown.into_bytes()), opts)
        .await
        .map_err(|source| OcrLambdaError::UploadFailed {
            uri: uri.to_string(),
            source,
        })?;

    info!("Uploaded {} ({} bytes)", uri, size);
    Ok(())
}
