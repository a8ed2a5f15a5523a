//! Image pulls with registry authentication.

use caravel_client::ClientEntry;
use caravel_core::ConfigId;
use serde_json::Value as Json;
use tracing::info;

use crate::cache::NameCache;
use crate::error::EngineResult;
use crate::state::update::credentials_for;

/// Pulls the image of an image node and refreshes the tag cache.
pub async fn pull(
    cache: &NameCache,
    entry: &ClientEntry,
    client_name: &str,
    id: &ConfigId,
) -> EngineResult<Option<Json>> {
    let name = id.config_name.clone();
    let tag = id.instance_name.clone().unwrap_or_else(|| "latest".to_string());
    let reference = format!("{}:{}", name, tag);
    info!(image = %reference, client = client_name, "pulling image");
    let credentials = credentials_for(&entry.config, &reference);
    let image_id = cache
        .ensure_image(client_name, entry.api.as_ref(), &reference, true, credentials)
        .await?;
    Ok(Some(Json::String(image_id)))
}
