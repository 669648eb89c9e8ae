//! Recommendation client for the Corki sommelier service.
//!
//! One call sends a prompt and raw attachments as a multipart form and yields the
//! response body as a lazy stream of text fragments.

use std::sync::Arc;

mod attachment;
mod decode;
mod http_adapter;
mod provider;

pub use attachment::{AttachmentSource, OCTET_STREAM, RawAttachment};
pub use http_adapter::HttpRecommendationProvider;
pub use provider::{
    BoxFuture, DEFAULT_BASE_URL, DEFAULT_HEALTH_PATH, DEFAULT_RECOMMEND_PATH, HTTP_PROVIDER_ID,
    HealthStatus, PreparedAttachment, PreparedRequest, ProviderConfig, ProviderError,
    ProviderResult, RecommendationProvider, RecommendationRequest, RecommendationStream,
    StreamEvent, normalize_base_url, normalize_path,
};

pub fn create_provider(config: ProviderConfig) -> ProviderResult<Arc<dyn RecommendationProvider>> {
    tracing::debug!(base_url = %config.base_url, "creating recommendation provider");
    Ok(Arc::new(HttpRecommendationProvider::new(config)?))
}
