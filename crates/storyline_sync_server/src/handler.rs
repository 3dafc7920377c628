//! Request handlers for sync endpoints.

use crate::assets::AssetResolver;
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::identity::CallerIdentity;
use crate::signer::UrlSigner;
use std::sync::Arc;
use storyline_core::ContentEngine;
use storyline_protocol::{
    AssetSyncRequest, AssetSyncResponse, BatchUrlsRequest, BatchUrlsResponse, DeltaSyncRequest,
    DeltaSyncResponse, VersionCheckRequest, VersionCheckResponse,
};
use tracing::{info, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Core services (shared across all handlers).
    pub engine: ContentEngine,
    /// Asset path validation and signing.
    pub assets: AssetResolver,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, engine: ContentEngine, signer: Arc<dyn UrlSigner>) -> Self {
        Self {
            assets: AssetResolver::new(signer, config.clone()),
            config,
            engine,
        }
    }
}

/// Handler for sync requests.
///
/// Handlers hold no per-request state and may be called from many threads.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a delta sync request.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the checksum map is too large and
    /// `StoreUnavailable` when the store cannot be reached.
    pub fn handle_delta_sync(
        &self,
        caller: &CallerIdentity,
        request: &DeltaSyncRequest,
    ) -> ServerResult<DeltaSyncResponse> {
        request
            .validate(self.context.config.max_client_checksums)
            .inspect_err(|e| {
                warn!(request_id = %caller.request_id, error = %e, "delta sync rejected");
            })?;

        let response = self
            .context
            .engine
            .reconciler()
            .reconcile(request)
            .inspect_err(|e| {
                warn!(request_id = %caller.request_id, error = %e, "delta sync failed");
            })?;

        info!(
            request_id = %caller.request_id,
            subject = %caller.subject,
            client_version = request.client_version,
            server_version = response.server_version,
            updated_stories = response.updated_stories,
            "delta sync"
        );
        Ok(response)
    }

    /// Handles a version check.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` when the store cannot be reached.
    pub fn handle_version_check(
        &self,
        caller: &CallerIdentity,
        request: &VersionCheckRequest,
    ) -> ServerResult<VersionCheckResponse> {
        let response = self
            .context
            .engine
            .reconciler()
            .check_version(request)?;
        info!(
            request_id = %caller.request_id,
            version = response.version,
            up_to_date = response.up_to_date,
            "version check"
        );
        Ok(response)
    }

    /// Handles a batch asset URL request.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty or oversized batch.
    pub fn handle_batch_urls(
        &self,
        caller: &CallerIdentity,
        request: &BatchUrlsRequest,
    ) -> ServerResult<BatchUrlsResponse> {
        let response = self.context.assets.resolve(request).inspect_err(|e| {
            warn!(request_id = %caller.request_id, error = %e, "asset batch rejected");
        })?;
        info!(
            request_id = %caller.request_id,
            signed = response.urls.len(),
            failed = response.failed.len(),
            "asset batch"
        );
        Ok(response)
    }

    /// Handles an asset delta sync.
    ///
    /// Diffs the client's asset checksums against the asset aggregate and
    /// signs every changed path. Paths that cannot be signed are listed in
    /// `failed` and still counted in `updated_count`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the checksum map is too large and
    /// `StoreUnavailable` when the store cannot be reached.
    pub fn handle_asset_sync(
        &self,
        caller: &CallerIdentity,
        request: &AssetSyncRequest,
    ) -> ServerResult<AssetSyncResponse> {
        request
            .validate(self.context.config.max_client_checksums)
            .inspect_err(|e| {
                warn!(request_id = %caller.request_id, error = %e, "asset sync rejected");
            })?;

        let aggregate = self
            .context
            .engine
            .asset_versions()
            .get_current()
            .inspect_err(|e| {
                warn!(request_id = %caller.request_id, error = %e, "asset sync failed");
            })?
            .unwrap_or_default();

        let changed = aggregate.diff(&request.asset_checksums);
        let (mut updated_assets, failed) = self
            .context
            .assets
            .sign_paths(changed.iter().map(String::as_str));
        for asset in &mut updated_assets {
            asset.checksum = aggregate.asset_checksums.get(&asset.path).cloned();
            if asset.size_bytes.is_none() {
                asset.size_bytes = aggregate.size_of(&asset.path);
            }
        }

        info!(
            request_id = %caller.request_id,
            subject = %caller.subject,
            client_version = ?request.client_version,
            server_version = aggregate.version,
            updated = changed.len(),
            failed = failed.len(),
            "asset sync"
        );
        Ok(AssetSyncResponse {
            server_version: aggregate.version,
            total_assets: aggregate.total_assets,
            updated_count: changed.len() as u64,
            last_updated: aggregate.last_updated,
            asset_checksums: aggregate.asset_checksums,
            updated_assets,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::signer::HmacUrlSigner;
    use storyline_core::CoreConfig;
    use storyline_protocol::{ChecksumMap, ProtocolError, Story, StoryPage};
    use storyline_store::InMemoryDocumentStore;

    fn create_handler() -> (Arc<InMemoryDocumentStore>, ContentEngine, RequestHandler) {
        let backend = Arc::new(InMemoryDocumentStore::new());
        let engine = ContentEngine::new(backend.clone(), CoreConfig::default());
        let signer = Arc::new(HmacUrlSigner::new(b"k".to_vec(), "https://cdn"));
        let context = Arc::new(HandlerContext::new(
            ServerConfig::default().with_max_client_checksums(3),
            engine.clone(),
            signer,
        ));
        (backend, engine, RequestHandler::new(context))
    }

    #[test]
    fn delta_sync_roundtrip() {
        let (_, engine, handler) = create_handler();
        engine
            .catalog()
            .save_story(Story::new("a", "A", "c").with_page(StoryPage::new(1, "cover", "a")))
            .unwrap();

        let caller = CallerIdentity::new("device-1");
        let response = handler
            .handle_delta_sync(&caller, &DeltaSyncRequest::initial())
            .unwrap();
        assert_eq!(response.stories.len(), 1);
    }

    #[test]
    fn oversized_checksum_map_is_rejected() {
        let (_, _, handler) = create_handler();
        let checksums: ChecksumMap = (0..4).map(|i| (format!("s{i}"), "x".into())).collect();
        let result =
            handler.handle_delta_sync(&CallerIdentity::system(), &DeltaSyncRequest::new(0, checksums));
        assert!(matches!(
            result,
            Err(ServerError::Validation(ProtocolError::TooManyChecksums { max: 3, actual: 4 }))
        ));
    }

    #[test]
    fn asset_sync_signs_changed_assets() {
        let (_, engine, handler) = create_handler();
        let assets = engine.asset_versions();
        assets
            .apply_asset_checksum_change("images/a.png", "c1", Some(64))
            .unwrap();
        assets
            .apply_asset_checksum_change("audio/b.mp3", "c2", None)
            .unwrap();

        let client: ChecksumMap = [("images/a.png".to_string(), "c1".to_string())].into();
        let response = handler
            .handle_asset_sync(&CallerIdentity::system(), &AssetSyncRequest::new(Some(1), client))
            .unwrap();
        assert_eq!(response.server_version, 2);
        assert_eq!(response.total_assets, 2);
        assert_eq!(response.updated_count, 1);
        assert_eq!(response.updated_assets.len(), 1);
        assert_eq!(response.updated_assets[0].path, "audio/b.mp3");
        assert_eq!(response.updated_assets[0].checksum.as_deref(), Some("c2"));
        assert!(response.failed.is_empty());

        let initial = handler
            .handle_asset_sync(&CallerIdentity::system(), &AssetSyncRequest::default())
            .unwrap();
        let paths: Vec<_> = initial.updated_assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["audio/b.mp3", "images/a.png"]);
        assert_eq!(initial.updated_assets[1].size_bytes, Some(64));
    }

    #[test]
    fn asset_sync_reports_unsignable_paths() {
        let (_, engine, handler) = create_handler();
        engine
            .asset_versions()
            .apply_asset_checksum_change("private/key.pem", "c1", None)
            .unwrap();
        let response = handler
            .handle_asset_sync(&CallerIdentity::system(), &AssetSyncRequest::default())
            .unwrap();
        assert_eq!(response.updated_count, 1);
        assert!(response.updated_assets.is_empty());
        assert_eq!(response.failed, vec!["private/key.pem".to_string()]);
    }

    #[test]
    fn empty_asset_aggregate_syncs_nothing() {
        let (_, _, handler) = create_handler();
        let response = handler
            .handle_asset_sync(&CallerIdentity::system(), &AssetSyncRequest::default())
            .unwrap();
        assert_eq!(response, AssetSyncResponse::default());

        let checksums: ChecksumMap = (0..4).map(|i| (format!("images/{i}.png"), "x".into())).collect();
        assert!(matches!(
            handler.handle_asset_sync(
                &CallerIdentity::system(),
                &AssetSyncRequest::new(None, checksums)
            ),
            Err(ServerError::Validation(ProtocolError::TooManyChecksums { max: 3, actual: 4 }))
        ));
    }

    #[test]
    fn outage_maps_to_store_unavailable() {
        let (backend, _, handler) = create_handler();
        backend.set_available(false);
        let err = handler
            .handle_version_check(&CallerIdentity::system(), &VersionCheckRequest::default())
            .unwrap_err();
        assert!(matches!(err, ServerError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }
}
