//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::identity::CallerIdentity;
use crate::signer::UrlSigner;
use std::sync::Arc;
use storyline_core::ContentEngine;
use storyline_protocol::{
    AssetSyncRequest, AssetSyncResponse, BatchUrlsRequest, BatchUrlsResponse, DeltaSyncRequest,
    DeltaSyncResponse, SyncMessage, VersionCheckRequest, VersionCheckResponse,
};
use tracing::error;

/// The sync server.
///
/// Transport-agnostic: an HTTP or RPC layer authenticates the caller, then
/// hands the decoded request (or the raw body and its type code) here.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use storyline_core::{ContentEngine, CoreConfig};
/// use storyline_protocol::DeltaSyncRequest;
/// use storyline_store::InMemoryDocumentStore;
/// use storyline_sync_server::{CallerIdentity, HmacUrlSigner, ServerConfig, SyncServer};
///
/// let engine = ContentEngine::new(Arc::new(InMemoryDocumentStore::new()), CoreConfig::default());
/// let signer = Arc::new(HmacUrlSigner::new(b"secret".to_vec(), "https://cdn.example.com"));
/// let server = SyncServer::new(ServerConfig::default(), engine, signer);
///
/// let response = server
///     .handle_delta_sync(&CallerIdentity::system(), &DeltaSyncRequest::initial())
///     .unwrap();
/// assert_eq!(response.server_version, 0);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig, engine: ContentEngine, signer: Arc<dyn UrlSigner>) -> Self {
        let context = Arc::new(HandlerContext::new(config, engine, signer));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a delta sync request.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_delta_sync`].
    pub fn handle_delta_sync(
        &self,
        caller: &CallerIdentity,
        request: &DeltaSyncRequest,
    ) -> ServerResult<DeltaSyncResponse> {
        self.handler.handle_delta_sync(caller, request)
    }

    /// Handles a version check.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_version_check`].
    pub fn handle_version_check(
        &self,
        caller: &CallerIdentity,
        request: &VersionCheckRequest,
    ) -> ServerResult<VersionCheckResponse> {
        self.handler.handle_version_check(caller, request)
    }

    /// Handles a batch asset URL request.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_batch_urls`].
    pub fn handle_batch_urls(
        &self,
        caller: &CallerIdentity,
        request: &BatchUrlsRequest,
    ) -> ServerResult<BatchUrlsResponse> {
        self.handler.handle_batch_urls(caller, request)
    }

    /// Handles an asset delta sync.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_asset_sync`].
    pub fn handle_asset_sync(
        &self,
        caller: &CallerIdentity,
        request: &AssetSyncRequest,
    ) -> ServerResult<AssetSyncResponse> {
        self.handler.handle_asset_sync(caller, request)
    }

    /// Handles a sync message (dispatches to appropriate handler).
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedMessage` for response messages and the handler's
    /// error otherwise.
    pub fn handle_message(
        &self,
        caller: &CallerIdentity,
        message: SyncMessage,
    ) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::DeltaSyncRequest(req) => self
                .handle_delta_sync(caller, &req)
                .map(SyncMessage::DeltaSyncResponse),
            SyncMessage::VersionCheckRequest(req) => self
                .handle_version_check(caller, &req)
                .map(SyncMessage::VersionCheckResponse),
            SyncMessage::BatchUrlsRequest(req) => self
                .handle_batch_urls(caller, &req)
                .map(SyncMessage::BatchUrlsResponse),
            SyncMessage::AssetSyncRequest(req) => self
                .handle_asset_sync(caller, &req)
                .map(SyncMessage::AssetSyncResponse),
            other => Err(ServerError::UnexpectedMessage(other.type_code())),
        }
    }

    /// Decodes a raw body, handles it and encodes the reply.
    ///
    /// Always produces a reply: failures come back as an error message
    /// (type code 255) carrying [`ServerError::to_response`].
    pub fn handle_bytes(&self, caller: &CallerIdentity, type_code: u8, body: &[u8]) -> (u8, Vec<u8>) {
        let reply = SyncMessage::decode(type_code, body)
            .map_err(ServerError::from)
            .and_then(|message| self.handle_message(caller, message))
            .unwrap_or_else(|e| SyncMessage::Error(e.to_response()));

        match reply.encode() {
            Ok(bytes) => (reply.type_code(), bytes),
            Err(e) => {
                error!(request_id = %caller.request_id, error = %e, "failed to encode reply");
                let fallback = ServerError::Internal(e.to_string()).to_response();
                let bytes = storyline_protocol::encode(&fallback).unwrap_or_default();
                (SyncMessage::Error(fallback).type_code(), bytes)
            }
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the content engine.
    pub fn engine(&self) -> &ContentEngine {
        &self.context.engine
    }
}
