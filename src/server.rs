//! Language server transport: forwards protocol requests to the document
//! cache and the features built on it.

use std::{path::PathBuf, sync::Arc};

use tower_lsp::{
    jsonrpc::{self, ErrorCode},
    lsp_types::*,
    Client, LanguageServer,
};
use tracing::{debug, info, warn};

use crate::{
    cache::{self, path_from_uri, CacheError, DocumentCache, DocumentHandle},
    config::Settings,
    gotodef, hover,
    load::FsLoader,
};

impl From<CacheError> for jsonrpc::Error {
    fn from(err: CacheError) -> Self {
        let code = match err {
            CacheError::Expired => ErrorCode::ContentModified,
            CacheError::InvalidVersion { .. }
            | CacheError::PositionOutOfRange { .. }
            | CacheError::OffsetOutOfRange(_)
            | CacheError::InvalidRange
            | CacheError::DocumentNotFound(_) => ErrorCode::InvalidParams,
            _ => ErrorCode::InternalError,
        };
        jsonrpc::Error {
            code,
            message: err.to_string().into(),
            data: None,
        }
    }
}

pub struct Backend {
    client: Client,
    cache: DocumentCache,
}

impl Backend {
    pub fn new(client: Client) -> Backend {
        Backend {
            client,
            cache: DocumentCache::new(Arc::new(FsLoader), Settings::default()),
        }
    }

    /// Publishes the diagnostics of `doc` once its compile settles. Nothing
    /// is published if a newer version arrived in the meantime.
    fn publish_diagnostics(&self, doc: DocumentHandle) {
        if !self.cache.settings().diagnostics {
            return;
        }

        let client = self.client.clone();
        tokio::spawn(async move {
            let (diagnostics, version) = match (doc.get_diagnostics().await, doc.get_version()) {
                (Ok(diagnostics), Ok(version)) => (diagnostics, version),
                (Err(CacheError::Expired), _) | (_, Err(CacheError::Expired)) => return,
                (Err(err), _) | (_, Err(err)) => {
                    warn!(uri = %doc.uri(), %err, "can't publish diagnostics");
                    return;
                }
            };

            if !diagnostics.contains_key(doc.uri()) {
                client.publish_diagnostics(doc.uri().clone(), Vec::new(), Some(version)).await;
            }
            for (uri, diagnostics) in diagnostics {
                let version = (&uri == doc.uri()).then_some(version);
                client.publish_diagnostics(uri, diagnostics, version).await;
            }
        });
    }

    /// The node under a position. Documents without a compiled package have
    /// nothing to show.
    async fn locate(&self, position: TextDocumentPositionParams) -> jsonrpc::Result<Option<cache::Location>> {
        match self.cache.find(&position.text_document.uri, position.position).await {
            Ok(location) => Ok(Some(location)),
            Err(CacheError::NoInstance) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
        let folder = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| &folder.uri);
        #[allow(deprecated)]
        let uri = folder.or(params.root_uri.as_ref())?;
        path_from_uri(uri)
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        if let Some(root) = Self::workspace_root(&params) {
            match Settings::new(&root) {
                Ok(settings) => self.cache.set_settings(settings),
                Err(err) => warn!(%err, "can't load settings, using defaults"),
            }
            self.cache.set_root(root);
        }

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("server initialized");
        self.client.log_message(MessageType::INFO, "cuels initialized").await;
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        self.cache.shutdown();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        match self.cache.add_document(params.text_document) {
            Ok(doc) => self.publish_diagnostics(doc),
            Err(err) => {
                warn!(%uri, %err, "can't open document");
                self.client.show_message(MessageType::ERROR, err.to_string()).await;
            }
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier { uri, version },
            content_changes,
        } = params;

        let updated = self.cache.get_document(&uri).and_then(|doc| {
            let content = doc.apply_incremental_changes(&content_changes, version)?;
            doc.set_content(content, version)
        });
        match updated {
            Ok(doc) => self.publish_diagnostics(doc),
            Err(err) => warn!(%uri, version, %err, "can't apply change"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Err(err) = self.cache.remove_document(&uri) {
            debug!(%uri, %err, "close of unknown document");
            return;
        }
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn hover(&self, params: HoverParams) -> jsonrpc::Result<Option<Hover>> {
        let Some(location) = self.locate(params.text_document_position_params).await? else {
            return Ok(None);
        };
        let settings = self.cache.settings();

        Ok(location
            .node
            .and_then(|node| hover::hover(&location.compiled.asg, node, &settings)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> jsonrpc::Result<Option<GotoDefinitionResponse>> {
        let Some(location) = self.locate(params.text_document_position_params).await? else {
            return Ok(None);
        };

        Ok(location
            .node
            .and_then(|node| gotodef::goto_definition(&location.compiled.asg, node))
            .map(GotoDefinitionResponse::Array))
    }
}
