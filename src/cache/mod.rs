//! Cache of the documents open in one client connection.
//!
//! Every document carries a version and a cancellation token that lives as
//! long as that version. An edit cancels the previous token, stores the new
//! content and starts an asynchronous compile bound to the new token. All
//! accessors of a [`DocumentHandle`] fail with [`CacheError::Expired`] once
//! the handle's token is cancelled, and a compile whose token was cancelled
//! drops its output instead of publishing it.
//!
//! Lock order is documents map first, then a document's state.

mod compile;
pub(crate) mod diagnostics;
mod document;
mod position;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Position, TextDocumentItem, Url};
use tracing::{debug, info};

use crate::{
    asg::{Compiler, NodeRef},
    config::Settings,
    load::{LoadConfig, Loader},
    position::Pos,
};

pub use compile::CompiledDocument;
pub use document::DocumentHandle;

use document::Document;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("document already exists: {0}")]
    DocumentExists(Url),
    #[error("document not found: {0}")]
    DocumentNotFound(Url),
    #[error("document expired")]
    Expired,
    #[error("update to {uri} didn't increase version number ({requested} <= {current})")]
    InvalidVersion { uri: Url, current: i32, requested: i32 },
    #[error("document too large: {size} bytes, at most {max} allowed")]
    DocumentTooLarge { size: usize, max: usize },
    #[error("{line}:{character} is out of range for the document")]
    PositionOutOfRange { line: u32, character: u32 },
    #[error("offset {0} is out of range for the document")]
    OffsetOutOfRange(usize),
    #[error("invalid range for content change")]
    InvalidRange,
    #[error("document has no compiled package")]
    NoInstance,
    #[error("compile task failed: {0}")]
    TaskFailed(String),
}

/// Converts a document URI into a file path. Only `file` URIs have one.
pub fn path_from_uri(uri: &Url) -> Option<PathBuf> {
    match uri.scheme().starts_with("file") {
        true => uri.to_file_path().ok(),
        false => None,
    }
}

/// Everything the cache knows about a position in a document.
pub struct Location {
    pub doc: DocumentHandle,
    pub pos: Pos,
    pub compiled: Arc<CompiledDocument>,
    /// Most specific node at `pos`, if any.
    pub node: Option<NodeRef>,
}

#[derive(Clone)]
pub struct DocumentCache {
    inner: Arc<CacheInner>,
}

pub(crate) struct CacheInner {
    root: RwLock<Option<PathBuf>>,
    documents: RwLock<HashMap<Url, Arc<Document>>>,
    settings: RwLock<Settings>,
    loader: Arc<dyn Loader>,
    /// Parent of every document token.
    lifetime: CancellationToken,
}

impl DocumentCache {
    pub fn new(loader: Arc<dyn Loader>, settings: Settings) -> DocumentCache {
        DocumentCache {
            inner: Arc::new(CacheInner {
                root: RwLock::new(None),
                documents: RwLock::new(HashMap::new()),
                settings: RwLock::new(settings),
                loader,
                lifetime: CancellationToken::new(),
            }),
        }
    }

    /// Sets the folder used as working directory of every later compile.
    pub fn set_root(&self, root: impl Into<PathBuf>) {
        let root = root.into();
        info!(root = %root.display(), "cache root");
        *self.inner.root.write() = Some(root);
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.inner.root.read().clone()
    }

    pub fn settings(&self) -> Settings {
        self.inner.settings.read().clone()
    }

    pub fn set_settings(&self, settings: Settings) {
        *self.inner.settings.write() = settings;
    }

    /// Adds a document and starts compiling it.
    pub fn add_document(&self, item: TextDocumentItem) -> Result<DocumentHandle, CacheError> {
        let TextDocumentItem {
            uri,
            language_id,
            version,
            text,
        } = item;

        let max = self.inner.settings.read().max_document_size;
        if text.len() > max {
            return Err(CacheError::DocumentTooLarge {
                size: text.len(),
                max,
            });
        }

        let path = self.inner.abs_path(&uri);
        let token = self.inner.lifetime.child_token();
        let doc = {
            let mut documents = self.inner.documents.write();
            if documents.contains_key(&uri) {
                return Err(CacheError::DocumentExists(uri));
            }
            let doc = Arc::new(Document::new(
                uri.clone(),
                path,
                language_id,
                text,
                version,
                token.clone(),
                Arc::downgrade(&self.inner),
            ));
            documents.insert(uri, doc.clone());
            doc.start_compile(&token, version);
            doc
        };

        debug!(uri = %doc.uri, version, "document added");
        Ok(DocumentHandle::new(doc, token))
    }

    /// A handle bound to the document's current version.
    pub fn get_document(&self, uri: &Url) -> Result<DocumentHandle, CacheError> {
        let documents = self.inner.documents.read();
        let doc = documents
            .get(uri)
            .ok_or_else(|| CacheError::DocumentNotFound(uri.clone()))?;
        let token = doc.current_token();
        Ok(DocumentHandle::new(doc.clone(), token))
    }

    /// Cancels the document's outstanding work and evicts it.
    pub fn remove_document(&self, uri: &Url) -> Result<(), CacheError> {
        let mut documents = self.inner.documents.write();
        let doc = documents
            .remove(uri)
            .ok_or_else(|| CacheError::DocumentNotFound(uri.clone()))?;
        doc.obsolete_version();
        debug!(%uri, "document removed");
        Ok(())
    }

    pub fn documents(&self) -> Vec<Url> {
        let mut uris: Vec<_> = self.inner.documents.read().keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Resolves a protocol position to the node under it, waiting for the
    /// document's compile to settle.
    pub async fn find(&self, uri: &Url, position: Position) -> Result<Location, CacheError> {
        let doc = self.get_document(uri)?;
        let offset = doc.position_to_offset(position)?;
        let compiled = doc.get_compiled().await?;

        let asg = &compiled.asg;
        let file = asg
            .sources()
            .file_id(doc.path())
            .ok_or(CacheError::NoInstance)?;
        let pos = Pos::new(file, offset);
        let node = asg
            .root()
            .and_then(|root| asg.find(NodeRef::Node(root), pos));

        Ok(Location {
            doc,
            pos,
            compiled,
            node,
        })
    }

    /// Cancels every document's token. Later reads fail with
    /// [`CacheError::Expired`].
    pub fn shutdown(&self) {
        info!("cache shutdown");
        self.inner.lifetime.cancel();
    }
}

impl CacheInner {
    /// Absolute path of a document. Relative paths resolve against the root.
    fn abs_path(&self, uri: &Url) -> PathBuf {
        let path = path_from_uri(uri).unwrap_or_else(|| PathBuf::from(uri.path()));
        match (path.is_absolute(), self.root.read().as_ref()) {
            (false, Some(root)) => root.join(path),
            _ => path,
        }
    }

    /// Contents of every open document, keyed by path.
    fn overlay(&self) -> HashMap<PathBuf, Arc<str>> {
        self.documents
            .read()
            .values()
            .map(|doc| (doc.path.clone(), doc.content()))
            .collect()
    }

    fn create_compiler(&self, doc_path: &Path) -> Compiler {
        let dir = match self.root.read().clone() {
            Some(root) => root,
            None => doc_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let config = LoadConfig::new(dir).with_overlay(self.overlay());
        Compiler::new(self.loader.clone(), config)
    }
}
