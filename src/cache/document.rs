use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use ropey::Rope;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Diagnostic, TextDocumentContentChangeEvent, Url};
use tracing::debug;

use super::{compile::CompiledDocument, CacheError, CacheInner};
use crate::position::position_to_offset;

/// Counts in-flight compiles per version; readers wait only for their own.
pub(crate) struct WaitGroup {
    counts: watch::Sender<BTreeMap<i32, usize>>,
}

impl WaitGroup {
    fn new() -> WaitGroup {
        let (counts, _) = watch::channel(BTreeMap::new());
        WaitGroup { counts }
    }

    pub(crate) fn add(&self, version: i32) {
        self.counts.send_modify(|counts| *counts.entry(version).or_default() += 1);
    }

    pub(crate) fn done(&self, version: i32) {
        self.counts.send_modify(|counts| {
            if let Some(count) = counts.get_mut(&version) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&version);
                }
            }
        });
    }

    pub(crate) async fn wait(&self, version: i32) {
        let mut rx = self.counts.subscribe();
        // the sender lives as long as `self`
        let _ = rx.wait_for(|counts| !counts.contains_key(&version)).await;
    }
}

pub(crate) struct DocumentState {
    pub(crate) content: Arc<str>,
    pub(crate) rope: Rope,
    pub(crate) version: i32,
    /// Cancelled as soon as the version changes.
    pub(crate) token: CancellationToken,
    pub(crate) compiled: Option<Arc<CompiledDocument>>,
    pub(crate) diagnostics: HashMap<Url, Vec<Diagnostic>>,
}

/// Content, metadata and compile results of one open document.
pub(crate) struct Document {
    pub(crate) uri: Url,
    pub(crate) path: PathBuf,
    pub(crate) language_id: String,
    pub(crate) state: RwLock<DocumentState>,
    pub(crate) compilers: WaitGroup,
    pub(crate) cache: Weak<CacheInner>,
}

impl Document {
    pub(crate) fn new(
        uri: Url,
        path: PathBuf,
        language_id: String,
        text: String,
        version: i32,
        token: CancellationToken,
        cache: Weak<CacheInner>,
    ) -> Document {
        let rope = Rope::from_str(&text);
        Document {
            uri,
            path,
            language_id,
            state: RwLock::new(DocumentState {
                content: text.into(),
                rope,
                version,
                token,
                compiled: None,
                diagnostics: HashMap::new(),
            }),
            compilers: WaitGroup::new(),
            cache,
        }
    }

    pub(crate) fn content(&self) -> Arc<str> {
        self.state.read().content.clone()
    }

    pub(crate) fn current_token(&self) -> CancellationToken {
        self.state.read().token.clone()
    }

    pub(crate) fn obsolete_version(&self) {
        self.state.read().token.cancel();
    }
}

/// A document bound to one of its versions.
///
/// Every accessor fails with [`CacheError::Expired`] once the document moved
/// past that version, except where noted.
#[derive(Clone)]
pub struct DocumentHandle {
    pub(crate) doc: Arc<Document>,
    pub(crate) token: CancellationToken,
}

impl DocumentHandle {
    pub(crate) fn new(doc: Arc<Document>, token: CancellationToken) -> DocumentHandle {
        DocumentHandle { doc, token }
    }

    pub fn uri(&self) -> &Url {
        &self.doc.uri
    }

    pub fn path(&self) -> &Path {
        &self.doc.path
    }

    /// Never fails: the language id does not change.
    pub fn language_id(&self) -> &str {
        &self.doc.language_id
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn check(&self) -> Result<(), CacheError> {
        match self.token.is_cancelled() {
            true => Err(CacheError::Expired),
            false => Ok(()),
        }
    }

    pub fn get_content(&self) -> Result<Arc<str>, CacheError> {
        let state = self.doc.state.read();
        self.check()?;
        Ok(state.content.clone())
    }

    /// Content between two byte offsets.
    pub fn get_substring(&self, start: usize, end: usize) -> Result<String, CacheError> {
        let state = self.doc.state.read();
        self.check()?;
        if start > end {
            return Err(CacheError::InvalidRange);
        }
        state
            .content
            .get(start..end)
            .map(str::to_string)
            .ok_or(CacheError::InvalidRange)
    }

    pub fn get_version(&self) -> Result<i32, CacheError> {
        let state = self.doc.state.read();
        self.check()?;
        Ok(state.version)
    }

    /// Waits until the compile of this handle's version finished or the
    /// version was superseded. Compiles of other versions are not awaited.
    async fn wait_compiled(&self) -> Result<(), CacheError> {
        let version = self.get_version()?;
        tokio::select! {
            _ = self.doc.compilers.wait(version) => {}
            _ = self.token.cancelled() => {}
        }
        Ok(())
    }

    /// The compiled package of this version. Waits for its compile.
    pub async fn get_compiled(&self) -> Result<Arc<CompiledDocument>, CacheError> {
        self.wait_compiled().await?;
        let state = self.doc.state.read();
        self.check()?;
        state.compiled.clone().ok_or(CacheError::NoInstance)
    }

    /// Diagnostics of this version by document. Waits for its compile.
    pub async fn get_diagnostics(&self) -> Result<HashMap<Url, Vec<Diagnostic>>, CacheError> {
        self.wait_compiled().await?;
        let state = self.doc.state.read();
        self.check()?;
        Ok(state.diagnostics.clone())
    }

    /// Applies `changes` in order to the current content and returns the
    /// result without storing it. Ranged changes are UTF-16 based; a change
    /// without range replaces everything.
    ///
    /// Works on the latest content whatever version the handle is bound to.
    pub fn apply_incremental_changes(
        &self,
        changes: &[TextDocumentContentChangeEvent],
        version: i32,
    ) -> Result<String, CacheError> {
        let state = self.doc.state.read();
        if version <= state.version {
            return Err(CacheError::InvalidVersion {
                uri: self.doc.uri.clone(),
                current: state.version,
                requested: version,
            });
        }

        let mut content = state.content.to_string();
        for change in changes {
            let Some(range) = change.range else {
                content = change.text.clone();
                continue;
            };

            let rope = Rope::from_str(&content);
            let out_of_range = |position: tower_lsp::lsp_types::Position| CacheError::PositionOutOfRange {
                line: position.line,
                character: position.character,
            };
            let start = position_to_offset(&rope, range.start).ok_or_else(|| out_of_range(range.start))?;
            let end = position_to_offset(&rope, range.end).ok_or_else(|| out_of_range(range.end))?;
            if end < start {
                return Err(CacheError::InvalidRange);
            }
            content.replace_range(start..end, &change.text);
        }
        Ok(content)
    }

    /// Stores new content for `version` and starts compiling it. Returns a
    /// handle bound to the new version; this handle expires.
    ///
    /// Works whatever version the handle is bound to.
    pub fn set_content(&self, content: String, version: i32) -> Result<DocumentHandle, CacheError> {
        let cache = self.doc.cache.upgrade();
        let max = cache
            .as_ref()
            .map(|cache| cache.settings.read().max_document_size)
            .unwrap_or(crate::config::MAX_DOCUMENT_SIZE);

        let token = {
            let mut state = self.doc.state.write();
            if version <= state.version {
                debug!(uri = %self.doc.uri, current = state.version, version, "version rejected");
                return Err(CacheError::InvalidVersion {
                    uri: self.doc.uri.clone(),
                    current: state.version,
                    requested: version,
                });
            }
            if content.len() > max {
                return Err(CacheError::DocumentTooLarge {
                    size: content.len(),
                    max,
                });
            }

            state.token.cancel();
            let token = match &cache {
                Some(cache) => cache.lifetime.child_token(),
                None => CancellationToken::new(),
            };

            state.rope = Rope::from_str(&content);
            state.content = content.into();
            state.version = version;
            state.token = token.clone();
            state.compiled = None;
            state.diagnostics.clear();
            // registered before the lock is released so readers wait for it
            self.doc.start_compile(&token, version);
            token
        };

        debug!(uri = %self.doc.uri, version, "content updated");
        Ok(DocumentHandle::new(self.doc.clone(), token))
    }
}
