use std::{collections::HashMap, sync::Arc};

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Diagnostic, Url};
use tracing::{debug, info, warn};

use super::{diagnostics, document::Document, CacheError, CacheInner};
use crate::asg::{Asg, CompileError};

/// Compile output of one document version.
#[derive(Debug)]
pub struct CompiledDocument {
    pub version: i32,
    pub asg: Asg,
    pub errors: Vec<CompileError>,
}

/// Marks a compile finished even when its task unwinds.
struct Done(Arc<Document>, i32);

impl Drop for Done {
    fn drop(&mut self) {
        self.0.compilers.done(self.1);
    }
}

impl Document {
    /// Registers a compile of `version` with the wait group and spawns it.
    /// Must not take the document's state lock: callers may hold it.
    pub(crate) fn start_compile(self: &Arc<Self>, token: &CancellationToken, version: i32) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        if !cache.settings.read().compiles(&self.language_id) {
            debug!(uri = %self.uri, language = %self.language_id, "not compiled");
            return;
        }

        self.compilers.add(version);
        let done = Done(self.clone(), version);
        let token = token.clone();
        tokio::spawn(async move {
            let doc = done.0.clone();
            match doc.compile(cache, &token, version).await {
                Ok(()) => {}
                Err(CacheError::Expired) => {
                    debug!(uri = %doc.uri, version, "compile result dropped, version superseded");
                }
                Err(err) => warn!(uri = %doc.uri, version, %err, "had error while trying to compile doc"),
            }
            drop(done);
        });
    }

    async fn compile(
        self: &Arc<Self>,
        cache: Arc<CacheInner>,
        token: &CancellationToken,
        version: i32,
    ) -> Result<(), CacheError> {
        if token.is_cancelled() {
            return Err(CacheError::Expired);
        }

        let compiler = cache.create_compiler(&self.path);
        drop(cache);

        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || compiler.compile_file(&path))
            .await
            .map_err(|err| CacheError::TaskFailed(err.to_string()))?;

        let (compiled, diagnostics) = match result {
            Ok(compilation) => {
                let diagnostics = diagnostics::collect(&self.uri, &self.path, &compilation.asg, &compilation.errors);
                info!(uri = %self.uri, version, errors = compilation.errors.len(), "compiled document");
                let compiled = CompiledDocument {
                    version,
                    asg: compilation.asg,
                    errors: compilation.errors,
                };
                (Some(Arc::new(compiled)), diagnostics)
            }
            Err(err) => {
                let diagnostics = diagnostics::collect(&self.uri, &self.path, &Asg::default(), &[err]);
                (None, diagnostics)
            }
        };

        self.publish(token, compiled, diagnostics)
    }

    /// Stores compile output unless the version it was made for is gone.
    fn publish(
        &self,
        token: &CancellationToken,
        compiled: Option<Arc<CompiledDocument>>,
        diagnostics: HashMap<Url, Vec<Diagnostic>>,
    ) -> Result<(), CacheError> {
        let mut state = self.state.write();
        if token.is_cancelled() {
            return Err(CacheError::Expired);
        }
        state.compiled = compiled;
        state.diagnostics = diagnostics;
        Ok(())
    }
}
