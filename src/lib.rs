//! cuels: analysis backend of a Language Server for CUE
//!
//! This crate provides the core functionality for the cuels server: it turns
//! CUE sources into a resolved semantic graph and keeps one versioned,
//! cancellable compilation per open document.
//!
//! # Overview
//!
//! - **Semantic graph**: packages, files, structs, declarations, references
//!   and values, with declarations of the same label merged into one node
//! - **Resolution**: lexical lookup upwards, dotted paths downwards, builtin
//!   fallback
//! - **Document cache**: edits bump the version, cancel work bound to the old
//!   version and start a new compile
//! - **Graph cursor**: sibling-linked view over the lower-level evaluation
//!   graph
//!
//! # Architecture
//!
//! - [`syntax`] and [`load`]: parser and instance loader feeding the compiler
//! - [`asg`]: the semantic graph, its compiler, resolution and visitors
//! - [`cache`]: open documents and their compile results
//! - [`adt`] and [`cursor`]: evaluation graph and the cursor tree over it
//! - [`server`]: protocol transport with [`hover`] and [`gotodef`]
//!
//! # Usage
//!
//! ```ignore
//! use cuels::{cache::DocumentCache, config::Settings, load::FsLoader};
//!
//! let cache = DocumentCache::new(Arc::new(FsLoader), Settings::default());
//! let doc = cache.add_document(item)?;
//! let compiled = doc.get_compiled().await?;
//! ```

// Core modules - semantic graph and compilation
pub mod asg;
pub mod cache;
pub mod load;
pub mod position;
pub mod syntax;

// Evaluation graph and cursor
pub mod adt;
pub mod cursor;

// LSP feature modules
pub mod gotodef;
pub mod hover;
pub mod server;

// Configuration and headless mode
pub mod check;
pub mod config;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
