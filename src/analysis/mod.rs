//! Image analysis
//!
//! The cache treats the analyzer as an opaque, possibly slow collaborator:
//! - [`Analyzer::analyze`] produces an [`ImageAnalysis`] or an error
//! - [`project_layer`] derives a [`LayerDetail`] from a finished analysis

pub mod archive;
mod engine;
pub mod model;

pub use engine::CliAnalyzer;
pub use model::{
    build_tree, FileKind, FileNode, FileRecord, ImageAnalysis, ImageMeta, Inefficiency,
    LayerAnalysis, LayerDetail,
};

use crate::error::{StrataError, StrataResult};
use async_trait::async_trait;

/// Produces the analysis of a named image
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze an image; may take arbitrarily long
    async fn analyze(&self, name: &str) -> StrataResult<ImageAnalysis>;
}

/// Project one layer of a finished analysis into its detail view
pub fn project_layer(analysis: &ImageAnalysis, index: usize) -> StrataResult<LayerDetail> {
    let layer = analysis
        .layers
        .get(index)
        .ok_or(StrataError::LayerOutOfRange {
            index,
            count: analysis.layers.len(),
        })?;

    Ok(LayerDetail {
        index: layer.index,
        digest: layer.digest.clone(),
        command: layer.command.clone(),
        size: layer.size,
        file_count: layer.file_count,
        tree: build_tree(&layer.files),
    })
}
