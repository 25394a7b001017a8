//! Analysis artifact types
//!
//! `ImageAnalysis` is what the detail endpoint returns. Per-layer file
//! lists ride along in memory but are only exposed through
//! [`LayerDetail`] projections.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Kind of a path recorded in a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Hardlink,
    /// Deleted by this layer (whiteout)
    Removed,
    Other,
}

/// One path written (or removed) by a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Normalized path without leading `/` or `./`
    pub path: String,
    pub size: u64,
    pub mode: u32,
    pub kind: FileKind,
    pub link_target: Option<String>,
}

/// Analysis of a single layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAnalysis {
    /// Position in the image, base layer first
    pub index: usize,

    /// Uncompressed content digest (`sha256:...`) when known
    pub digest: String,

    /// Instruction that produced the layer
    pub command: String,

    /// Bytes of content added by the layer
    pub size: u64,

    /// Number of entries, whiteouts included
    pub file_count: usize,

    /// Entries in archive order
    #[serde(skip)]
    pub files: Vec<FileRecord>,

    /// Directories made opaque by this layer
    #[serde(skip)]
    pub opaque_dirs: Vec<String>,
}

impl LayerAnalysis {
    /// Build a layer record, deriving size and count from its files
    pub fn new(
        index: usize,
        digest: String,
        command: String,
        files: Vec<FileRecord>,
        opaque_dirs: Vec<String>,
    ) -> Self {
        let size = files
            .iter()
            .filter(|f| f.kind == FileKind::File)
            .map(|f| f.size)
            .sum();
        Self {
            index,
            digest,
            command,
            size,
            file_count: files.len(),
            files,
            opaque_dirs,
        }
    }
}

/// A path whose content was paid for more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inefficiency {
    pub path: String,
    /// Number of layers that wrote or removed the path
    pub count: usize,
    pub wasted_bytes: u64,
}

/// Image metadata read from the image config
#[derive(Debug, Clone, Default)]
pub struct ImageMeta {
    pub id: String,
    pub created: Option<DateTime<Utc>>,
    pub architecture: Option<String>,
    pub os: Option<String>,
}

/// Full analysis of an image
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub name: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Sum of layer sizes
    pub size: u64,
    pub layer_count: usize,
    /// 1.0 means no byte was written twice
    pub efficiency: f64,
    pub wasted_bytes: u64,
    pub inefficiencies: Vec<Inefficiency>,
    pub layers: Vec<LayerAnalysis>,
}

#[derive(Default)]
struct PathStats {
    count: usize,
    wasted: u64,
}

impl ImageAnalysis {
    /// Assemble an analysis from ordered layers, computing waste
    ///
    /// Content overwritten or removed by a later layer counts as wasted.
    /// Removals are applied before writes within the same layer.
    pub fn assemble(
        name: impl Into<String>,
        meta: ImageMeta,
        layers: Vec<LayerAnalysis>,
        top_inefficiencies: usize,
    ) -> Self {
        // Sorted so everything under a directory is one contiguous range
        let mut live: BTreeMap<&str, u64> = BTreeMap::new();
        let mut stats: HashMap<&str, PathStats> = HashMap::new();

        for layer in &layers {
            let mut removed: Vec<&str> = Vec::new();
            for dir in &layer.opaque_dirs {
                removed.extend(paths_under(&live, dir));
            }
            for record in layer.files.iter().filter(|f| f.kind == FileKind::Removed) {
                if live.contains_key(record.path.as_str()) {
                    removed.push(record.path.as_str());
                }
                removed.extend(paths_under(&live, &record.path));
            }
            for path in removed {
                if let Some(size) = live.remove(path) {
                    let entry = stats.entry(path).or_default();
                    entry.count += 1;
                    entry.wasted += size;
                }
            }

            for record in layer.files.iter().filter(|f| f.kind == FileKind::File) {
                let entry = stats.entry(record.path.as_str()).or_default();
                entry.count += 1;
                if let Some(previous) = live.insert(record.path.as_str(), record.size) {
                    entry.wasted += previous;
                }
            }
        }

        let mut inefficiencies: Vec<Inefficiency> = stats
            .into_iter()
            .filter(|(_, s)| s.wasted > 0)
            .map(|(path, s)| Inefficiency {
                path: path.to_string(),
                count: s.count,
                wasted_bytes: s.wasted,
            })
            .collect();
        inefficiencies.sort_by(|a, b| {
            b.wasted_bytes
                .cmp(&a.wasted_bytes)
                .then_with(|| a.path.cmp(&b.path))
        });

        let wasted_bytes = inefficiencies.iter().map(|i| i.wasted_bytes).sum();
        inefficiencies.truncate(top_inefficiencies);

        let size: u64 = layers.iter().map(|l| l.size).sum();
        let efficiency = if size == 0 {
            1.0
        } else {
            1.0 - (wasted_bytes as f64 / size as f64)
        };

        Self {
            name: name.into(),
            id: meta.id,
            created: meta.created,
            architecture: meta.architecture,
            os: meta.os,
            size,
            layer_count: layers.len(),
            efficiency,
            wasted_bytes,
            inefficiencies,
            layers,
        }
    }
}

/// Live paths strictly below `dir`
fn paths_under<'a>(live: &BTreeMap<&'a str, u64>, dir: &str) -> Vec<&'a str> {
    let prefix = format!("{}/", dir);
    live.range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
        .map(|(path, _)| *path)
        .take_while(|path| path.starts_with(&prefix))
        .collect()
}

/// Node of a layer's file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    /// Cumulative size of the node and everything below it
    pub size: u64,
    pub kind: FileKind,
    pub mode: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Find a direct child by name
    pub fn child(&self, name: &str) -> Option<&FileNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Detail view of one layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDetail {
    pub index: usize,
    pub digest: String,
    pub command: String,
    pub size: u64,
    pub file_count: usize,
    pub tree: FileNode,
}

struct TreeBuilder {
    kind: FileKind,
    mode: u32,
    size: u64,
    link_target: Option<String>,
    children: BTreeMap<String, TreeBuilder>,
}

impl TreeBuilder {
    fn dir() -> Self {
        Self {
            kind: FileKind::Dir,
            mode: 0o755,
            size: 0,
            link_target: None,
            children: BTreeMap::new(),
        }
    }

    fn insert(&mut self, record: &FileRecord) {
        let mut node = self;
        for part in record.path.split('/').filter(|p| !p.is_empty()) {
            node = node
                .children
                .entry(part.to_string())
                .or_insert_with(TreeBuilder::dir);
        }
        node.kind = record.kind;
        node.mode = record.mode;
        node.size = if record.kind == FileKind::File {
            record.size
        } else {
            0
        };
        node.link_target = record.link_target.clone();
    }

    fn finish(self, name: String) -> FileNode {
        let children: Vec<FileNode> = self
            .children
            .into_iter()
            .map(|(name, child)| child.finish(name))
            .collect();
        let size = self.size + children.iter().map(|c| c.size).sum::<u64>();
        FileNode {
            name,
            size,
            kind: self.kind,
            mode: self.mode,
            link_target: self.link_target,
            children,
        }
    }
}

/// Build the file tree of one layer, rooted at `/`
pub fn build_tree(files: &[FileRecord]) -> FileNode {
    let mut root = TreeBuilder::dir();
    for record in files {
        root.insert(record);
    }
    root.finish("/".to_string())
}
