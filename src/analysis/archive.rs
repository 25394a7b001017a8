//! Image archive reader
//!
//! Reads the `docker-archive` layout produced by `podman save` and
//! `docker save`: a tarball holding `manifest.json`, the image config
//! blob, and one tarball per layer (plain or gzip-compressed).

use crate::analysis::model::{FileKind, FileRecord, ImageMeta, LayerAnalysis};
use crate::error::{StrataError, StrataResult};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path};
use tar::{Archive, EntryType};
use tracing::debug;

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_MARKER: &str = ".wh..wh..opq";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestEntry {
    config: String,
    #[serde(default)]
    layers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    architecture: Option<String>,
    os: Option<String>,
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    rootfs: RootFs,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    created_by: String,
    #[serde(default)]
    empty_layer: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RootFs {
    #[serde(default)]
    diff_ids: Vec<String>,
}

/// Contents of an exported image
#[derive(Debug)]
pub struct ImageArchive {
    pub meta: ImageMeta,
    pub layers: Vec<LayerAnalysis>,
}

/// Read an exported image archive from disk
///
/// The archive is unpacked into `scratch`, which must be an empty
/// directory owned by the caller.
pub fn read_image_archive(archive: &Path, scratch: &Path) -> StrataResult<ImageArchive> {
    let file = File::open(archive)
        .map_err(|e| StrataError::io(format!("opening {}", archive.display()), e))?;
    Archive::new(BufReader::new(file))
        .unpack(scratch)
        .map_err(|e| StrataError::io(format!("unpacking {}", archive.display()), e))?;

    let manifest_path = scratch.join("manifest.json");
    let manifest = std::fs::read_to_string(&manifest_path)
        .map_err(|_| StrataError::ArchiveInvalid("manifest.json missing".to_string()))?;
    let mut entries: Vec<ManifestEntry> = serde_json::from_str(&manifest)?;
    if entries.is_empty() {
        return Err(StrataError::ArchiveInvalid(
            "manifest.json lists no images".to_string(),
        ));
    }
    let entry = entries.swap_remove(0);

    let config_path = archive_member(scratch, &entry.config)?;
    let config_raw = std::fs::read_to_string(&config_path)
        .map_err(|e| StrataError::io(format!("reading image config {}", entry.config), e))?;
    let config: ImageConfig = serde_json::from_str(&config_raw)?;

    let commands: Vec<String> = config
        .history
        .iter()
        .filter(|h| !h.empty_layer)
        .map(|h| clean_command(&h.created_by))
        .collect();

    let mut layers = Vec::with_capacity(entry.layers.len());
    for (index, member) in entry.layers.iter().enumerate() {
        let path = archive_member(scratch, member)?;
        let file = File::open(&path)
            .map_err(|e| StrataError::io(format!("opening layer {}", member), e))?;
        let (files, opaque_dirs) = read_layer(file)?;
        let digest = config
            .rootfs
            .diff_ids
            .get(index)
            .cloned()
            .unwrap_or_else(|| digest_from_member(member));
        let command = commands.get(index).cloned().unwrap_or_default();
        debug!("Layer {} {}: {} entries", index, digest, files.len());
        layers.push(LayerAnalysis::new(index, digest, command, files, opaque_dirs));
    }

    Ok(ImageArchive {
        meta: ImageMeta {
            id: digest_from_member(&entry.config),
            created: config.created,
            architecture: config.architecture,
            os: config.os,
        },
        layers,
    })
}

/// Read one layer tarball into its file records and opaque directories
pub fn read_layer<R: Read>(reader: R) -> StrataResult<(Vec<FileRecord>, Vec<String>)> {
    let mut buffered = BufReader::new(reader);
    let gzipped = {
        let head = buffered
            .fill_buf()
            .map_err(|e| StrataError::io("reading layer header", e))?;
        head.starts_with(&[0x1f, 0x8b])
    };

    if gzipped {
        collect_entries(Archive::new(GzDecoder::new(buffered)))
    } else {
        collect_entries(Archive::new(buffered))
    }
}

fn collect_entries<R: Read>(mut archive: Archive<R>) -> StrataResult<(Vec<FileRecord>, Vec<String>)> {
    let mut files = Vec::new();
    let mut opaque_dirs = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| StrataError::io("reading layer entries", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StrataError::io("reading layer entry", e))?;
        let raw = entry
            .path()
            .map_err(|e| StrataError::io("reading layer entry path", e))?;
        let path = normalize_path(&raw);
        if path.is_empty() {
            continue;
        }

        let (parent, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), path.clone()),
        };

        if name == OPAQUE_MARKER {
            opaque_dirs.push(parent);
            continue;
        }

        if let Some(target) = name.strip_prefix(WHITEOUT_PREFIX) {
            let removed = if parent.is_empty() {
                target.to_string()
            } else {
                format!("{}/{}", parent, target)
            };
            files.push(FileRecord {
                path: removed,
                size: 0,
                mode: 0,
                kind: FileKind::Removed,
                link_target: None,
            });
            continue;
        }

        let header = entry.header();
        let kind = match header.entry_type() {
            EntryType::Regular | EntryType::Continuous => FileKind::File,
            EntryType::Directory => FileKind::Dir,
            EntryType::Symlink => FileKind::Symlink,
            EntryType::Link => FileKind::Hardlink,
            _ => FileKind::Other,
        };
        let link_target = entry
            .link_name()
            .ok()
            .flatten()
            .map(|target| target.to_string_lossy().into_owned());

        files.push(FileRecord {
            path,
            size: if kind == FileKind::File { entry.size() } else { 0 },
            mode: header.mode().unwrap_or(0),
            kind,
            link_target,
        });
    }

    Ok((files, opaque_dirs))
}

/// Resolve a manifest member path inside the unpacked archive
fn archive_member(root: &Path, member: &str) -> StrataResult<std::path::PathBuf> {
    let relative = Path::new(member);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(StrataError::ArchiveInvalid(format!(
            "unsafe member path: {}",
            member
        )));
    }
    let path = root.join(relative);
    if !path.is_file() {
        return Err(StrataError::ArchiveInvalid(format!(
            "missing member: {}",
            member
        )));
    }
    Ok(path)
}

/// Strip leading `./` and `/` plus any trailing `/`
fn normalize_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive `sha256:<hex>` from a member such as `blobs/sha256/<hex>`,
/// `<hex>.json` or `<hex>/layer.tar`
fn digest_from_member(member: &str) -> String {
    let hex = member
        .split('/')
        .map(|part| part.trim_end_matches(".json").trim_end_matches(".tar"))
        .find(|part| part.len() == 64 && part.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(member);
    format!("sha256:{}", hex)
}

/// Turn a history `created_by` into a Dockerfile-like instruction
pub fn clean_command(created_by: &str) -> String {
    let trimmed = created_by.trim();
    if let Some(rest) = trimmed.strip_prefix("/bin/sh -c #(nop)") {
        return rest.trim().to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("/bin/sh -c") {
        return format!("RUN {}", rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("|") {
        // BuildKit prefixes RUN with the build-arg count: `|2 A=1 B=2 /bin/sh -c ...`
        if let Some(pos) = rest.find("/bin/sh -c") {
            return format!("RUN {}", rest[pos + "/bin/sh -c".len()..].trim());
        }
    }
    trimmed.trim_end_matches(" # buildkit").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn append_file(builder: &mut tar::Builder<impl std::io::Write>, path: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn append_dir(builder: &mut tar::Builder<impl std::io::Write>, path: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(EntryType::Directory);
        header.set_cksum();
        builder.append(&header, std::io::empty()).unwrap();
    }

    fn layer_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            append_file(&mut builder, path, data);
        }
        builder.into_inner().unwrap()
    }

    fn write_image(dir: &Path) -> std::path::PathBuf {
        let base = layer_tar(&[
            ("etc/os-release", &b"ID=test\n"[..]),
            ("tmp/big", &[0u8; 100][..]),
        ]);
        let top = {
            let mut builder = tar::Builder::new(Vec::new());
            append_dir(&mut builder, "app/");
            append_file(&mut builder, "app/run", b"#!/bin/sh\n");
            append_file(&mut builder, "tmp/.wh.big", b"");
            builder.into_inner().unwrap()
        };
        let config = serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "created": "2024-05-01T10:00:00Z",
            "history": [
                {"created_by": "/bin/sh -c #(nop) ADD file:abc in / "},
                {"created_by": "/bin/sh -c #(nop)  CMD [\"sh\"]", "empty_layer": true},
                {"created_by": "/bin/sh -c rm -f /tmp/big"}
            ],
            "rootfs": {"type": "layers", "diff_ids": ["sha256:base", "sha256:top"]}
        });
        let config_name = format!("{}.json", "a".repeat(64));
        let manifest = serde_json::json!([{
            "Config": config_name,
            "RepoTags": ["test:latest"],
            "Layers": ["base/layer.tar", "top/layer.tar"]
        }]);

        let path = dir.join("image.tar");
        let file = File::create(&path).unwrap();
        let mut builder = tar::Builder::new(file);
        append_file(&mut builder, "manifest.json", manifest.to_string().as_bytes());
        append_file(&mut builder, &config_name, config.to_string().as_bytes());
        append_file(&mut builder, "base/layer.tar", &base);
        append_file(&mut builder, "top/layer.tar", &top);
        builder.finish().unwrap();
        path
    }

    #[test]
    fn reads_layers_in_manifest_order() {
        let temp = TempDir::new().unwrap();
        let archive = write_image(temp.path());
        let scratch = temp.path().join("unpacked");
        std::fs::create_dir(&scratch).unwrap();

        let image = read_image_archive(&archive, &scratch).unwrap();

        assert_eq!(image.meta.id, format!("sha256:{}", "a".repeat(64)));
        assert_eq!(image.meta.architecture.as_deref(), Some("amd64"));
        assert_eq!(image.layers.len(), 2);

        let base = &image.layers[0];
        assert_eq!(base.digest, "sha256:base");
        assert_eq!(base.command, "ADD file:abc in /");
        assert_eq!(base.size, 108);

        let top = &image.layers[1];
        assert_eq!(top.command, "RUN rm -f /tmp/big");
        assert_eq!(top.file_count, 3);
        assert!(top
            .files
            .iter()
            .any(|f| f.path == "tmp/big" && f.kind == FileKind::Removed));
        assert!(top
            .files
            .iter()
            .any(|f| f.path == "app" && f.kind == FileKind::Dir));
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("image.tar");
        let mut builder = tar::Builder::new(File::create(&path).unwrap());
        append_file(&mut builder, "other.json", b"{}");
        builder.finish().unwrap();
        let scratch = temp.path().join("unpacked");
        std::fs::create_dir(&scratch).unwrap();

        let err = read_image_archive(&path, &scratch).unwrap_err();
        assert!(matches!(err, StrataError::ArchiveInvalid(_)));
    }

    #[test]
    fn gzip_layers_and_opaque_dirs() {
        let raw = {
            let mut builder = tar::Builder::new(Vec::new());
            append_file(&mut builder, "./var/lib/.wh..wh..opq", b"");
            append_file(&mut builder, "./var/lib/state", b"12345");
            builder.into_inner().unwrap()
        };
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &raw).unwrap();
        let compressed = encoder.finish().unwrap();

        let (files, opaque) = read_layer(compressed.as_slice()).unwrap();

        assert_eq!(opaque, vec!["var/lib".to_string()]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "var/lib/state");
        assert_eq!(files[0].size, 5);
    }

    #[test]
    fn digest_from_member_variants() {
        let hex = "b".repeat(64);
        assert_eq!(
            digest_from_member(&format!("blobs/sha256/{}", hex)),
            format!("sha256:{}", hex)
        );
        assert_eq!(
            digest_from_member(&format!("{}/layer.tar", hex)),
            format!("sha256:{}", hex)
        );
        assert_eq!(digest_from_member("odd"), "sha256:odd");
    }

    #[test]
    fn clean_command_forms() {
        assert_eq!(clean_command("/bin/sh -c #(nop) WORKDIR /app"), "WORKDIR /app");
        assert_eq!(clean_command("/bin/sh -c apk add curl"), "RUN apk add curl");
        assert_eq!(
            clean_command("|1 VERSION=2 /bin/sh -c make install"),
            "RUN make install"
        );
        assert_eq!(
            clean_command("COPY . . # buildkit"),
            "COPY . ."
        );
    }
}
