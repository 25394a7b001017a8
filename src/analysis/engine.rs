//! Container engine backed analyzer
//!
//! Exports the image through the engine CLI (Podman by default, Docker
//! works too) and reads the resulting archive on a blocking thread.

use crate::analysis::archive::read_image_archive;
use crate::analysis::model::ImageAnalysis;
use crate::analysis::Analyzer;
use crate::config::schema::AnalyzerConfig;
use crate::error::{StrataError, StrataResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Analyzer that shells out to a container engine CLI
pub struct CliAnalyzer {
    engine: String,
    pull: bool,
    top_inefficiencies: usize,
}

impl CliAnalyzer {
    /// Create an analyzer from configuration
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            pull: config.pull,
            top_inefficiencies: config.top_inefficiencies,
        }
    }

    /// Engine binary in use
    pub fn engine(&self) -> &str {
        &self.engine
    }

    fn is_docker(&self) -> bool {
        Path::new(&self.engine)
            .file_name()
            .is_some_and(|name| name == "docker")
    }

    /// Check if the engine CLI is installed
    async fn engine_installed(&self) -> bool {
        Command::new(&self.engine)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> StrataResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.engine, args);

        Command::new(&self.engine)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StrataError::command_failed(format!("{} {:?}", self.engine, args), e))
    }

    /// Check if image exists locally
    async fn image_exists(&self, image: &str) -> StrataResult<bool> {
        let output = self.exec(&["image", "inspect", "--format", "{{.Id}}", "--", image]).await?;
        Ok(output.status.success())
    }

    /// Pull an image
    async fn pull(&self, image: &str) -> StrataResult<()> {
        info!("Pulling image: {}", image);

        let output = self.exec(&["pull", "--", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(StrataError::ImagePull {
                image: image.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    /// Make sure the image is available locally, pulling when allowed
    async fn ensure_local(&self, image: &str) -> StrataResult<()> {
        if self.image_exists(image).await? {
            return Ok(());
        }
        if !self.pull {
            return Err(StrataError::ImageNotFound(image.to_string()));
        }
        self.pull(image).await
    }

    /// Export the image as a docker-archive tarball
    async fn export(&self, image: &str, dest: &Path) -> StrataResult<()> {
        let dest = dest.to_string_lossy().into_owned();
        let args: Vec<&str> = if self.is_docker() {
            vec!["save", "-o", dest.as_str(), "--", image]
        } else {
            vec!["save", "--format", "docker-archive", "-o", dest.as_str(), "--", image]
        };

        let output = self.exec(&args).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(StrataError::ImageExport {
                image: image.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Analyzer for CliAnalyzer {
    async fn analyze(&self, name: &str) -> StrataResult<ImageAnalysis> {
        if name.starts_with('-') {
            return Err(StrataError::ImageNameInvalid {
                name: name.to_string(),
                reason: "must not start with '-'",
            });
        }
        if !self.engine_installed().await {
            return Err(StrataError::EngineNotFound(self.engine.clone()));
        }

        self.ensure_local(name).await?;

        let workdir = tempfile::Builder::new()
            .prefix("strata-")
            .tempdir()
            .map_err(|e| StrataError::io("creating export directory", e))?;
        let archive = workdir.path().join("image.tar");
        self.export(name, &archive).await?;
        debug!("Exported {} to {}", name, archive.display());

        let image = name.to_string();
        let top = self.top_inefficiencies;
        tokio::task::spawn_blocking(move || -> StrataResult<ImageAnalysis> {
            let scratch = workdir.path().join("unpacked");
            std::fs::create_dir(&scratch)
                .map_err(|e| StrataError::io("creating unpack directory", e))?;
            let contents = read_image_archive(&archive, &scratch)?;
            Ok(ImageAnalysis::assemble(
                image,
                contents.meta,
                contents.layers,
                top,
            ))
        })
        .await
        .map_err(|e| StrataError::Internal(format!("analysis task panicked: {}", e)))?
    }
}
