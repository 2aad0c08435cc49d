//! Office documents: convert to PDF with an external program, then render.

use super::rasterize::{RasterInput, RasterStrategy};
use crate::error::RasterError;
use crate::output::PageImage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs `<program> --headless --convert-to pdf` inside a private temp
/// directory and hands the produced PDF to the paged strategy.
///
/// The child is killed if the timeout fires or the run is cancelled; the
/// directory is removed on every exit path.
pub struct OfficeStrategy {
    program: String,
    timeout: Duration,
    paged: Arc<dyn RasterStrategy>,
    scratch_dir: Option<PathBuf>,
}

impl OfficeStrategy {
    pub fn new(program: impl Into<String>, timeout_secs: u64, paged: Arc<dyn RasterStrategy>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(timeout_secs),
            paged,
            scratch_dir: None,
        }
    }

    /// Create per-run workspaces under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    async fn convert_to_pdf(&self, source: &Path, workspace: &Path) -> Result<PathBuf, RasterError> {
        // A per-run profile keeps concurrent converters from fighting over
        // the user's LibreOffice profile lock.
        let profile = format!("-env:UserInstallation=file://{}/profile", workspace.display());

        let child = Command::new(&self.program)
            .arg(profile)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(workspace)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RasterError::ConverterUnavailable {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("{} timed out after {:?}", self.program, self.timeout);
                return Err(RasterError::ConverterTimeout {
                    program: self.program.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(RasterError::ConverterFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(
            "{} output: {}",
            self.program,
            String::from_utf8_lossy(&output.stdout).trim()
        );

        find_pdf(workspace)
    }
}

fn find_pdf(dir: &Path) -> Result<PathBuf, RasterError> {
    let found = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|p| {
            p.extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        });
    found.ok_or_else(|| RasterError::NoOutput {
        dir: dir.to_path_buf(),
    })
}

#[async_trait]
impl RasterStrategy for OfficeStrategy {
    fn name(&self) -> &'static str {
        "office"
    }

    async fn rasterize(&self, input: RasterInput<'_>) -> Result<Vec<PageImage>, RasterError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("doc2md-office-");
        let workspace = match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        info!("Converting {} to PDF first...", input.extension);
        let pdf = self.convert_to_pdf(input.path, workspace.path()).await?;

        let pages = self
            .paged
            .rasterize(RasterInput {
                path: &pdf,
                extension: ".pdf",
                dpi: input.dpi,
            })
            .await?;
        info!("Converted {} → PDF → {} images", input.extension, pages.len());
        Ok(pages)
    }
}
