//! Adapter for the external post-processing pipeline.
//!
//! Disparity matching, rectification, and merging live in a separate
//! executable that operates on scene-directory paths. We only spawn it
//! with a subcommand and positional arguments and report its exit
//! status; nothing about its internals leaks into this crate.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::MlightError;
use crate::message::SweepAxis;

/// Handle to the pipeline executable.
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    executable: PathBuf,
}

impl PipelineRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Cross-check and refine a freshly decoded raster.
    ///
    /// Invoked once per recorded sweep as
    /// `<exe> refine <decoded-dir> <axis-index> <pfm> <angle> <position>`.
    pub async fn refine(
        &self,
        decoded_dir: &Path,
        axis: SweepAxis,
        raster: &Path,
        angle: f64,
        position: u32,
    ) -> Result<(), MlightError> {
        let axis_index = match axis {
            SweepAxis::Vertical => 0u32,
            SweepAxis::Horizontal => 1u32,
        };
        self.run(
            "refine",
            &[
                decoded_dir.as_os_str().to_os_string(),
                axis_index.to_string().into(),
                raster.as_os_str().to_os_string(),
                angle.to_string().into(),
                position.to_string().into(),
            ],
        )
        .await
    }

    /// Compute disparities between two recorded stage positions.
    ///
    /// `<exe> disparity <scene-root> <left-pos> <right-pos>`
    pub async fn disparity(
        &self,
        scene_root: &Path,
        left: u32,
        right: u32,
    ) -> Result<(), MlightError> {
        self.run(
            "disparity",
            &[
                scene_root.as_os_str().to_os_string(),
                left.to_string().into(),
                right.to_string().into(),
            ],
        )
        .await
    }

    async fn run(
        &self,
        subcommand: &str,
        args: &[std::ffi::OsString],
    ) -> Result<(), MlightError> {
        debug!("pipeline: {} {subcommand}", self.executable.display());
        let status = Command::new(&self.executable)
            .arg(subcommand)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(MlightError::Other(format!(
                "pipeline {subcommand} exited with {status}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_an_error() {
        let runner = PipelineRunner::new("/nonexistent/mlight-pipeline");
        let err = runner
            .refine(Path::new("/tmp"), SweepAxis::Vertical, Path::new("/tmp/r.pfm"), 0.0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, MlightError::Connection(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let runner = PipelineRunner::new("/bin/false");
        let err = runner
            .disparity(Path::new("/tmp"), 0, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, MlightError::Other(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_succeeds() {
        let runner = PipelineRunner::new("/bin/true");
        runner.disparity(Path::new("/tmp"), 0, 1).await.unwrap();
    }
}
