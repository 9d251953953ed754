//! Scene coordination: directory layout, metadata files, and
//! persistence of completed sweeps.
//!
//! The coordinator is a thin consumer of [`SweepOutcome`]s: it maps
//! (projector, position, axis) to locations in the fixed scene
//! hierarchy, writes the raster and metadata, and hands the paths to
//! the external post-processing pipeline. An aborted sweep never
//! reaches [`SceneCoordinator::record`], so the scene directory is
//! left untouched for that take.

pub mod pipeline;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MlightError;
use crate::message::SweepAxis;
use crate::sweep::SweepOutcome;

pub use pipeline::PipelineRunner;

// ── SceneDirs ────────────────────────────────────────────────────

/// The fixed on-disk hierarchy for one scene.
///
/// ```text
/// <root>/<scene>/
///   ambient/
///   calibration/
///   prethresh/proj<p>/pos<n>/
///   thresh/proj<p>/pos<n>/
///   decoded/proj<p>/pos<n>/result-<axis>.pfm
///   metadata/proj<p>/pos<n>/metadata-<axis>.yml
///   computed/
/// ```
#[derive(Debug, Clone)]
pub struct SceneDirs {
    scene_root: PathBuf,
}

impl SceneDirs {
    pub fn new(root: impl AsRef<Path>, scene: &str) -> Self {
        Self {
            scene_root: root.as_ref().join(scene),
        }
    }

    pub fn root(&self) -> &Path {
        &self.scene_root
    }

    pub fn ambient(&self) -> PathBuf {
        self.scene_root.join("ambient")
    }

    pub fn calibration(&self) -> PathBuf {
        self.scene_root.join("calibration")
    }

    pub fn computed(&self) -> PathBuf {
        self.scene_root.join("computed")
    }

    fn take_dir(&self, tree: &str, projector: u32, position: u32) -> PathBuf {
        self.scene_root
            .join(tree)
            .join(format!("proj{projector}"))
            .join(format!("pos{position}"))
    }

    pub fn prethresh(&self, projector: u32, position: u32) -> PathBuf {
        self.take_dir("prethresh", projector, position)
    }

    pub fn thresh(&self, projector: u32, position: u32) -> PathBuf {
        self.take_dir("thresh", projector, position)
    }

    pub fn decoded(&self, projector: u32, position: u32) -> PathBuf {
        self.take_dir("decoded", projector, position)
    }

    pub fn metadata(&self, projector: u32, position: u32) -> PathBuf {
        self.take_dir("metadata", projector, position)
    }

    /// `decoded/.../result-<axis>.pfm`
    pub fn raster_file(&self, projector: u32, position: u32, axis: SweepAxis) -> PathBuf {
        self.decoded(projector, position)
            .join(format!("result-{}.pfm", axis.letter()))
    }

    /// `metadata/.../metadata-<axis>.yml`
    pub fn metadata_file(&self, projector: u32, position: u32, axis: SweepAxis) -> PathBuf {
        self.metadata(projector, position)
            .join(format!("metadata-{}.yml", axis.letter()))
    }
}

// ── SweepMetadata ────────────────────────────────────────────────

/// Side-channel data recorded alongside each decoded raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepMetadata {
    /// Capture angle of the device mount, degrees.
    pub angle: f64,
    /// Exposure durations used for the sweep, seconds.
    pub exposure_durations: Vec<f64>,
    /// Parallel ISO list.
    pub exposure_isos: Vec<f32>,
}

impl SweepMetadata {
    pub fn to_yaml(&self) -> Result<String, MlightError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, MlightError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

// ── SceneCoordinator ─────────────────────────────────────────────

/// Persists sweep outcomes and triggers downstream processing.
#[derive(Debug)]
pub struct SceneCoordinator {
    dirs: SceneDirs,
    pipeline: Option<PipelineRunner>,
}

impl SceneCoordinator {
    pub fn new(dirs: SceneDirs, pipeline: Option<PipelineRunner>) -> Self {
        Self { dirs, pipeline }
    }

    pub fn dirs(&self) -> &SceneDirs {
        &self.dirs
    }

    /// Write the raster (and metadata, if present) for a completed
    /// sweep, then invoke the external refine step.
    ///
    /// The raster is written to a temporary name and renamed into
    /// place, so a crash mid-write never leaves a partial `.pfm`
    /// visible. Returns the final raster path.
    pub async fn record(&self, outcome: &SweepOutcome) -> Result<PathBuf, MlightError> {
        let raster_path = self
            .dirs
            .raster_file(outcome.projector, outcome.position, outcome.axis);
        if let Some(parent) = raster_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = raster_path.with_extension("pfm.partial");
        tokio::fs::write(&partial, &outcome.raster_pfm).await?;
        tokio::fs::rename(&partial, &raster_path).await?;
        info!("recorded raster {}", raster_path.display());

        let mut angle = None;
        if let Some(yaml) = &outcome.metadata_yaml {
            let metadata_path =
                self.dirs
                    .metadata_file(outcome.projector, outcome.position, outcome.axis);
            if let Some(parent) = metadata_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&metadata_path, yaml).await?;

            match SweepMetadata::from_yaml(yaml) {
                Ok(meta) => angle = Some(meta.angle),
                Err(e) => warn!("metadata unparsable, skipping refine: {e}"),
            }
        }

        if let (Some(pipeline), Some(angle)) = (&self.pipeline, angle) {
            let decoded_dir = self.dirs.decoded(outcome.projector, outcome.position);
            if let Err(e) = pipeline
                .refine(&decoded_dir, outcome.axis, &raster_path, angle, outcome.position)
                .await
            {
                // Post-processing failure does not invalidate the capture.
                warn!("refine step failed: {e}");
            }
        }

        Ok(raster_path)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(axis: SweepAxis, metadata: Option<String>) -> SweepOutcome {
        SweepOutcome {
            projector: 2,
            position: 1,
            axis,
            raster_pfm: b"Pf\n1 1\n-1\n\x00\x00\x80\x3f".to_vec(),
            metadata_yaml: metadata,
        }
    }

    #[test]
    fn path_layout() {
        let dirs = SceneDirs::new("/scenes", "desk");
        assert_eq!(
            dirs.raster_file(3, 0, SweepAxis::Vertical),
            PathBuf::from("/scenes/desk/decoded/proj3/pos0/result-u.pfm")
        );
        assert_eq!(
            dirs.metadata_file(3, 0, SweepAxis::Horizontal),
            PathBuf::from("/scenes/desk/metadata/proj3/pos0/metadata-v.yml")
        );
        assert_eq!(
            dirs.thresh(1, 2),
            PathBuf::from("/scenes/desk/thresh/proj1/pos2")
        );
    }

    #[test]
    fn metadata_yaml_roundtrip() {
        let meta = SweepMetadata {
            angle: 35.5,
            exposure_durations: vec![0.01, 0.05],
            exposure_isos: vec![100.0, 400.0],
        };
        let yaml = meta.to_yaml().unwrap();
        assert_eq!(SweepMetadata::from_yaml(&yaml).unwrap(), meta);
    }

    #[tokio::test]
    async fn record_writes_raster_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = SceneDirs::new(tmp.path(), "scene1");
        let coordinator = SceneCoordinator::new(dirs.clone(), None);

        let meta = SweepMetadata {
            angle: 10.0,
            exposure_durations: vec![0.01],
            exposure_isos: vec![100.0],
        };
        let out = outcome(SweepAxis::Vertical, Some(meta.to_yaml().unwrap()));
        let path = coordinator.record(&out).await.unwrap();

        assert_eq!(path, dirs.raster_file(2, 1, SweepAxis::Vertical));
        assert_eq!(std::fs::read(&path).unwrap(), out.raster_pfm);

        let written =
            std::fs::read_to_string(dirs.metadata_file(2, 1, SweepAxis::Vertical)).unwrap();
        assert_eq!(SweepMetadata::from_yaml(&written).unwrap(), meta);

        // No stray partial file.
        assert!(!path.with_extension("pfm.partial").exists());
    }

    #[tokio::test]
    async fn record_without_metadata_skips_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = SceneDirs::new(tmp.path(), "scene1");
        let coordinator = SceneCoordinator::new(dirs.clone(), None);

        let out = outcome(SweepAxis::Horizontal, None);
        coordinator.record(&out).await.unwrap();
        assert!(dirs.raster_file(2, 1, SweepAxis::Horizontal).exists());
        assert!(!dirs.metadata_file(2, 1, SweepAxis::Horizontal).exists());
    }
}
