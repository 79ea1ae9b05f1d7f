//! Result collection from the tool's fixed output layout.
//!
//! ```text
//! <output_dir>/<results_prefix>/predictions/<job_name>/
//!     <job_name>_model_0.<cif|pdb>
//!     confidence_<job_name>_model_0.json
//!     affinity_<job_name>.json
//! ```
//!
//! Only the rank-0 model is read. Missing or unreadable files are reported as
//! notes and never fail collection.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use foldyx_common::{FoldyxError, Result, StructureFormat};

use crate::summary::{AffinitySummary, ConfidenceSummary};
use crate::workspace::RunDirectory;

/// Resolves where the tool put each artifact of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub output_dir: PathBuf,
    pub results_prefix: String,
    pub job_name: String,
    pub format: StructureFormat,
}

impl ArtifactLayout {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        results_prefix: impl Into<String>,
        job_name: impl Into<String>,
        format: StructureFormat,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            results_prefix: results_prefix.into(),
            job_name: job_name.into(),
            format,
        }
    }

    pub fn for_run(dir: &RunDirectory, format: StructureFormat) -> Self {
        Self::new(dir.output_dir.clone(), dir.results_prefix(), dir.job_name.clone(), format)
    }

    pub fn prediction_dir(&self) -> PathBuf {
        self.output_dir
            .join(&self.results_prefix)
            .join("predictions")
            .join(&self.job_name)
    }

    pub fn structure_path(&self) -> PathBuf {
        self.prediction_dir()
            .join(format!("{}_model_0.{}", self.job_name, self.format.extension()))
    }

    pub fn confidence_path(&self) -> PathBuf {
        self.prediction_dir()
            .join(format!("confidence_{}_model_0.json", self.job_name))
    }

    pub fn affinity_path(&self) -> PathBuf {
        self.prediction_dir()
            .join(format!("affinity_{}.json", self.job_name))
    }
}

/// Best-ranked structure file and its base64 payload for the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureArtifact {
    pub path: PathBuf,
    pub format: StructureFormat,
    /// Empty once the payload has been dropped for storage
    #[serde(skip_serializing_if = "String::is_empty")]
    pub base64: String,
}

impl StructureArtifact {
    /// Encode the file again from disk.
    pub async fn read_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(fs::read(&self.path).await?))
    }
}

/// Everything the result view needs after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedResults {
    pub structure: Option<StructureArtifact>,
    pub confidence: ConfidenceSummary,
    pub affinity: AffinitySummary,
    /// Side files that exist on disk, for downloads
    pub confidence_path: Option<PathBuf>,
    pub affinity_path: Option<PathBuf>,
    pub notes: Vec<String>,
}

impl CollectedResults {
    /// Drop the inline structure payload before long-lived storage.
    pub fn without_payload(mut self) -> Self {
        if let Some(structure) = self.structure.as_mut() {
            structure.base64 = String::new();
        }
        self
    }
}

pub struct ResultCollector;

impl ResultCollector {
    pub async fn collect(layout: &ArtifactLayout) -> Result<CollectedResults> {
        let mut notes = Vec::new();

        let structure_path = layout.structure_path();
        let structure = match fs::read(&structure_path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {:?}", bytes.len(), structure_path);
                Some(StructureArtifact {
                    path: structure_path,
                    format: layout.format,
                    base64: STANDARD.encode(bytes),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let missing = FoldyxError::MissingArtifact(structure_path);
                warn!("{}", missing);
                notes.push(format!("Predicted structure file not found. {}", missing));
                None
            }
            Err(e) => return Err(FoldyxError::Io(e)),
        };

        let (confidence_data, confidence_path) =
            read_side_file(&layout.confidence_path(), "confidence", &mut notes).await?;
        let (affinity_data, affinity_path) =
            read_side_file(&layout.affinity_path(), "affinity", &mut notes).await?;

        info!(
            "Collected results from {:?} (structure: {}, confidence: {}, affinity: {})",
            layout.prediction_dir(),
            structure.is_some(),
            confidence_path.is_some(),
            affinity_path.is_some()
        );

        Ok(CollectedResults {
            structure,
            confidence: ConfidenceSummary::from_json(&confidence_data),
            affinity: AffinitySummary::from_json(&affinity_data),
            confidence_path,
            affinity_path,
            notes,
        })
    }
}

/// Absent file → `Null`. Unparseable file → `Null` plus a note; the path is
/// still returned so the raw file can be downloaded.
async fn read_side_file(
    path: &Path,
    label: &str,
    notes: &mut Vec<String>,
) -> Result<(Value, Option<PathBuf>)> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No {} file at {:?}", label, path);
            return Ok((Value::Null, None));
        }
        Err(e) => return Err(FoldyxError::Io(e)),
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => Ok((value, Some(path.to_path_buf()))),
        Err(e) => {
            warn!("Malformed {} file {:?}: {}", label, path, e);
            notes.push(format!("The {} file could not be parsed: {}", label, e));
            Ok((Value::Null, Some(path.to_path_buf())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(root: &Path) -> ArtifactLayout {
        ArtifactLayout::new(
            root,
            "boltz_results_input",
            "prediction_config",
            StructureFormat::Mmcif,
        )
    }

    #[test]
    fn test_paths() {
        let l = layout(Path::new("/runs/r1/output"));
        let dir = PathBuf::from("/runs/r1/output/boltz_results_input/predictions/prediction_config");
        assert_eq!(l.prediction_dir(), dir);
        assert_eq!(l.structure_path(), dir.join("prediction_config_model_0.cif"));
        assert_eq!(l.confidence_path(), dir.join("confidence_prediction_config_model_0.json"));
        assert_eq!(l.affinity_path(), dir.join("affinity_prediction_config.json"));

        let pdb = ArtifactLayout { format: StructureFormat::Pdb, ..l };
        assert!(pdb.structure_path().ends_with("prediction_config_model_0.pdb"));
    }

    #[tokio::test]
    async fn test_collect_full_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let l = layout(tmp.path());
        std::fs::create_dir_all(l.prediction_dir()).unwrap();
        std::fs::write(l.structure_path(), b"data_model\n").unwrap();
        std::fs::write(
            l.confidence_path(),
            r#"{"confidence_score": 0.91, "iptm": 0.8, "complex_plddt": 0.95}"#,
        )
        .unwrap();
        std::fs::write(
            l.affinity_path(),
            r#"{"affinity_pred_value": -1.5, "affinity_probability_binary": 0.5}"#,
        )
        .unwrap();

        let r = ResultCollector::collect(&l).await.unwrap();
        let s = r.structure.unwrap();
        assert_eq!(s.base64, STANDARD.encode(b"data_model\n"));
        assert_eq!(s.format, StructureFormat::Mmcif);
        assert_eq!(r.confidence.confidence_score, "0.910");
        assert_eq!(r.affinity.predicted_value, "-1.50");
        assert_eq!(r.affinity.binder_probability, "50.00%");
        assert!(r.confidence_path.is_some());
        assert!(r.notes.is_empty());
    }

    #[tokio::test]
    async fn test_payload_is_dropped_and_read_back_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let l = layout(tmp.path());
        std::fs::create_dir_all(l.prediction_dir()).unwrap();
        std::fs::write(l.structure_path(), b"ATOM\n").unwrap();

        let stored = ResultCollector::collect(&l).await.unwrap().without_payload();
        let s = stored.structure.as_ref().unwrap();
        assert!(s.base64.is_empty());
        let json = serde_json::to_value(&stored).unwrap();
        assert!(json["structure"].get("base64").is_none());
        assert_eq!(s.read_base64().await.unwrap(), STANDARD.encode(b"ATOM\n"));
    }

    #[tokio::test]
    async fn test_missing_files_are_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let r = ResultCollector::collect(&layout(tmp.path())).await.unwrap();
        assert!(r.structure.is_none());
        assert_eq!(r.notes.len(), 1);
        assert!(r.notes[0].contains("not found"));
        assert_eq!(r.confidence.iptm, "N/A");
        assert_eq!(r.affinity.binder_probability, "N/A");
        assert!(r.confidence_path.is_none());
        assert!(r.affinity_path.is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_becomes_note() {
        let tmp = tempfile::tempdir().unwrap();
        let l = layout(tmp.path());
        std::fs::create_dir_all(l.prediction_dir()).unwrap();
        std::fs::write(l.structure_path(), b"x").unwrap();
        std::fs::write(l.confidence_path(), "{not json").unwrap();

        let r = ResultCollector::collect(&l).await.unwrap();
        assert!(r.structure.is_some());
        assert!(!r.confidence.available);
        assert_eq!(r.confidence.complex_plddt, "N/A");
        assert_eq!(r.confidence_path, Some(l.confidence_path()));
        assert!(r.notes.iter().any(|n| n.contains("confidence file could not be parsed")));
    }
}
