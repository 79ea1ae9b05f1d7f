//! Job description builder.
//!
//! Turns the editor's chains plus an optional affinity request into the YAML
//! document the prediction tool reads:
//!
//! ```yaml
//! sequences:
//!   - protein:
//!       id: A
//!       sequence: MKT...
//!   - ligand:
//!       id: L
//!       smiles: C1=CC=C(C=C1)C(=O)O
//! properties:
//!   - affinity:
//!       binder: L
//! ```

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use foldyx_common::{ChainEntry, FoldyxError, MoleculeType, Result};

/// Designates the chain whose binding affinity is predicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityRequest {
    pub binder: String,
}

impl AffinityRequest {
    pub fn new(binder: impl Into<String>) -> Self {
        Self { binder: binder.into().trim().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolymerRecord {
    pub id: String,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LigandRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smiles: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccd: Option<String>,
}

/// One entry of `sequences`, keyed by molecule kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceRecord {
    Protein(PolymerRecord),
    Dna(PolymerRecord),
    Rna(PolymerRecord),
    Ligand(LigandRecord),
}

impl SequenceRecord {
    pub fn from_entry(entry: &ChainEntry) -> Self {
        let id = entry.chain_id.trim().to_string();
        let seq = entry.sequence.trim().to_string();
        match entry.molecule_type {
            MoleculeType::Protein => SequenceRecord::Protein(PolymerRecord { id, sequence: seq }),
            MoleculeType::Dna     => SequenceRecord::Dna(PolymerRecord { id, sequence: seq }),
            MoleculeType::Rna     => SequenceRecord::Rna(PolymerRecord { id, sequence: seq }),
            MoleculeType::LigandSmiles => {
                SequenceRecord::Ligand(LigandRecord { id, smiles: Some(seq), ccd: None })
            }
            MoleculeType::LigandCcd => {
                SequenceRecord::Ligand(LigandRecord { id, smiles: None, ccd: Some(seq) })
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SequenceRecord::Protein(p) | SequenceRecord::Dna(p) | SequenceRecord::Rna(p) => &p.id,
            SequenceRecord::Ligand(l) => &l.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SequenceRecord::Protein(_) => "protein",
            SequenceRecord::Dna(_)     => "dna",
            SequenceRecord::Rna(_)     => "rna",
            SequenceRecord::Ligand(_)  => "ligand",
        }
    }
}

// serde_yaml writes externally tagged enums as `!tag` nodes; the tool wants a
// plain single-key mapping, so serialize by hand.
impl Serialize for SequenceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            SequenceRecord::Protein(p) | SequenceRecord::Dna(p) | SequenceRecord::Rna(p) => {
                map.serialize_entry(self.kind(), p)?
            }
            SequenceRecord::Ligand(l) => map.serialize_entry(self.kind(), l)?,
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRecord {
    pub affinity: AffinityRequest,
}

/// The job document handed to the prediction tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescription {
    pub sequences: Vec<SequenceRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyRecord>,
}

impl JobDescription {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        debug!("Job description written to {:?}", path);
        Ok(())
    }

    pub fn affinity_binder(&self) -> Option<&str> {
        self.properties.first().map(|p| p.affinity.binder.as_str())
    }
}

/// Build the job document.
///
/// Entries with a blank id or sequence are skipped with a warning. An
/// affinity binder that does not name one of the kept chains is a
/// validation error and no document is produced.
pub fn build_job(entries: &[ChainEntry], affinity: Option<&AffinityRequest>) -> Result<JobDescription> {
    let mut sequences = Vec::with_capacity(entries.len());
    for entry in entries {
        if !entry.is_complete() {
            warn!(
                "Skipping incomplete chain entry (id: {:?}, type: {})",
                entry.chain_id, entry.molecule_type
            );
            continue;
        }
        sequences.push(SequenceRecord::from_entry(entry));
    }

    let mut properties = Vec::new();
    if let Some(request) = affinity {
        let binder = request.binder.trim();
        let ids: HashSet<&str> = sequences.iter().map(SequenceRecord::id).collect();
        if binder.is_empty() || !ids.contains(binder) {
            return Err(FoldyxError::Validation(format!(
                "affinity binder '{}' is not one of the configured chains",
                binder
            )));
        }
        properties.push(PropertyRecord { affinity: AffinityRequest::new(binder) });
    }

    debug!("Built job with {} sequences, affinity: {}", sequences.len(), !properties.is_empty());
    Ok(JobDescription { sequences, properties })
}
