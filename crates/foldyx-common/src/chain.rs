//! Chain entries as entered in the sequence editor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FoldyxError;

/// Kind of molecule a chain holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoleculeType {
    Protein,
    Dna,
    Rna,
    /// Ligand given as a SMILES string
    LigandSmiles,
    /// Ligand given as a PDB Chemical Component Dictionary code
    LigandCcd,
}

impl MoleculeType {
    pub const ALL: [MoleculeType; 5] = [
        MoleculeType::Protein,
        MoleculeType::Dna,
        MoleculeType::Rna,
        MoleculeType::LigandSmiles,
        MoleculeType::LigandCcd,
    ];

    /// Form / wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            MoleculeType::Protein      => "protein",
            MoleculeType::Dna          => "dna",
            MoleculeType::Rna          => "rna",
            MoleculeType::LigandSmiles => "ligand-smiles",
            MoleculeType::LigandCcd    => "ligand-ccd",
        }
    }

    /// Human-readable label for the UI.
    pub fn label(&self) -> &'static str {
        match self {
            MoleculeType::Protein      => "Protein",
            MoleculeType::Dna          => "DNA",
            MoleculeType::Rna          => "RNA",
            MoleculeType::LigandSmiles => "Ligand (SMILES)",
            MoleculeType::LigandCcd    => "Ligand (CCD code)",
        }
    }

    pub fn is_ligand(&self) -> bool {
        matches!(self, MoleculeType::LigandSmiles | MoleculeType::LigandCcd)
    }

    pub fn is_polymer(&self) -> bool {
        !self.is_ligand()
    }
}

impl fmt::Display for MoleculeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoleculeType {
    type Err = FoldyxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "protein"                              => Ok(MoleculeType::Protein),
            "dna"                                  => Ok(MoleculeType::Dna),
            "rna"                                  => Ok(MoleculeType::Rna),
            "ligand-smiles" | "ligand_smiles" | "smiles" => Ok(MoleculeType::LigandSmiles),
            "ligand-ccd" | "ligand_ccd" | "ccd"    => Ok(MoleculeType::LigandCcd),
            other => Err(FoldyxError::Validation(format!(
                "unknown molecule type '{}'", other
            ))),
        }
    }
}

/// One chain in the editor collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub chain_id: String,
    pub molecule_type: MoleculeType,
    /// Residue sequence for polymers, SMILES or CCD code for ligands
    pub sequence: String,
}

impl ChainEntry {
    pub fn new(chain_id: impl Into<String>, molecule_type: MoleculeType, sequence: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            molecule_type,
            sequence: sequence.into(),
        }
    }

    /// Entry has both an id and a sequence after trimming.
    pub fn is_complete(&self) -> bool {
        !self.chain_id.trim().is_empty() && !self.sequence.trim().is_empty()
    }
}
