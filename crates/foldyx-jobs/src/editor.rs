//! Sequence editor: the ordered chain collection of one editing session.
//!
//! `SequenceSet` is an explicit state value. Every operation borrows the
//! current set and returns a new one, so a failed edit leaves the caller's
//! set untouched and no session state lives in globals.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use foldyx_common::{ChainEntry, FoldyxError, MoleculeType, Result};

/// Ordered collection of chains with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSet {
    entries: Vec<ChainEntry>,
}

impl SequenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chain. Fails if the id is blank, contains anything besides
    /// letters, digits, `-` or `_`, or is taken, or if the sequence is blank.
    pub fn add(&self, chain_id: &str, molecule_type: MoleculeType, sequence: &str) -> Result<SequenceSet> {
        let chain_id = chain_id.trim();
        if chain_id.is_empty() {
            return Err(FoldyxError::Validation("chain id must not be empty".into()));
        }
        if !is_valid_chain_id(chain_id) {
            return Err(FoldyxError::Validation(format!(
                "chain id '{}' may only contain letters, digits, '-' or '_'",
                chain_id
            )));
        }

        let sequence = normalise_sequence(molecule_type, sequence);
        if sequence.is_empty() {
            return Err(FoldyxError::Validation(format!(
                "{} for chain {} must not be empty",
                sequence_noun(molecule_type),
                chain_id
            )));
        }

        if self.contains(chain_id) {
            return Err(FoldyxError::Validation(format!(
                "chain id '{}' already exists",
                chain_id
            )));
        }

        let mut entries = self.entries.clone();
        entries.push(ChainEntry::new(chain_id, molecule_type, sequence));
        debug!("Added chain {} ({}), {} chains total", chain_id, molecule_type, entries.len());
        Ok(SequenceSet { entries })
    }

    /// Remove every chain whose id is in `ids`.
    /// Fails with `NotFound` when none of the ids are present.
    pub fn delete<I, S>(&self, ids: I) -> Result<SequenceSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: HashSet<String> = ids
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let entries: Vec<ChainEntry> = self
            .entries
            .iter()
            .filter(|e| !wanted.contains(&e.chain_id))
            .cloned()
            .collect();

        if entries.len() == self.entries.len() {
            let mut requested: Vec<&str> = wanted.iter().map(String::as_str).collect();
            requested.sort_unstable();
            return Err(FoldyxError::NotFound(format!(
                "no chains matched [{}]",
                requested.join(", ")
            )));
        }

        debug!("Deleted {} chains", self.entries.len() - entries.len());
        Ok(SequenceSet { entries })
    }

    pub fn clear(&self) -> SequenceSet {
        SequenceSet::default()
    }

    /// Example collection for a preset.
    pub fn preset(preset: Preset) -> SequenceSet {
        let mut set = SequenceSet::new();
        for (id, kind, seq) in preset.chains() {
            // preset data is static and valid
            if let Ok(next) = set.add(id, *kind, seq) {
                set = next;
            }
        }
        set
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.chain_id.as_str()).collect()
    }

    pub fn get(&self, chain_id: &str) -> Option<&ChainEntry> {
        self.entries.iter().find(|e| e.chain_id == chain_id)
    }

    pub fn contains(&self, chain_id: &str) -> bool {
        self.get(chain_id).is_some()
    }

    /// Chains that can be designated as the affinity binder.
    pub fn ligand_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.molecule_type.is_ligand())
            .map(|e| e.chain_id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Polymer sequences are often pasted over several lines; drop all whitespace.
/// Ligand identifiers are only trimmed (SMILES is case- and layout-sensitive).
fn normalise_sequence(molecule_type: MoleculeType, raw: &str) -> String {
    if molecule_type.is_polymer() {
        raw.chars().filter(|c| !c.is_whitespace()).collect()
    } else {
        raw.trim().to_string()
    }
}

fn sequence_noun(molecule_type: MoleculeType) -> &'static str {
    match molecule_type {
        MoleculeType::LigandSmiles => "SMILES string",
        MoleculeType::LigandCcd    => "CCD code",
        _                          => "sequence",
    }
}

// ── Presets ───────────────────────────────────────────────────────────────────

const UBIQUITIN: &str = "MQIFVKTLTGKTITLEVEPSDTIENVKAKIQDKEGIPPDQQRLIFAGKQLEDGRTLSDYNIQKESTLHLVLRLRGG";

/// Ready-made example inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    ProteinLigandSmiles,
    ProteinLigandCcd,
    ProteinDna,
}

impl Preset {
    pub const ALL: [Preset; 3] = [
        Preset::ProteinLigandSmiles,
        Preset::ProteinLigandCcd,
        Preset::ProteinDna,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::ProteinLigandSmiles => "protein-ligand-smiles",
            Preset::ProteinLigandCcd    => "protein-ligand-ccd",
            Preset::ProteinDna          => "protein-dna",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Preset::ProteinLigandSmiles => "Protein + benzoic acid (SMILES)",
            Preset::ProteinLigandCcd    => "Protein + ATP (CCD)",
            Preset::ProteinDna          => "Protein + DNA duplex",
        }
    }

    fn chains(&self) -> &'static [(&'static str, MoleculeType, &'static str)] {
        match self {
            Preset::ProteinLigandSmiles => &[
                ("A", MoleculeType::Protein, UBIQUITIN),
                ("L", MoleculeType::LigandSmiles, "C1=CC=C(C=C1)C(=O)O"),
            ],
            Preset::ProteinLigandCcd => &[
                ("A", MoleculeType::Protein, UBIQUITIN),
                ("L", MoleculeType::LigandCcd, "ATP"),
            ],
            Preset::ProteinDna => &[
                ("A", MoleculeType::Protein, UBIQUITIN),
                ("B", MoleculeType::Dna, "ATGCGTACGTTAGC"),
                ("C", MoleculeType::Dna, "GCTAACGTACGCAT"),
            ],
        }
    }
}

impl FromStr for Preset {
    type Err = FoldyxError;

    fn from_str(s: &str) -> Result<Self> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| FoldyxError::Validation(format!("unknown preset '{}'", s)))
    }
}

/// Ids are single tokens so they survive comma-separated delete lists.
fn is_valid_chain_id(id: &str) -> bool {
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SequenceSet {
        SequenceSet::new()
            .add("A", MoleculeType::Protein, "MKT")
            .unwrap()
            .add("B", MoleculeType::Rna, "ACGU")
            .unwrap()
            .add("L", MoleculeType::LigandCcd, "SAH")
            .unwrap()
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let set = sample();
        assert_eq!(set.ids(), vec!["A", "B", "L"]);
    }

    #[test]
    fn test_add_rejects_blank_fields_and_leaves_set_unchanged() {
        let set = sample();
        let err = set.add("  ", MoleculeType::Protein, "MKT").unwrap_err();
        assert!(matches!(err, FoldyxError::Validation(_)));
        let err = set.add("C", MoleculeType::Protein, " \n ").unwrap_err();
        assert!(matches!(err, FoldyxError::Validation(_)));
        assert_eq!(set, sample());
    }

    #[test]
    fn test_add_rejects_ids_that_are_not_single_tokens() {
        let set = sample();
        for id in ["C,D", "C D", "C;D", "é"] {
            let err = set.add(id, MoleculeType::Protein, "MKT").unwrap_err();
            assert!(err.to_string().contains("may only contain"), "{}", id);
        }
        assert_eq!(set, sample());
        assert!(set.add("chain_2-b", MoleculeType::Protein, "MKT").is_ok());
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let set = sample();
        let err = set.add(" A ", MoleculeType::Dna, "ACGT").unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_polymer_whitespace_is_removed() {
        let set = SequenceSet::new()
            .add("A", MoleculeType::Protein, "MKT AYI\nAKQR\n")
            .unwrap();
        assert_eq!(set.get("A").unwrap().sequence, "MKTAYIAKQR");
    }

    #[test]
    fn test_ligand_identifier_is_only_trimmed() {
        let set = SequenceSet::new()
            .add("L", MoleculeType::LigandSmiles, "  c1ccccc1O ")
            .unwrap();
        assert_eq!(set.get("L").unwrap().sequence, "c1ccccc1O");
    }

    #[test]
    fn test_delete_keeps_remaining_order() {
        let set = sample().delete(["B"]).unwrap();
        assert_eq!(set.ids(), vec!["A", "L"]);
    }

    #[test]
    fn test_delete_with_partial_match_removes_present_ids() {
        let set = sample().delete(["A", "Z"]).unwrap();
        assert_eq!(set.ids(), vec!["B", "L"]);
    }

    #[test]
    fn test_delete_without_match_reports_not_found() {
        let set = sample();
        let err = set.delete(["X", "Y"]).unwrap_err();
        assert!(matches!(err, FoldyxError::NotFound(_)));
        assert_eq!(set, sample());
    }

    #[test]
    fn test_clear_is_unconditional() {
        assert!(sample().clear().is_empty());
        assert!(SequenceSet::new().clear().is_empty());
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in Preset::ALL {
            let set = SequenceSet::preset(preset);
            assert!(set.len() >= 2, "{:?} should have at least two chains", preset);
            assert!(set.entries().iter().all(|e| e.is_complete()));
        }
        assert_eq!(SequenceSet::preset(Preset::ProteinLigandCcd).ligand_ids(), vec!["L"]);
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("protein-dna".parse::<Preset>().unwrap(), Preset::ProteinDna);
        assert!("nope".parse::<Preset>().is_err());
    }

    /// Drive a fixed pseudo-random op sequence and check ids stay unique.
    #[test]
    fn test_ids_stay_unique_across_mixed_operations() {
        let ids = ["A", "B", "C", "A", "D", "B"];
        let mut set = SequenceSet::new();
        let mut seed: u32 = 17;
        for step in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let id = ids[(seed >> 8) as usize % ids.len()];
            set = match (seed >> 4) % 7 {
                0 => set.clear(),
                1 | 2 => set.delete([id]).unwrap_or(set),
                _ => set.add(id, MoleculeType::Protein, "MK").unwrap_or(set),
            };
            let unique: HashSet<&str> = set.ids().into_iter().collect();
            assert_eq!(unique.len(), set.len(), "duplicate id after step {}", step);
        }
    }
}
