//! Human-readable summaries of the confidence and affinity side files.

use serde::Serialize;
use serde_json::Value;

pub const NOT_AVAILABLE: &str = "N/A";

/// One metric row: label, formatted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub label: &'static str,
    pub value: String,
}

fn number(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64)
}

/// Fixed-decimal rendering, or `N/A` for anything that is not a JSON number.
pub fn format_decimal(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Fraction rendered as a percentage with two decimals (`0.82` → `82.00%`).
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}%", v * 100.0),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn markdown_table(title: &str, rows: &[SummaryRow], notes: &str) -> String {
    let mut md = format!("### {}\n| Metric | Value |\n| :--- | :--- |\n", title);
    for row in rows {
        md.push_str(&format!("| **{}** | **`{}`** |\n", row.label, row.value));
    }
    md.push_str("\n---\n");
    md.push_str(notes);
    md
}

// ── Affinity ──────────────────────────────────────────────────────────────────

const AFFINITY_NOTES: &str = "\
**Reading the affinity scores:**
- **Predicted affinity value**: reported as `log(IC50)` with IC50 in `uM`. Lower values mean stronger predicted binding.
  - e.g. -3 (strong binder), 0 (moderate binder), 2 (weak binder / decoy).
- **Binding probability**: 0 to 1, the predicted probability that the ligand is a binder.
";

/// Formatted view of `affinity_<job>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffinitySummary {
    pub available: bool,
    /// `affinity_pred_value`, two decimals
    pub predicted_value: String,
    /// `affinity_probability_binary` as a percentage
    pub binder_probability: String,
}

impl AffinitySummary {
    pub fn from_json(data: &Value) -> Self {
        Self {
            available: !is_empty_payload(data),
            predicted_value: format_decimal(number(data, "affinity_pred_value"), 2),
            binder_probability: format_percent(number(data, "affinity_probability_binary")),
        }
    }

    pub fn empty() -> Self {
        Self::from_json(&Value::Null)
    }

    pub fn rows(&self) -> Vec<SummaryRow> {
        vec![
            SummaryRow { label: "Predicted affinity value", value: self.predicted_value.clone() },
            SummaryRow { label: "Binding probability", value: self.binder_probability.clone() },
        ]
    }

    pub fn to_markdown(&self) -> String {
        if !self.available {
            return "No affinity data was generated.".to_string();
        }
        markdown_table("Affinity prediction", &self.rows(), AFFINITY_NOTES)
    }
}

// ── Confidence ────────────────────────────────────────────────────────────────

const CONFIDENCE_NOTES: &str = "\
**Reading the confidence scores (0 to 1, higher is better):**
- **Confidence score**: aggregate used to rank models (0.8 * complex_plddt + 0.2 * iptm).
- **iptm**: predicted interface TM-score, accuracy of the inter-chain contacts.
- **complex_plddt**: mean pLDDT over the complex, local confidence of atom positions.
";

/// Formatted view of `confidence_<job>_model_0.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfidenceSummary {
    pub available: bool,
    pub confidence_score: String,
    pub iptm: String,
    pub complex_plddt: String,
}

impl ConfidenceSummary {
    pub fn from_json(data: &Value) -> Self {
        Self {
            available: !is_empty_payload(data),
            confidence_score: format_decimal(number(data, "confidence_score"), 3),
            iptm: format_decimal(number(data, "iptm"), 3),
            complex_plddt: format_decimal(number(data, "complex_plddt"), 3),
        }
    }

    pub fn empty() -> Self {
        Self::from_json(&Value::Null)
    }

    pub fn rows(&self) -> Vec<SummaryRow> {
        vec![
            SummaryRow { label: "Confidence score", value: self.confidence_score.clone() },
            SummaryRow { label: "iptm (interface)", value: self.iptm.clone() },
            SummaryRow { label: "complex_plddt (local)", value: self.complex_plddt.clone() },
        ]
    }

    pub fn to_markdown(&self) -> String {
        if !self.available {
            return "No confidence data was generated.".to_string();
        }
        markdown_table("Structure confidence", &self.rows(), CONFIDENCE_NOTES)
    }
}
