//! Descriptor validation
//!
//! Validation is a pluggable predicate. The bundled [`DescriptorValidator`]
//! only checks the shape an AlphaFold3 input needs to be worth launching;
//! the prediction tool remains the authority on content.

use serde_json::Value;
use std::path::Path;

/// Standard amino-acid one-letter codes accepted in protein chains
const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Validator decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Accept the descriptor
    Valid,
    /// Reject with a reason
    Invalid(String),
}

impl Verdict {
    /// True when accepted
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Decides whether a descriptor becomes a job
pub trait JobValidator: Send + Sync {
    /// Inspect one descriptor
    fn validate(&self, path: &Path) -> Verdict;
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl JobValidator for AcceptAll {
    fn validate(&self, _path: &Path) -> Verdict {
        Verdict::Valid
    }
}

/// Structural check for AlphaFold3 JSON inputs: a non-empty `sequences`
/// list of objects, and protein chains made of standard residues.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorValidator;

impl DescriptorValidator {
    /// Validate an already-parsed document
    pub fn check(document: &Value) -> Verdict {
        let Some(sequences) = document.get("sequences") else {
            return Verdict::invalid("missing required field 'sequences'");
        };
        let Some(sequences) = sequences.as_array().filter(|s| !s.is_empty()) else {
            return Verdict::invalid("'sequences' must be a non-empty list");
        };

        for (i, entry) in sequences.iter().enumerate() {
            if !entry.is_object() {
                return Verdict::invalid(format!("sequence {} is not an object", i));
            }
            let Some(protein) = entry.get("protein") else {
                continue;
            };
            let Some(sequence) = protein.get("sequence") else {
                return Verdict::invalid(format!("sequence {} is missing 'sequence'", i));
            };
            let Some(sequence) = sequence.as_str() else {
                return Verdict::invalid(format!("sequence {} 'sequence' is not a string", i));
            };
            if let Some(bad) = sequence.chars().find(|c| !AMINO_ACIDS.contains(*c)) {
                return Verdict::invalid(format!(
                    "sequence {} contains invalid residue '{}'",
                    i, bad
                ));
            }
        }

        Verdict::Valid
    }
}

impl JobValidator for DescriptorValidator {
    fn validate(&self, path: &Path) -> Verdict {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => return Verdict::invalid(format!("cannot read descriptor: {}", e)),
        };
        let document: Value = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => return Verdict::invalid(format!("invalid JSON: {}", e)),
        };

        let verdict = Self::check(&document);
        if verdict.is_valid() {
            tracing::debug!(path = %path.display(), "Descriptor accepted");
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_protein() {
        let doc = json!({"name": "t", "sequences": [{"protein": {"id": "A", "sequence": "MKTAYIAKQR"}}]});
        assert_eq!(DescriptorValidator::check(&doc), Verdict::Valid);
    }

    #[test]
    fn test_non_protein_entries_pass() {
        let doc = json!({"sequences": [{"rna": {"id": "R", "sequence": "AUGC"}}]});
        assert!(DescriptorValidator::check(&doc).is_valid());
    }

    #[test]
    fn test_missing_sequences() {
        let verdict = DescriptorValidator::check(&json!({"name": "x"}));
        assert_eq!(verdict, Verdict::Invalid("missing required field 'sequences'".into()));
    }

    #[test]
    fn test_empty_sequences() {
        assert!(!DescriptorValidator::check(&json!({"sequences": []})).is_valid());
        assert!(!DescriptorValidator::check(&json!({"sequences": "MKT"})).is_valid());
    }

    #[test]
    fn test_bad_residue() {
        let doc = json!({"sequences": [{"protein": {"id": "A", "sequence": "MKTXB"}}]});
        match DescriptorValidator::check(&doc) {
            Verdict::Invalid(reason) => assert!(reason.contains("'X'")),
            Verdict::Valid => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_entry_not_object() {
        let doc = json!({"sequences": ["MKT"]});
        assert!(!DescriptorValidator::check(&doc).is_valid());
    }

    #[test]
    fn test_unparsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        match DescriptorValidator.validate(&path) {
            Verdict::Invalid(reason) => assert!(reason.starts_with("invalid JSON")),
            Verdict::Valid => panic!("expected rejection"),
        }
    }
}
