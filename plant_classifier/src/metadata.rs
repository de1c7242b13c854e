use crate::{catalog::LabelCatalog, config::UnmatchedPolicy, error::MetadataError};
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Descriptive record for one catalog label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiseaseInfo {
    #[serde(alias = "scientificName", default = "not_available")]
    pub scientific_name: String,
    #[serde(alias = "commonName", default = "not_available")]
    pub common_name: String,
    #[serde(default = "not_available")]
    pub crop: String,
    #[serde(default = "not_available")]
    pub description: String,
}

impl DiseaseInfo {
    /// True when the record carries no information, e.g. `{}` in the file.
    pub fn is_blank(&self) -> bool {
        [
            &self.scientific_name,
            &self.common_name,
            &self.crop,
            &self.description,
        ]
        .iter()
        .all(|field| {
            let field = field.trim();
            field.is_empty() || field == NOT_AVAILABLE
        })
    }
}

/// Metadata keyed by catalog label, checked against the catalog when loaded.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: HashMap<String, DiseaseInfo>,
    missing: Vec<String>,
}

impl MetadataTable {
    pub fn from_file(
        filepath: &Path,
        catalog: &LabelCatalog,
        policy: UnmatchedPolicy,
    ) -> Result<Self, MetadataError> {
        let raw = fs::read_to_string(filepath)?;
        Self::from_json(&raw, catalog, policy)
    }

    pub fn from_json(
        raw: &str,
        catalog: &LabelCatalog,
        policy: UnmatchedPolicy,
    ) -> Result<Self, MetadataError> {
        let entries: HashMap<String, DiseaseInfo> = serde_json::from_str(raw)?;
        Self::build(entries, catalog, policy)
    }

    pub fn build(
        mut entries: HashMap<String, DiseaseInfo>,
        catalog: &LabelCatalog,
        policy: UnmatchedPolicy,
    ) -> Result<Self, MetadataError> {
        // Blank records answer like absent ones.
        entries.retain(|label, info| {
            let blank = info.is_blank();
            if blank {
                tracing::warn!("Ignoring blank metadata entry for {}", label);
            }
            !blank
        });

        let missing: Vec<String> = catalog
            .iter()
            .filter(|label| !entries.contains_key(*label))
            .map(str::to_string)
            .collect();

        let mut unknown: Vec<String> = entries
            .keys()
            .filter(|key| !catalog.contains(key))
            .cloned()
            .collect();
        unknown.sort();

        if policy == UnmatchedPolicy::Reject {
            if !missing.is_empty() {
                return Err(MetadataError::MissingLabels(missing));
            }
            if !unknown.is_empty() {
                return Err(MetadataError::UnknownLabels(unknown));
            }
        }

        if !missing.is_empty() {
            tracing::warn!(
                "{} catalog labels have no metadata and will answer 404: {:?}",
                missing.len(),
                missing
            );
        }
        for key in &unknown {
            tracing::warn!("Dropping metadata entry with no catalog label: {}", key);
            entries.remove(key);
        }

        tracing::info!("Loaded metadata for {} labels", entries.len());

        Ok(Self { entries, missing })
    }

    pub fn get(&self, label: &str) -> Option<&DiseaseInfo> {
        self.entries.get(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog labels that had no entry in the metadata file.
    pub fn missing_labels(&self) -> &[String] {
        &self.missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LabelCatalog {
        LabelCatalog::new(["Apple___healthy", "Apple___Black_rot"]).unwrap()
    }

    const FULL: &str = r#"{
        "Apple___healthy": {
            "scientific_name": "Malus domestica",
            "commonName": "Healthy apple",
            "crop": "Apple",
            "description": "No disease detected."
        },
        "Apple___Black_rot": {
            "scientificName": "Botryosphaeria obtusa",
            "common_name": "Black rot",
            "crop": "Apple"
        }
    }"#;

    #[test]
    fn accepts_both_field_spellings_and_defaults_missing_fields() {
        let table = MetadataTable::from_json(FULL, &catalog(), UnmatchedPolicy::Reject).unwrap();

        let healthy = table.get("Apple___healthy").unwrap();
        assert_eq!(healthy.scientific_name, "Malus domestica");
        assert_eq!(healthy.common_name, "Healthy apple");

        let rot = table.get("Apple___Black_rot").unwrap();
        assert_eq!(rot.scientific_name, "Botryosphaeria obtusa");
        assert_eq!(rot.common_name, "Black rot");
        assert_eq!(rot.description, "N/A");
        assert!(table.missing_labels().is_empty());
    }

    #[test]
    fn warn_policy_keeps_missing_labels_for_request_time() {
        let raw = r#"{
            "Apple___healthy": {"scientific_name": "Malus domestica"},
            "Banana___healthy": {"scientific_name": "Musa"}
        }"#;
        let table = MetadataTable::from_json(raw, &catalog(), UnmatchedPolicy::Warn).unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.get("Banana___healthy").is_none());
        assert!(table.get("Apple___Black_rot").is_none());
        assert_eq!(table.missing_labels(), &["Apple___Black_rot"]);
    }

    #[test]
    fn reject_policy_fails_on_any_mismatch() {
        let missing = r#"{"Apple___healthy": {"crop": "Apple"}}"#;
        assert!(matches!(
            MetadataTable::from_json(missing, &catalog(), UnmatchedPolicy::Reject),
            Err(MetadataError::MissingLabels(labels)) if labels == vec!["Apple___Black_rot"]
        ));

        let unknown = r#"{
            "Apple___healthy": {"crop": "Apple"},
            "Apple___Black_rot": {"crop": "Apple"},
            "Kiwi___healthy": {"crop": "Kiwi"}
        }"#;
        assert!(matches!(
            MetadataTable::from_json(unknown, &catalog(), UnmatchedPolicy::Reject),
            Err(MetadataError::UnknownLabels(labels)) if labels == vec!["Kiwi___healthy"]
        ));
    }

    #[test]
    fn blank_records_count_as_missing() {
        let raw = r#"{
            "Apple___healthy": {"scientific_name": "Malus domestica"},
            "Apple___Black_rot": {}
        }"#;

        let table = MetadataTable::from_json(raw, &catalog(), UnmatchedPolicy::Warn).unwrap();
        assert!(table.get("Apple___Black_rot").is_none());
        assert_eq!(table.missing_labels(), &["Apple___Black_rot"]);

        let blank_strings = r#"{
            "Apple___healthy": {"scientific_name": "Malus domestica"},
            "Apple___Black_rot": {"scientificName": " ", "crop": "N/A"}
        }"#;
        assert!(matches!(
            MetadataTable::from_json(blank_strings, &catalog(), UnmatchedPolicy::Reject),
            Err(MetadataError::MissingLabels(labels)) if labels == vec!["Apple___Black_rot"]
        ));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            MetadataTable::from_json("[1, 2]", &catalog(), UnmatchedPolicy::Warn),
            Err(MetadataError::Parse(_))
        ));
    }
}
