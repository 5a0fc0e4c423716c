//! Reference rewriting and per-package validation.

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::mapping::{Resolution, WorkingMapping};
use crate::types::{ContentPackage, Guid, MetadataType};

/// A package ready for submission, with its references rewritten for the
/// target environment. Validation errors attach to the package; they never
/// abort the run.
#[derive(Debug, Clone)]
pub struct PreparedPackage {
    pub package: ContentPackage,
    pub errors: Vec<ValidationError>,
}

impl PreparedPackage {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Metadata types by GUID for the object set of one run, used to catch
/// references whose target has a different type than the reference expects.
pub fn type_index(packages: &[ContentPackage]) -> BTreeMap<Guid, MetadataType> {
    packages
        .iter()
        .map(|package| (package.guid.clone(), package.metadata_type.clone()))
        .collect()
}

/// Rewrite one package through the working mapping.
///
/// Resolved references (override or mapped) are rewritten to their target
/// GUID. Pending references keep the original GUID; the import discovers the
/// target side. A reference with no entry anywhere passes through unchanged on
/// a same-environment deploy and is a validation error otherwise.
pub fn prepare_package(
    package: &ContentPackage,
    working: &WorkingMapping,
    types_by_guid: &BTreeMap<Guid, MetadataType>,
    same_environment: bool,
) -> PreparedPackage {
    let mut errors = Vec::new();
    let mut rewrites: Vec<(Guid, Guid)> = Vec::new();

    for reference in &package.references {
        if let (Some(expected), Some(actual)) =
            (reference.kind.as_ref(), types_by_guid.get(&reference.guid))
            && expected != actual
        {
            errors.push(ValidationError::ReferenceTypeMismatch {
                package: package.guid.clone(),
                reference: reference.guid.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            });
            continue;
        }

        match working.resolve(&reference.guid) {
            Resolution::Override(new) | Resolution::Mapped(new) => {
                if *new != reference.guid {
                    rewrites.push((reference.guid.clone(), new.clone()));
                }
            }
            Resolution::Pending => {}
            Resolution::Unknown => {
                if !same_environment {
                    errors.push(ValidationError::UnresolvedReference {
                        package: package.guid.clone(),
                        reference: reference.guid.clone(),
                    });
                }
            }
        }
    }

    // the package's own GUID is rewritten when the target already maps it
    match working.resolve(&package.guid) {
        Resolution::Override(new) | Resolution::Mapped(new) if *new != package.guid => {
            rewrites.push((package.guid.clone(), new.clone()));
        }
        _ => {}
    }

    let mut rewritten = package.clone();
    apply_rewrites(&mut rewritten, &rewrites);

    PreparedPackage {
        package: rewritten,
        errors,
    }
}

/// GUIDs appear in payloads as whole string values; rewrite them in place.
/// The envelope `guid` field is left alone, it keys the mapping bookkeeping.
fn apply_rewrites(package: &mut ContentPackage, rewrites: &[(Guid, Guid)]) {
    if rewrites.is_empty() {
        return;
    }
    let table: BTreeMap<&str, &str> = rewrites
        .iter()
        .map(|(old, new)| (old.as_str(), new.as_str()))
        .collect();

    rewrite_value(&mut package.payload, &table);
    for reference in &mut package.references {
        if let Some(new) = table.get(reference.guid.as_str()) {
            reference.guid = Guid::from(*new);
        }
    }
}

fn rewrite_value(value: &mut serde_json::Value, table: &BTreeMap<&str, &str>) {
    match value {
        serde_json::Value::String(s) => {
            if let Some(new) = table.get(s.as_str()) {
                *s = (*new).to_string();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                rewrite_value(item, table);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                rewrite_value(item, table);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingFile, merge_mappings};
    use crate::types::{Environment, PackageRef};
    use chrono::Utc;

    fn working_with(entries: &[(&str, Option<&str>)]) -> WorkingMapping {
        let mut target = MappingFile::new(&Environment::new("prod").unwrap());
        for (old, new) in entries.iter().copied() {
            target.mapping.insert(Guid::from(old), new.map(Guid::from));
        }
        let source = MappingFile::new(&Environment::new("dev").unwrap());
        merge_mappings(&source, &target)
    }

    fn package_with_refs(guid: &str, refs: Vec<PackageRef>) -> ContentPackage {
        ContentPackage {
            guid: Guid::from(guid),
            metadata_type: MetadataType::new("LIVEBOARD"),
            name: guid.to_string(),
            modified_at: Utc::now(),
            payload: serde_json::json!({
                "guid": guid,
                "tables": refs.iter().map(|r| r.guid.as_str()).collect::<Vec<_>>(),
            }),
            references: refs,
        }
    }

    #[test]
    fn test_mapped_references_are_rewritten_in_payload() {
        let working = working_with(&[("dep", Some("dep-prod"))]);
        let package = package_with_refs("board", vec![PackageRef::new("dep")]);
        let index = BTreeMap::new();

        let prepared = prepare_package(&package, &working, &index, false);

        assert!(prepared.is_valid());
        assert_eq!(prepared.package.references[0].guid, Guid::from("dep-prod"));
        assert_eq!(
            prepared.package.payload["tables"][0],
            serde_json::json!("dep-prod")
        );
        // envelope identity is untouched
        assert_eq!(prepared.package.guid, Guid::from("board"));
    }

    #[test]
    fn test_pending_reference_keeps_original_guid() {
        let working = working_with(&[("dep", None)]);
        let package = package_with_refs("board", vec![PackageRef::new("dep")]);

        let prepared = prepare_package(&package, &working, &BTreeMap::new(), false);

        assert!(prepared.is_valid());
        assert_eq!(prepared.package.references[0].guid, Guid::from("dep"));
    }

    #[test]
    fn test_unknown_reference_fails_cross_environment_only() {
        let working = working_with(&[]);
        let package = package_with_refs("board", vec![PackageRef::new("missing")]);

        let cross = prepare_package(&package, &working, &BTreeMap::new(), false);
        assert_eq!(cross.errors.len(), 1);
        assert!(matches!(
            cross.errors[0],
            ValidationError::UnresolvedReference { .. }
        ));

        let same = prepare_package(&package, &working, &BTreeMap::new(), true);
        assert!(same.is_valid());
        assert_eq!(same.package.references[0].guid, Guid::from("missing"));
    }

    #[test]
    fn test_reference_type_mismatch_is_a_validation_error() {
        let working = working_with(&[("dep", Some("dep-prod"))]);
        let package = package_with_refs(
            "board",
            vec![PackageRef::new("dep").with_kind(MetadataType::new("TABLE"))],
        );
        let mut index = BTreeMap::new();
        index.insert(Guid::from("dep"), MetadataType::new("MODEL"));

        let prepared = prepare_package(&package, &working, &index, false);

        assert_eq!(prepared.errors.len(), 1);
        assert!(matches!(
            prepared.errors[0],
            ValidationError::ReferenceTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_own_guid_rewrite_applies_to_payload() {
        let working = working_with(&[("board", Some("board-prod"))]);
        let package = package_with_refs("board", Vec::new());

        let prepared = prepare_package(&package, &working, &BTreeMap::new(), false);

        assert_eq!(prepared.package.payload["guid"], serde_json::json!("board-prod"));
        assert_eq!(prepared.package.guid, Guid::from("board"));
    }
}
