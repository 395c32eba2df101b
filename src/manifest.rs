//! Manifest distribution
//!
//! A lab's resource manifest is multi-document YAML. Each document is either
//! a *singleton* - applied exactly once, into the lab's shared namespace -
//! or a per-tenant object, applied once into every tenant namespace that is
//! new in the current request. The flag is `metadata.single_instance` and
//! defaults to true.
//!
//! The whole manifest is decoded up front into an ordered document list, so
//! a malformed document aborts distribution before anything is applied.
//! Distribution then makes two passes over the list: singletons run only the
//! first time a lab is created; the per-tenant pass always runs, scoped to
//! the namespaces new in this request. That shared shape is what lets "create
//! a lab" and "add tenants to an existing lab" use one code path.

use serde::Deserialize;
use tracing::{debug, info};

use crate::control::ControlPlane;
use crate::roster::lab_namespace;
use crate::{Error, Result};

/// One decoded manifest document
#[derive(Clone, Debug)]
pub struct ManifestDocument {
    value: serde_json::Value,
    singleton: bool,
}

impl ManifestDocument {
    /// Whether this document is applied once into the lab namespace
    pub fn singleton(&self) -> bool {
        self.singleton
    }

    /// The document's `kind`, for logging
    pub fn kind(&self) -> &str {
        self.value.get("kind").and_then(|v| v.as_str()).unwrap_or("")
    }

    /// The decoded document
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

/// Read the singleton flag from a decoded document
///
/// Absent metadata or an absent flag default to true. A flag that is present
/// but not a boolean is a decode error: defaulting it either way could
/// silently place objects in the wrong namespaces.
fn singleton_flag(value: &serde_json::Value, index: usize) -> Result<bool> {
    let metadata = match value.get("metadata") {
        None | Some(serde_json::Value::Null) => return Ok(true),
        Some(metadata) => metadata,
    };

    match metadata.get("single_instance") {
        None | Some(serde_json::Value::Null) => Ok(true),
        Some(serde_json::Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(Error::decode(format!(
            "manifest document {}: single_instance must be a boolean, got {other}",
            index + 1
        ))),
    }
}

/// Decode a multi-document YAML manifest into an ordered document list
///
/// Empty documents are skipped. Every kept document must carry `apiVersion`
/// and `kind` (they drive type resolution at apply time); any YAML error or
/// malformed document aborts the whole parse.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_json::Value::deserialize(document)
            .map_err(|e| Error::decode(format!("manifest document {}: {e}", index + 1)))?;

        if value.is_null() {
            continue;
        }

        if value.get("apiVersion").and_then(|v| v.as_str()).is_none() {
            return Err(Error::decode(format!(
                "manifest document {} missing apiVersion",
                index + 1
            )));
        }
        if value.get("kind").and_then(|v| v.as_str()).is_none() {
            return Err(Error::decode(format!(
                "manifest document {} missing kind",
                index + 1
            )));
        }

        let singleton = singleton_flag(&value, index)?;
        documents.push(ManifestDocument { value, singleton });
    }

    Ok(documents)
}

/// Apply a decoded manifest to the lab and its new tenant namespaces
///
/// Singleton documents are created once in `ns-<lab>`, and only when the lab
/// namespace did not exist before this request (otherwise they were realized
/// by an earlier request and must not be recreated). Non-singleton documents
/// are created once per namespace in `new_namespaces`. All creations are
/// plain creates; a name conflict propagates as fatal, and a failure leaves
/// earlier creations in place.
pub async fn distribute<C: ControlPlane + ?Sized>(
    control: &C,
    documents: &[ManifestDocument],
    lab_name: &str,
    new_namespaces: &[String],
    lab_existed: bool,
) -> Result<()> {
    let lab_ns = lab_namespace(lab_name);

    if !lab_existed {
        for document in documents.iter().filter(|d| d.singleton) {
            debug!(kind = %document.kind(), namespace = %lab_ns, "Creating singleton object");
            control.create_object(document.value.clone(), &lab_ns).await?;
        }
    }

    for document in documents.iter().filter(|d| !d.singleton) {
        for namespace in new_namespaces {
            debug!(kind = %document.kind(), namespace = %namespace, "Creating tenant object");
            control
                .create_object(document.value.clone(), namespace)
                .await?;
        }
    }

    info!(
        lab = %lab_name,
        documents = documents.len(),
        new_namespaces = new_namespaces.len(),
        "Manifest distributed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MockControlPlane;
    use std::sync::{Arc, Mutex};

    const TWO_DOCS: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: shared-settings
---
apiVersion: v1
kind: Pod
metadata:
  name: workbench
  single_instance: false
"#;

    /// Record of (kind, namespace) pairs created through the mock
    fn capture_creates(
        control: &mut MockControlPlane,
    ) -> Arc<Mutex<Vec<(String, String)>>> {
        let created = Arc::new(Mutex::new(Vec::new()));
        let sink = created.clone();
        control.expect_create_object().returning(move |value, ns| {
            let kind = value.get("kind").and_then(|v| v.as_str()).unwrap().to_string();
            sink.lock().unwrap().push((kind, ns.to_string()));
            Ok(())
        });
        created
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn test_singleton_defaults_to_true() {
        let docs = parse_manifest("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n")
            .unwrap();
        assert!(docs[0].singleton());

        // No metadata section at all still defaults to singleton.
        let docs = parse_manifest("apiVersion: v1\nkind: Namespace\n").unwrap();
        assert!(docs[0].singleton());
    }

    #[test]
    fn test_explicit_flag_is_respected() {
        let docs = parse_manifest(TWO_DOCS).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].singleton());
        assert!(!docs[1].singleton());
        assert_eq!(docs[1].kind(), "Pod");
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let text = "---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n---\n";
        let docs = parse_manifest(text).unwrap();
        assert_eq!(docs.len(), 1);
    }

    /// Story: a malformed singleton flag fails loudly
    ///
    /// Guessing a default for a non-boolean flag could replicate an object
    /// meant to exist once, or collapse per-tenant objects into the shared
    /// namespace. Neither is acceptable, so it is a decode error.
    #[test]
    fn story_non_boolean_flag_is_a_decode_error() {
        let text = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  single_instance: \"yes\"\n";
        let err = parse_manifest(text).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_document_without_kind_is_a_decode_error() {
        let err = parse_manifest("apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let err = parse_manifest("kind: Pod\nmetadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_invalid_yaml_aborts_the_whole_parse() {
        let err = parse_manifest("apiVersion: v1\nkind: [unclosed\n").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    // =========================================================================
    // Distribution
    // =========================================================================

    /// Story: singletons land once in the lab namespace, the rest fan out
    ///
    /// One singleton and one per-tenant document against two new tenant
    /// namespaces yield exactly one shared object and two replicas.
    #[tokio::test]
    async fn story_singleton_and_per_tenant_distribution() {
        let docs = parse_manifest(TWO_DOCS).unwrap();
        let mut control = MockControlPlane::new();
        let created = capture_creates(&mut control);

        let new_namespaces = vec![
            "ns-demo-jane-doe".to_string(),
            "ns-demo-group-1".to_string(),
        ];
        distribute(&control, &docs, "demo", &new_namespaces, false)
            .await
            .unwrap();

        let created = created.lock().unwrap();
        assert_eq!(
            *created,
            vec![
                ("ConfigMap".to_string(), "ns-demo".to_string()),
                ("Pod".to_string(), "ns-demo-jane-doe".to_string()),
                ("Pod".to_string(), "ns-demo-group-1".to_string()),
            ]
        );
    }

    /// Story: extending an existing lab never recreates singletons
    ///
    /// When the lab namespace pre-existed, the singleton pass is skipped
    /// entirely; only per-tenant documents reach the new namespaces.
    #[tokio::test]
    async fn story_existing_lab_skips_singletons() {
        let docs = parse_manifest(TWO_DOCS).unwrap();
        let mut control = MockControlPlane::new();
        let created = capture_creates(&mut control);

        let new_namespaces = vec!["ns-demo-john-roe".to_string()];
        distribute(&control, &docs, "demo", &new_namespaces, true)
            .await
            .unwrap();

        let created = created.lock().unwrap();
        assert_eq!(
            *created,
            vec![("Pod".to_string(), "ns-demo-john-roe".to_string())]
        );
    }

    /// Story: a creation conflict propagates and stops distribution
    #[tokio::test]
    async fn story_create_failure_aborts_remaining_documents() {
        let docs = parse_manifest(TWO_DOCS).unwrap();
        let mut control = MockControlPlane::new();
        control
            .expect_create_object()
            .times(1)
            .returning(|_, _| Err(Error::credential("stand-in for an API conflict")));

        let result = distribute(
            &control,
            &docs,
            "demo",
            &["ns-demo-jane-doe".to_string()],
            false,
        )
        .await;
        assert!(result.is_err());
    }
}
