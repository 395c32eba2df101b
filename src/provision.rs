//! Lab-level orchestration
//!
//! Ties the namespace, RBAC, and manifest components together: creating a
//! lab, extending it with new tenants (the same operation re-invoked with a
//! larger roster), and cascading deletion.
//!
//! Failures abort the remaining steps without rolling back what already
//! succeeded - the lab is left partially provisioned, and the corrective
//! action is re-invoking create (idempotent for existing namespaces) or
//! delete (cascading). Deletion itself stops at the first error.

use std::collections::BTreeMap;

use tracing::info;

use crate::chart::DeploymentSource;
use crate::control::ControlPlane;
use crate::manifest::{distribute, parse_manifest};
use crate::retry::RetryConfig;
use crate::roster::{derive_tenant_namespaces, lab_namespace, tenant_key, ProvisionMode, Student};
use crate::{namespace, rbac, Error, Result, LAB_READ_VERBS, READ_NAMESPACES_BINDING_PREFIX, TENANT_ROLE};

/// Create a lab, or extend it with the tenants new to this roster
///
/// Bootstraps the shared lab namespace and its read role on first creation,
/// ensures every derived tenant namespace, provisions identity and bindings
/// for the namespaces created by this call, renders the configuration
/// source, and distributes the manifest (singletons on first creation only;
/// per-tenant objects into the new namespaces).
///
/// Returns the tenant-key to bearer-token mapping for the newly provisioned
/// identities. Tenants whose namespaces already existed are untouched and
/// absent from the mapping.
pub async fn create_lab<C: ControlPlane + ?Sized>(
    control: &C,
    retry: &RetryConfig,
    lab_name: &str,
    students: &[Student],
    mode: ProvisionMode,
    source: &DeploymentSource,
) -> Result<BTreeMap<String, String>> {
    let lab_ns = lab_namespace(lab_name);

    let lab_existed = namespace::exists(control, &lab_ns).await?;
    if !lab_existed {
        control.create_namespace(&lab_ns).await?;
        control
            .create_role(
                &lab_ns,
                TENANT_ROLE,
                LAB_READ_VERBS.iter().map(ToString::to_string).collect(),
            )
            .await?;
        info!(lab = %lab_name, namespace = %lab_ns, "Bootstrapped lab namespace");
    }

    let wanted = derive_tenant_namespaces(students, lab_name, mode);
    let mut new_namespaces = Vec::new();
    for ns in &wanted {
        if namespace::ensure(control, ns).await? {
            new_namespaces.push(ns.clone());
        }
    }

    let mut credentials = BTreeMap::new();
    for ns in &new_namespaces {
        let key = tenant_key(ns, lab_name).ok_or_else(|| {
            Error::validation(format!("namespace {ns} does not belong to lab {lab_name}"))
        })?;

        let token = rbac::provision_identity(control, retry, key, ns).await?;
        rbac::grant_tenant_full_access(control, ns, key, &["*"]).await?;
        rbac::grant_lab_read_access(control, &lab_ns, key, ns).await?;
        rbac::grant_cluster_read(control, lab_name, key, ns).await?;
        credentials.insert(key.to_string(), token);
    }

    let manifest_text = source.resolve().await?;
    let documents = parse_manifest(&manifest_text)?;
    distribute(control, &documents, lab_name, &new_namespaces, lab_existed).await?;

    info!(
        lab = %lab_name,
        new_tenants = new_namespaces.len(),
        existed = lab_existed,
        "Lab provisioned"
    );
    Ok(credentials)
}

/// Cascade-delete a lab
///
/// Deletes every namespace named `ns-<lab>` or prefixed `ns-<lab>-`, then
/// every ClusterRoleBinding prefixed `read-namespaces-crb-<lab>-`. The first
/// deletion error stops the cascade, leaving the remaining objects in place.
pub async fn delete_lab<C: ControlPlane + ?Sized>(control: &C, lab_name: &str) -> Result<()> {
    let lab_ns = lab_namespace(lab_name);
    let ns_prefix = format!("{lab_ns}-");

    for ns in control.list_namespaces().await? {
        if ns == lab_ns || ns.starts_with(&ns_prefix) {
            control.delete_namespace(&ns).await?;
        }
    }

    let binding_prefix = format!("{READ_NAMESPACES_BINDING_PREFIX}-{lab_name}-");
    for binding in control.list_cluster_role_bindings().await? {
        if binding.starts_with(&binding_prefix) {
            control.delete_cluster_role_binding(&binding).await?;
        }
    }

    info!(lab = %lab_name, "Lab deleted");
    Ok(())
}
