//! RBAC provisioning
//!
//! Per tenant this module creates an identity (ServiceAccount) and its three
//! authorization relations: full access to the tenant's own namespace, read
//! access to the lab's shared namespace, and a cluster-scoped binding to the
//! shared namespace-listing role. It also retrieves the identity's bearer
//! token, which the control plane materializes asynchronously after account
//! creation.

use tracing::{debug, info};

use crate::control::ControlPlane;
use crate::retry::{poll_until, RetryConfig};
use crate::{Error, Result, READ_NAMESPACES_BINDING_PREFIX, READ_NAMESPACES_ROLE, TENANT_ROLE};

/// Name of the cluster binding granting a tenant namespace-listing access
///
/// The lab name and tenant key keep the name unique across labs and tenants;
/// cascade deletion matches on the `read-namespaces-crb-<lab>-` prefix.
pub fn cluster_read_binding_name(lab_name: &str, key: &str) -> String {
    format!("{READ_NAMESPACES_BINDING_PREFIX}-{lab_name}-{key}")
}

/// Ensure the cluster-wide namespace-listing role exists
///
/// Invoked once at process start, not per request. The existence check uses
/// the typed API status carried by the client.
pub async fn ensure_cluster_read_role<C: ControlPlane + ?Sized>(control: &C) -> Result<()> {
    if control.cluster_role_exists(READ_NAMESPACES_ROLE).await? {
        debug!(role = READ_NAMESPACES_ROLE, "Cluster read role already present");
        return Ok(());
    }

    control
        .create_namespace_read_cluster_role(READ_NAMESPACES_ROLE)
        .await?;
    info!(role = READ_NAMESPACES_ROLE, "Created cluster read role");
    Ok(())
}

/// Grant an identity the given verb set over its own namespace
///
/// Creates the `tenant` role in the namespace and binds it to the account.
pub async fn grant_tenant_full_access<C: ControlPlane + ?Sized>(
    control: &C,
    namespace: &str,
    account: &str,
    verbs: &[&str],
) -> Result<()> {
    control
        .create_role(
            namespace,
            TENANT_ROLE,
            verbs.iter().map(ToString::to_string).collect(),
        )
        .await?;
    control
        .create_role_binding(namespace, "tenant-binding", TENANT_ROLE, account, namespace)
        .await
}

/// Grant an identity read access to the lab's shared namespace
///
/// The binding lives in the lab namespace; its subject references the
/// account in the account's own namespace (a cross-namespace subject).
pub async fn grant_lab_read_access<C: ControlPlane + ?Sized>(
    control: &C,
    lab_namespace: &str,
    account: &str,
    account_namespace: &str,
) -> Result<()> {
    control
        .create_role_binding(
            lab_namespace,
            &format!("tenant-binding-{account}"),
            TENANT_ROLE,
            account,
            account_namespace,
        )
        .await
}

/// Grant an identity the cluster-wide namespace-listing role
pub async fn grant_cluster_read<C: ControlPlane + ?Sized>(
    control: &C,
    lab_name: &str,
    key: &str,
    account_namespace: &str,
) -> Result<()> {
    control
        .create_cluster_role_binding(
            &cluster_read_binding_name(lab_name, key),
            READ_NAMESPACES_ROLE,
            key,
            account_namespace,
        )
        .await
}

/// Create a tenant identity and return its bearer token
///
/// The token secret appears asynchronously after the ServiceAccount is
/// created, so this polls for the account's first secret reference with
/// bounded attempts and backoff. A remote error aborts immediately; poll
/// exhaustion is a credential error.
pub async fn provision_identity<C: ControlPlane + ?Sized>(
    control: &C,
    retry: &RetryConfig,
    key: &str,
    namespace: &str,
) -> Result<String> {
    control.create_service_account(namespace, key).await?;

    let secret_name = poll_until(retry, "service_account_token_secret", || {
        control.service_account_secret(namespace, key)
    })
    .await?
    .ok_or_else(|| {
        Error::credential(format!(
            "no token secret for {namespace}/{key} after {} attempts",
            retry.max_attempts
        ))
    })?;

    let token = control
        .secret_token(namespace, &secret_name)
        .await?
        .ok_or_else(|| {
            Error::credential(format!("secret {namespace}/{secret_name} has no token entry"))
        })?;

    info!(account = %key, namespace = %namespace, "Provisioned tenant identity");
    Ok(token)
}
