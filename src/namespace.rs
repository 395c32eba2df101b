//! Idempotent namespace management
//!
//! Namespaces are the tenant isolation boundary. Creation is guarded by an
//! existence check so re-submitting a roster that already has namespaces for
//! some tenants creates only the missing ones. There is no guard against a
//! concurrent creation race; the HTTP layer serializes requests per lab.

use crate::control::ControlPlane;
use crate::Result;

/// Check whether a namespace with the given name exists
///
/// Lists all namespaces and scans for an exact match. Side-effect free.
pub async fn exists<C: ControlPlane + ?Sized>(control: &C, name: &str) -> Result<bool> {
    let namespaces = control.list_namespaces().await?;
    Ok(namespaces.iter().any(|ns| ns == name))
}

/// Create the namespace if it does not exist
///
/// Returns `true` when this call created the namespace, `false` when it
/// already existed - the orchestrator uses this to track which namespaces
/// are new in the current request.
pub async fn ensure<C: ControlPlane + ?Sized>(control: &C, name: &str) -> Result<bool> {
    if exists(control, name).await? {
        return Ok(false);
    }

    control.create_namespace(name).await?;
    Ok(true)
}
