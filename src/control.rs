//! Control-plane boundary
//!
//! Everything the provisioning engine asks of the cluster control plane goes
//! through the [`ControlPlane`] trait: namespace CRUD, RBAC object creation,
//! ServiceAccount/Secret reads, and dynamic creation of arbitrary manifest
//! objects with discovery-based type resolution.
//!
//! The trait allows mocking the control plane in tests while using the real
//! client in production. [`KubeControlPlane`] is the production
//! implementation: one handle object constructed at startup, shared by `Arc`,
//! never reassigned.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams, ObjectMeta, PostParams};
use kube::discovery::{Discovery, Scope};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::Error;

/// Trait abstracting cluster control-plane operations
///
/// This is the external boundary of the provisioning engine: every remote
/// call it makes is one of these methods. Tests mock it; production uses
/// [`KubeControlPlane`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List the names of all namespaces in the cluster
    async fn list_namespaces(&self) -> Result<Vec<String>, Error>;

    /// Create a namespace with the given name
    async fn create_namespace(&self, name: &str) -> Result<(), Error>;

    /// Delete the namespace with the given name
    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    /// Check whether a ClusterRole with the given name exists
    ///
    /// Absence must be detected from the typed API status, not error text.
    async fn cluster_role_exists(&self, name: &str) -> Result<bool, Error>;

    /// Create a ClusterRole granting `get`/`list` on namespaces
    async fn create_namespace_read_cluster_role(&self, name: &str) -> Result<(), Error>;

    /// Create a Role in `namespace` granting `verbs` on all resources of all
    /// API groups
    async fn create_role(&self, namespace: &str, name: &str, verbs: Vec<String>)
        -> Result<(), Error>;

    /// Create a RoleBinding in `namespace` binding `role_name` to the
    /// ServiceAccount `account` living in `account_namespace`
    async fn create_role_binding(
        &self,
        namespace: &str,
        name: &str,
        role_name: &str,
        account: &str,
        account_namespace: &str,
    ) -> Result<(), Error>;

    /// Create a ClusterRoleBinding binding `cluster_role` to the
    /// ServiceAccount `account` living in `account_namespace`
    async fn create_cluster_role_binding(
        &self,
        name: &str,
        cluster_role: &str,
        account: &str,
        account_namespace: &str,
    ) -> Result<(), Error>;

    /// List the names of all ClusterRoleBindings in the cluster
    async fn list_cluster_role_bindings(&self) -> Result<Vec<String>, Error>;

    /// Delete the ClusterRoleBinding with the given name
    async fn delete_cluster_role_binding(&self, name: &str) -> Result<(), Error>;

    /// Create a ServiceAccount named `name` in `namespace`
    async fn create_service_account(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Name of the first Secret referenced by a ServiceAccount, if any
    ///
    /// The control plane attaches the token secret asynchronously after
    /// account creation, so `Ok(None)` means "not materialized yet".
    async fn service_account_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, Error>;

    /// The `token` entry of a Secret, decoded as UTF-8, if present
    async fn secret_token(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<String>, Error>;

    /// Create one manifest object in the given namespace
    ///
    /// The object's group/version/kind is resolved against the cluster's API
    /// discovery data at call time; `metadata.namespace` is overwritten with
    /// `namespace` for namespaced resources. Creation is a plain create -
    /// an existing object with the same name is a conflict error.
    async fn create_object(
        &self,
        manifest: serde_json::Value,
        namespace: &str,
    ) -> Result<(), Error>;
}

/// Production [`ControlPlane`] backed by a [`kube::Client`]
///
/// The same client serves typed calls and the discovery-parameterized dynamic
/// calls; it is read-only after construction and safe to share across
/// in-flight requests.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    /// Create a new control-plane handle from a connected client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn subject(account: &str, account_namespace: &str) -> Subject {
        Subject {
            kind: "ServiceAccount".to_string(),
            name: account.to_string(),
            namespace: Some(account_namespace.to_string()),
            ..Default::default()
        }
    }

    fn named(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

/// Split an `apiVersion` value into (group, version)
///
/// Core-group resources carry a bare version with no `/`.
fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list(&ListParams::default()).await?;
        Ok(namespaces
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: Self::named(name),
            ..Default::default()
        };
        api.create(&PostParams::default(), &namespace).await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn cluster_role_exists(&self, name: &str) -> Result<bool, Error> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?.is_some())
    }

    async fn create_namespace_read_cluster_role(&self, name: &str) -> Result<(), Error> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        let role = ClusterRole {
            metadata: Self::named(name),
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["namespaces".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string()],
                ..Default::default()
            }]),
            ..Default::default()
        };
        api.create(&PostParams::default(), &role).await?;
        Ok(())
    }

    async fn create_role(
        &self,
        namespace: &str,
        name: &str,
        verbs: Vec<String>,
    ) -> Result<(), Error> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), namespace);
        let role = Role {
            metadata: Self::named(name),
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec!["*".to_string()]),
                resources: Some(vec!["*".to_string()]),
                verbs,
                ..Default::default()
            }]),
        };
        api.create(&PostParams::default(), &role).await?;
        Ok(())
    }

    async fn create_role_binding(
        &self,
        namespace: &str,
        name: &str,
        role_name: &str,
        account: &str,
        account_namespace: &str,
    ) -> Result<(), Error> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        let binding = RoleBinding {
            metadata: Self::named(name),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
            subjects: Some(vec![Self::subject(account, account_namespace)]),
        };
        api.create(&PostParams::default(), &binding).await?;
        Ok(())
    }

    async fn create_cluster_role_binding(
        &self,
        name: &str,
        cluster_role: &str,
        account: &str,
        account_namespace: &str,
    ) -> Result<(), Error> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let binding = ClusterRoleBinding {
            metadata: Self::named(name),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: cluster_role.to_string(),
            },
            subjects: Some(vec![Self::subject(account, account_namespace)]),
        };
        api.create(&PostParams::default(), &binding).await?;
        Ok(())
    }

    async fn list_cluster_role_bindings(&self) -> Result<Vec<String>, Error> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let bindings = api.list(&ListParams::default()).await?;
        Ok(bindings
            .items
            .into_iter()
            .filter_map(|crb| crb.metadata.name)
            .collect())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<(), Error> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn create_service_account(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let account = ServiceAccount {
            metadata: Self::named(name),
            ..Default::default()
        };
        api.create(&PostParams::default(), &account).await?;
        Ok(())
    }

    async fn service_account_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, Error> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let account = api.get(name).await?;
        Ok(account
            .secrets
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|reference| reference.name))
    }

    async fn secret_token(
        &self,
        namespace: &str,
        secret_name: &str,
    ) -> Result<Option<String>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(secret_name).await?;
        let token = secret
            .data
            .and_then(|mut data| data.remove("token"))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned());
        Ok(token)
    }

    async fn create_object(
        &self,
        manifest: serde_json::Value,
        namespace: &str,
    ) -> Result<(), Error> {
        let api_version = manifest
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::decode("manifest document missing apiVersion"))?;
        let kind = manifest
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::decode("manifest document missing kind"))?;

        let (group, version) = parse_api_version(api_version);
        let gvk = GroupVersionKind {
            group,
            version,
            kind: kind.to_string(),
        };

        // Resolve the abstract type against live discovery data; the manifest
        // does not pre-declare the plural resource or its scope.
        let discovery = Discovery::new(self.client.clone()).run().await?;
        let (resource, capabilities) = discovery.resolve_gvk(&gvk).ok_or_else(|| {
            Error::decode(format!(
                "no API resource registered for {}/{}",
                api_version, kind
            ))
        })?;

        let mut object: DynamicObject = serde_json::from_value(manifest)
            .map_err(|e| Error::decode(format!("manifest document is not an object: {e}")))?;

        let api: Api<DynamicObject> = if matches!(capabilities.scope, Scope::Namespaced) {
            object.metadata.namespace = Some(namespace.to_string());
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        debug!(
            kind = %gvk.kind,
            name = object.metadata.name.as_deref().unwrap_or(""),
            namespace = %namespace,
            "Creating manifest object"
        );
        api.create(&PostParams::default(), &object).await?;
        Ok(())
    }
}
