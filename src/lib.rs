//! Labspace - multi-tenant lab environment provisioner for Kubernetes
//!
//! Labspace stands up isolated working environments for the students (or
//! student groups) of a lab inside a shared cluster: one namespace, one
//! ServiceAccount, and a full RBAC binding set per tenant, plus a declarative
//! manifest replicated into every tenant namespace.
//!
//! # Architecture
//!
//! A lab owns a shared namespace `ns-<lab>` that every tenant can read; each
//! tenant owns a namespace `ns-<lab>-<key>` it fully controls. Creating a lab
//! and adding tenants to an existing lab share one code path: namespaces that
//! already exist are skipped, and only namespaces new to the current request
//! receive identities, bindings, and per-tenant manifest objects.
//!
//! # Modules
//!
//! - [`control`] - Control-plane boundary trait and its kube-backed implementation
//! - [`namespace`] - Idempotent namespace existence/creation
//! - [`rbac`] - Roles, bindings, and ServiceAccount credential provisioning
//! - [`roster`] - Student roster parsing and tenant namespace derivation
//! - [`manifest`] - Two-pass singleton/per-tenant manifest distribution
//! - [`chart`] - Helm chart rendering to manifest text
//! - [`provision`] - Lab-level orchestration (create, extend, delete)
//! - [`server`] - HTTP surface
//! - [`retry`] - Bounded readiness polling with backoff
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod chart;
pub mod control;
pub mod error;
pub mod manifest;
pub mod namespace;
pub mod provision;
pub mod rbac;
pub mod retry;
pub mod roster;
pub mod server;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Cluster object naming
// =============================================================================
// These names are part of the external contract: delete-lab matches on them,
// and the cluster role is shared by every lab on the cluster.

/// Name of the cluster-wide role granting read access to namespace listings.
///
/// Created at most once per cluster, on process startup.
pub const READ_NAMESPACES_ROLE: &str = "read-namespaces-cr";

/// Prefix of the per-tenant cluster role bindings for [`READ_NAMESPACES_ROLE`].
///
/// Full names are `read-namespaces-crb-<lab>-<key>`, unique across labs and
/// tenants; cascade deletion matches on the `read-namespaces-crb-<lab>-`
/// prefix.
pub const READ_NAMESPACES_BINDING_PREFIX: &str = "read-namespaces-crb";

/// Name of the role created both in the lab namespace (read verbs) and in
/// each tenant namespace (full verbs).
pub const TENANT_ROLE: &str = "tenant";

/// Verbs granted to tenants on the lab's shared namespace.
pub const LAB_READ_VERBS: &[&str] = &["list", "get", "watch"];
