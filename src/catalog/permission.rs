/*!
Permission grants, identities and the composition rules for access checks.

The catalog stores grants externally (see [PermissionStore]); this module
owns the data model and how grants compose: the effective level for a
principal on a resource is the maximum over all matching, non-expired
grants, where tables inherit from their namespace and nested namespaces
from their parents.
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::identifier::TableIdentifier;
use crate::catalog::namespace::Namespace;
use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
/// Access levels, totally ordered.
pub enum PermissionLevel {
    /// No access.
    None,
    /// Read table data and metadata.
    Read,
    /// Write and commit.
    Write,
    /// Manage grants and table settings.
    Admin,
    /// Full control, including drops.
    Owner,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
#[serde(rename_all = "lowercase", tag = "resource-type", content = "resource-id")]
/// What a grant applies to.
pub enum Resource {
    /// A namespace, identified by its dotted path.
    Namespace(String),
    /// A table, identified by its dotted path.
    Table(String),
}

impl Resource {
    /// The resources an access check consults for a table, most specific
    /// first: the table, its namespace, then each enclosing namespace.
    pub fn chain_for_table(identifier: &TableIdentifier) -> Vec<Resource> {
        let mut chain = vec![Resource::Table(identifier.to_string())];
        let mut namespace = Some(identifier.namespace().clone());
        while let Some(current) = namespace {
            if !current.is_empty() {
                chain.push(Resource::Namespace(current.to_string()));
            }
            namespace = current.parent();
        }
        chain
    }

    /// The resources an access check consults for a namespace.
    pub fn chain_for_namespace(namespace: &Namespace) -> Vec<Resource> {
        let mut chain = vec![];
        let mut current = Some(namespace.clone());
        while let Some(namespace) = current {
            if !namespace.is_empty() {
                chain.push(Resource::Namespace(namespace.to_string()));
            }
            current = namespace.parent();
        }
        chain
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
#[serde(rename_all = "lowercase", tag = "principal-type", content = "principal-id")]
/// Who a grant applies to.
pub enum Principal {
    /// A single user.
    User(String),
    /// A role carried in the identity's role list.
    Role(String),
    /// A group carried in the identity's role list.
    Group(String),
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A stored permission grant.
pub struct PermissionGrant {
    /// Unique id of the grant.
    pub id: String,
    /// What the grant applies to.
    #[serde(flatten)]
    pub resource: Resource,
    /// Who the grant applies to.
    #[serde(flatten)]
    pub principal: Principal,
    /// The granted level.
    pub level: PermissionLevel,
    /// When the grant was created.
    pub created_at: DateTime<Utc>,
    /// Who created the grant.
    pub created_by: String,
    /// When the grant stops applying, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    fn matches(&self, identity: &Identity, resources: &[Resource], now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return false;
            }
        }
        if !resources.contains(&self.resource) {
            return false;
        }
        match &self.principal {
            Principal::User(user_id) => identity.user_id == *user_id,
            Principal::Role(role) | Principal::Group(role) => identity.roles.contains(role),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// An authenticated caller, supplied by the identity collaborator. The core
/// never validates tokens itself.
pub struct Identity {
    /// Stable user id.
    pub user_id: String,
    /// E-mail address.
    pub email: String,
    /// Roles and groups the user belongs to.
    pub roles: Vec<String>,
    /// The organization the user acts within.
    pub organization_id: String,
    /// OAuth scopes attached to the credential.
    pub scopes: Vec<String>,
}

/// External storage of permission grants.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// All grants for a principal.
    async fn get_grants_for_principal(&self, principal: &Principal)
        -> Result<Vec<PermissionGrant>>;
    /// All grants on a resource.
    async fn get_grants_for_resource(&self, resource: &Resource) -> Result<Vec<PermissionGrant>>;
    /// Store a grant.
    async fn create_grant(&self, grant: PermissionGrant) -> Result<()>;
    /// Delete a grant by id.
    async fn delete_grant(&self, grant_id: &str) -> Result<()>;
    /// Delete every grant on a resource.
    async fn delete_grants_for_resource(&self, resource: &Resource) -> Result<()>;
}

/// The effective level of an identity on a resource chain: the maximum
/// over all matching, non-expired grants.
pub fn effective_level(
    identity: &Identity,
    resources: &[Resource],
    grants: &[PermissionGrant],
    now: DateTime<Utc>,
) -> PermissionLevel {
    grants
        .iter()
        .filter(|grant| grant.matches(identity, resources, now))
        .map(|grant| grant.level)
        .max()
        .unwrap_or(PermissionLevel::None)
}

/// Check that an identity holds at least `required` on the resource chain.
///
/// A missing identity is `Unauthorized`; an insufficient level is
/// `Forbidden`, naming the required level and the most specific resource.
pub fn require_level(
    identity: Option<&Identity>,
    resources: &[Resource],
    grants: &[PermissionGrant],
    required: PermissionLevel,
    now: DateTime<Utc>,
) -> Result<()> {
    let identity = identity.ok_or(Error::Unauthorized)?;
    let effective = effective_level(identity, resources, grants, now);
    if effective >= required {
        Ok(())
    } else {
        let resource = match resources.first() {
            Some(Resource::Table(name)) | Some(Resource::Namespace(name)) => name.clone(),
            None => String::new(),
        };
        Err(Error::Forbidden(format!("{required:?}").to_uppercase(), resource))
    }
}
