use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A database scopes a set of collections within a tenant. Uniqueness is
/// `(tenant, name)`, not `name` alone: two tenants may each have a database
/// named `default_database`.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub id: Uuid,
    pub name: String,
    pub tenant: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}
