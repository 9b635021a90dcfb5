use chrono::{DateTime, Utc};

/// A tenant namespace. Tenants are created lazily on first use or explicitly
/// via `CreateTenant`; `id` is the tenant's name and is globally unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Tenant {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";
