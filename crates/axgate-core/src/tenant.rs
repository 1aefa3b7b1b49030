//! Tenant and developer identity types.

use serde::{Deserialize, Serialize};

/// A customer scope: (organization, environment, tenant id).
///
/// `tenant_id` combined with an api key locates developer attribution data;
/// `org` and `env` name the window directory a record is buffered under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Tenant {
    pub org: String,
    pub env: String,
    pub tenant_id: String,
}

impl Tenant {
    pub fn new(org: impl Into<String>, env: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            env: env.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// The `org~env` key used for directory names and upload requests.
    pub fn key(&self) -> String {
        format!("{}~{}", self.org, self.env)
    }
}

/// Developer attribution for a (tenant, api key) pair.
///
/// All fields default to empty: absent attribution is valid for the domain
/// and is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeveloperInfo {
    pub api_product: String,
    pub developer_app: String,
    pub developer_email: String,
    pub developer: String,
}
