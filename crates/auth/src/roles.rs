use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Staff role carried in a token.
///
/// Roles are opaque strings; the well-known clinic roles are provided as
/// constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const RECEPTION: Role = Role(Cow::Borrowed("reception"));
    pub const CASHIER: Role = Role(Cow::Borrowed("cashier"));
    pub const CLINICIAN: Role = Role(Cow::Borrowed("clinician"));
    pub const STOREKEEPER: Role = Role(Cow::Borrowed("storekeeper"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
