use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a user in the host application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A payer shared across orders and linked to any number of host users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub users: BTreeSet<UserId>,
}

impl Customer {
    pub fn new(id: CustomerId) -> Self {
        Self {
            id,
            given_name: None,
            family_name: None,
            email: None,
            phone: None,
            users: BTreeSet::new(),
        }
    }

    /// Returns `false` if the user was already linked.
    pub fn link_user(&mut self, user: UserId) -> bool {
        self.users.insert(user)
    }

    pub fn unlink_user(&mut self, user: &UserId) -> bool {
        self.users.remove(user)
    }

    pub fn has_user(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }

    /// Overwrites contact fields that are set on `other`; user links are merged.
    pub fn merge(&mut self, other: Customer) {
        if other.given_name.is_some() {
            self.given_name = other.given_name;
        }
        if other.family_name.is_some() {
            self.family_name = other.family_name;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
        if other.phone.is_some() {
            self.phone = other.phone;
        }
        self.users.extend(other.users);
    }
}
