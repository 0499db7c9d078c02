use crate::core::Document;
use serde::{Deserialize, Serialize};

/// A user account; `email` is unique across the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Document for User {
    const UNIQUE_FIELD: &'static str = "email";

    fn unique_key(&self) -> &str {
        &self.email
    }
}
