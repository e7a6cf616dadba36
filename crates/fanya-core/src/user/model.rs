use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The externally-supplied current user.
///
/// Absence of this object means the engine presents an empty, unbound state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    /// Free-form profile metadata from the identity provider.
    #[serde(default)]
    pub metadata: Value,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            metadata: Value::Null,
        }
    }

    /// `metadata.full_name`, then `metadata.name`, then the email address.
    pub fn display_name(&self) -> String {
        ["full_name", "name"]
            .iter()
            .filter_map(|key| self.metadata.get(key).and_then(Value::as_str))
            .find(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name_fallback_chain() {
        let mut user = CurrentUser::new("u-1", "ana@example.com");
        assert_eq!(user.display_name(), "ana@example.com");

        user.metadata = json!({"name": "Ana"});
        assert_eq!(user.display_name(), "Ana");

        user.metadata = json!({"name": "Ana", "full_name": "Ana Lima"});
        assert_eq!(user.display_name(), "Ana Lima");
    }
}
