use serde::{Deserialize, Serialize};

/// Stable user identity assigned by the messaging platform.
pub type UserId = i64;

/// Non-negative coin balance.
pub type Coins = u64;

/// Signed coin adjustment applied to a balance.
pub type CoinDelta = i64;

/// Identity handle the messaging layer supplies for every observed
/// interaction: a stable id plus the current display name. The core
/// never parses message text; this is the whole identity contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
}

impl UserRef {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Platforms may omit a display name; fall back to a stable
    /// id-derived placeholder.
    pub fn with_optional_name(id: UserId, display_name: Option<String>) -> Self {
        let display_name = display_name.unwrap_or_else(|| format!("id_{id}"));
        Self { id, display_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_display_name_falls_back_to_id() {
        let user = UserRef::with_optional_name(42, None);
        assert_eq!(user.display_name, "id_42");
        let named = UserRef::with_optional_name(42, Some("alice".to_string()));
        assert_eq!(named.display_name, "alice");
    }
}
