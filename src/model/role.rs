use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::CoreError;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Display,
    EnumString, AsRefStr,
)]
pub enum Role {
    Admin,
    Teacher,
    /// Homeroom teacher.
    WaliKelas,
    /// Field supervisor at the placement site.
    Supervisor,
    Student,
}

/// Authenticated caller as handed over by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: u64,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(user_id: u64, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    /// Builds a principal from raw role labels, rejecting anything unknown.
    pub fn from_labels<S: AsRef<str>>(user_id: u64, labels: &[S]) -> Result<Self, CoreError> {
        let mut roles = BTreeSet::new();
        for label in labels {
            let role = Role::from_str(label.as_ref()).map_err(|_| {
                CoreError::validation(format!("unknown role label '{}'", label.as_ref()))
            })?;
            roles.insert(role);
        }
        Ok(Self { user_id, roles })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_labels_into_ordered_set() {
        let p = Principal::from_labels(7, &["WaliKelas", "Teacher", "WaliKelas"]).unwrap();
        assert_eq!(p.roles.len(), 2);
        assert!(p.has_role(Role::WaliKelas));
        assert!(p.has_any(&[Role::Admin, Role::Teacher]));
        assert!(!p.has_role(Role::Admin));
    }

    #[test]
    fn rejects_unknown_label() {
        let err = Principal::from_labels(7, &["Student", "root"]).unwrap_err();
        assert_eq!(err.kind(), "ValidationFailure");
    }
}
