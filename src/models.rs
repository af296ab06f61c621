use serde::{Deserialize, Serialize};

/// Bearer token claims issued by the identity service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    /// Role labels, e.g. "Student", "WaliKelas".
    pub roles: Vec<String>,
    pub exp: usize,
}
