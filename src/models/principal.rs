//! The authenticated caller, as forwarded by the upstream auth layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A signed-in user. Anonymous share-link visitors have no principal.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
}
