use serde::{Deserialize, Serialize};

/// Administrative region. Immutable reference data seeded at bootstrap;
/// the engines only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Short unique code (e.g. "LIT" for Littoral).
    pub code: String,
    pub name: String,
}

impl Region {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}
