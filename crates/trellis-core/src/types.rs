use serde::{Deserialize, Serialize};

/// Value object: the service type a workflow is defined for
///
/// Service types are opaque identifiers assigned by the workflow engine
/// (for example `"movie"` or `"grocery"`). One workflow definition exists
/// per service type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceType(pub String);

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to an external media resource attached to a prompt or message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    /// Location of the media resource
    pub url: String,

    /// Optional display title
    pub title: Option<String>,
}
