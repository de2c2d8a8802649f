//! JSON representation for response data.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

pub use serde_json_bytes::ByteString;
pub use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object, as found in GraphQL response `data` and in error
/// `extensions`.
pub type Object = Map<ByteString, Value>;

/// A path to a field inside the response data, as carried by the `path`
/// entry of a GraphQL error.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<ByteString>);

impl Path {
    /// The path to a single field under its parent instance.
    pub fn from_field(field_name: &str) -> Self {
        Self(vec![field_name.into()])
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            write!(f, "/{}", element.as_str())?;
        }
        Ok(())
    }
}
