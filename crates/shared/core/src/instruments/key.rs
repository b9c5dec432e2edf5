use serde::{Deserialize, Serialize};

/// Separator between the exchange segment and the security token
const SEGMENT_SEPARATOR: char = '|';

/// Exchange + security identifier, e.g. `NSE_EQ|INE848E01016`
///
/// Treated as opaque by the streaming core: it is only compared, hashed and
/// echoed back to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentKey(String);

impl InstrumentKey {
    /// Create a new instrument key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange segment prefix (`NSE_EQ` for `NSE_EQ|INE848E01016`)
    pub fn segment(&self) -> Option<&str> {
        self.0
            .split_once(SEGMENT_SEPARATOR)
            .map(|(segment, _)| segment)
            .filter(|segment| !segment.is_empty())
    }
}

impl std::fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstrumentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstrumentKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for InstrumentKey {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

impl AsRef<str> for InstrumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
