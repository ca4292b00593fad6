//! Session diagnostics attached to transactions.

use std::collections::BTreeMap;
use std::fmt;

/// Named-parameter bag attached to a transaction.
///
/// Applications put whatever identifies a session here (user name, request
/// id, host). When a lock request times out, the contention error carries
/// the *holder's* session info so the blocked caller can report who is in
/// the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo(BTreeMap<String, String>);

impl SessionInfo {
    /// Creates an empty session info.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a named parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Sets a named parameter. Builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if no parameters are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Converts into a plain map, for wire transfer.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }

    /// Builds session info from a plain map.
    #[must_use]
    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<anonymous>");
        }
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}
