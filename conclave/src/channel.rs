//! Minimal channel URI handling for log subscriptions and destinations.
//!
//! URIs take the form `aeron:<media>?key=value|key=value`. Only the pieces
//! the election needs are implemented: parse, get/put/remove of params, and
//! rendering back to a string with insertion order preserved.

use std::fmt;

use crate::error::ElectionError;

pub(crate) const SPY_PREFIX: &str = "aeron-spy:";
const URI_PREFIX: &str = "aeron:";

pub(crate) const ENDPOINT_PARAM: &str = "endpoint";
pub(crate) const MDC_CONTROL_PARAM: &str = "control";
pub(crate) const MDC_CONTROL_MODE_PARAM: &str = "control-mode";
pub(crate) const MDC_CONTROL_MODE_MANUAL: &str = "manual";
pub(crate) const GROUP_PARAM: &str = "group";
pub(crate) const SESSION_ID_PARAM: &str = "session-id";
pub(crate) const TAGS_PARAM: &str = "tags";
pub(crate) const ALIAS_PARAM: &str = "alias";

/// A parsed channel URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUri {
    prefix: String,
    media: String,
    params: Vec<(String, String)>,
}

impl ChannelUri {
    pub fn parse(uri: &str) -> Result<Self, ElectionError> {
        let invalid = |reason: &str| ElectionError::InvalidChannelUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, rest) = if let Some(rest) = uri.strip_prefix(SPY_PREFIX) {
            (SPY_PREFIX, rest)
        } else if let Some(rest) = uri.strip_prefix(URI_PREFIX) {
            (URI_PREFIX, rest)
        } else {
            return Err(invalid("missing aeron: prefix"));
        };

        let (media, query) = match rest.split_once('?') {
            Some((media, query)) => (media, Some(query)),
            None => (rest, None),
        };

        if media.is_empty() {
            return Err(invalid("empty media"));
        }

        let mut params = Vec::new();
        if let Some(query) = query {
            for pair in query.split('|') {
                let (key, value) = pair.split_once('=').ok_or_else(|| invalid("param without '='"))?;
                if key.is_empty() {
                    return Err(invalid("param with empty key"));
                }
                params.push((key.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            prefix: prefix.to_string(),
            media: media.to_string(),
            params,
        })
    }

    pub fn media(&self) -> &str {
        &self.media
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Set `key` to `value`, replacing an existing entry in place.
    pub fn put(&mut self, key: &str, value: &str) {
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.params.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.params.iter().position(|(k, _)| k == key)?;
        Some(self.params.remove(index).1)
    }
}

impl fmt::Display for ChannelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.media)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '|' };
            write!(f, "{}{}={}", sep, k, v)?;
        }
        Ok(())
    }
}
