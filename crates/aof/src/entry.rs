//! Log records and the cache entries they reconstruct

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of mutation recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Insert or overwrite a key
    Add,
    /// Delete a key
    Remove,
    /// A key's TTL elapsed
    Expire,
    /// Every key was dropped
    Flush,
}

impl Verb {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Expire => "expire",
            Self::Flush => "flush",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "remove" | "delete" => Ok(Self::Remove),
            "expire" => Ok(Self::Expire),
            "flush" => Ok(Self::Flush),
            other => Err(format!("unknown verb '{other}'")),
        }
    }
}

/// One mutation, as appended to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub verb: Verb,
    pub key: String,
    pub value: String,
    pub ttl: Option<Duration>,
}

impl LogEntry {
    pub fn new(
        verb: Verb,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            verb,
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    pub fn add(key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self::new(Verb::Add, key, value, ttl)
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self::new(Verb::Remove, key, String::new(), None)
    }

    pub fn expire(key: impl Into<String>) -> Self {
        Self::new(Verb::Expire, key, String::new(), None)
    }

    pub fn flush() -> Self {
        Self::new(Verb::Flush, String::new(), String::new(), None)
    }
}

impl From<CacheEntry> for LogEntry {
    fn from(entry: CacheEntry) -> Self {
        Self::add(entry.key, entry.value, entry.ttl)
    }
}

/// Live cache state for one key, as exposed by the cache collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    #[serde(default, with = "ttl_secs")]
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }
}

/// TTLs as optional whole seconds
mod ttl_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(ttl: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ttl {
            Some(ttl) => serializer.serialize_some(&ttl.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
