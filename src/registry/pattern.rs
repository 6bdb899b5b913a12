//! A registry mapping regular expressions over model identifiers to payloads,
//! with a memoizing resolution cache in front of it.
//!
//! Resolution probes the cache under a shared lock. On a miss it takes the
//! exclusive lock, probes the cache again and then scans the registered
//! patterns in order, caching the first payload whose pattern matches.
//! Every successful registration drops the whole cache, so no resolution made
//! before a registration survives it.
//!
//! Patterns are tested with unanchored search semantics (`Regex::is_match`);
//! use `^` and `$` to anchor them.
//!
//! ## Precedence
//!
//! When more than one pattern matches an identifier, the pattern registered
//! first wins. Registering an existing pattern again replaces its payload
//! but keeps its position. Callers should not lean on this: registering
//! mutually exclusive patterns keeps resolution independent of start-up order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use regex::Regex;

use crate::error::{Error, Result};

struct PatternEntry<T> {
    pattern: String,
    regex: Regex,
    payload: T,
}

struct Inner<T> {
    entries: Vec<PatternEntry<T>>,
    cache: HashMap<String, T>,
}

pub struct PatternRegistry<T> {
    inner: RwLock<Inner<T>>,
    scans: AtomicU64,
}

impl<T> Default for PatternRegistry<T> {
    fn default() -> Self {
        PatternRegistry {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                cache: HashMap::new(),
            }),
            scans: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> PatternRegistry<T> {
    pub fn new() -> PatternRegistry<T> {
        PatternRegistry::default()
    }

    /// Associates `payload` with `pattern`, replacing any payload the pattern
    /// already had.
    pub fn register(&self, pattern: &str, payload: T) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut inner = self.inner.write();

        match inner.entries.iter_mut().find(|e| e.pattern == pattern) {
            Some(entry) => {
                tracing::debug!(pattern, "replacing registered pattern");
                entry.payload = payload;
            }
            None => {
                tracing::debug!(pattern, "registering pattern");
                inner.entries.push(PatternEntry {
                    pattern: pattern.to_string(),
                    regex,
                    payload,
                });
            }
        }

        inner.cache.clear();

        Ok(())
    }

    /// Registers `payload` under each pattern in turn, stopping at the first
    /// invalid one.
    pub fn register_all<I, S>(&self, patterns: I, payload: T) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.register(pattern.as_ref(), payload.clone())?;
        }

        Ok(())
    }

    /// Returns the payload of the first pattern matching `identifier`.
    pub fn resolve(&self, identifier: &str) -> Result<T> {
        {
            let inner = self.inner.read();

            if let Some(payload) = inner.cache.get(identifier) {
                tracing::trace!(identifier, "resolved from cache");
                return Ok(payload.clone());
            }
        }

        let mut inner = self.inner.write();

        // Another resolver may have filled the cache while we waited
        if let Some(payload) = inner.cache.get(identifier) {
            return Ok(payload.clone());
        }

        self.scans.fetch_add(1, Ordering::Relaxed);

        let found = inner
            .entries
            .iter()
            .find(|e| e.regex.is_match(identifier))
            .map(|e| (e.pattern.clone(), e.payload.clone()));

        match found {
            Some((pattern, payload)) => {
                tracing::debug!(identifier, pattern = %pattern, "resolved by scan");
                inner.cache.insert(identifier.to_string(), payload.clone());
                Ok(payload)
            }
            None => Err(Error::NotFound(identifier.to_string())),
        }
    }

    /// A snapshot of the registered patterns, in precedence order
    pub fn list(&self) -> Vec<String> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|e| e.pattern.clone())
            .collect()
    }

    /// A snapshot of every payload accepted by `filter`, in precedence order
    pub fn payloads<F>(&self, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| filter(&e.payload))
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Removes every pattern and cached resolution
    pub fn clear(&self) {
        let mut inner = self.inner.write();

        inner.entries.clear();
        inner.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of times resolution had to scan the patterns
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }
}
