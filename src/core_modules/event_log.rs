// THEORY:
// A `TemporalEventLog` is the memory of one (gesture kind, zone) pair: when was
// the last PickUp at the Medication shelf, and the one before that? Rules only
// ever look at the most recent entry, so the log is newest-first and bounded;
// once it is full the oldest timestamp falls off the back.
//
// The `EventLogBook` owns every log. Logs are created the first time something
// is pushed to their key, and asking for a key that has never been pushed to
// behaves like asking an empty log.

use crate::core_modules::gesture::{GestureKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LOG_CAPACITY: usize = 32;

/// Identifies one history: a gesture kind at a named zone (or `"None"`).
///
/// Serialized as `"Kind@Zone"`, e.g. `"PickUp@Medication"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogKey {
    pub kind: GestureKind,
    pub zone: String,
}

impl LogKey {
    pub fn new(kind: GestureKind, zone: impl Into<String>) -> Self {
        Self { kind, zone: zone.into() }
    }
}

impl fmt::Display for LogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.zone)
    }
}

impl FromStr for LogKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, zone) = s
            .split_once('@')
            .ok_or_else(|| format!("log key `{s}` is not of the form Kind@Zone"))?;
        if zone.is_empty() {
            return Err(format!("log key `{s}` has an empty zone"));
        }
        Ok(Self::new(kind.parse()?, zone))
    }
}

impl TryFrom<String> for LogKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogKey> for String {
    fn from(key: LogKey) -> Self {
        key.to_string()
    }
}

/// Bounded, newest-first timestamp history.
#[derive(Debug, Clone)]
pub struct TemporalEventLog {
    entries: VecDeque<Timestamp>,
    capacity: usize,
}

impl TemporalEventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, timestamp: Timestamp) {
        self.entries.push_front(timestamp);
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// The most recently pushed timestamp.
    pub fn peek(&self) -> Option<Timestamp> {
        self.entries.front().copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timestamp> {
        self.entries.iter()
    }
}

/// One lazily-created log per (kind, zone).
#[derive(Debug, Clone)]
pub struct EventLogBook {
    logs: HashMap<LogKey, TemporalEventLog>,
    capacity: usize,
}

impl Default for EventLogBook {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLogBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: HashMap::new(),
            capacity,
        }
    }

    pub fn push(&mut self, key: LogKey, timestamp: Timestamp) {
        let capacity = self.capacity;
        self.logs
            .entry(key)
            .or_insert_with(|| TemporalEventLog::new(capacity))
            .push(timestamp);
    }

    pub fn get(&self, key: &LogKey) -> Option<&TemporalEventLog> {
        self.logs.get(key)
    }

    pub fn peek(&self, key: &LogKey) -> Option<Timestamp> {
        self.logs.get(key).and_then(TemporalEventLog::peek)
    }

    pub fn count(&self, key: &LogKey) -> usize {
        self.logs.get(key).map_or(0, TemporalEventLog::count)
    }

    pub fn clear(&mut self, key: &LogKey) {
        if let Some(log) = self.logs.get_mut(key) {
            log.clear();
        }
    }

    /// Keys that currently hold at least one entry.
    pub fn keys(&self) -> impl Iterator<Item = &LogKey> {
        self.logs.iter().filter(|(_, log)| !log.is_empty()).map(|(key, _)| key)
    }
}
