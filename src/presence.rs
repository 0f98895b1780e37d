use crate::logs::LogLine;
use itertools::Itertools;
use regex::Regex;
use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
};

pub const SERVER_STARTED: &str = "SERVER STARTED";
pub const SERVER_EXITED: &str = "Server exited";
pub const FULLY_CONNECTED: &str = "fully connected";
pub const DISCONNECTED_PLAYER: &str = "disconnected player";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Connected(String),
    Disconnected(String),
}

type EventCtor = fn(String) -> PresenceEvent;

static PATTERNS: LazyLock<Vec<(Regex, EventCtor)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r#""(.+?)" fully connected"#).unwrap(),
            PresenceEvent::Connected as EventCtor,
        ),
        (
            Regex::new(r#""(.+?)" disconnected player"#).unwrap(),
            PresenceEvent::Disconnected as EventCtor,
        ),
    ]
});

/// Every presence event a log line carries, in table order, so a disconnect
/// on the same line overrides a connect.
pub fn classify(text: &str) -> impl Iterator<Item = PresenceEvent> + '_ {
    PATTERNS.iter().filter_map(move |(pattern, ctor)| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|name| ctor(name.as_str().to_string()))
    })
}

/// Names currently inferred online, iterated in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet(BTreeSet<String>);

impl PresenceSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PresenceSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Folds ordered events into the set of names whose last event was a connect.
pub fn reduce(events: impl IntoIterator<Item = PresenceEvent>) -> PresenceSet {
    let mut state = HashMap::new();
    for event in events {
        match event {
            PresenceEvent::Connected(name) => state.insert(name, true),
            PresenceEvent::Disconnected(name) => state.insert(name, false),
        };
    }
    state
        .into_iter()
        .filter_map(|(name, online)| online.then_some(name))
        .collect()
}

/// Sorts lines by timestamp (stable on ties) and reduces the events they carry.
pub fn presence_from_lines(lines: &[LogLine]) -> PresenceSet {
    reduce(
        lines
            .iter()
            .sorted_by_key(|line| line.timestamp)
            .flat_map(|line| classify(&line.text)),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMarker {
    Started,
    Exited,
}

impl ServerMarker {
    pub fn classify(text: &str) -> Option<Self> {
        if text.contains(SERVER_STARTED) {
            Some(ServerMarker::Started)
        } else if text.contains(SERVER_EXITED) {
            Some(ServerMarker::Exited)
        } else {
            None
        }
    }
}

fn latest_marker(lines: &[LogLine], want: impl Fn(ServerMarker) -> bool) -> Option<(u64, ServerMarker)> {
    lines
        .iter()
        .filter_map(|line| ServerMarker::classify(&line.text).map(|m| (line.timestamp, m)))
        .filter(|(_, marker)| want(*marker))
        // max_by_key keeps the last of equal keys, i.e. the later-stored line
        .max_by_key(|(timestamp, _)| *timestamp)
}

/// Online iff the most recent start/exit marker is a start. No marker means offline.
pub fn server_online(lines: &[LogLine]) -> bool {
    matches!(latest_marker(lines, |_| true), Some((_, ServerMarker::Started)))
}

/// Timestamp of the most recent server start, if any.
pub fn last_server_start(lines: &[LogLine]) -> Option<u64> {
    latest_marker(lines, |m| m == ServerMarker::Started).map(|(timestamp, _)| timestamp)
}
