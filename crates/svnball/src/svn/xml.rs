//! Parsers for `svn info --xml` and `svn ls --xml`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::InfoError;
use crate::svn::{ChildEntry, DirectoryListing, EntryKind};

/// Extract `info/entry/commit/@revision`, the last revision that changed the
/// queried path.
pub fn parse_info_revision(xml: &str) -> Result<u64, InfoError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                if name == "commit" && path_is(&path, &["info", "entry"]) {
                    return commit_revision(&e);
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if element_name(&e) == "commit" && path_is(&path, &["info", "entry"]) {
                    return commit_revision(&e);
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(InfoError::Parse(format!(
                    "malformed info XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    Err(InfoError::Parse(
        "no entry/commit revision in info output".to_string(),
    ))
}

#[derive(Default)]
struct PendingEntry {
    kind: Option<String>,
    name: Option<String>,
    revision: Option<u64>,
    date: Option<String>,
}

impl PendingEntry {
    fn finish(self) -> Result<(String, ChildEntry), InfoError> {
        let name = self
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| InfoError::Parse("list entry without a name".to_string()))?;
        let kind = match self.kind.as_deref() {
            Some("dir") => EntryKind::Dir,
            Some("file") => EntryKind::File,
            other => {
                return Err(InfoError::Parse(format!(
                    "list entry {name:?} has unknown kind {other:?}"
                )));
            }
        };
        let revision = self.revision.ok_or_else(|| {
            InfoError::Parse(format!("list entry {name:?} has no commit revision"))
        })?;
        let date = self
            .date
            .ok_or_else(|| InfoError::Parse(format!("list entry {name:?} has no commit date")))?;
        let commit_date = parse_date(&date)?;

        Ok((
            name,
            ChildEntry {
                kind,
                revision,
                commit_date,
            },
        ))
    }
}

/// Collect `lists/list/entry` elements keyed by entry name.
pub fn parse_listing(xml: &str) -> Result<DirectoryListing, InfoError> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut entries = BTreeMap::new();
    let mut pending: Option<PendingEntry> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                if path.is_empty() && name == "lists" {
                    saw_root = true;
                }
                if name == "entry" && path_is(&path, &["lists", "list"]) {
                    pending = Some(PendingEntry {
                        kind: attribute(&e, b"kind"),
                        ..PendingEntry::default()
                    });
                } else if name == "commit" {
                    if let Some(entry) = pending.as_mut() {
                        entry.revision = commit_revision(&e).ok();
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if element_name(&e) == "commit" {
                    if let Some(entry) = pending.as_mut() {
                        entry.revision = commit_revision(&e).ok();
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let Some(entry) = pending.as_mut() else {
                    continue;
                };
                let value = text
                    .unescape()
                    .map_err(|e| InfoError::Parse(format!("bad text in list XML: {e}")))?
                    .trim()
                    .to_string();
                match path.last().map(String::as_str) {
                    Some("name") => entry.name = Some(value),
                    Some("date") if path.iter().any(|p| p == "commit") => {
                        entry.date = Some(value)
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("entry") {
                    if let Some(entry) = pending.take() {
                        let (name, child) = entry.finish()?;
                        entries.insert(name, child);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(InfoError::Parse(format!(
                    "malformed list XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if !saw_root {
        return Err(InfoError::Parse("no <lists> element in ls output".to_string()));
    }

    Ok(DirectoryListing { entries })
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn commit_revision(e: &BytesStart<'_>) -> Result<u64, InfoError> {
    let raw = attribute(e, b"revision")
        .ok_or_else(|| InfoError::Parse("commit element without revision".to_string()))?;
    raw.trim()
        .parse()
        .map_err(|_| InfoError::Parse(format!("invalid revision {raw:?}")))
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, InfoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| InfoError::Parse(format!("invalid commit date {raw:?}: {e}")))
}

fn path_is(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}
