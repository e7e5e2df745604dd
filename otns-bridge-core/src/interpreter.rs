//! Status line interpretation
//!
//! Device output is heterogeneous free text. Each recognizer below is a
//! regular expression paired with a handler producing a typed [`LineEvent`];
//! recognizers are tried in order and the first match wins.

use chrono::NaiveDateTime;
use regex::{Captures, Regex};
use std::collections::HashSet;

use crate::node::{Role, Status};

const STATUS: &str = r"wpantund\[(\d+)\]: NCP => .*\[OTNS\] ([\w\d]+=[A-Fa-f0-9,rsdn]+)";
const EXTADDR_STATUS: &str = r"extaddr=([A-Fa-f0-9]{16})";
const ROLE_STATUS: &str = r"role=([0-4])";
const CHILD_ADDED_STATUS: &str = r"child_added=([A-Fa-f0-9]{16})";
const CHILD_REMOVED_STATUS: &str = r"child_removed=([A-Fa-f0-9]{16})";
const ROUTER_ADDED_STATUS: &str = r"router_added=([A-Fa-f0-9]{16})";
const ROUTER_REMOVED_STATUS: &str = r"router_removed=([A-Fa-f0-9]{16})";
const WPANTUND_STARTED: &str = r"wpantund\[(\d+)\]: Starting wpantund";
const NETNS_DELETED: &str = r"sudo ip netns del";
const EXTADDR_RESPONSE: &str = r"\[stdout\] \[([A-Fa-f0-9]{16})\]";
const NCP_VERSION: &str = r#"NCP is running "([^"]+)""#;
const COMMIT: &str = r"-g([0-9A-Fa-f]{7,40})\b";

const LOG_LINE: &str = r"\[([\d\s,:-]+)\] \[([\w\d.-]+)\] \[(\w+)\] (.+)";
const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

const SET_UP_CLASS: &str = r"SET UP CLASS (\w+)";
const RUNNING_TEST: &str = r"RUNNING TEST (\w+\.\w+)";
const TEAR_DOWN_DONE: &str = r"TEAR DOWN CLASS DONE (\w+)";
const TEAR_DOWN_CLASS: &str = r"TEAR DOWN CLASS (\w+)";

/// A line of the harness log format
/// `[<timestamp>] [<entity>] [<level>] <message>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: NaiveDateTime,
    pub entity: String,
    pub level: String,
    pub message: String,
}

/// Firmware identification reported by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub commit: Option<String>,
}

/// What a single device line means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Per-node status push
    Status(Status),
    /// Device process started; the node should exist
    Started,
    /// Device namespace torn down; the node should go away
    Stopped,
    /// Extended address read back directly from the device
    Extaddr(u64),
    /// Firmware banner, reported as network metadata
    Version(VersionInfo),
}

/// Result of interpreting a line tagged with its entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Title(String),
    Device { device: String, event: LineEvent },
}

type Handler = fn(&Captures<'_>) -> Option<LineEvent>;
type StatusHandler = fn(&Captures<'_>) -> Option<Status>;
type TitleHandler = fn(&Captures<'_>) -> String;

fn recognize<T>(
    pattern: &str,
    handler: fn(&Captures<'_>) -> T,
) -> Result<(Regex, fn(&Captures<'_>) -> T), regex::Error> {
    Ok((Regex::new(pattern)?, handler))
}

pub struct Interpreter {
    root: String,
    devices: HashSet<String>,
    status: Regex,
    statuses: Vec<(Regex, StatusHandler)>,
    lines: Vec<(Regex, Handler)>,
    titles: Vec<(Regex, TitleHandler)>,
    banner: Regex,
    commit: Regex,
    log_line: Regex,
}

fn hex_addr(caps: &Captures<'_>) -> Option<u64> {
    u64::from_str_radix(&caps[1], 16).ok()
}

impl Interpreter {
    /// Builds an interpreter that accepts lines from `root.<device>...`
    /// entities for the given devices, plus title lines from `root` itself.
    pub fn new<I, S>(root: impl Into<String>, devices: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statuses = vec![
            recognize(EXTADDR_STATUS, |c| hex_addr(c).map(Status::Extaddr))?,
            recognize(ROLE_STATUS, |c| {
                c[1].parse::<u8>()
                    .ok()
                    .and_then(Role::from_repr)
                    .map(Status::Role)
            })?,
            recognize(CHILD_ADDED_STATUS, |c| hex_addr(c).map(Status::ChildAdded))?,
            recognize(CHILD_REMOVED_STATUS, |c| hex_addr(c).map(Status::ChildRemoved))?,
            recognize(ROUTER_ADDED_STATUS, |c| hex_addr(c).map(Status::RouterAdded))?,
            recognize(ROUTER_REMOVED_STATUS, |c| hex_addr(c).map(Status::RouterRemoved))?,
        ];

        let lines = vec![
            recognize(WPANTUND_STARTED, |_| Some(LineEvent::Started))?,
            recognize(NETNS_DELETED, |_| Some(LineEvent::Stopped))?,
            recognize(EXTADDR_RESPONSE, |c| hex_addr(c).map(LineEvent::Extaddr))?,
        ];

        let titles = vec![
            recognize(SET_UP_CLASS, |c| format!("{}.set_up", &c[1]))?,
            recognize(RUNNING_TEST, |c| c[1].to_string())?,
            recognize(TEAR_DOWN_DONE, |_| String::new())?,
            recognize(TEAR_DOWN_CLASS, |c| format!("{}.tear_down", &c[1]))?,
        ];

        Ok(Self {
            root: root.into(),
            devices: devices.into_iter().map(Into::into).collect(),
            status: Regex::new(STATUS)?,
            statuses,
            lines,
            titles,
            banner: Regex::new(NCP_VERSION)?,
            commit: Regex::new(COMMIT)?,
            log_line: Regex::new(LOG_LINE)?,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn is_known_device(&self, device: &str) -> bool {
        self.devices.contains(device)
    }

    /// Splits a combined log line into its parts; `None` for anything not
    /// in the harness format.
    pub fn parse_log_line(&self, line: &str) -> Option<LogLine> {
        let caps = self.log_line.captures(line)?;
        let timestamp =
            NaiveDateTime::parse_from_str(caps[1].trim(), LOG_TIMESTAMP_FORMAT).ok()?;
        Some(LogLine {
            timestamp,
            entity: caps[2].to_string(),
            level: caps[3].to_string(),
            message: caps[4].trim_end().to_string(),
        })
    }

    /// Interprets a line tagged with the dot-separated entity that logged it.
    ///
    /// Lines from unknown devices are ignored; lines from the root entity are
    /// only checked for test phase titles.
    pub fn interpret(&self, entity: &str, message: &str) -> Option<Directive> {
        let mut parts = entity.split('.');
        if parts.next() != Some(self.root.as_str()) {
            return None;
        }

        match parts.next() {
            None => self.interpret_title(message).map(Directive::Title),
            Some(device) if self.is_known_device(device) => self
                .interpret_device_line(message)
                .map(|event| Directive::Device {
                    device: device.to_string(),
                    event,
                }),
            Some(_) => None,
        }
    }

    fn interpret_title(&self, message: &str) -> Option<String> {
        self.titles
            .iter()
            .find_map(|(regex, handler)| regex.captures(message).map(|caps| handler(&caps)))
    }

    /// Interprets a line already known to come from one device
    pub fn interpret_device_line(&self, message: &str) -> Option<LineEvent> {
        if let Some(caps) = self.status.captures(message) {
            let inner = &caps[2];
            let status = self
                .statuses
                .iter()
                .find_map(|(regex, handler)| regex.captures(inner).and_then(|c| handler(&c)))
                .unwrap_or_else(|| Status::Raw(inner.to_string()));
            return Some(LineEvent::Status(status));
        }

        if let Some(event) = self
            .lines
            .iter()
            .find_map(|(regex, handler)| regex.captures(message).and_then(|c| handler(&c)))
        {
            return Some(event);
        }

        self.version_banner(message).map(LineEvent::Version)
    }

    fn version_banner(&self, message: &str) -> Option<VersionInfo> {
        let caps = self.banner.captures(message)?;
        let version = caps[1].split(';').next().unwrap_or_default().trim().to_string();
        let commit = self
            .commit
            .captures(&version)
            .map(|c| c[1].to_lowercase());
        Some(VersionInfo { version, commit })
    }
}
