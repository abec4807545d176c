//! Live stats wire format and decoder
//!
//! Each inbound text frame is one JSON object. Every field is optional and a
//! single message may carry any subset of them:
//!
//! ```text
//! { live?: [RecentEvent], lifetime?: {username: [found, scanned]},
//!   global?: [found, scanned], project?: {project: [found, scanned]},
//!   live_new?: RecentEvent }
//! ```
//!
//! Unknown keys are ignored so newer servers can add fields.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::collections::HashMap,
};

/// A `{found, scanned}` counter pair, carried on the wire as `[found, scanned]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct Counts {
    pub found: u64,
    pub scanned: u64,
}

impl Counts {
    pub fn new(found: u64, scanned: u64) -> Self {
        Self { found, scanned }
    }

    pub fn add(&mut self, found: u64, scanned: u64) {
        self.found += found;
        self.scanned += scanned;
    }

    fn is_valid(&self) -> bool {
        self.found <= self.scanned
    }
}

impl From<(u64, u64)> for Counts {
    fn from((found, scanned): (u64, u64)) -> Self {
        Self { found, scanned }
    }
}

impl From<Counts> for (u64, u64) {
    fn from(counts: Counts) -> Self {
        (counts.found, counts.scanned)
    }
}

/// One finished work item reported by a scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEvent {
    pub username: String,
    pub project: String,
    pub found: u64,
    pub scanned: u64,
}

impl RecentEvent {
    pub fn counts(&self) -> Counts {
        Counts::new(self.found, self.scanned)
    }
}

/// A decoded message. `None` means "no update for that view".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default, rename = "live")]
    pub live_snapshot: Option<Vec<RecentEvent>>,
    #[serde(default, rename = "lifetime")]
    pub lifetime_snapshot: Option<HashMap<String, Counts>>,
    #[serde(default, rename = "global")]
    pub global_snapshot: Option<Counts>,
    #[serde(default, rename = "project")]
    pub project_snapshot: Option<HashMap<String, Counts>>,
    #[serde(default, rename = "live_new")]
    pub delta: Option<RecentEvent>,
}

impl Envelope {
    pub fn is_empty(&self) -> bool {
        self.live_snapshot.is_none()
            && self.lifetime_snapshot.is_none()
            && self.global_snapshot.is_none()
            && self.project_snapshot.is_none()
            && self.delta.is_none()
    }

    pub fn has_snapshot(&self) -> bool {
        self.live_snapshot.is_some()
            || self.lifetime_snapshot.is_some()
            || self.global_snapshot.is_some()
            || self.project_snapshot.is_some()
    }

    fn validate(&self) -> Result<(), DecodeError> {
        let events = self.live_snapshot.iter().flatten().chain(self.delta.iter());
        for event in events {
            if !event.counts().is_valid() {
                return Err(DecodeError::Invalid(format!(
                    "event for {}/{} has found {} > scanned {}",
                    event.username, event.project, event.found, event.scanned
                )));
            }
        }

        let maps = [("lifetime", &self.lifetime_snapshot), ("project", &self.project_snapshot)];
        for (view, map) in maps {
            if let Some((key, counts)) = map.iter().flatten().find(|(_, c)| !c.is_valid()) {
                return Err(DecodeError::Invalid(format!(
                    "{} entry {} has found {} > scanned {}",
                    view, key, counts.found, counts.scanned
                )));
            }
        }

        match self.global_snapshot {
            Some(global) if !global.is_valid() => Err(DecodeError::Invalid(format!(
                "global has found {} > scanned {}",
                global.found, global.scanned
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    /// Not a JSON object of the expected shape
    Malformed(serde_json::Error),
    /// Well-formed but violates `found <= scanned`
    Invalid(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed(e) => write!(f, "Malformed stats message: {}", e),
            DecodeError::Invalid(msg) => write!(f, "Invalid stats message: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Malformed(e) => Some(e),
            DecodeError::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed(e)
    }
}

fn malformed(msg: &str) -> DecodeError {
    DecodeError::Malformed(serde::de::Error::custom(msg))
}

/// Reject array-shaped messages and events, which serde would otherwise
/// accept by field position
fn require_objects(value: &Value) -> Result<(), DecodeError> {
    let message = value
        .as_object()
        .ok_or_else(|| malformed("stats message must be a JSON object"))?;

    if let Some(delta) = message.get("live_new") {
        if !delta.is_object() && !delta.is_null() {
            return Err(malformed("live_new must be a JSON object"));
        }
    }
    if let Some(Value::Array(events)) = message.get("live") {
        if events.iter().any(|event| !event.is_object()) {
            return Err(malformed("live entries must be JSON objects"));
        }
    }
    Ok(())
}

/// Parse one raw inbound frame
pub fn decode(raw: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    require_objects(&value)?;

    let envelope: Envelope = serde_json::from_value(value)?;
    envelope.validate()?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delta() {
        let envelope = decode(
            r#"{"live_new": {"username":"alice","project":"p1","found":2,"scanned":100}}"#,
        )
        .unwrap();

        let delta = envelope.delta.unwrap();
        assert_eq!(delta.username, "alice");
        assert_eq!(delta.project, "p1");
        assert_eq!(delta.counts(), Counts::new(2, 100));
        assert!(envelope.live_snapshot.is_none());
        assert!(envelope.global_snapshot.is_none());
    }

    #[test]
    fn test_decode_full_snapshot() {
        let raw = r#"{
            "live": [{"username":"bob","project":"isgd","found":0,"scanned":50}],
            "lifetime": {"bob": [3, 900]},
            "global": [3, 900],
            "project": {"isgd": [3, 900]}
        }"#;

        let envelope = decode(raw).unwrap();

        assert_eq!(envelope.live_snapshot.as_ref().unwrap().len(), 1);
        assert_eq!(envelope.lifetime_snapshot.as_ref().unwrap()["bob"], Counts::new(3, 900));
        assert_eq!(envelope.global_snapshot, Some(Counts::new(3, 900)));
        assert_eq!(envelope.project_snapshot.as_ref().unwrap()["isgd"], Counts::new(3, 900));
        assert!(envelope.delta.is_none());
        assert!(envelope.has_snapshot());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let envelope = decode(
            r#"{"motd": "hello", "global": [1, 2], "live_new": {"username":"a","project":"p","found":0,"scanned":1,"extra":true}}"#,
        )
        .unwrap();

        assert_eq!(envelope.global_snapshot, Some(Counts::new(1, 2)));
        assert!(envelope.delta.is_some());
    }

    #[test]
    fn test_empty_object_is_empty_envelope() {
        let envelope = decode("{}").unwrap();
        assert!(envelope.is_empty());
        assert!(!envelope.has_snapshot());
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        for raw in ["", "not json", "{\"global\": [1,", "[1, 2]", r#"{"global": [-1, 5]}"#] {
            match decode(raw) {
                Err(DecodeError::Malformed(_)) => {}
                other => panic!("expected Malformed for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_array_shaped_messages_are_malformed() {
        let positional_delta = r#"[null, null, null, null, ["a", "p", 0, 9]]"#;
        for raw in [
            "[]",
            "[null, null, [1, 5]]",
            positional_delta,
            r#"{"live_new": ["a", "p", 0, 9]}"#,
            r#"{"live": [["a", "p", 0, 9]]}"#,
            "\"live\"",
            "42",
        ] {
            match decode(raw) {
                Err(DecodeError::Malformed(_)) => {}
                other => panic!("expected Malformed for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_null_fields_mean_no_update() {
        let envelope = decode(r#"{"live_new": null, "global": null}"#).unwrap();
        assert!(envelope.is_empty());
    }

    #[test]
    fn test_found_above_scanned_is_invalid() {
        let result = decode(r#"{"live_new": {"username":"a","project":"p","found":5,"scanned":1}}"#);
        assert!(matches!(result, Err(DecodeError::Invalid(_))));

        let result = decode(r#"{"project": {"p": [9, 3]}}"#);
        assert!(matches!(result, Err(DecodeError::Invalid(_))));
    }

    #[test]
    fn test_counts_serialize_as_pair() {
        let json = serde_json::to_string(&Counts::new(2, 100)).unwrap();
        assert_eq!(json, "[2,100]");
    }
}
