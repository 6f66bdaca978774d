//! Inbound Command Matching
//!
//! Turns a raw (topic, payload) pair from the broker into a [`Command`].
//! Matching is exact on both length and bytes: no trimming, no case folding,
//! no prefix matches.

use crate::{defaults, Lane};

/// What a command asks the gate to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Open,
    Unknown,
}

/// A decoded command, discarded after dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Lane the topic addressed, `None` when the topic is not a command topic
    pub lane: Option<Lane>,
    pub action: GateAction,
}

impl Command {
    /// Open the given lane
    pub fn open(lane: Lane) -> Self {
        Self {
            lane: Some(lane),
            action: GateAction::Open,
        }
    }

    /// Unrecognized topic or payload
    pub fn unknown(lane: Option<Lane>) -> Self {
        Self {
            lane,
            action: GateAction::Unknown,
        }
    }

    /// Returns the lane to open, if this command opens one
    pub fn open_lane(&self) -> Option<Lane> {
        match (self.lane, self.action) {
            (Some(lane), GateAction::Open) => Some(lane),
            _ => None,
        }
    }
}

/// Maps command topics and the open token to commands
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    entry_topic: String,
    exit_topic: String,
    open_token: String,
}

impl Default for CommandMatcher {
    fn default() -> Self {
        Self::new(
            defaults::ENTRY_TOPIC,
            defaults::EXIT_TOPIC,
            defaults::OPEN_TOKEN,
        )
    }
}

impl CommandMatcher {
    pub fn new(
        entry_topic: impl Into<String>,
        exit_topic: impl Into<String>,
        open_token: impl Into<String>,
    ) -> Self {
        Self {
            entry_topic: entry_topic.into(),
            exit_topic: exit_topic.into(),
            open_token: open_token.into(),
        }
    }

    /// Topic for a lane
    pub fn topic(&self, lane: Lane) -> &str {
        match lane {
            Lane::Entry => &self.entry_topic,
            Lane::Exit => &self.exit_topic,
        }
    }

    /// All topics that must be subscribed, entry first
    pub fn topics(&self) -> [&str; 2] {
        [&self.entry_topic, &self.exit_topic]
    }

    /// Lane addressed by a topic
    pub fn lane_for(&self, topic: &[u8]) -> Option<Lane> {
        Lane::ALL
            .into_iter()
            .find(|lane| self.topic(*lane).as_bytes() == topic)
    }

    /// Decode a raw broker message
    pub fn parse(&self, topic: &[u8], payload: &[u8]) -> Command {
        match self.lane_for(topic) {
            Some(lane) if payload == self.open_token.as_bytes() => Command::open(lane),
            lane => Command::unknown(lane),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_open() {
        let matcher = CommandMatcher::default();
        let cmd = matcher.parse(b"parking/gate/entry", b"open");
        assert_eq!(cmd, Command::open(Lane::Entry));
        assert_eq!(cmd.open_lane(), Some(Lane::Entry));
    }

    #[test]
    fn test_exit_open() {
        let matcher = CommandMatcher::default();
        let cmd = matcher.parse(b"parking/gate/exit", b"open");
        assert_eq!(cmd.open_lane(), Some(Lane::Exit));
    }

    #[test]
    fn test_payload_must_match_exactly() {
        let matcher = CommandMatcher::default();
        let payloads: [&[u8]; 8] = [b"Open", b"open ", b" open", b"ope", b"openn", b"close", b"", b"OPEN"];
        for payload in payloads {
            let cmd = matcher.parse(b"parking/gate/entry", payload);
            assert_eq!(cmd.action, GateAction::Unknown, "payload {:?}", payload);
            assert_eq!(cmd.lane, Some(Lane::Entry));
            assert_eq!(cmd.open_lane(), None);
        }
    }

    #[test]
    fn test_topic_must_match_exactly() {
        let matcher = CommandMatcher::default();
        let topics: [&[u8]; 6] = [
            b"parking/gate",
            b"parking/gate/entr",
            b"parking/gate/entry/",
            b"parking/gate/entryx",
            b"PARKING/GATE/ENTRY",
            b"",
        ];
        for topic in topics {
            let cmd = matcher.parse(topic, b"open");
            assert_eq!(cmd, Command::unknown(None), "topic {:?}", topic);
        }
    }

    #[test]
    fn test_custom_topics() {
        let matcher = CommandMatcher::new("lot/a/in", "lot/a/out", "go");
        assert_eq!(matcher.topics(), ["lot/a/in", "lot/a/out"]);
        assert_eq!(matcher.parse(b"lot/a/out", b"go").open_lane(), Some(Lane::Exit));
        assert_eq!(matcher.parse(b"lot/a/out", b"open").open_lane(), None);
    }
}
