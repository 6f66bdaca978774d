//! Command dispatcher - routes broker messages to gate controllers

use crate::gate::GateController;
use gate_shared::{Command, CommandMatcher, Lane};
use tracing::debug;

/// Routes decoded commands to the lane controllers
pub struct CommandDispatcher {
    matcher: CommandMatcher,
    entry: GateController,
    exit: GateController,
}

impl CommandDispatcher {
    pub fn new(matcher: CommandMatcher, entry: GateController, exit: GateController) -> Self {
        Self {
            matcher,
            entry,
            exit,
        }
    }

    /// Topics the channel client must subscribe to
    pub fn topics(&self) -> [&str; 2] {
        self.matcher.topics()
    }

    pub fn gate(&self, lane: Lane) -> &GateController {
        match lane {
            Lane::Entry => &self.entry,
            Lane::Exit => &self.exit,
        }
    }

    /// Decode a message and open the addressed gate, if any
    ///
    /// Runs in the message delivery context; unknown commands are dropped
    /// without a response.
    pub async fn dispatch(&self, topic: &[u8], payload: &[u8]) -> Command {
        let command = self.matcher.parse(topic, payload);

        match command.open_lane() {
            Some(lane) => self.gate(lane).open().await,
            None => debug!(
                "Dropping unrecognized command: topic={} payload={}",
                String::from_utf8_lossy(topic),
                String::from_utf8_lossy(payload)
            ),
        }

        command
    }
}
