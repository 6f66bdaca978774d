//! Network Attachment State Machine
//!
//! Linear bounded retry: every failure is retried immediately until
//! `max_attempts` retries have been spent, then the machine settles in
//! `Failed` until an address is acquired again.

/// Attachment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed,
}

impl LinkStatus {
    /// True once a terminal status has been reached
    pub fn is_settled(&self) -> bool {
        matches!(self, LinkStatus::Connected | LinkStatus::Failed)
    }
}

/// Events reported by the network link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Attachment was requested
    Started,
    /// An attach attempt failed, or an established link dropped
    Disconnected { reason: String },
    /// The link obtained an address
    AddressAcquired { address: std::net::IpAddr },
}

/// Terminal outcome signalled to waiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Connected,
    Failed,
}

/// What the driver of the state machine must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Issue an attach attempt
    Attach,
    /// Wake everyone waiting on the outcome
    Signal(LinkOutcome),
    /// Nothing to do
    None,
}

/// Attach retry bookkeeping
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    attempt_count: u32,
    max_attempts: u32,
    status: LinkStatus,
}

impl ConnectivityState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            status: LinkStatus::Idle,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Retries spent since the last successful attachment
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Apply an event and return the action it requires
    pub fn handle(&mut self, event: LinkEvent) -> LinkAction {
        match (self.status, event) {
            (LinkStatus::Idle, LinkEvent::Started) => {
                self.status = LinkStatus::Connecting;
                LinkAction::Attach
            }

            // Already attaching, attached, or given up
            (_, LinkEvent::Started) => LinkAction::None,

            (LinkStatus::Connecting | LinkStatus::Connected, LinkEvent::Disconnected { .. }) => {
                if self.attempt_count < self.max_attempts {
                    self.attempt_count += 1;
                    self.status = LinkStatus::Connecting;
                    LinkAction::Attach
                } else {
                    self.status = LinkStatus::Failed;
                    LinkAction::Signal(LinkOutcome::Failed)
                }
            }

            // Failure is signalled once; stray disconnects before start are ignored
            (LinkStatus::Failed | LinkStatus::Idle, LinkEvent::Disconnected { .. }) => {
                LinkAction::None
            }

            (LinkStatus::Connected, LinkEvent::AddressAcquired { .. }) => {
                self.attempt_count = 0;
                LinkAction::None
            }

            (_, LinkEvent::AddressAcquired { .. }) => {
                self.attempt_count = 0;
                self.status = LinkStatus::Connected;
                LinkAction::Signal(LinkOutcome::Connected)
            }
        }
    }
}
