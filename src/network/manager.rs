//! Connectivity manager - drives the attach state machine over a network link

use super::link::NetworkLink;
use gate_shared::{ConnectivityState, LinkAction, LinkEvent, LinkOutcome, LinkStatus};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Owns the attach retry state of one network link
pub struct ConnectivityManager {
    link: Arc<dyn NetworkLink>,
    state: Mutex<ConnectivityState>,
    status_tx: watch::Sender<LinkStatus>,
}

impl ConnectivityManager {
    pub fn new(link: Arc<dyn NetworkLink>, max_attempts: u32) -> Self {
        let (status_tx, _) = watch::channel(LinkStatus::Idle);
        Self {
            link,
            state: Mutex::new(ConnectivityState::new(max_attempts)),
            status_tx,
        }
    }

    /// Watch attachment status changes
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> LinkStatus {
        *self.status_tx.borrow()
    }

    /// The binary ready signal
    pub fn is_ready(&self) -> bool {
        self.status() == LinkStatus::Connected
    }

    /// Retries spent since the last successful attachment
    pub async fn attempt_count(&self) -> u32 {
        self.state.lock().await.attempt_count()
    }

    /// Bring the link up, returning once connected or out of retries
    pub async fn start(&self) -> LinkOutcome {
        info!("[NET] Attaching via {}...", self.link.name());
        self.drive(LinkEvent::Started).await
    }

    /// Re-attach whenever the established link drops
    ///
    /// The task ends once the retry budget is exhausted.
    pub fn supervise(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                let reason = manager.link.wait_lost().await;
                warn!("[NET] Link lost: {}", reason);

                match manager.drive(LinkEvent::Disconnected { reason }).await {
                    LinkOutcome::Connected => info!("[NET] Link restored"),
                    LinkOutcome::Failed => {
                        error!("[NET] Link could not be restored, giving up");
                        break;
                    }
                }
            }
        })
    }

    /// Feed events through the state machine until it settles
    async fn drive(&self, first: LinkEvent) -> LinkOutcome {
        let mut event = first;

        loop {
            let action = self.apply(event).await;

            event = match action {
                LinkAction::Attach => self.attempt().await,
                LinkAction::Signal(outcome) => return outcome,
                LinkAction::None => return self.wait_settled().await,
            };
        }
    }

    async fn apply(&self, event: LinkEvent) -> LinkAction {
        let mut state = self.state.lock().await;
        let action = state.handle(event);
        self.status_tx.send_replace(state.status());
        action
    }

    /// One attach attempt, reported as a link event
    async fn attempt(&self) -> LinkEvent {
        match self.link.attach().await {
            Ok(address) => {
                info!("[NET] Got IP: {}", address);
                LinkEvent::AddressAcquired { address }
            }
            Err(e) => {
                let state = self.state.lock().await;
                if state.attempt_count() < state.max_attempts() {
                    info!(
                        "[NET] Attach failed ({}), retrying {}/{}",
                        e,
                        state.attempt_count() + 1,
                        state.max_attempts()
                    );
                } else {
                    error!("[NET] Attach failed ({}), no retries left", e);
                }
                LinkEvent::Disconnected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Another caller is attaching; wait for its outcome
    async fn wait_settled(&self) -> LinkOutcome {
        let mut status_rx = self.status_tx.subscribe();
        let settled = match status_rx.wait_for(|status| status.is_settled()).await {
            Ok(status) => *status,
            Err(_) => LinkStatus::Failed,
        };

        if settled == LinkStatus::Connected {
            LinkOutcome::Connected
        } else {
            LinkOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2));

    /// Link that answers attach attempts from a script, failing once it runs out
    #[derive(Default)]
    struct ScriptedLink {
        script: StdMutex<VecDeque<bool>>,
        attempts: StdMutex<u32>,
        losses: StdMutex<u32>,
        delay: Duration,
    }

    impl ScriptedLink {
        fn new(script: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.iter().copied().collect()),
                ..Default::default()
            })
        }

        fn slow(script: &[bool], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.iter().copied().collect()),
                delay,
                ..Default::default()
            })
        }

        fn attempts(&self) -> u32 {
            *self.attempts.lock().unwrap()
        }
    }

    #[async_trait]
    impl NetworkLink for ScriptedLink {
        async fn attach(&self) -> Result<IpAddr> {
            *self.attempts.lock().unwrap() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.script.lock().unwrap().pop_front() {
                Some(true) => Ok(ADDRESS),
                _ => Err(anyhow!("association rejected")),
            }
        }

        async fn wait_lost(&self) -> String {
            let lost = {
                let mut losses = self.losses.lock().unwrap();
                if *losses > 0 {
                    *losses -= 1;
                    true
                } else {
                    false
                }
            };
            if lost {
                "beacon timeout".into()
            } else {
                std::future::pending().await
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_connects_first_try() {
        let link = ScriptedLink::new(&[true]);
        let manager = ConnectivityManager::new(link.clone(), 10);
        assert!(!manager.is_ready());

        assert_eq!(manager.start().await, LinkOutcome::Connected);
        assert!(manager.is_ready());
        assert_eq!(link.attempts(), 1);
        assert_eq!(manager.attempt_count().await, 0);
    }

    #[tokio::test]
    async fn test_retries_until_connected() {
        let link = ScriptedLink::new(&[false, false, false, true]);
        let manager = ConnectivityManager::new(link.clone(), 10);

        assert_eq!(manager.start().await, LinkOutcome::Connected);
        assert_eq!(link.attempts(), 4);
        assert_eq!(manager.attempt_count().await, 0);
        assert_eq!(manager.status(), LinkStatus::Connected);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let link = ScriptedLink::new(&[]);
        let manager = ConnectivityManager::new(link.clone(), 3);

        assert_eq!(manager.start().await, LinkOutcome::Failed);
        // First attempt plus three retries
        assert_eq!(link.attempts(), 4);
        assert_eq!(manager.attempt_count().await, 3);
        assert_eq!(manager.status(), LinkStatus::Failed);
        assert!(!manager.is_ready());
    }

    #[tokio::test]
    async fn test_second_start_does_not_reattach() {
        let link = ScriptedLink::new(&[true]);
        let manager = ConnectivityManager::new(link.clone(), 3);

        assert_eq!(manager.start().await, LinkOutcome::Connected);
        assert_eq!(manager.start().await, LinkOutcome::Connected);
        assert_eq!(link.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_start_waits_for_outcome() {
        let link = ScriptedLink::slow(&[false, true], Duration::from_millis(200));
        let manager = ConnectivityManager::new(link.clone(), 3);

        let (first, second) = tokio::join!(manager.start(), async {
            // Join while the first attach is still in flight
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(manager.status(), LinkStatus::Connecting);
            manager.start().await
        });

        assert_eq!(first, LinkOutcome::Connected);
        assert_eq!(second, LinkOutcome::Connected);
        assert_eq!(link.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_start_sees_failure() {
        let link = ScriptedLink::slow(&[], Duration::from_millis(200));
        let manager = ConnectivityManager::new(link.clone(), 1);

        let (first, second) = tokio::join!(manager.start(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            manager.start().await
        });

        assert_eq!(first, LinkOutcome::Failed);
        assert_eq!(second, LinkOutcome::Failed);
        assert_eq!(link.attempts(), 2);
    }

    #[tokio::test]
    async fn test_status_watch_follows_transitions() {
        let link = ScriptedLink::new(&[false, true]);
        let manager = ConnectivityManager::new(link, 3);
        let mut status_rx = manager.subscribe();

        manager.start().await;
        assert!(status_rx.has_changed().unwrap());
        assert_eq!(*status_rx.borrow_and_update(), LinkStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_reattaches_after_loss() {
        let link = ScriptedLink::new(&[true, false, true]);
        *link.losses.lock().unwrap() = 1;
        let manager = Arc::new(ConnectivityManager::new(link.clone(), 3));

        assert_eq!(manager.start().await, LinkOutcome::Connected);
        let _supervisor = manager.supervise();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(link.attempts(), 3);
        assert!(manager.is_ready());
        assert_eq!(manager.attempt_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_stops_when_exhausted() {
        let link = ScriptedLink::new(&[true]);
        *link.losses.lock().unwrap() = 1;
        let manager = Arc::new(ConnectivityManager::new(link.clone(), 2));

        manager.start().await;
        let supervisor = manager.supervise();

        tokio::time::timeout(Duration::from_secs(1), supervisor)
            .await
            .unwrap()
            .unwrap();
        // Initial attach, then two retries after the loss
        assert_eq!(link.attempts(), 3);
        assert_eq!(manager.status(), LinkStatus::Failed);
    }
}
