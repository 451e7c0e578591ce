//! Shared connectivity state with change notifications.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        self == ConnectivityState::Online
    }
}

/// Process-wide online/offline flag. The embedding surface flips it from
/// whatever platform signal it has; subscribers wake on every transition.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        !self.state().is_online()
    }

    pub fn set_online(&self) {
        self.tx.send_replace(ConnectivityState::Online);
    }

    pub fn set_offline(&self) {
        self.tx.send_replace(ConnectivityState::Offline);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transitions_are_observed_by_subscribers() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        assert!(monitor.is_offline());

        let mut rx = monitor.subscribe();
        monitor.set_online();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectivityState::Online);
        assert!(!monitor.is_offline());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectivityState::Offline).unwrap(),
            "\"offline\""
        );
    }
}
