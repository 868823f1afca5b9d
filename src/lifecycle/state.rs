//! Listener state machine.
//!
//! ```text
//! NotListening --listen--> Binding --ok--> Listening --close--> Closing --> NotListening
//!                          Binding --err or cancelled--> NotListening
//! Listening    --listen--> Listening      (fails, unchanged)
//! ```
//!
//! `Binding` and `Closing` are transitional: they reject further listen calls
//! like `Listening` does, but report no addresses.

use std::path::PathBuf;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::AddressRecord;

/// Resources owned while listening.
#[derive(Debug)]
pub struct ActiveListener {
    pub url: String,
    pub addresses: Vec<AddressRecord>,
    pub shutdown: Shutdown,
    pub accept_loops: Vec<JoinHandle<()>>,
    pub connections: ConnectionTracker,
    pub socket_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub enum ListenerState {
    #[default]
    NotListening,
    Binding,
    Listening(ActiveListener),
    Closing,
}

impl ListenerState {
    /// True while a listen call must be rejected.
    pub fn is_busy(&self) -> bool {
        !matches!(self, ListenerState::NotListening)
    }

    pub fn addresses(&self) -> Vec<AddressRecord> {
        match self {
            ListenerState::Listening(active) => active.addresses.clone(),
            _ => Vec::new(),
        }
    }

    /// True for `Binding` and `Closing`.
    pub fn is_transitional(&self) -> bool {
        matches!(self, ListenerState::Binding | ListenerState::Closing)
    }

    /// Take the active listener out, leaving `Closing` until its sockets
    /// are released.
    ///
    /// A bind in flight is left alone.
    pub fn begin_close(&mut self) -> Option<ActiveListener> {
        match std::mem::replace(self, ListenerState::Closing) {
            ListenerState::Listening(active) => Some(active),
            other => {
                *self = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> ActiveListener {
        ActiveListener {
            url: "http://127.0.0.1:1".into(),
            addresses: vec![AddressRecord::from_socket_addr("127.0.0.1:1".parse().unwrap())],
            shutdown: Shutdown::new(),
            accept_loops: Vec::new(),
            connections: ConnectionTracker::new(),
            socket_path: None,
        }
    }

    #[test]
    fn busy_states() {
        assert!(!ListenerState::NotListening.is_busy());
        assert!(ListenerState::Binding.is_busy());
        assert!(ListenerState::Listening(active()).is_busy());
        assert!(ListenerState::Closing.is_busy());
    }

    #[test]
    fn begin_close_holds_the_state_busy() {
        let mut state = ListenerState::Listening(active());
        assert_eq!(state.addresses().len(), 1);

        assert!(state.begin_close().is_some());
        assert!(matches!(state, ListenerState::Closing));
        assert!(state.is_busy());
        assert!(state.is_transitional());
        assert!(state.addresses().is_empty());
        assert!(state.begin_close().is_none());
        assert!(matches!(state, ListenerState::Closing));
    }

    #[test]
    fn begin_close_leaves_binding_alone() {
        let mut state = ListenerState::Binding;
        assert!(state.begin_close().is_none());
        assert!(matches!(state, ListenerState::Binding));
    }

    #[test]
    fn only_idle_and_listening_are_settled() {
        assert!(!ListenerState::NotListening.is_transitional());
        assert!(!ListenerState::Listening(active()).is_transitional());
        assert!(ListenerState::Binding.is_transitional());
    }
}
