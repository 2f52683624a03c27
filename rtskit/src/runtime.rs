//! Session control task
//!
//! [`spawn_session`] moves a [`MediaSession`] onto one tokio task. That task
//! is the only place the session is touched: caller commands and transport
//! events are taken one at a time from their channels, so no two transitions
//! ever interleave. After every message the task republishes the session
//! state (watch channel) and a [`SessionSnapshot`] for readers.

use crate::event::{EventHub, EventStream};
use crate::session::{MediaSession, SessionSnapshot};
use parking_lot::RwLock;
use rtskit_core::{RtsError, RtsResult, SessionState, TransportEnvelope};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

type Reply = Box<dyn FnOnce() + Send>;
type Command = Box<dyn FnOnce(&mut MediaSession) -> Reply + Send>;

enum ControlMessage {
    Run(Command),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a session running on a control task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<ControlMessage>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    state: watch::Receiver<SessionState>,
    events: EventHub,
}

impl std::fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMessage::Run(_) => f.write_str("Run"),
            ControlMessage::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// Run `session` on its own control task. Must be called inside a tokio runtime.
pub fn spawn_session(mut session: MediaSession) -> SessionHandle {
    let (commands, mut command_rx) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(session.state());
    let snapshot = Arc::new(RwLock::new(session.snapshot()));
    let events = session.event_hub();
    let mut transport_rx = session.take_transport_events();

    let published = Arc::clone(&snapshot);
    tokio::spawn(async move {
        info!("🎛️ Session control loop started");
        loop {
            tokio::select! {
                message = command_rx.recv() => match message {
                    Some(ControlMessage::Run(command)) => {
                        let reply = command(&mut session);
                        publish(&session, &published, &state_tx);
                        reply();
                    }
                    Some(ControlMessage::Shutdown(done)) => {
                        session.release();
                        publish(&session, &published, &state_tx);
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        debug!("Every session handle dropped");
                        session.release();
                        break;
                    }
                },
                Some(envelope) = next_envelope(&mut transport_rx) => {
                    if let Err(e) = session.handle_envelope(envelope) {
                        debug!("Transport event not applied: {}", e);
                    }
                    publish(&session, &published, &state_tx);
                }
            }
        }
        info!("🛑 Session control loop stopped");
    });

    SessionHandle {
        commands,
        snapshot,
        state,
        events,
    }
}

async fn next_envelope(
    rx: &mut Option<mpsc::UnboundedReceiver<TransportEnvelope>>,
) -> Option<TransportEnvelope> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn publish(
    session: &MediaSession,
    snapshot: &RwLock<SessionSnapshot>,
    state_tx: &watch::Sender<SessionState>,
) {
    *snapshot.write() = session.snapshot();
    let next = session.state();
    if *state_tx.borrow() != next {
        let _ = state_tx.send(next);
    }
}

impl SessionHandle {
    /// Run `f` on the control task and return its result.
    ///
    /// The snapshot and state seen through this handle already reflect `f`
    /// when the call returns.
    pub async fn call<R, F>(&self, f: F) -> RtsResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut MediaSession) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let command: Command = Box::new(move |session| {
            let result = f(session);
            Box::new(move || {
                let _ = tx.send(result);
            })
        });
        self.commands
            .send(ControlMessage::Run(command))
            .map_err(|_| RtsError::ControlLoopClosed)?;
        rx.await.map_err(|_| RtsError::ControlLoopClosed)
    }

    /// Latest published copy of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    /// Latest published state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session state satisfies `predicate`
    pub async fn wait_for_state(
        &self,
        predicate: impl Fn(&SessionState) -> bool,
    ) -> RtsResult<SessionState> {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            if predicate(&current) {
                return Ok(current);
            }
            state
                .changed()
                .await
                .map_err(|_| RtsError::ControlLoopClosed)?;
        }
    }

    /// Subscribe to session events
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Whether the control task still runs
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Release the session and stop the control task
    pub async fn shutdown(&self) -> RtsResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(ControlMessage::Shutdown(tx))
            .map_err(|_| RtsError::ControlLoopClosed)?;
        rx.await.map_err(|_| RtsError::ControlLoopClosed)
    }
}
