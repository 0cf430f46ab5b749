//! The access controller.
//!
//! One [`AccessController`] drives one relay board. Scans come in through
//! [`run`](AccessController::run) (or one at a time through
//! [`handle_scan`](AccessController::handle_scan)), door commands through
//! [`request_open_door`](AccessController::request_open_door). Both paths take
//! the same sequence gate, so relay commands of two attempts never interleave.
//!
//! Relay wiring and timing come from [`AccessSettings`]:
//!
//! | phase            | relay commands                                        |
//! |------------------|-------------------------------------------------------|
//! | deny             | set red, set yellow, dwell, clear red, clear yellow   |
//! | open             | set door, then set green and clear yellow together    |
//! | hold             | wait the open duration                                |
//! | close            | clear door (retried), then clear green and set yellow |

use std::sync::Arc;
use std::time::Duration;

use doorlock_core::config::RelayPorts;
use doorlock_core::{AccessDecision, AccessEvent, Config, DecisionReason, RelayNumber, Uid};
use doorlock_hardware::RelayBoard;
use doorlock_protocol::CommandCode;
use doorlock_storage::Registry;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::{AccessError, Result};
use crate::state::AccessState;

/// Relay wiring and timing of the access sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSettings {
    pub ports: RelayPorts,

    /// How long the door stays energized.
    pub door_open: Duration,

    /// How long the deny lamps stay lit.
    pub deny_dwell: Duration,

    /// How often clearing the door relay is tried.
    pub close_attempts: u32,

    /// Pause between relays when all are switched at start-up.
    pub stagger: Duration,
}

impl AccessSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ports: config.relay.ports,
            door_open: config.access.door_open(),
            deny_dwell: config.access.deny_dwell(),
            close_attempts: config.access.close_attempts,
            stagger: config.relay.stagger_delay(),
        }
    }
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Turns scans and door commands into relay sequences.
///
/// Share it as `Arc<AccessController<_>>`: every method takes `&self`.
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use doorlock_access::{AccessController, AccessSettings};
/// use doorlock_core::{AccessEvent, Uid};
/// use doorlock_hardware::mock::MockRelayBoard;
/// use doorlock_hardware::{RelayBoard, RelayLink};
/// use doorlock_storage::{MemoryRegistry, UserKind};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (io, _mock) = MockRelayBoard::spawn();
/// let board = Arc::new(RelayBoard::new(RelayLink::new("mock", Duration::from_millis(100))));
/// board.link().attach(io).await?;
///
/// let registry = MemoryRegistry::new();
/// let alice = registry.create_user("alice", UserKind::User)?;
/// registry.create_card(&Uid::new("04AB")?, Some(alice.id))?;
///
/// let settings = AccessSettings {
///     door_open: Duration::from_millis(10),
///     stagger: Duration::ZERO,
///     ..AccessSettings::default()
/// };
/// let controller = AccessController::new(board, registry, settings);
/// controller.initialize().await?;
///
/// let decision = controller.handle_scan(AccessEvent::new(Uid::new("04ab")?)).await?;
/// assert!(decision.granted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AccessController<R> {
    board: Arc<RelayBoard>,
    registry: R,
    settings: AccessSettings,
    gate: Mutex<()>,
    state: watch::Sender<AccessState>,
    cancel: CancellationToken,
}

impl<R: Registry> AccessController<R> {
    pub fn new(board: Arc<RelayBoard>, registry: R, settings: AccessSettings) -> Self {
        let (state, _) = watch::channel(AccessState::Idle);
        Self {
            board,
            registry,
            settings,
            gate: Mutex::new(()),
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn board(&self) -> &Arc<RelayBoard> {
        &self.board
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    pub fn state(&self) -> AccessState {
        *self.state.borrow()
    }

    /// Follow state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<AccessState> {
        self.state.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Address the board and switch every relay off, one at a time.
    ///
    /// # Errors
    /// [`AccessError::SetupFailed`] if the board does not answer Setup, or the
    /// first relay error of the sweep.
    pub async fn initialize(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        if !self.board.setup().await {
            return Err(AccessError::SetupFailed);
        }
        self.board
            .deactivate_all_cancellable(self.settings.stagger, &self.cancel)
            .await?;
        info!("Relay board initialized, all relays off");
        Ok(())
    }

    /// Consume scans until the channel closes or [`shutdown`](Self::shutdown)
    /// is called. Failed attempts are logged; none ends the loop.
    pub async fn run(&self, mut scans: mpsc::Receiver<AccessEvent>) {
        info!("Access controller running");
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = scans.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            if let Err(e) = self.handle_scan(event).await {
                if e.is_fatal() {
                    error!(error = %e, "Access attempt left the door unsecured");
                } else {
                    warn!(error = %e, "Access attempt failed");
                }
            }
        }
        info!("Access controller stopped");
    }

    /// Evaluate one scan and run the matching sequence.
    ///
    /// A denied scan is not an error: the decision says why. Errors mean the
    /// attempt could not run ([`LinkDown`](AccessError::LinkDown),
    /// [`ShuttingDown`](AccessError::ShuttingDown)) or the door could not be
    /// secured afterwards.
    pub async fn handle_scan(&self, event: AccessEvent) -> Result<AccessDecision> {
        let span = info_span!("access", event_id = %event.id, uid = %event.uid);
        self.attempt(event.uid).instrument(span).await
    }

    /// Open the door for an already authorized caller.
    pub async fn request_open_door(&self) -> Result<()> {
        async {
            self.check_ready()?;
            let _gate = self.gate.lock().await;
            self.check_ready()?;

            info!("Door command received");
            self.set_state(AccessState::Granting);
            let result = self.open_door_sequence().await;
            self.set_state(AccessState::Idle);
            result
        }
        .instrument(info_span!("door_command"))
        .await
    }

    /// Stop the controller.
    ///
    /// Pending waits end immediately, an in-flight sequence still runs its
    /// close steps, the door relay gets one more clear, and the link is closed.
    /// Later attempts fail with [`ShuttingDown`](AccessError::ShuttingDown).
    pub async fn shutdown(&self) {
        info!("Access controller shutting down");
        self.cancel.cancel();

        let _gate = self.gate.lock().await;
        if self.board.is_connected() {
            let door = self.settings.ports.door;
            match self.board.execute(CommandCode::DelSingle, door.mask()).await {
                Ok(_) => debug!(relay = %door, "Door relay cleared"),
                Err(e) => warn!(relay = %door, error = %e, "Final door clear failed"),
            }
        }
        self.board.disconnect().await;
    }

    async fn attempt(&self, uid: Uid) -> Result<AccessDecision> {
        self.check_ready()?;
        let _gate = self.gate.lock().await;
        self.check_ready()?;

        self.set_state(AccessState::Evaluating);
        let decision = self.evaluate(&uid).await;
        info!(granted = decision.granted, reason = %decision.reason, "Access decision");

        let result = if decision.granted {
            self.set_state(AccessState::Granting);
            self.open_door_sequence().await
        } else {
            self.set_state(AccessState::Denying);
            self.deny_sequence().await;
            Ok(())
        };

        self.set_state(AccessState::Idle);
        result.map(|()| decision)
    }

    /// Registry lookup. Lookup failures deny.
    async fn evaluate(&self, uid: &Uid) -> AccessDecision {
        let card = match self.registry.find_card_by_uid(uid).await {
            Ok(Some(card)) => card,
            Ok(None) => return AccessDecision::deny(DecisionReason::UnknownCard),
            Err(e) => {
                warn!(error = %e, "Card lookup failed");
                return AccessDecision::deny(DecisionReason::RegistryUnavailable);
            }
        };

        match self.registry.find_user_for_card(&card).await {
            Ok(Some(user)) if user.is_disabled() => {
                debug!(user = %user.username, "User is disabled");
                AccessDecision::deny(DecisionReason::UserDisabled)
            }
            Ok(Some(user)) => {
                debug!(user = %user.username, "Card owner found");
                AccessDecision::grant()
            }
            Ok(None) => AccessDecision::deny(DecisionReason::NoLinkedUser),
            Err(e) => {
                warn!(error = %e, "User lookup failed");
                AccessDecision::deny(DecisionReason::RegistryUnavailable)
            }
        }
    }

    async fn deny_sequence(&self) {
        let ports = self.settings.ports;
        self.lamp_on(ports.red).await;
        self.lamp_on(ports.yellow).await;
        self.pause(self.settings.deny_dwell).await;
        self.lamp_off(ports.red).await;
        self.lamp_off(ports.yellow).await;
    }

    async fn open_door_sequence(&self) -> Result<()> {
        let ports = self.settings.ports;

        if self.energize_door().await {
            tokio::join!(self.lamp_on(ports.green), self.lamp_off(ports.yellow));
            self.pause(self.settings.door_open).await;
        }

        let secured = self.secure_door().await;
        tokio::join!(self.lamp_off(ports.green), self.lamp_on(ports.yellow));

        if secured {
            info!("Door closed");
            Ok(())
        } else {
            let attempts = self.settings.close_attempts;
            error!(relay = %ports.door, attempts, "Door could not be closed");
            Err(AccessError::DoorNotSecured { attempts })
        }
    }

    /// The confirmed echo is the success criterion. The data byte of the
    /// answer is the port before the command and says nothing about the door.
    async fn energize_door(&self) -> bool {
        let door = self.settings.ports.door;
        match self.board.execute(CommandCode::SetSingle, door.mask()).await {
            Ok(previous) => {
                info!(relay = %door, %previous, "Door opened");
                true
            }
            Err(e) => {
                warn!(relay = %door, error = %e, "Door relay could not be energized");
                false
            }
        }
    }

    async fn secure_door(&self) -> bool {
        let door = self.settings.ports.door;
        for attempt in 1..=self.settings.close_attempts {
            match self.board.execute(CommandCode::DelSingle, door.mask()).await {
                Ok(_) => return true,
                Err(e) => warn!(relay = %door, error = %e, attempt, "Clearing door relay failed"),
            }
        }
        false
    }

    async fn lamp_on(&self, relay: RelayNumber) {
        if let Err(e) = self.board.set_single(relay).await {
            warn!(%relay, error = %e, "Lamp could not be switched on");
        }
    }

    async fn lamp_off(&self, relay: RelayNumber) {
        if let Err(e) = self.board.del_single(relay).await {
            warn!(%relay, error = %e, "Lamp could not be switched off");
        }
    }

    /// Sleep unless shutdown has been requested.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => debug!("Wait cut short by shutdown"),
        }
    }

    fn check_ready(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AccessError::ShuttingDown);
        }
        if !self.board.is_connected() {
            return Err(AccessError::LinkDown);
        }
        Ok(())
    }

    fn set_state(&self, next: AccessState) {
        let previous = self.state.send_replace(next);
        debug_assert!(
            previous.can_transition_to(&next),
            "invalid transition {previous} -> {next}"
        );
        debug!(from = %previous, to = %next, "State change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = Config::from_toml_str(
            r#"
            [relay]
            stagger_delay_ms = 20

            [relay.ports]
            door = 5

            [access]
            door_open_ms = 4000
            deny_dwell_ms = 500
            close_attempts = 2
            "#,
        )
        .unwrap();

        let settings = AccessSettings::from_config(&config);
        assert_eq!(settings.ports.door.as_u8(), 5);
        assert_eq!(settings.door_open, Duration::from_millis(4000));
        assert_eq!(settings.deny_dwell, Duration::from_millis(500));
        assert_eq!(settings.close_attempts, 2);
        assert_eq!(settings.stagger, Duration::from_millis(20));
    }

    #[test]
    fn test_default_settings() {
        let settings = AccessSettings::default();
        assert_eq!(settings.ports.door.as_u8(), 1);
        assert_eq!(settings.door_open, Duration::from_millis(3000));
        assert_eq!(settings.deny_dwell, Duration::from_millis(1500));
        assert_eq!(settings.close_attempts, 3);
    }
}
