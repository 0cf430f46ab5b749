//! Typed command surface of the 8-channel relay board.
//!
//! [`RelayBoard`] turns the nine protocol commands into methods and checks the
//! board's echo on every answer. It owns the [`RelayLink`] and the address the
//! board assigned itself during [`setup`](RelayBoard::setup):
//!
//! ```text
//! Unaddressed ──setup() ok──> Addressed (terminal)
//!      │
//!      └──setup() fails──> Unaddressed
//! ```
//!
//! Until the board is addressed, frames carry address 0.
//!
//! # Confirmed and lenient commands
//!
//! [`execute`](RelayBoard::execute) fails with `ProtocolMismatch` when the
//! echo is wrong. The named helpers ([`set_single`](RelayBoard::set_single)
//! and friends) and the bulk sweeps log the mismatch and resolve to
//! [`RelayMask::EMPTY`] instead; only transport errors reach the caller.
//! Relay commands answer with the port mask from before the command, so the
//! answer never tells whether a relay is on now; ask
//! [`get_port`](RelayBoard::get_port) for that.

use doorlock_core::constants::UNASSIGNED_ADDRESS;
use doorlock_core::{BoardAddress, Error as CoreError, RelayMask};
use doorlock_protocol::{CommandCode, SerialFrame};
use std::time::Duration;
use tokio::sync::{OnceCell, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LinkError, Result};
use crate::link::{LinkEvent, RelayLink};

/// The relay board behind a [`RelayLink`].
#[derive(Debug)]
pub struct RelayBoard {
    link: RelayLink,
    address: OnceCell<BoardAddress>,
}

impl RelayBoard {
    /// Wrap `link`. The board starts unaddressed.
    pub fn new(link: RelayLink) -> Self {
        Self {
            link,
            address: OnceCell::new(),
        }
    }

    /// The underlying transport, e.g. to attach a stream.
    pub fn link(&self) -> &RelayLink {
        &self.link
    }

    /// The address assigned by setup, if any.
    pub fn address(&self) -> Option<BoardAddress> {
        self.address.get().copied()
    }

    /// Whether setup has succeeded on this board.
    pub fn is_addressed(&self) -> bool {
        self.address.initialized()
    }

    /// Whether the link is up.
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Subscribe to the events of the underlying link.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.link.subscribe()
    }

    /// Open the serial device; see [`RelayLink::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.link.connect().await
    }

    /// Close the link. The address is kept for the next connection.
    pub async fn disconnect(&self) {
        self.link.disconnect().await
    }

    /// Ask the board for its address.
    ///
    /// Returns `true` once the board is addressed. An addressed board returns
    /// `true` immediately without touching the link. Concurrent callers share
    /// a single Setup exchange. A failed exchange (timeout, wrong echo,
    /// address 0) leaves the board unaddressed and returns `false`.
    pub async fn setup(&self) -> bool {
        if let Some(address) = self.address.get() {
            debug!(%address, "Relay board already addressed");
            return true;
        }

        match self
            .address
            .get_or_try_init(|| self.negotiate_address())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Relay board setup failed");
                false
            }
        }
    }

    /// Round-trip without side effects.
    pub async fn no_operation(&self) -> bool {
        match self.exchange(CommandCode::NoOperation, 0).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "NoOperation failed");
                false
            }
        }
    }

    /// Energize `relays`. Resolves to the port mask from before the command.
    pub async fn set_single(&self, relays: impl Into<RelayMask>) -> Result<RelayMask> {
        self.lenient(CommandCode::SetSingle, relays.into()).await
    }

    /// De-energize `relays`. Resolves to the port mask from before the command.
    pub async fn del_single(&self, relays: impl Into<RelayMask>) -> Result<RelayMask> {
        self.lenient(CommandCode::DelSingle, relays.into()).await
    }

    /// Flip `relays`. Resolves to the port mask from before the command.
    pub async fn toggle(&self, relays: impl Into<RelayMask>) -> Result<RelayMask> {
        self.lenient(CommandCode::Toggle, relays.into()).await
    }

    /// Read the current port mask; an unconfirmed answer reads as empty.
    pub async fn get_port(&self) -> Result<RelayMask> {
        self.lenient(CommandCode::GetPort, RelayMask::EMPTY).await
    }

    /// Read the option byte; an unconfirmed answer reads as 0.
    pub async fn get_option(&self) -> Result<u8> {
        match self.exchange(CommandCode::GetOption, 0).await {
            Ok(answer) => Ok(answer.data()),
            Err(LinkError::ProtocolMismatch(cause)) => {
                warn!(error = %cause, "GetOption not confirmed");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite the whole port without waiting for confirmation.
    pub async fn set_port(&self, state: RelayMask) -> Result<()> {
        self.notify(CommandCode::SetPort, state.bits()).await
    }

    /// Overwrite the option byte without waiting for confirmation.
    pub async fn set_option(&self, value: u8) -> Result<()> {
        self.notify(CommandCode::SetOption, value).await
    }

    /// Run a relay command and insist on a correct echo.
    ///
    /// The returned mask is the data byte of the answer, which for relay
    /// commands is the port before the command. A confirmed echo is the only
    /// evidence that the command was carried out.
    ///
    /// # Errors
    /// `ProtocolMismatch` if the board answers with the wrong command byte or a
    /// corrupt frame, plus every transport error of [`RelayLink::request`].
    pub async fn execute(&self, command: CommandCode, relays: RelayMask) -> Result<RelayMask> {
        let answer = self.exchange(command, relays.bits()).await?;
        let port = RelayMask::from_bits(answer.data());
        debug!(%command, %relays, %port, "Relay command confirmed");
        Ok(port)
    }

    /// Energize every relay; see [`sweep_cancellable`](Self::sweep_cancellable).
    pub async fn activate_all(&self, delay: Duration) -> Result<()> {
        self.sweep(CommandCode::SetSingle, delay, None).await
    }

    /// De-energize every relay; see [`sweep_cancellable`](Self::sweep_cancellable).
    pub async fn deactivate_all(&self, delay: Duration) -> Result<()> {
        self.sweep(CommandCode::DelSingle, delay, None).await
    }

    /// [`activate_all`](Self::activate_all) whose pauses end early on `cancel`.
    pub async fn activate_all_cancellable(
        &self,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.sweep(CommandCode::SetSingle, delay, Some(cancel)).await
    }

    /// [`deactivate_all`](Self::deactivate_all) whose pauses end early on `cancel`.
    pub async fn deactivate_all_cancellable(
        &self,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.sweep(CommandCode::DelSingle, delay, Some(cancel)).await
    }

    /// Apply `command` to every relay.
    ///
    /// With a zero `delay` one command carrying mask `0xFF` is sent. Otherwise
    /// the eight single-relay masks go out in ascending order with `delay`
    /// between consecutive steps. Steps are lenient like
    /// [`set_single`](Self::set_single): an unconfirmed echo only warns. A step
    /// failing on the transport is logged and the sweep goes on; the first such
    /// failure is returned at the end. Cancelling `cancel` skips
    /// the remaining pauses, never the remaining steps.
    pub async fn sweep_cancellable(
        &self,
        command: CommandCode,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.sweep(command, delay, Some(cancel)).await
    }

    async fn sweep(
        &self,
        command: CommandCode,
        delay: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        if delay.is_zero() {
            return self.lenient(command, RelayMask::ALL).await.map(|_| ());
        }

        let mut first_error = None;
        for (step, mask) in RelayMask::singles().enumerate() {
            if step > 0 {
                pause(delay, cancel).await;
            }
            if let Err(e) = self.lenient(command, mask).await {
                warn!(%command, relays = %mask, error = %e, "Sweep step failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn negotiate_address(&self) -> Result<BoardAddress> {
        let answer = self
            .link
            .request(SerialFrame::request(CommandCode::Setup, UNASSIGNED_ADDRESS, 0))
            .await?;
        check_echo(CommandCode::Setup, &answer)?;

        let address = BoardAddress::new(answer.address()).map_err(LinkError::ProtocolMismatch)?;
        info!(%address, firmware = answer.data(), "Relay board addressed");
        Ok(address)
    }

    async fn lenient(&self, command: CommandCode, relays: RelayMask) -> Result<RelayMask> {
        match self.execute(command, relays).await {
            Err(LinkError::ProtocolMismatch(cause)) => {
                warn!(%command, %relays, error = %cause, "Relay command not confirmed");
                Ok(RelayMask::EMPTY)
            }
            other => other,
        }
    }

    async fn exchange(&self, command: CommandCode, data: u8) -> Result<SerialFrame> {
        let frame = SerialFrame::request(command, self.wire_address(), data);
        let answer = self.link.request(frame).await?;
        check_echo(command, &answer)?;
        Ok(answer)
    }

    async fn notify(&self, command: CommandCode, data: u8) -> Result<()> {
        let frame = SerialFrame::request(command, self.wire_address(), data);
        self.link.send(frame).await
    }

    fn wire_address(&self) -> u8 {
        self.address()
            .map_or(UNASSIGNED_ADDRESS, |address| address.as_u8())
    }
}

fn check_echo(command: CommandCode, answer: &SerialFrame) -> Result<()> {
    if answer.is_echo_of(command) {
        return Ok(());
    }
    Err(LinkError::ProtocolMismatch(CoreError::UnexpectedEcho {
        expected: command.expected_echo(),
        actual: answer.command(),
    }))
}

async fn pause(delay: Duration, cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {}
            }
        }
        None => tokio::time::sleep(delay).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_echo() {
        let good = SerialFrame::echo(CommandCode::Toggle, 1, 0);
        assert!(check_echo(CommandCode::Toggle, &good).is_ok());

        let bad = SerialFrame::echo(CommandCode::SetSingle, 1, 0);
        match check_echo(CommandCode::Toggle, &bad) {
            Err(LinkError::ProtocolMismatch(CoreError::UnexpectedEcho { expected, actual })) => {
                assert_eq!(expected, 247);
                assert_eq!(actual, 249);
            }
            other => panic!("Expected UnexpectedEcho, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unconnected_board() {
        let board = RelayBoard::new(RelayLink::new("/dev/null", Duration::from_millis(10)));

        assert!(!board.is_connected());
        assert!(!board.setup().await);
        assert!(!board.is_addressed());
        assert!(!board.no_operation().await);
        assert!(matches!(
            board.set_single(RelayMask::ALL).await,
            Err(LinkError::LinkNotOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pause_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();

        let start = tokio::time::Instant::now();
        pause(Duration::from_secs(60), Some(&token)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
