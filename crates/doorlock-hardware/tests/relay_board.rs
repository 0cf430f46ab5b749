//! Integration tests for `RelayBoard` against the mock relay board.

use std::sync::Arc;
use std::time::Duration;

use doorlock_core::{RelayMask, RelayNumber};
use doorlock_hardware::mock::{Fault, MockRelayBoard, MockRelayBoardHandle};
use doorlock_hardware::{LinkError, RelayBoard, RelayLink};
use doorlock_protocol::CommandCode;
use rstest::rstest;
use tokio_util::sync::CancellationToken;

const WINDOW: Duration = Duration::from_millis(100);

async fn board_with_mock() -> (RelayBoard, MockRelayBoardHandle) {
    let (io, mock) = MockRelayBoard::spawn();
    let board = RelayBoard::new(RelayLink::new("mock", WINDOW));
    board.link().attach(io).await.unwrap();
    (board, mock)
}

fn relay(number: u8) -> RelayNumber {
    RelayNumber::new(number).unwrap()
}

// ============================================================================
// Setup
// ============================================================================

#[tokio::test]
async fn test_setup_assigns_address() {
    let (board, mock) = board_with_mock().await;

    assert!(board.setup().await);
    assert_eq!(board.address().unwrap().as_u8(), 1);
    assert!(mock.is_addressed());

    let setup = mock.requests(CommandCode::Setup);
    assert_eq!(setup.len(), 1);
    assert_eq!(setup[0].frame.address(), 0);
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let (board, mock) = board_with_mock().await;

    assert!(board.setup().await);
    assert!(board.setup().await);
    assert!(board.setup().await);

    assert_eq!(mock.requests(CommandCode::Setup).len(), 1);
}

#[tokio::test]
async fn test_concurrent_setup_is_coalesced() {
    let (board, mock) = board_with_mock().await;
    let board = Arc::new(board);

    let (a, b, c) = tokio::join!(board.setup(), board.setup(), board.setup());

    assert!(a && b && c);
    assert_eq!(mock.requests(CommandCode::Setup).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_setup_fails_on_silence_and_can_be_retried() {
    let (board, mock) = board_with_mock().await;
    mock.fail_next(CommandCode::Setup, Fault::Silent);

    assert!(!board.setup().await);
    assert!(!board.is_addressed());

    assert!(board.setup().await);
    assert_eq!(mock.requests(CommandCode::Setup).len(), 2);
}

#[rstest]
#[case(Fault::WrongEcho)]
#[case(Fault::CorruptChecksum)]
#[tokio::test]
async fn test_setup_fails_on_bad_answer(#[case] fault: Fault) {
    let (board, mock) = board_with_mock().await;
    mock.fail_next(CommandCode::Setup, fault);

    assert!(!board.setup().await);
    assert!(board.address().is_none());
}

#[tokio::test]
async fn test_setup_rejects_address_zero() {
    let (io, _mock) = MockRelayBoard::spawn_with_address(0);
    let board = RelayBoard::new(RelayLink::new("mock", WINDOW));
    board.link().attach(io).await.unwrap();

    assert!(!board.setup().await);
    assert!(!board.is_addressed());
}

#[tokio::test]
async fn test_frames_use_assigned_address() {
    let (io, mock) = MockRelayBoard::spawn_with_address(42);
    let board = RelayBoard::new(RelayLink::new("mock", WINDOW));
    board.link().attach(io).await.unwrap();

    assert!(board.setup().await);
    board.set_single(relay(1)).await.unwrap();

    let set = mock.requests(CommandCode::SetSingle);
    assert_eq!(set[0].frame.address(), 42);
}

// ============================================================================
// Relay commands
// ============================================================================

#[tokio::test]
async fn test_relay_commands_report_previous_port() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);

    assert_eq!(board.set_single(relay(1)).await.unwrap().bits(), 0b0000_0000);
    assert_eq!(
        board.set_single(relay(2).mask() | relay(3).mask()).await.unwrap().bits(),
        0b0000_0001
    );
    assert_eq!(board.del_single(relay(2)).await.unwrap().bits(), 0b0000_0111);
    assert_eq!(board.toggle(RelayMask::from_bits(0b1000_0001)).await.unwrap().bits(), 0b0000_0101);
    assert_eq!(board.get_port().await.unwrap().bits(), 0b1000_0100);
    assert_eq!(board.get_port().await.unwrap(), mock.port());
    assert!(mock.is_on(relay(8)));
    assert!(!mock.is_on(relay(1)));
}

#[rstest]
#[case(Fault::WrongEcho)]
#[case(Fault::CorruptChecksum)]
#[tokio::test]
async fn test_unconfirmed_relay_command_is_neutral(#[case] fault: Fault) {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.fail_next(CommandCode::SetSingle, fault);

    let port = board.set_single(relay(4)).await.unwrap();

    assert_eq!(port, RelayMask::EMPTY);
    // The board did act on it.
    assert!(mock.is_on(relay(4)));
}

#[tokio::test]
async fn test_execute_insists_on_echo() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.fail_next(CommandCode::DelSingle, Fault::WrongEcho);

    let result = board.execute(CommandCode::DelSingle, relay(1).into()).await;
    assert!(matches!(result, Err(LinkError::ProtocolMismatch(_))));
}

#[tokio::test(start_paused = true)]
async fn test_relay_command_timeout_propagates() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.fail_next(CommandCode::SetSingle, Fault::Silent);

    let result = board.set_single(relay(1)).await;
    assert!(matches!(result, Err(LinkError::Timeout { duration_ms: 100 })));
}

#[tokio::test]
async fn test_no_operation() {
    let (board, mock) = board_with_mock().await;
    assert!(board.no_operation().await);

    mock.fail_next(CommandCode::NoOperation, Fault::WrongEcho);
    assert!(!board.no_operation().await);
}

#[tokio::test]
async fn test_set_port_and_option_are_notifications() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);

    board.set_port(RelayMask::from_bits(0x0F)).await.unwrap();
    board.set_option(0x2A).await.unwrap();

    // Answers to the sends never surface as answers to these requests.
    assert_eq!(board.get_option().await.unwrap(), 0x2A);
    assert_eq!(board.get_port().await.unwrap().bits(), 0x0F);
    assert_eq!(mock.option(), 0x2A);
}

#[tokio::test]
async fn test_commands_after_unplug_fail() {
    let (board, mock) = board_with_mock().await;
    let mut events = board.subscribe();
    assert!(board.setup().await);

    mock.unplug();
    loop {
        if events.recv().await.unwrap() == doorlock_hardware::LinkEvent::Disconnected {
            break;
        }
    }

    assert!(!board.is_connected());
    let result = board.set_single(relay(1)).await;
    assert!(result.unwrap_err().is_link_down());
}

// ============================================================================
// Bulk operations
// ============================================================================

#[tokio::test]
async fn test_activate_all_without_delay_sends_one_command() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.clear_frames();

    board.activate_all(Duration::ZERO).await.unwrap();

    let frames = mock.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), Some(CommandCode::SetSingle));
    assert_eq!(frames[0].mask(), RelayMask::ALL);
    assert_eq!(mock.port(), RelayMask::ALL);
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_all_with_delay_is_staggered() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.set_port(RelayMask::ALL);
    mock.clear_frames();

    let delay = Duration::from_millis(100);
    board.deactivate_all(delay).await.unwrap();

    let frames = mock.frames();
    assert_eq!(frames.len(), 8);
    for (recorded, expected) in frames.iter().zip(RelayMask::singles()) {
        assert_eq!(recorded.command(), Some(CommandCode::DelSingle));
        assert_eq!(recorded.mask(), expected);
    }
    for pair in frames.windows(2) {
        assert!(pair[1].at - pair[0].at >= delay);
    }
    assert_eq!(mock.port(), RelayMask::EMPTY);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_continues_after_failed_step() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.clear_frames();
    mock.fail_next(CommandCode::SetSingle, Fault::Silent);

    let result = board.activate_all(Duration::from_millis(10)).await;

    assert!(matches!(result, Err(LinkError::Timeout { .. })));
    assert_eq!(mock.requests(CommandCode::SetSingle).len(), 8);
    // The silent step was swallowed; every other relay is on.
    assert_eq!(mock.port(), RelayMask::from_bits(0b1111_1110));
}

#[rstest]
#[case(Fault::WrongEcho)]
#[case(Fault::CorruptChecksum)]
#[tokio::test(start_paused = true)]
async fn test_sweep_treats_unconfirmed_step_as_neutral(#[case] fault: Fault) {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.fail_next(CommandCode::SetSingle, fault);

    board.activate_all(Duration::from_millis(10)).await.unwrap();

    assert_eq!(mock.port(), RelayMask::ALL);
}

#[tokio::test]
async fn test_unconfirmed_bulk_command_is_neutral() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.fail_next(CommandCode::DelSingle, Fault::WrongEcho);

    board.deactivate_all(Duration::ZERO).await.unwrap();

    assert_eq!(mock.requests(CommandCode::DelSingle).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_sweep_skips_pauses_not_steps() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);
    mock.clear_frames();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let start = tokio::time::Instant::now();

    board
        .activate_all_cancellable(Duration::from_secs(10), &cancel)
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(mock.requests(CommandCode::SetSingle).len(), 8);
}

// ============================================================================
// Link discipline
// ============================================================================

#[tokio::test]
async fn test_concurrent_requests_get_their_own_answers() {
    let (board, _mock) = board_with_mock().await;
    let board = Arc::new(board);
    assert!(board.setup().await);

    let mut tasks = Vec::new();
    for bit in 0..8u8 {
        let board = Arc::clone(&board);
        tasks.push(tokio::spawn(async move {
            let mask = RelayMask::from_bits(1 << bit);
            let previous = board.execute(CommandCode::Toggle, mask).await.unwrap();
            (mask, previous)
        }));
    }

    let mut sizes = Vec::new();
    for task in tasks {
        let (mask, previous) = task.await.unwrap();
        // Each answer is the port right before this caller's own toggle.
        assert_eq!(previous.bits() & mask.bits(), 0);
        sizes.push(previous.bits().count_ones());
    }
    // Eight distinct answers: the port grew by one relay per toggle.
    sizes.sort_unstable();
    assert_eq!(sizes, (0..8).collect::<Vec<u32>>());
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_is_not_taken_by_next_request() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);

    mock.set_response_delay(Duration::from_millis(150));
    let late = board.set_single(relay(1)).await;
    assert!(matches!(late, Err(LinkError::Timeout { .. })));

    mock.set_response_delay(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let port = board.execute(CommandCode::GetPort, RelayMask::EMPTY).await.unwrap();
    assert_eq!(port, RelayMask::from_bits(0b0000_0001));
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_is_not_taken_by_immediate_retry() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);

    mock.set_response_delay(Duration::from_millis(150));
    let late = board.execute(CommandCode::SetSingle, relay(1).mask()).await;
    assert!(matches!(late, Err(LinkError::Timeout { .. })));

    // Same command straight away, while the first answer is still on its way.
    mock.set_response_delay(Duration::ZERO);
    let previous = board
        .execute(CommandCode::SetSingle, relay(2).mask())
        .await
        .unwrap();

    // The late answer would have reported the empty port.
    assert_eq!(previous, relay(1).mask());
    assert_eq!(mock.port(), relay(1).mask() | relay(2).mask());
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_lost_answer_succeeds() {
    let (board, mock) = board_with_mock().await;
    assert!(board.setup().await);

    mock.fail_next(CommandCode::DelSingle, Fault::Silent);
    let lost = board.execute(CommandCode::DelSingle, relay(1).mask()).await;
    assert!(matches!(lost, Err(LinkError::Timeout { .. })));

    let start = tokio::time::Instant::now();
    board
        .execute(CommandCode::DelSingle, relay(1).mask())
        .await
        .unwrap();
    // At most one extra window is spent waiting for the lost answer.
    assert!(start.elapsed() <= WINDOW * 2);
}
