//! Integration tests for `RelayCodec` over in-memory tokio streams.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Framed, FramedRead};
use doorlock_protocol::{CommandCode, RawFrame, RelayCodec, SerialFrame};

fn create_framed_duplex(
    buffer_size: usize,
) -> (
    Framed<DuplexStream, RelayCodec>,
    Framed<DuplexStream, RelayCodec>,
) {
    let (host, board) = tokio::io::duplex(buffer_size);
    (
        Framed::new(host, RelayCodec::new()),
        Framed::new(board, RelayCodec::new()),
    )
}

#[tokio::test]
async fn test_request_and_echo_roundtrip() {
    let (mut host, mut board) = create_framed_duplex(64);

    host.send(SerialFrame::request(CommandCode::Setup, 0, 0))
        .await
        .unwrap();

    let request = board.next().await.unwrap().unwrap().validate().unwrap();
    assert_eq!(request.command_code(), Some(CommandCode::Setup));

    board
        .send(SerialFrame::echo(CommandCode::Setup, 1, 11))
        .await
        .unwrap();

    let answer = host.next().await.unwrap().unwrap().validate().unwrap();
    assert!(answer.is_echo_of(CommandCode::Setup));
    assert_eq!(answer.address(), 1);
    assert_eq!(answer.data(), 11);
}

#[tokio::test]
async fn test_frames_split_across_writes() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut frames = FramedRead::new(reader, RelayCodec::new());
    let expected = SerialFrame::echo(CommandCode::GetPort, 1, 0b1010_0101);
    let bytes = expected.to_bytes();

    writer.write_all(&bytes[..1]).await.unwrap();
    writer.write_all(&bytes[1..3]).await.unwrap();
    writer.write_all(&bytes[3..]).await.unwrap();

    let frame = frames.next().await.unwrap().unwrap();
    assert_eq!(frame.validate().unwrap(), expected);
}

#[tokio::test]
async fn test_stream_survives_corrupt_frame() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut frames = FramedRead::new(reader, RelayCodec::new());
    let good = SerialFrame::echo(CommandCode::SetSingle, 1, 0x04);

    writer.write_all(&[249, 1, 4, 0xAA]).await.unwrap();
    writer.write_all(&good.to_bytes()).await.unwrap();

    let corrupt = frames.next().await.unwrap().unwrap();
    assert!(corrupt.validate().is_err());

    let next = frames.next().await.unwrap().unwrap();
    assert_eq!(next.validate().unwrap(), good);
}

#[tokio::test]
async fn test_stream_ends_on_close_dropping_partial_frame() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut frames = FramedRead::new(reader, RelayCodec::new());
    let good = SerialFrame::echo(CommandCode::Toggle, 1, 0x10);

    writer.write_all(&good.to_bytes()).await.unwrap();
    writer.write_all(&[1, 2]).await.unwrap();
    drop(writer);

    assert_eq!(
        frames.next().await.unwrap().unwrap(),
        RawFrame::from(good)
    );
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_burst_of_frames() {
    let (mut host, mut board) = create_framed_duplex(16);

    let sender = tokio::spawn(async move {
        for bit in 0..8u8 {
            host.send(SerialFrame::request(CommandCode::SetSingle, 1, 1 << bit))
                .await
                .unwrap();
        }
    });

    for bit in 0..8u8 {
        let frame = board.next().await.unwrap().unwrap().validate().unwrap();
        assert_eq!(frame.data(), 1 << bit);
    }
    sender.await.unwrap();
}
