//! TCP protocol between a keypoint source (pose estimator) and the jump server.
//!
//! Each connection is one camera stream and owns one engine on the server side.

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::engine::FrameReport;
use crate::pose::PersonKeypoints;

// --- Message types ---

/// Keypoint source → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// One detector result. `timestamp_us` must come from a monotonic clock.
    KeypointFrame {
        timestamp_us: u64,
        people: Vec<PersonKeypoints>,
    },
    QueryJumpCount,
    Reset,
}

/// Server → keypoint source
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    FrameReport(FrameReport),
    JumpCount { count: u32 },
    ResetAck,
    Error { message: String },
}

/// Microseconds → engine seconds
pub fn timestamp_secs(timestamp_us: u64) -> f64 {
    timestamp_us as f64 / 1_000_000.0
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(1024 * 1024) // 1MB
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    send_to_sink(stream, msg).await
}

/// Same as `send_message`, for the write half of a split stream.
pub async fn send_to_sink<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `Ok(None)` when the peer closed the connection.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<Option<T>> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_timestamp_secs() {
        assert_eq!(timestamp_secs(0), 0.0);
        assert_eq!(timestamp_secs(1_500_000), 1.5);
    }

    #[tokio::test]
    async fn test_messages_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut stream = message_stream(tcp);
            let msg: ClientMessage = recv_message(&mut stream).await.unwrap().unwrap();
            let count = match msg {
                ClientMessage::KeypointFrame { people, .. } => people.len() as u32,
                _ => 0,
            };
            send_message(&mut stream, &ServerMessage::JumpCount { count })
                .await
                .unwrap();
            // 切断を検出できる
            let closed: Option<ClientMessage> = recv_message(&mut stream).await.unwrap();
            assert!(closed.is_none());
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut stream = message_stream(tcp);
        let frame = ClientMessage::KeypointFrame {
            timestamp_us: 10,
            people: vec![
                PersonKeypoints::from_reference(1.0, 2.0),
                PersonKeypoints::empty(),
            ],
        };
        send_message(&mut stream, &frame).await.unwrap();
        let reply: ServerMessage = recv_message(&mut stream).await.unwrap().unwrap();
        assert_eq!(reply, ServerMessage::JumpCount { count: 2 });
        drop(stream);

        server.await.unwrap();
    }
}
