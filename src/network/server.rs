//! TCP server and connection handling
//!
//! Accepts incoming peer connections and frames gossip messages on the wire.

use crate::network::message::{Message, MAGIC, MAX_MESSAGE_SIZE};
use crate::network::peer::{PeerError, PeerHandle, PeerManager};
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Message codec for length-prefixed framing
pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item
            .to_bytes()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        if data.len() > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} message too large: {} bytes", item.type_name(), data.len()),
            ));
        }

        // Magic (4) + Length (4) + Data
        dst.reserve(8 + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);

        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least header
        if src.len() < 8 {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Frame of {} bytes exceeds limit", len),
            ));
        }

        // Check if we have full message
        if src.len() < 8 + len {
            src.reserve(8 + len - src.len());
            return Ok(None);
        }

        src.advance(8);
        let data = src.split_to(len);

        let msg = Message::from_bytes(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(Some(msg))
    }
}

/// TCP server for accepting peer connections
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind to a port and create the server
    pub async fn bind(port: u16) -> Result<Self, std::io::Error> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr).await?;
        log::info!("Gossip listening on {}", addr);

        Ok(Self { listener })
    }

    /// The bound address, useful when binding port 0
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept incoming connections
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), std::io::Error> {
        self.listener.accept().await
    }
}

/// Connect to a peer
pub async fn connect_to_peer(addr: &str) -> Result<(TcpStream, SocketAddr), PeerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

    let peer_addr = stream
        .peer_addr()
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;

    Ok((stream, peer_addr))
}

/// Handle a peer connection (both inbound and outbound).
///
/// `greeting` is written as soon as the peer is registered, before any
/// queued broadcast.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    peer_manager: Arc<PeerManager>,
    greeting: Vec<Message>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
) -> Result<(), PeerError> {
    let framed = Framed::new(stream, MessageCodec);
    let (mut writer, mut reader) = framed.split();

    // Create channel for sending to this peer
    let (tx, mut rx) = mpsc::channel::<Message>(100);
    let handle = PeerHandle { addr, tx };

    peer_manager.add_peer(addr, handle).await?;

    for msg in greeting {
        log::debug!("Sending {} to {}", msg.type_name(), addr);
        if let Err(e) = writer.send(msg).await {
            peer_manager.remove_peer(&addr).await;
            return Err(PeerError::IoError(e));
        }
    }

    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if writer.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        match reader.next().await {
            Some(Ok(msg)) => {
                if message_tx.send((addr, msg)).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                log::warn!("Error reading from {}: {}", addr, e);
                break;
            }
            None => {
                log::info!("Peer {} disconnected", addr);
                break;
            }
        }
    }

    write_handle.abort();
    peer_manager.remove_peer(&addr).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    #[test]
    fn test_message_codec() {
        let mut codec = MessageCodec;
        let tx = Transaction::reward("miner");

        let mut buf = BytesMut::new();
        codec
            .encode(Message::NewTransaction(tx.clone()), &mut buf)
            .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        if let Message::NewTransaction(received) = decoded {
            assert_eq!(received, tx);
        } else {
            panic!("Wrong message type");
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_waits_for_full_frame() {
        let mut codec = MessageCodec;
        let mut full = BytesMut::new();
        codec.encode(Message::GetChain, &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_codec_rejects_bad_magic() {
        let mut codec = MessageCodec;
        let mut buf = BytesMut::from(&b"XXXX\0\0\0\x02{}"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[tokio::test]
    async fn test_connection_delivers_greeting() {
        let server = Server::bind(0).await.unwrap();
        let port = server.local_addr().unwrap().port();

        let accept = tokio::spawn(async move { server.accept().await.unwrap() });
        let (stream, addr) = connect_to_peer(&format!("127.0.0.1:{}", port))
            .await
            .unwrap();
        let (inbound, _) = accept.await.unwrap();

        let (tx, _rx) = mpsc::channel(8);
        tokio::spawn(handle_connection(
            stream,
            addr,
            Arc::new(PeerManager::new()),
            vec![Message::GetPool],
            tx,
        ));

        let mut framed = Framed::new(inbound, MessageCodec);
        let received = framed.next().await.unwrap().unwrap();
        assert!(matches!(received, Message::GetPool));
    }
}
