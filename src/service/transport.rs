//! Thin transport abstraction so [`super::runtime::Service`] workers don't
//! care whether their wire format rides UDP (Semtech/TTN) or a
//! length-prefixed TCP stream (Relay and friends). A [`MockTransport`] backs
//! the runtime's unit tests.

use crate::error::GatewayError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex as AsyncMutex;

/// One datagram/frame worth of bytes in either direction.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, data: &[u8]) -> Result<(), GatewayError>;

    /// Waits up to `timeout` for one inbound frame. `Ok(None)` on timeout.
    async fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, GatewayError>;
}

/// A UDP-backed transport connected to a single remote endpoint, used by the
/// Semtech/TTN protocol (each datagram is already self-delimiting).
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn connect(local: &str, remote: &str) -> Result<Self, GatewayError> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<(), GatewayError> {
        self.socket.send(data).await?;
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, GatewayError> {
        let mut buf = vec![0u8; 4096];
        match tokio::time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Ok(Err(e)) => Err(GatewayError::from(e)),
            Err(_) => Ok(None),
        }
    }
}

/// A TCP-backed transport with a 2-byte big-endian length prefix per frame,
/// used by the Relay protocol (whose frames carry no self-delimiting length).
pub struct TcpTransport {
    stream: AsyncMutex<TcpStream>,
}

impl TcpTransport {
    pub async fn connect(remote: &str) -> Result<Self, GatewayError> {
        let stream = TcpStream::connect(remote).await?;
        Ok(Self {
            stream: AsyncMutex::new(stream),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, data: &[u8]) -> Result<(), GatewayError> {
        let len = data.len() as u16;
        let mut stream = self.stream.lock().await;
        // Safety net against a caller trying to frame something oversized;
        // relay payloads are already capped well under u16::MAX.
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(data).await?;
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, GatewayError> {
        let mut stream = self.stream.lock().await;
        let read = async {
            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            stream.read_exact(&mut data).await?;
            Ok::<_, std::io::Error>(data)
        };
        match tokio::time::timeout(timeout, read).await {
            Ok(Ok(data)) => Ok(Some(data)),
            Ok(Err(e)) => Err(GatewayError::from(e)),
            Err(_) => Ok(None),
        }
    }
}

/// An MQTT-backed transport: `send` publishes to the uplink topic, `recv`
/// polls the event loop for a publish on the downlink topic.
#[cfg(feature = "mqtt")]
pub struct MqttTransport {
    client: rumqttc::AsyncClient,
    eventloop: AsyncMutex<rumqttc::EventLoop>,
    uplink_topic: String,
    downlink_topic: String,
}

#[cfg(feature = "mqtt")]
impl MqttTransport {
    pub async fn connect(
        broker: &str,
        port: u16,
        client_id: &str,
        password: Option<&str>,
        uplink_topic: String,
        downlink_topic: String,
    ) -> Result<Self, GatewayError> {
        let mut options = rumqttc::MqttOptions::new(client_id, broker, port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(password) = password {
            options.set_credentials(client_id, password);
        }
        let (client, eventloop) = rumqttc::AsyncClient::new(options, 64);
        client
            .subscribe(&downlink_topic, rumqttc::QoS::AtLeastOnce)
            .await
            .map_err(|e| GatewayError::TransientIo(e.to_string()))?;
        Ok(Self {
            client,
            eventloop: AsyncMutex::new(eventloop),
            uplink_topic,
            downlink_topic,
        })
    }
}

#[cfg(feature = "mqtt")]
#[async_trait]
impl Transport for MqttTransport {
    async fn send(&self, data: &[u8]) -> Result<(), GatewayError> {
        self.client
            .publish(&self.uplink_topic, rumqttc::QoS::AtLeastOnce, false, data)
            .await
            .map_err(|e| GatewayError::TransientIo(e.to_string()))
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<Vec<u8>>, GatewayError> {
        let mut eventloop = self.eventloop.lock().await;
        loop {
            let poll = tokio::time::timeout(timeout, eventloop.poll()).await;
            match poll {
                Ok(Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish)))) => {
                    if publish.topic == self.downlink_topic {
                        return Ok(Some(publish.payload.to_vec()));
                    }
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(GatewayError::TransientIo(e.to_string())),
                Err(_) => return Ok(None),
            }
        }
    }
}

/// An in-memory transport for tests: outbound frames land in `sent`, inbound
/// frames are drained from a pre-loaded queue.
#[derive(Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    failing: Arc<std::sync::atomic::AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_inbound(&self, frame: Vec<u8>) {
        self.inbound.lock().unwrap().push_back(frame);
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Makes every subsequent `send`/`recv` return an error, for exercising
    /// a service's failure/autoquit path without a real broken socket.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::Relaxed);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<(), GatewayError> {
        if self.failing.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(GatewayError::TransientIo("mock transport send failure".to_string()));
        }
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn recv(&self, _timeout: Duration) -> Result<Option<Vec<u8>>, GatewayError> {
        if self.failing.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(GatewayError::TransientIo("mock transport recv failure".to_string()));
        }
        Ok(self.inbound.lock().unwrap().pop_front())
    }
}
