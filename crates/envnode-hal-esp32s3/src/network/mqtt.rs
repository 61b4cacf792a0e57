//! QoS 0 MQTT session over one TCP socket, scoped to a single wake cycle.
//!
//! The protocol side is `rust-mqtt`. Its client keeps no state between
//! exchanges once the session is open, so one is built over the socket for
//! each exchange and the socket itself carries the session.

use core::net::Ipv4Addr;

use embassy_net::{IpAddress, IpEndpoint, tcp::TcpSocket};
use embassy_time::{Duration, Instant, WithTimeout};
use envnode_core::{
    network::{InboundMessage, NetworkTransport},
    publish::PublishQueue,
};
use log::{debug, info, warn};
use rust_mqtt::{
    client::{
        client::MqttClient,
        client_config::{ClientConfig, MqttVersion},
    },
    packet::v5::{publish_packet::QualityOfService, reason_codes::ReasonCode},
    utils::rng_generator::CountingRng,
};

use super::{LinkError, WifiLink};

/// Encode and decode buffer size; larger inbound packets are rejected by
/// the client.
pub const PACKET_BYTES: usize = 512;
const MAX_PROPERTIES: usize = 5;
const SUBSCRIBE_BUDGET_MS: u64 = 1_000;
const DISCONNECT_BUDGET_MS: u64 = 300;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MqttConfig {
    pub broker: Ipv4Addr,
    pub port: u16,
    pub client_id: &'static str,
    pub keep_alive_s: u16,
}

impl MqttConfig {
    pub const fn new(broker: Ipv4Addr, client_id: &'static str) -> Self {
        Self {
            broker,
            port: 1883,
            client_id,
            keep_alive_s: 30,
        }
    }
}

#[derive(Debug)]
pub enum MqttError {
    Link(LinkError),
    Timeout,
    Tcp,
    /// The client or the broker answered with a failure reason code.
    Broker(ReasonCode),
    NotConnected,
}

type SessionClient<'s, 'a> = MqttClient<'s, &'s mut TcpSocket<'a>, MAX_PROPERTIES, CountingRng>;

fn session_client<'s, 'a>(
    socket: &'s mut TcpSocket<'a>,
    tx: &'s mut [u8; PACKET_BYTES],
    rx: &'s mut [u8; PACKET_BYTES],
    config: &MqttConfig,
) -> SessionClient<'s, 'a> {
    let mut client_config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20_000));
    client_config.add_client_id(config.client_id);
    client_config.add_max_subscribe_qos(QualityOfService::QoS0);
    client_config.keep_alive = config.keep_alive_s;
    client_config.max_packet_size = PACKET_BYTES as u32;
    MqttClient::new(socket, tx, PACKET_BYTES, rx, PACKET_BYTES, client_config)
}

fn deadline_in(ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(ms)
}

pub struct MqttTransport<'a> {
    link: WifiLink<'a>,
    socket: TcpSocket<'a>,
    config: MqttConfig,
    queue: PublishQueue,
    tx: [u8; PACKET_BYTES],
    rx: [u8; PACKET_BYTES],
    session: bool,
}

impl<'a> MqttTransport<'a> {
    pub fn new(
        link: WifiLink<'a>,
        rx_buffer: &'a mut [u8],
        tx_buffer: &'a mut [u8],
        config: MqttConfig,
    ) -> Self {
        let socket = TcpSocket::new(link.stack(), rx_buffer, tx_buffer);
        Self {
            link,
            socket,
            config,
            queue: PublishQueue::new(),
            tx: [0; PACKET_BYTES],
            rx: [0; PACKET_BYTES],
            session: false,
        }
    }

    fn client(&mut self) -> SessionClient<'_, 'a> {
        session_client(&mut self.socket, &mut self.tx, &mut self.rx, &self.config)
    }

    fn drop_session(&mut self) {
        self.session = false;
        self.socket.abort();
    }
}

impl NetworkTransport for MqttTransport<'_> {
    type Error = MqttError;

    async fn connect(&mut self, budget_ms: u32) -> Result<(), MqttError> {
        let deadline = deadline_in(budget_ms as u64);
        self.session = false;
        self.link.join(deadline).await.map_err(MqttError::Link)?;

        let endpoint = IpEndpoint::new(IpAddress::Ipv4(self.config.broker), self.config.port);
        match self.socket.connect(endpoint).with_deadline(deadline).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("mqtt: tcp connect failed: {:?}", err);
                return Err(MqttError::Tcp);
            }
            Err(_) => {
                self.socket.abort();
                return Err(MqttError::Timeout);
            }
        }

        let opened = self.client().connect_to_broker().with_deadline(deadline).await;
        match opened {
            Ok(Ok(())) => {}
            Ok(Err(code)) => {
                warn!("mqtt: broker refused session: {:?}", code);
                self.drop_session();
                return Err(MqttError::Broker(code));
            }
            Err(_) => {
                self.drop_session();
                return Err(MqttError::Timeout);
            }
        }

        self.session = true;
        info!(
            "mqtt: session open broker={}:{} client={}",
            self.config.broker, self.config.port, self.config.client_id
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session && self.link.is_up()
    }

    async fn subscribe(&mut self, topic_filter: &str) -> Result<(), MqttError> {
        if !self.session {
            return Err(MqttError::NotConnected);
        }
        let acked = self
            .client()
            .subscribe_to_topic(topic_filter)
            .with_timeout(Duration::from_millis(SUBSCRIBE_BUDGET_MS))
            .await;
        match acked {
            Ok(Ok(())) => {
                debug!("mqtt: subscribed filter={}", topic_filter);
                Ok(())
            }
            Ok(Err(code)) => {
                warn!("mqtt: subscription {} rejected: {:?}", topic_filter, code);
                Err(MqttError::Broker(code))
            }
            Err(_) => Err(MqttError::Timeout),
        }
    }

    fn queue_publish(&mut self, topic: &str, payload: &str, retain: bool) -> bool {
        self.queue.push(topic, payload, retain)
    }

    async fn flush(&mut self, budget_ms: u32) -> Result<usize, MqttError> {
        if !self.session {
            return Err(MqttError::NotConnected);
        }
        let deadline = deadline_in(budget_ms as u64);
        let mut sent = 0usize;

        while let Some(message) = self.queue.front() {
            let mut client =
                session_client(&mut self.socket, &mut self.tx, &mut self.rx, &self.config);
            let outcome = client
                .send_message(
                    message.topic.as_str(),
                    message.payload.as_bytes(),
                    QualityOfService::QoS0,
                    message.retain,
                )
                .with_deadline(deadline)
                .await;
            let err = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(code)) => Some(MqttError::Broker(code)),
                Err(_) => Some(MqttError::Timeout),
            };
            if let Some(err) = err {
                warn!("mqtt: publish stopped after {} messages: {:?}", sent, err);
                if sent == 0 {
                    return Err(err);
                }
                return Ok(sent);
            }
            self.queue.pop_front();
            sent += 1;
        }

        match self.socket.flush().with_deadline(deadline).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("mqtt: tcp flush failed: {:?}", err),
            Err(_) => warn!("mqtt: tcp flush timed out"),
        }
        Ok(sent)
    }

    async fn poll_inbound(&mut self, wait_ms: u32) -> Result<Option<InboundMessage>, MqttError> {
        if !self.session {
            return Err(MqttError::NotConnected);
        }
        let deadline = deadline_in(wait_ms as u64);
        loop {
            let mut client = self.client();
            let received = client.receive_message().with_deadline(deadline).await;
            match received {
                Ok(Ok((topic, payload))) => match InboundMessage::from_bytes(topic, payload) {
                    Some(message) => return Ok(Some(message)),
                    None => debug!("mqtt: dropped unusable message on {}", topic),
                },
                Ok(Err(ReasonCode::NetworkError)) => {
                    drop(client);
                    self.drop_session();
                    return Err(MqttError::Tcp);
                }
                Ok(Err(code)) => debug!("mqtt: skipped packet: {:?}", code),
                Err(_) => return Ok(None),
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.session {
            let _ = self
                .client()
                .disconnect()
                .with_timeout(Duration::from_millis(DISCONNECT_BUDGET_MS))
                .await;
        }
        self.socket.close();
        let _ = self
            .socket
            .flush()
            .with_timeout(Duration::from_millis(DISCONNECT_BUDGET_MS))
            .await;
        self.drop_session();
        self.queue.clear();
        self.link.leave().await;
        info!("mqtt: session closed");
    }
}
