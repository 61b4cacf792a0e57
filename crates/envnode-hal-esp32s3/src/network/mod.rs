//! Wi-Fi station link and the MQTT transport built on it.

pub mod mqtt;

use embassy_net::Stack;
use embassy_time::{Instant, WithTimeout};
use esp_radio::wifi::WifiController;
use log::{info, warn};

/// Wi-Fi credentials source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl WifiConfig {
    pub const fn new(ssid: &'static str, password: &'static str) -> Self {
        Self { ssid, password }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LinkError {
    Start,
    Associate,
    DhcpTimeout,
}

/// Station-mode radio plus the IP stack it feeds. Joining is bounded by a
/// deadline; there is no background reconnect loop.
pub struct WifiLink<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
}

impl<'a> WifiLink<'a> {
    /// `controller` must already carry the client configuration.
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self { controller, stack }
    }

    pub fn stack(&self) -> Stack<'a> {
        self.stack
    }

    pub fn is_up(&self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    /// Starts the radio, associates and waits for a DHCP lease.
    pub async fn join(&mut self, deadline: Instant) -> Result<(), LinkError> {
        if !self.controller.is_started().unwrap_or(false) {
            match self.controller.start_async().with_deadline(deadline).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("wifi: start failed: {:?}", err);
                    return Err(LinkError::Start);
                }
                Err(_) => return Err(LinkError::Start),
            }
        }

        match self.controller.connect_async().with_deadline(deadline).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!("wifi: connect failed: {:?}", err);
                let _ = self.controller.disconnect_async().await;
                return Err(LinkError::Associate);
            }
            Err(_) => {
                warn!("wifi: connect timed out");
                let _ = self.controller.disconnect_async().await;
                return Err(LinkError::Associate);
            }
        }

        if self
            .stack
            .wait_config_up()
            .with_deadline(deadline)
            .await
            .is_err()
        {
            warn!("wifi: dhcp timeout");
            let _ = self.controller.disconnect_async().await;
            return Err(LinkError::DhcpTimeout);
        }

        if let Some(config) = self.stack.config_v4() {
            info!("wifi: connected address={}", config.address);
        }
        Ok(())
    }

    /// Drops the association and stops the radio before sleep.
    pub async fn leave(&mut self) {
        let _ = self.controller.disconnect_async().await;
        if let Err(err) = self.controller.stop_async().await {
            warn!("wifi: stop failed: {:?}", err);
        }
    }
}
