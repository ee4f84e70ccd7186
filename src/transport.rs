//! Register transport session.
//!
//! The poll scheduler talks to devices through the narrow
//! [`RegisterTransport`] trait; [`ModbusTcpTransport`] is the production
//! implementation. Tests substitute their own.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::debug;

use crate::config::{DeviceConfig, RegisterTable};

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),
    /// A register read failed on an otherwise established session.
    #[error("Read failed: {0}")]
    Read(String),
}

/// One request/response session to a register-addressed device.
///
/// A transport is either disconnected or connected; reads are only valid
/// while connected. Implementations own their session state exclusively.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Establish the session.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Whether the session is currently established.
    fn is_connected(&self) -> bool;

    /// Read `count` raw words starting at `address` from the given table.
    ///
    /// An I/O failure tears the session down; the next cycle reconnects.
    async fn read_words(
        &mut self,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Drop the session.
    async fn close(&mut self);
}

/// Modbus TCP implementation of [`RegisterTransport`].
pub struct ModbusTcpTransport {
    host: String,
    port: u16,
    unit_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusTcpTransport {
    /// Create a disconnected transport for a device.
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            host: device.host.clone(),
            port: device.port,
            unit_id: device.unit_id,
            timeout: Duration::from_millis(device.timeout_ms),
            ctx: None,
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| TransportError::Connect(format!("Invalid address: {}", e)))?;

        let ctx = tokio::time::timeout(
            self.timeout,
            tcp::connect_slave(addr, Slave(self.unit_id)),
        )
        .await
        .map_err(|_| TransportError::Connect("Connection timeout".to_string()))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(host = %self.host, port = self.port, unit_id = self.unit_id, "Connected");
        self.ctx = Some(ctx);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_words(
        &mut self,
        table: RegisterTable,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| TransportError::Read("Not connected".to_string()))?;

        let result = match table {
            RegisterTable::Input => {
                tokio::time::timeout(self.timeout, ctx.read_input_registers(address, count)).await
            }
            RegisterTable::Holding => {
                tokio::time::timeout(self.timeout, ctx.read_holding_registers(address, count)).await
            }
        };

        match result {
            Err(_) => {
                // Timed out mid-request; the session is in an unknown state.
                self.ctx = None;
                Err(TransportError::Read(format!(
                    "Read timeout at address {}",
                    address
                )))
            }
            Ok(Err(e)) => {
                self.ctx = None;
                Err(TransportError::Read(e.to_string()))
            }
            // A Modbus exception response leaves the session usable.
            Ok(Ok(Err(exception))) => {
                Err(TransportError::Read(format!("Exception: {:?}", exception)))
            }
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }

    async fn close(&mut self) {
        if self.ctx.take().is_some() {
            debug!(host = %self.host, port = self.port, "Session closed");
        }
    }
}
