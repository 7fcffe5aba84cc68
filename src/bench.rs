//! The pair of instruments on the bench and how they get connected.
//!
//! [`Bench`] owns at most one oscilloscope and one generator controller. Each sits behind
//! its own async mutex, so an operation on one instrument never waits on the other, and
//! every command to a given instrument is serialized through that instrument's lock.

use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult};
use crate::instrument::{FunctionGenerator, Oscilloscope};
use crate::transport::socket::DEFAULT_PORT;
use crate::transport::{BusTransport, SocketTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{info, warn};

/// Builds unconnected controllers for a given address.
pub trait InstrumentConnector: Send + Sync {
    /// Address used when the caller does not name one.
    fn default_oscilloscope_address(&self) -> String;

    fn default_generator_address(&self) -> String;

    fn oscilloscope(&self, address: &str) -> BenchResult<Oscilloscope>;

    fn generator(&self, address: &str) -> BenchResult<FunctionGenerator>;
}

/// Real instruments: the oscilloscope on the bus, the generator on a socket.
#[derive(Debug, Clone)]
pub struct HardwareConnector {
    resource: String,
    bus_timeout: Duration,
    generator_address: String,
    socket_timeout: Duration,
}

impl HardwareConnector {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            resource: config.oscilloscope.resource.clone(),
            bus_timeout: config.oscilloscope.timeout(),
            generator_address: config.generator.address(),
            socket_timeout: config.generator.timeout(),
        }
    }
}

impl InstrumentConnector for HardwareConnector {
    fn default_oscilloscope_address(&self) -> String {
        self.resource.clone()
    }

    fn default_generator_address(&self) -> String {
        self.generator_address.clone()
    }

    fn oscilloscope(&self, address: &str) -> BenchResult<Oscilloscope> {
        let transport = BusTransport::visa(address).with_timeout(self.bus_timeout);
        Ok(Oscilloscope::new(Box::new(transport)))
    }

    fn generator(&self, address: &str) -> BenchResult<FunctionGenerator> {
        let (host, port) = split_host_port(address)?;
        let transport = SocketTransport::new(host, port).with_timeout(self.socket_timeout);
        Ok(FunctionGenerator::new(Box::new(transport)))
    }
}

/// Split `host[:port]`, defaulting to the raw SCPI socket port.
pub fn split_host_port(address: &str) -> BenchResult<(&str, u16)> {
    let address = address.trim();
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                BenchError::Argument(format!("Invalid port in generator address '{}'", address))
            })?;
            (host, port)
        }
        None => (address, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(BenchError::Argument(format!(
            "Missing host in generator address '{}'",
            address
        )));
    }
    Ok((host, port))
}

/// The two bench instruments.
pub struct Bench {
    connector: Arc<dyn InstrumentConnector>,
    oscilloscope: Mutex<Option<Oscilloscope>>,
    generator: Mutex<Option<FunctionGenerator>>,
}

impl Bench {
    pub fn new(connector: Arc<dyn InstrumentConnector>) -> Self {
        Self {
            connector,
            oscilloscope: Mutex::new(None),
            generator: Mutex::new(None),
        }
    }

    /// Connect the oscilloscope, replacing any previous controller.
    ///
    /// A no-op when already connected.
    pub async fn connect_oscilloscope(&self, address: Option<&str>) -> BenchResult<()> {
        let mut slot = self.oscilloscope.lock().await;
        if slot.as_ref().is_some_and(Oscilloscope::is_connected) {
            return Ok(());
        }
        let address = address
            .map(str::to_string)
            .unwrap_or_else(|| self.connector.default_oscilloscope_address());
        let mut scope = self.connector.oscilloscope(&address)?;
        scope.connect().await?;
        info!(address = %address, "Oscilloscope connected");
        if let Some(mut old) = slot.replace(scope) {
            old.dispose();
        }
        Ok(())
    }

    /// Connect and reset the function generator, replacing any previous controller.
    ///
    /// A no-op when already connected.
    pub async fn connect_generator(&self, address: Option<&str>) -> BenchResult<()> {
        let mut slot = self.generator.lock().await;
        if slot.as_ref().is_some_and(FunctionGenerator::is_connected) {
            return Ok(());
        }
        let address = address
            .map(str::to_string)
            .unwrap_or_else(|| self.connector.default_generator_address());
        let mut generator = self.connector.generator(&address)?;
        generator.connect().await?;
        if let Err(err) = generator.initialize().await {
            generator.dispose();
            return Err(err);
        }
        info!(address = %address, "Function generator connected");
        if let Some(mut old) = slot.replace(generator) {
            old.dispose();
        }
        Ok(())
    }

    pub async fn disconnect_oscilloscope(&self) {
        if let Some(mut scope) = self.oscilloscope.lock().await.take() {
            scope.dispose();
            info!("Oscilloscope disconnected");
        }
    }

    /// Switch the generator outputs off and release it.
    pub async fn disconnect_generator(&self) -> BenchResult<()> {
        let Some(mut generator) = self.generator.lock().await.take() else {
            return Ok(());
        };
        let result = generator.shutdown().await;
        match &result {
            Ok(()) => info!("Function generator disconnected"),
            Err(err) => warn!("Function generator released with outputs in unknown state: {}", err),
        }
        result
    }

    pub async fn is_oscilloscope_connected(&self) -> bool {
        self.oscilloscope
            .lock()
            .await
            .as_ref()
            .is_some_and(Oscilloscope::is_connected)
    }

    pub async fn is_generator_connected(&self) -> bool {
        self.generator
            .lock()
            .await
            .as_ref()
            .is_some_and(FunctionGenerator::is_connected)
    }

    /// Exclusive access to the oscilloscope controller until the guard drops.
    pub async fn oscilloscope(&self) -> BenchResult<MappedMutexGuard<'_, Oscilloscope>> {
        MutexGuard::try_map(self.oscilloscope.lock().await, Option::as_mut)
            .map_err(|_| BenchError::NotConnected("oscilloscope".to_string()))
    }

    /// Exclusive access to the generator controller until the guard drops.
    pub async fn generator(&self) -> BenchResult<MappedMutexGuard<'_, FunctionGenerator>> {
        MutexGuard::try_map(self.generator.lock().await, Option::as_mut)
            .map_err(|_| BenchError::NotConnected("function generator".to_string()))
    }
}
