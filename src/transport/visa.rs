//! VISA backend for [`BusTransport`](super::BusTransport).
//!
//! The real implementation is gated behind the `instrument_visa` feature flag, since it
//! links against a system VISA library. Without the feature, the backend still exists
//! but refuses to open sessions.

use super::bus::{BusBackend, BusSession};
use crate::error::{BenchError, BenchResult};
use std::sync::Arc;
use std::time::Duration;

/// The VISA backend available in this build.
pub fn default_backend() -> Arc<dyn BusBackend> {
    Arc::new(VisaBackend)
}

/// Opens sessions through the system VISA resource manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct VisaBackend;

#[cfg(feature = "instrument_visa")]
mod imp {
    use super::*;
    use std::ffi::CString;
    use std::io::{self, Read, Write};
    use visa_rs::enums::attribute::{AttrTmoValue, HasAttribute};
    use visa_rs::prelude::*;

    /// One open VISA instrument session.
    ///
    /// Field order matters: the instrument must close before its resource manager.
    pub struct VisaSession {
        instrument: Instrument,
        _manager: DefaultRM,
    }

    fn visa_to_io(err: visa_rs::Error) -> io::Error {
        io::Error::other(format!("VISA error: {:?}", err))
    }

    impl Read for VisaSession {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.instrument.read(buf)
        }
    }

    impl Write for VisaSession {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.instrument.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.instrument.flush()
        }
    }

    impl BusSession for VisaSession {
        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
            let attr = AttrTmoValue::new_checked(u64::from(millis)).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "VISA timeout out of range")
            })?;
            self.instrument.set_attr(attr).map_err(visa_to_io)
        }
    }

    impl BusBackend for VisaBackend {
        fn name(&self) -> &'static str {
            "visa"
        }

        fn open(&self, resource: &str, timeout: Duration) -> BenchResult<Box<dyn BusSession>> {
            let manager = DefaultRM::new().map_err(|e| {
                BenchError::Connection(format!("VISA resource manager unavailable: {:?}", e))
            })?;
            let name = CString::new(resource).map_err(|_| {
                BenchError::Argument(format!("Invalid resource string: {}", resource))
            })?;
            let instrument = manager
                .open(&name.into(), AccessMode::NO_LOCK, timeout)
                .map_err(|e| {
                    BenchError::Connection(format!("VISA open of {} failed: {:?}", resource, e))
                })?;
            Ok(Box::new(VisaSession {
                instrument,
                _manager: manager,
            }))
        }
    }
}

#[cfg(feature = "instrument_visa")]
pub use imp::VisaSession;

#[cfg(not(feature = "instrument_visa"))]
impl BusBackend for VisaBackend {
    fn name(&self) -> &'static str {
        "visa (disabled)"
    }

    fn open(&self, _resource: &str, _timeout: Duration) -> BenchResult<Box<dyn BusSession>> {
        Err(BenchError::FeatureNotEnabled("instrument_visa"))
    }
}

#[cfg(all(test, not(feature = "instrument_visa")))]
mod tests {
    use super::*;
    use crate::transport::{BusTransport, Transport};

    #[tokio::test]
    async fn disabled_backend_reports_missing_feature() {
        let mut transport = BusTransport::visa("USB0::0x2A8D::0x1770::MY58491960::0::INSTR");
        assert!(matches!(
            transport.connect().await,
            Err(BenchError::FeatureNotEnabled("instrument_visa"))
        ));
    }
}
