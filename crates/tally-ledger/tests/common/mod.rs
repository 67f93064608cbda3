//! Signing device stubs and service builders shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_ledger::{LedgerConfig, LedgerService};
use tally_store::{InMemoryDatabase, LedgerDatabase};
use tally_tse::{DeviceError, SignRequest, SigningDevice, SoftwareTse};
use tally_types::TseResponse;

/// Always fails with `Unavailable`.
pub struct FailingDevice {
    pub calls: AtomicUsize,
}

impl FailingDevice {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SigningDevice for FailingDevice {
    async fn sign(&self, _request: &SignRequest) -> Result<TseResponse, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DeviceError::Unavailable("device offline".into()))
    }

    fn serial(&self) -> &str {
        "STUB-FAILING"
    }
}

/// Never answers.
pub struct HangingDevice;

#[async_trait]
impl SigningDevice for HangingDevice {
    async fn sign(&self, _request: &SignRequest) -> Result<TseResponse, DeviceError> {
        std::future::pending().await
    }

    fn serial(&self) -> &str {
        "STUB-HANGING"
    }
}

/// A software device that waits before answering, so concurrent callers
/// overlap inside the device call.
pub struct SlowDevice {
    inner: SoftwareTse,
    delay: Duration,
}

impl SlowDevice {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: SoftwareTse::generate(),
            delay,
        }
    }
}

#[async_trait]
impl SigningDevice for SlowDevice {
    async fn sign(&self, request: &SignRequest) -> Result<TseResponse, DeviceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.sign(request).await
    }

    fn serial(&self) -> &str {
        self.inner.serial()
    }
}

pub fn service_with(
    db: Arc<dyn LedgerDatabase>,
    device: Arc<dyn SigningDevice>,
) -> LedgerService {
    LedgerService::new(db, device, LedgerConfig::default()).unwrap()
}

pub fn in_memory(device: Arc<dyn SigningDevice>) -> (Arc<InMemoryDatabase>, LedgerService) {
    let db = Arc::new(InMemoryDatabase::new());
    let service = service_with(db.clone(), device);
    (db, service)
}
