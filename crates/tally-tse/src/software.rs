use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use tally_crypto::{ChainCodec, Field};
use tally_types::{Timestamp, TseResponse};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::device::{SignRequest, SigningDevice};
use crate::error::DeviceError;

/// Domain tag of the message the device signs.
const SIGNING_CODEC: ChainCodec = ChainCodec::new("tally-tse-v1");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Counters {
    transaction_number: u64,
    signature_counter: u64,
}

/// On-disk state of a [`SoftwareTse`].
#[derive(Serialize, Deserialize)]
struct DeviceState {
    secret_key: String,
    #[serde(flatten)]
    counters: Counters,
}

/// Ed25519 software signing device.
///
/// Every signature advances the transaction number and the signature
/// counter by one. The signed message binds the serial, both counters, the
/// device time and the request. When opened from a state file the
/// counters are saved before the signature is released, so they never go
/// backwards across restarts. The file write runs on the blocking pool;
/// concurrent `sign` calls queue on the counter lock.
pub struct SoftwareTse {
    key: ed25519_dalek::SigningKey,
    serial: String,
    counters: Mutex<Counters>,
    state_path: Option<PathBuf>,
}

impl SoftwareTse {
    /// A device with a fresh random key and in-memory counters.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self::with_key(ed25519_dalek::SigningKey::generate(&mut csprng), Counters::default(), None)
    }

    /// A device with the given secret key and in-memory counters.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::with_key(
            ed25519_dalek::SigningKey::from_bytes(&bytes),
            Counters::default(),
            None,
        )
    }

    /// Load the device from `path`, creating a new key there if the file
    /// does not exist.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        if path.exists() {
            let raw = fs::read(path).map_err(|e| DeviceError::State(e.to_string()))?;
            let state: DeviceState =
                serde_json::from_slice(&raw).map_err(|e| DeviceError::State(e.to_string()))?;
            let secret: [u8; 32] = hex::decode(&state.secret_key)
                .map_err(|e| DeviceError::State(e.to_string()))?
                .try_into()
                .map_err(|_| DeviceError::State("secret key must be 32 bytes".into()))?;

            let device = Self::with_key(
                ed25519_dalek::SigningKey::from_bytes(&secret),
                state.counters,
                Some(path.to_path_buf()),
            );
            info!(
                serial = %device.serial,
                transaction_number = state.counters.transaction_number,
                "software signing device loaded"
            );
            return Ok(device);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DeviceError::State(e.to_string()))?;
            }
        }
        let mut csprng = rand::thread_rng();
        let device = Self::with_key(
            ed25519_dalek::SigningKey::generate(&mut csprng),
            Counters::default(),
            Some(path.to_path_buf()),
        );
        write_state(path, &device.state(Counters::default()))?;
        info!(serial = %device.serial, path = %path.display(), "software signing device created");
        Ok(device)
    }

    fn with_key(key: ed25519_dalek::SigningKey, counters: Counters, state_path: Option<PathBuf>) -> Self {
        let digest = blake3::hash(key.verifying_key().as_bytes());
        let serial = format!("SWTSE-{}", hex::encode_upper(&digest.as_bytes()[..8]));
        Self {
            key,
            serial,
            counters: Mutex::new(counters),
            state_path,
        }
    }

    /// Public key, hex encoded.
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }

    /// The last issued transaction number (0 before the first signature).
    pub async fn transaction_number(&self) -> u64 {
        self.counters.lock().await.transaction_number
    }

    /// Check that `response` is this device's signature over `request`.
    pub fn verify(&self, request: &SignRequest, response: &TseResponse) -> Result<(), DeviceError> {
        if response.device_serial != self.serial {
            return Err(DeviceError::InvalidSignature(format!(
                "serial {} does not belong to this device",
                response.device_serial
            )));
        }

        let bytes: [u8; 64] = hex::decode(&response.signature)
            .map_err(|e| DeviceError::InvalidSignature(e.to_string()))?
            .try_into()
            .map_err(|_| DeviceError::InvalidSignature("signature must be 64 bytes".into()))?;
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);

        let message = signing_message(
            &response.device_serial,
            Counters {
                transaction_number: response.transaction_number,
                signature_counter: response.signature_counter,
            },
            response.log_time,
            request,
        );
        self.key
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .map_err(|_| DeviceError::InvalidSignature("signature does not verify".into()))
    }

    fn state(&self, counters: Counters) -> DeviceState {
        DeviceState {
            secret_key: hex::encode(self.key.to_bytes()),
            counters,
        }
    }
}

/// Replace the state file atomically (write a sibling, then rename).
fn write_state(path: &Path, state: &DeviceState) -> Result<(), DeviceError> {
    let raw = serde_json::to_vec_pretty(state).map_err(|e| DeviceError::State(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, raw).map_err(|e| DeviceError::State(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| DeviceError::State(e.to_string()))
}

#[async_trait]
impl SigningDevice for SoftwareTse {
    async fn sign(&self, request: &SignRequest) -> Result<TseResponse, DeviceError> {
        let counters = {
            let mut current = self.counters.lock().await;
            let next = Counters {
                transaction_number: current.transaction_number + 1,
                signature_counter: current.signature_counter + 1,
            };
            if let Some(path) = self.state_path.clone() {
                let state = self.state(next);
                tokio::task::spawn_blocking(move || write_state(&path, &state))
                    .await
                    .map_err(|e| DeviceError::State(format!("state writer failed: {e}")))??;
            }
            *current = next;
            next
        };

        let log_time = Timestamp::now();
        let message = signing_message(&self.serial, counters, log_time, request);
        let signature = self.key.sign(message.as_bytes());

        debug!(
            operation_id = %request.operation_id,
            transaction_number = counters.transaction_number,
            "software device signed"
        );

        Ok(TseResponse {
            transaction_number: counters.transaction_number,
            signature_counter: counters.signature_counter,
            log_time,
            signature: hex::encode(signature.to_bytes()),
            device_serial: self.serial.clone(),
        })
    }

    fn serial(&self) -> &str {
        &self.serial
    }
}

impl std::fmt::Debug for SoftwareTse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftwareTse({}, key: <redacted>)", self.serial)
    }
}

fn signing_message(
    serial: &str,
    counters: Counters,
    log_time: Timestamp,
    request: &SignRequest,
) -> String {
    SIGNING_CODEC.canonical(&[
        Field::text(serial),
        Field::uint(counters.transaction_number),
        Field::uint(counters.signature_counter),
        Field::owned(log_time.canonical()),
        Field::owned(request.operation_id.to_string()),
        Field::text(&request.event_type),
        Field::document(&request.payload),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_types::{Document, OperationId};

    fn request(kind: &str) -> SignRequest {
        SignRequest {
            operation_id: OperationId::new(),
            event_type: kind.into(),
            payload: Document::from_value(&json!({"amount": 12.5})),
        }
    }

    #[tokio::test]
    async fn counters_advance_per_signature() {
        let tse = SoftwareTse::generate();
        let first = tse.sign(&request("sale")).await.unwrap();
        let second = tse.sign(&request("sale")).await.unwrap();

        assert_eq!(first.transaction_number, 1);
        assert_eq!(second.transaction_number, 2);
        assert_eq!(second.signature_counter, first.signature_counter + 1);
        assert_eq!(first.device_serial, tse.serial());
        assert_eq!(tse.transaction_number().await, 2);
    }

    #[tokio::test]
    async fn response_verifies() {
        let tse = SoftwareTse::generate();
        let req = request("sale");
        let response = tse.sign(&req).await.unwrap();
        assert!(tse.verify(&req, &response).is_ok());
    }

    #[tokio::test]
    async fn tampered_response_fails_verification() {
        let tse = SoftwareTse::generate();
        let req = request("sale");
        let mut response = tse.sign(&req).await.unwrap();
        response.transaction_number += 1;
        assert!(matches!(
            tse.verify(&req, &response),
            Err(DeviceError::InvalidSignature(_))
        ));

        let other = request("void");
        let response = tse.sign(&req).await.unwrap();
        assert!(tse.verify(&other, &response).is_err());
    }

    #[tokio::test]
    async fn foreign_serial_is_rejected() {
        let tse = SoftwareTse::generate();
        let other = SoftwareTse::generate();
        let req = request("sale");
        let response = other.sign(&req).await.unwrap();
        assert!(tse.verify(&req, &response).is_err());
    }

    #[test]
    fn serial_is_derived_from_key() {
        let a = SoftwareTse::from_secret_bytes([3; 32]);
        let b = SoftwareTse::from_secret_bytes([3; 32]);
        let c = SoftwareTse::from_secret_bytes([4; 32]);
        assert_eq!(a.serial(), b.serial());
        assert_ne!(a.serial(), c.serial());
        assert!(a.serial().starts_with("SWTSE-"));
    }

    #[tokio::test]
    async fn state_file_keeps_key_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tse.json");

        let serial = {
            let tse = SoftwareTse::open(&path).unwrap();
            tse.sign(&request("sale")).await.unwrap();
            tse.sign(&request("sale")).await.unwrap();
            tse.serial().to_string()
        };

        let tse = SoftwareTse::open(&path).unwrap();
        assert_eq!(tse.serial(), serial);
        let response = tse.sign(&request("sale")).await.unwrap();
        assert_eq!(response.transaction_number, 3);
    }

    #[test]
    fn debug_redacts_key() {
        let tse = SoftwareTse::generate();
        let debug = format!("{tse:?}");
        assert!(debug.contains("redacted"));
        assert!(!debug.contains(&hex::encode(tse.key.to_bytes())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_signatures_with_state_file_get_distinct_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tse.json");
        let tse = std::sync::Arc::new(SoftwareTse::open(&path).unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let tse = std::sync::Arc::clone(&tse);
                tokio::spawn(async move { tse.sign(&request("sale")).await.unwrap() })
            })
            .collect();
        let mut numbers = Vec::new();
        for task in tasks {
            numbers.push(task.await.unwrap().transaction_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<_>>());

        drop(tse);
        let reopened = SoftwareTse::open(&path).unwrap();
        assert_eq!(reopened.transaction_number().await, 8);
    }
}
