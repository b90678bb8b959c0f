//! Crypto engine double
//!
//! Deterministic stand-in for the MPC SDK. Outputs are derived with SHA-256
//! from the inputs, so repeated calls with the same inputs agree. When
//! linked to a [`MockBackend`], computing an operation completes it on the
//! backend the way a real device would.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use waas_core::{
    Completion, CryptoEngine, DeviceBackup, EngineError, EngineResult, ExportedKey, MpcData,
    Passcode, RawSignedTransaction, Signature,
};

use crate::recorder::CallRecorder;
use crate::services::MockBackend;

/// How callback-style calls deliver their result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Complete before returning
    #[default]
    Inline,
    /// Complete from a separate OS thread
    Thread,
    /// Drop the completion without a result
    Drop,
    /// Hold the completion until [`MockCryptoEngine::take_parked`]
    Park,
}

/// Recording crypto engine double
#[derive(Debug)]
pub struct MockCryptoEngine {
    state: Mutex<EngineState>,
    recorder: CallRecorder,
    backend: Option<Arc<MockBackend>>,
}

#[derive(Debug, Default)]
struct EngineState {
    passcode: Option<String>,
    failures: HashMap<String, String>,
    completion_mode: CompletionMode,
    computed: Vec<String>,
    prepared_backup: Option<String>,
    parked: Vec<Completion>,
    compute_delay: Option<Duration>,
}

fn digest_hex(input: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(input.as_ref()))
}

impl MockCryptoEngine {
    /// Create an engine that is not linked to a backend
    pub fn new(recorder: CallRecorder) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            recorder,
            backend: None,
        }
    }

    /// Create an engine whose computations complete operations on `backend`
    pub fn linked(backend: Arc<MockBackend>) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            recorder: backend.recorder().clone(),
            backend: Some(backend),
        }
    }

    /// Fail the next call to `call` (e.g. `CryptoEngine.compute_mpc_operation`)
    pub fn fail_next(&self, call: &str, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .insert(call.to_string(), message.into());
    }

    /// Choose how completions are delivered
    pub fn set_completion_mode(&self, mode: CompletionMode) {
        self.state.lock().completion_mode = mode;
    }

    /// Oldest completion held back in [`CompletionMode::Park`]
    pub fn take_parked(&self) -> Option<Completion> {
        let mut state = self.state.lock();
        if state.parked.is_empty() {
            None
        } else {
            Some(state.parked.remove(0))
        }
    }

    /// Block every compute call for `delay` before it finishes
    pub fn set_compute_delay(&self, delay: Duration) {
        self.state.lock().compute_delay = Some(delay);
    }

    /// MPC data of every successful compute, in order
    pub fn computed_operations(&self) -> Vec<String> {
        self.state.lock().computed.clone()
    }

    /// True once `bootstrap_device` has succeeded
    pub fn is_bootstrapped(&self) -> bool {
        self.state.lock().passcode.is_some()
    }

    fn begin(&self, call: &str) -> EngineResult<()> {
        let label = format!("CryptoEngine.{call}");
        self.recorder.record(label.clone());
        match self.state.lock().failures.remove(&label) {
            Some(message) => Err(EngineError::new(message)),
            None => Ok(()),
        }
    }

    fn deliver(&self, done: Completion, result: EngineResult<String>) {
        let mode = self.state.lock().completion_mode;
        match mode {
            CompletionMode::Inline => done.complete(result),
            CompletionMode::Thread => {
                std::thread::spawn(move || done.complete(result));
            }
            CompletionMode::Drop => drop(done),
            CompletionMode::Park => self.state.lock().parked.push(done),
        }
    }

    fn check_passcode(&self, passcode: &Passcode) -> EngineResult<()> {
        match &self.state.lock().passcode {
            Some(current) if current != passcode.expose() => {
                Err(EngineError::new("invalid passcode"))
            }
            _ => Ok(()),
        }
    }

    fn finish_compute(&self, mpc_data: &MpcData) {
        let delay = self.state.lock().compute_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.state.lock().computed.push(mpc_data.as_str().to_string());
        if let Some(backend) = &self.backend {
            backend.complete_operation(mpc_data);
        }
    }
}

impl CryptoEngine for MockCryptoEngine {
    fn bootstrap_device(&self, passcode: &Passcode, done: Completion) {
        let result = self.begin("bootstrap_device").map(|()| {
            self.state.lock().passcode = Some(passcode.expose().to_string());
            String::new()
        });
        self.deliver(done, result);
    }

    fn reset_passcode(&self, new_passcode: &Passcode) -> EngineResult<()> {
        self.begin("reset_passcode")?;
        let mut state = self.state.lock();
        if state.passcode.is_none() {
            return Err(EngineError::new("device is not bootstrapped"));
        }
        state.passcode = Some(new_passcode.expose().to_string());
        Ok(())
    }

    fn get_registration_data(&self, done: Completion) {
        let result = self
            .begin("get_registration_data")
            .map(|()| format!("registration-{}", &digest_hex("device")[..16]));
        self.deliver(done, result);
    }

    fn compute_mpc_operation(&self, mpc_data: &MpcData) -> EngineResult<()> {
        self.begin("compute_mpc_operation")?;
        self.finish_compute(mpc_data);
        Ok(())
    }

    fn compute_prepare_device_archive_mpc_operation(
        &self,
        mpc_data: &MpcData,
        passcode: &Passcode,
    ) -> EngineResult<()> {
        self.begin("compute_prepare_device_archive_mpc_operation")?;
        self.check_passcode(passcode)?;
        self.finish_compute(mpc_data);
        Ok(())
    }

    fn compute_prepare_device_backup_mpc_operation(
        &self,
        mpc_data: &MpcData,
        passcode: &Passcode,
    ) -> EngineResult<()> {
        self.begin("compute_prepare_device_backup_mpc_operation")?;
        self.check_passcode(passcode)?;
        self.state.lock().prepared_backup =
            Some(digest_hex(format!("backup:{}", mpc_data.as_str())));
        self.finish_compute(mpc_data);
        Ok(())
    }

    fn export_device_backup(&self, done: Completion) {
        let result = self.begin("export_device_backup").and_then(|()| {
            self.state
                .lock()
                .prepared_backup
                .clone()
                .ok_or_else(|| EngineError::new("no device backup has been prepared"))
        });
        self.deliver(done, result);
    }

    fn compute_add_device_mpc_operation(
        &self,
        mpc_data: &MpcData,
        passcode: &Passcode,
        backup: &DeviceBackup,
    ) -> EngineResult<()> {
        self.begin("compute_add_device_mpc_operation")?;
        self.check_passcode(passcode)?;
        if backup.expose().is_empty() {
            return Err(EngineError::new("device backup is empty"));
        }
        self.finish_compute(mpc_data);
        Ok(())
    }

    fn export_private_keys(
        &self,
        mpc_key_export_metadata: &str,
        passcode: &Passcode,
    ) -> EngineResult<String> {
        self.begin("export_private_keys")?;
        self.check_passcode(passcode)?;
        if mpc_key_export_metadata.is_empty() {
            return Err(EngineError::new("export metadata is empty"));
        }
        let address = digest_hex(format!("address:{mpc_key_export_metadata}"));
        let keys = vec![ExportedKey::new(
            format!("0x{}", &address[..40]),
            digest_hex(format!("key:{mpc_key_export_metadata}")),
        )];
        serde_json::to_string(&keys).map_err(|e| EngineError::new(e.to_string()))
    }

    fn get_signed_transaction(
        &self,
        transaction_json: &str,
        signature: &Signature,
    ) -> EngineResult<RawSignedTransaction> {
        self.begin("get_signed_transaction")?;
        let raw = format!(
            "0x02{}",
            digest_hex(format!("{transaction_json}|{}", signature.signed_payload))
        );
        Ok(RawSignedTransaction {
            transaction_hash: format!("0x{}", digest_hex(&raw)),
            raw_transaction: raw,
        })
    }
}
