//! Domain types exchanged with the remote services and the crypto engine

pub mod operation;
pub mod resources;
pub mod secret;
pub mod transaction;

pub use operation::{
    MpcData, OperationKind, OperationStatus, PendingDevice, PendingDeviceArchive,
    PendingDeviceBackup, PendingDeviceGroup, PendingOperation, PendingOperationSet,
    PendingSignature,
};
pub use resources::{
    Address, CreateMpcWalletResponse, Device, DeviceGroup, ExportedKey, LongRunningOperation,
    MpcWallet, OperationError, Pool, Signature,
};
pub use secret::{DeviceBackup, Passcode};
pub use transaction::{RawSignedTransaction, SignedTransaction, Transaction};
