/// La-Vak shared data model.
///
/// Types here are owned by no single component: Discovery and Transport
/// each own their respective tables (`PeerRecord`, `TransferRecord`), but
/// both the `la-vak-engine` glue layer and tests need to name the same
/// shapes, so they live in one leaf crate with no runtime dependencies.

pub mod events;
pub mod models;

pub use events::{EngineEvent, IncomingRequest};
pub use models::{
    DeviceIdentity, Direction, PeerRecord, TransferRecord, TransferStatus,
};
