//! # courier-core
//!
//! Core library for the courier driver client: position tracking, the
//! realtime tracking channel, delivery offers and the REST boundary, shared
//! by every front end (CLI today, mobile shells through the same API).
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Socket I/O lives on a
//!   worker thread; all state changes happen on the caller's thread.
//! - **Online-gated**: The session's online flag starts and stops the
//!   sampler and the channel together.
//! - **Graceful degradation**: Sensor and socket trouble become passive
//!   status, read failures become empty/default values.
//! - **Explicit capability**: A host without a location provider gets the
//!   `Unavailable` sampler, decided once at construction.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_core::{load_config, DriverEngine, FileCredentialStore, StorageConfig};
//!
//! let storage = StorageConfig::default();
//! let mut engine = DriverEngine::connect_default(load_config(&storage)?, None)?;
//! engine.login_from(&FileCredentialStore::new(&storage))?;
//! engine.go_online()?;
//! let notices = engine.pump();
//! ```

pub mod api;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod offers;
pub mod reconcile;
pub mod sampler;
pub mod session;
pub mod storage;
pub mod tracking;
pub mod types;

// Re-export commonly used items at crate root
pub use api::{DeliveryApi, HttpDeliveryApi};
pub use config::{load_config, CourierConfig, ReconnectPolicy};
pub use credentials::{
    clear_credentials, save_credentials, CredentialStore, FileCredentialStore, StaticCredentials,
};
pub use engine::{DriverEngine, EngineNotice, EngineParts, EngineSnapshot};
pub use error::{CourierError, Result};
pub use offers::{OfferChannel, OfferEvent};
pub use reconcile::{LogAlert, OfferAlert, OfferBook, Reconciled};
pub use sampler::{LocationSensor, PermissionStatus, PositionSampler, ReplaySensor};
pub use session::SessionStore;
pub use storage::StorageConfig;
pub use tracking::{
    ChannelUpdate, ConnectRequest, EventSink, SendOutcome, SocketIoTransport, TrackingChannel,
    Transport, TransportEvent,
};
pub use types::*;

pub use courier_protocol::{DeliveryOffer, DeliveryRecord, DeliveryStatus};
