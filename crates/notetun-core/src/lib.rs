//! Core wire types for the covert note transport: the payload codec, the
//! title grammar, the `Unit` type, persisted configuration, and the shared
//! error taxonomy. No networking lives here — see `notetun-transport` and
//! `notetun-router`.

pub mod codec;
pub mod config;
pub mod error;
pub mod title;
pub mod unit;

pub use codec::Codec;
pub use error::{CodecError, ConfigError, TitleError};
pub use title::{Direction, RequestId, Title, UnitType};
pub use unit::Unit;

/// Hard budget on a single snippet's encoded character length (§4.4).
pub const MAX_SNIPPET_CHARS: usize = 2_000_000;

/// Sender batch-close timeout.
pub const BATCH_TIMEOUT_MS: u64 = 300;

/// Receiver adaptive-poll interval when the last poll was empty.
pub const POLL_INTERVAL_MS: u64 = 100;

/// Stale reaper threshold for unconsumed reassembly state.
pub const STALE_TIMEOUT_MS: u128 = 10 * 60 * 1000;

/// Note-id regex used by the receiver to validate record ids: `^\d+_\d+_\d+$`.
pub const NOTE_ID_PATTERN: &str = r"^\d+_\d+_\d+$";

/// Default concurrent PATCH writers.
pub const SEND_POOL_SIZE: usize = 7;

/// Default concurrent snippet processors.
pub const PROCESS_POOL_SIZE: usize = 4;
