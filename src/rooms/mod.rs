//! Room provisioning against the Daily REST API
//!
//! Each `/connect` call creates one time-boxed room plus an owner token.
//! Rooms are never renewed; they expire (and eject participants) at `exp`.

mod daily;

pub use daily::{DailyRestHelper, DailyRoom, ProvisionError, RoomDescriptor};
