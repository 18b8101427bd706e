#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (e.g., Vec<Route> in the configuration)
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod common;
pub mod hal;

// --- Messages and Wire Codec ---
pub mod message;

// --- State Machines ---
pub mod fsm;

// --- Device Models ---
pub mod device;

// --- Diagnostics and Logging ---
pub mod diag;
pub mod logbuf;

// --- Top-level Exports ---
pub use types::{NodeId, NodeType, PointPosition, Route, RouteId, RoutePosition, SensorState};
pub use common::{Nonce, Timestamp};
pub use hal::{DixlError, PeerProbe, SensorInput};
pub use message::codec::{Codec, deserialize_message};
pub use message::{ExtBody, ExtMessage, Msg};
pub use fsm::ctrl::{CtrlAction, CtrlEvent, CtrlMachine, CtrlState};
pub use fsm::init::{InitAction, InitMachine, InitState};
pub use logbuf::{LogBuffer, LogKind, LogRecord};
