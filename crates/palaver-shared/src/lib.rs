//! # palaver-shared
//!
//! Types shared between the Palaver server and its clients: the WebSocket
//! wire protocol, common enums, and tuning constants.

pub mod constants;
pub mod events;
pub mod types;
