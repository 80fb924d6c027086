//! powermon-fleet — worker power commands.
//!
//! # Architecture
//!
//! ```text
//! FleetController::set_all(action)
//!   └── per worker: tokio::spawn (detached, never joined)
//!       └── CommandChannel::send(endpoint, action)
//!           └── TcpCommandChannel: connect → write frame → ≤1 reply → close
//! ```

pub mod channel;
pub mod command;
pub mod controller;

pub use channel::{BoxFuture, CommandChannel, CommandDeliveryError, TcpCommandChannel};
pub use command::{Command, CommandEncoder, RpcRequest};
pub use controller::{DeliveryReport, FleetController};
