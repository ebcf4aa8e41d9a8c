//! A daemon driving a GSM modem over AT commands to send and receive SMS.
//!
//! The crate is organized bottom-up from the wire: [`charset`] and [`pdu`]
//! implement the 3GPP 03.38/23.040 codec, [`transport`] and [`dialogue`]
//! drive the byte stream and request/response protocol, [`session`] is the
//! top-level state machine, and [`spool`] bridges it to the filesystem for
//! both directions of traffic.
#[macro_use]
extern crate num_derive;
#[macro_use]
extern crate failure_derive;

pub use errors::GatewayResult;

pub mod at;
pub mod charset;
pub mod config;
pub mod dialogue;
pub mod error_codes;
pub mod errors;
pub mod logging;
pub mod message;
pub mod parse;
pub mod pdu;
pub mod session;
pub mod signals;
pub mod spool;
pub mod stats;
pub mod transport;
pub mod util;
