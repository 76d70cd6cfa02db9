//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_ack, decode_command, decode_parameters, decode_status, encode_command, encode_status,
    ProtocolError,
};
pub use messages::*;
