//! Kamailio BINRPC reload notifications
pub mod codec;
pub mod notifier;

pub use codec::{encode_request, CodecError, Value};
pub use notifier::BinRpcNotifier;
