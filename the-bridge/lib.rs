mod bridge;
mod callback;
mod envelope;
mod error;
mod lua;
mod peer;
mod transport;

pub use bridge::{
  Bridge,
  BridgeConfig,
  Handler,
  HandlerFuture,
  HandlerId,
  HandlerRegistration,
};
pub use callback::{
  Callback,
  CallbackRegistry,
  CallbackToken,
  EXECUTE_CALLBACK_ACTION,
};
pub use envelope::{
  Envelope,
  MessageType,
};
pub use error::{
  BridgeError,
  DecodeError,
  PeerCallError,
};
pub use lua::{
  is_lua_identifier,
  serialize_for_peer,
};
pub use peer::{
  PeerCall,
  PeerRpc,
};
pub use transport::{
  ChannelTransport,
  Transport,
};
