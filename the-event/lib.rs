//! Typed event emission and teardown handles shared by the bridge, the
//! buffer router and the host.

mod disposable;
mod emitter;

pub use disposable::{
  Disposable,
  DisposableStore,
};
pub use emitter::{
  Emitter,
  Event,
};
