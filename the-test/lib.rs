//! Test support shared by the workspace's integration tests.

mod buffer_manager;

pub use buffer_manager::{
  FakeBuffer,
  FakeBufferManager,
};
