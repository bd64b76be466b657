//! # stream-engine - safe Rust layer over the Tobii Stream Engine library
//!
//! Loads the native library at runtime and provides:
//! - Version detection once per library, with per-version call shapes bound up front
//! - Root context and device session lifetimes enforced by the borrow checker
//! - Typed device queries (info, track box, display area, state, capabilities)
//! - Per-stream callback subscriptions dispatched from `process_callbacks`
//! - A stable failure taxonomy over the native status codes
//!
//! ## Quick Start
//! ```no_run
//! use stream_engine::{DeviceGenerations, EngineConfig, NativeLibrary, RootContext};
//!
//! let config = EngineConfig::from_env();
//! let lib = NativeLibrary::load(&config).unwrap();
//! let ctx = RootContext::open_with_config(lib, &config).unwrap();
//!
//! let urls = ctx.enumerate_device_urls(DeviceGenerations::all()).unwrap();
//! let mut session = ctx.open_device(&urls[0]).unwrap();
//! println!("Model: {}", session.info().unwrap().model);
//!
//! session.on_gaze_point(|p| println!("gaze: {:?}", p.position_xy)).unwrap();
//! for _ in 0..100 {
//!     if ctx.wait_for_callbacks(&[&session]).unwrap() {
//!         session.process_callbacks().unwrap();
//!     }
//! }
//! ```

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod ffi;
pub mod layout;
pub mod library;
mod pinned;
pub mod stream;
pub mod types;
pub mod version;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use context::RootContext;
pub use device::DeviceSession;
pub use error::{EngineError, FailureKind};
pub use library::{NativeLibrary, SymbolSource};
pub use stream::{
    CallbackId, GazeOriginStream, GazePointStream, HeadPoseStream, NotificationStream, Stream,
    StreamKind, SubscriptionState, UserPositionGuideStream, UserPresenceStream,
};
pub use types::*;
pub use version::Version;

/// Result type alias for stream-engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
