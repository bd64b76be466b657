//! Root context: one native API instance.
//!
//! A [`RootContext`] owns the native root handle and, when a log callback is
//! installed, the pinned slot the native side logs through. Device sessions
//! borrow the context, so it cannot be closed or dropped while any of them
//! is alive:
//!
//! ```compile_fail
//! use stream_engine::{NativeLibrary, RootContext};
//!
//! let lib = NativeLibrary::global().unwrap();
//! let mut ctx = RootContext::open(lib).unwrap();
//! let session = ctx.open_device("tobii-ttp://IS514").unwrap();
//! ctx.close().unwrap(); // `ctx` is still borrowed by `session`
//! drop(session);
//! ```

use crate::config::EngineConfig;
use crate::device::DeviceSession;
use crate::error::{translate, EngineError, FailureKind};
use crate::ffi::{self, c_str_to_string, RawApi, RawCustomLog};
use crate::library::NativeLibrary;
use crate::pinned::PinnedSlot;
use crate::stream::{guard_callback, resume_pending_panic};
use crate::types::{DeviceGenerations, LogLevel, Timestamp};
use crate::version::Version;
use crate::Result;
use std::cell::Cell;
use std::ffi::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, PoisonError};

type LogCallback = Box<dyn FnMut(LogLevel, &str) + Send>;

/// Pinned log registration. `descriptor.log_context` points back at the
/// sink itself.
struct LogSink {
    descriptor: RawCustomLog,
    callback: Mutex<LogCallback>,
}

/// The native side may log from its own threads, so the sink is only ever
/// reached through a shared reference and the callback sits behind a mutex.
unsafe extern "C" fn log_trampoline(log_context: *mut c_void, level: c_int, text: *const c_char) {
    if log_context.is_null() {
        return;
    }
    let sink = PinnedSlot::<LogSink>::shared_from_user_data(log_context);
    let level = LogLevel::from_raw(level);
    let text = c_str_to_string(text);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut callback = sink.callback.lock().unwrap_or_else(PoisonError::into_inner);
        callback(level, &text);
    }));
    if result.is_err() {
        log::error!("Native log callback panicked; line dropped");
    }
}

unsafe extern "C" fn url_receiver(url: *const c_char, user_data: *mut c_void) {
    if url.is_null() || user_data.is_null() {
        return;
    }
    let urls = PinnedSlot::<Vec<String>>::from_user_data(user_data);
    let url = c_str_to_string(url);
    guard_callback(|| urls.push(url));
}

/// One native API instance.
pub struct RootContext {
    lib: Arc<NativeLibrary>,
    handle: Option<NonNull<RawApi>>,
    log_slot: Option<PinnedSlot<LogSink>>,
    open_sessions: Cell<usize>,
}

impl RootContext {
    /// Create a context without a log callback.
    pub fn open(lib: Arc<NativeLibrary>) -> Result<Self> {
        Self::create(lib, None)
    }

    /// Create a context whose native log output goes to `callback`. The
    /// callback may run on a native thread, and may run before this
    /// function returns.
    pub fn open_with_log(
        lib: Arc<NativeLibrary>,
        callback: impl FnMut(LogLevel, &str) + Send + 'static,
    ) -> Result<Self> {
        Self::create(lib, Some(Box::new(callback)))
    }

    /// Create a context that forwards native log lines into the `log`
    /// facade as `config` directs.
    pub fn open_with_config(lib: Arc<NativeLibrary>, config: &EngineConfig) -> Result<Self> {
        if !config.forward_native_log {
            return Self::open(lib);
        }
        let max_level = config.native_log_level;
        Self::open_with_log(lib, move |level, text| {
            if level <= max_level {
                log::log!(target: "stream_engine::native", log::Level::from(level), "{}", text);
            }
        })
    }

    fn create(lib: Arc<NativeLibrary>, log: Option<LogCallback>) -> Result<Self> {
        let mut log_slot = log.map(|callback| {
            PinnedSlot::new(LogSink {
                descriptor: RawCustomLog {
                    log_context: ptr::null_mut(),
                    log_func: Some(log_trampoline),
                },
                callback: Mutex::new(callback),
            })
        });
        if let Some(slot) = log_slot.as_mut() {
            let context = slot.user_data();
            slot.get_mut().descriptor.log_context = context;
        }
        let descriptor = log_slot
            .as_ref()
            .map_or(ptr::null(), |slot| &slot.get().descriptor as *const RawCustomLog);

        let mut raw = ptr::null_mut();
        let status = unsafe { (lib.api.api_create)(&mut raw, ptr::null(), descriptor) };
        // On failure the native side keeps no reference, so the log slot is
        // freed on return.
        if status == ffi::ERROR_ALLOCATION_FAILED {
            return Err(EngineError::OutOfMemory);
        }
        lib.check("tobii_api_create", status)?;
        let handle = NonNull::new(raw).ok_or_else(|| {
            EngineError::Integrity("tobii_api_create returned a null handle".into())
        })?;

        log::info!(
            "Opened root context (library {}, native log {})",
            lib.version(),
            if log_slot.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            lib,
            handle: Some(handle),
            log_slot,
            open_sessions: Cell::new(0),
        })
    }

    pub(crate) fn raw(&self) -> Result<*mut RawApi> {
        self.handle
            .map(NonNull::as_ptr)
            .ok_or(EngineError::Disposed("RootContext"))
    }

    pub(crate) fn library(&self) -> &NativeLibrary {
        &self.lib
    }

    pub(crate) fn session_opened(&self) {
        self.open_sessions.set(self.open_sessions.get() + 1);
    }

    pub(crate) fn session_closed(&self) {
        self.open_sessions.set(self.open_sessions.get().saturating_sub(1));
    }

    /// Version of the library this context was created on.
    pub fn version(&self) -> Version {
        self.lib.version()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Destroy the native root. Idempotent.
    ///
    /// Fails with [`EngineError::SessionsOpen`] if a session created from
    /// this context was leaked without being closed. If the native destroy
    /// fails the context stays open and the call may be retried.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle else {
            return Ok(());
        };
        let open = self.open_sessions.get();
        if open > 0 {
            return Err(EngineError::SessionsOpen(open));
        }

        let status = unsafe { (self.lib.api.api_destroy)(handle.as_ptr()) };
        self.lib.check("tobii_api_destroy", status)?;
        self.handle = None;

        // The native side can no longer log through the slot.
        if let Some(slot) = self.log_slot.take() {
            slot.release();
        }
        log::info!("Closed root context");
        Ok(())
    }

    /// Library system clock, in microseconds.
    pub fn now(&self) -> Result<Timestamp> {
        let api = self.raw()?;
        let mut timestamp_us = 0i64;
        let status = unsafe { (self.lib.api.system_clock)(api, &mut timestamp_us) };
        self.lib.check("tobii_system_clock", status)?;
        Ok(Timestamp(timestamp_us))
    }

    /// URLs of locally attached devices of the given generations.
    pub fn enumerate_device_urls(&self, generations: DeviceGenerations) -> Result<Vec<String>> {
        let api = self.raw()?;
        let mut urls = PinnedSlot::new(Vec::<String>::new());
        let status = unsafe {
            (self.lib.api.enumerate_urls)(api, url_receiver, urls.user_data(), generations.bits())
        };
        // The receiver is only called during enumeration.
        let found = std::mem::take(urls.get_mut());
        urls.release();
        resume_pending_panic();
        self.lib.check("tobii_enumerate_local_device_urls_ex", status)?;

        log::debug!("Enumerated {} device(s)", found.len());
        Ok(found)
    }

    /// Open a session on the device at `url`.
    pub fn open_device(&self, url: &str) -> Result<DeviceSession<'_>> {
        DeviceSession::open(self, url)
    }

    /// Block until at least one of `sessions` has callbacks to process.
    ///
    /// Returns `Ok(false)` when the native wait timed out. Every session must
    /// belong to this context.
    pub fn wait_for_callbacks(&self, sessions: &[&DeviceSession<'_>]) -> Result<bool> {
        let api = self.raw()?;
        if sessions.is_empty() {
            return Err(EngineError::InvalidArgument(
                "no device sessions to wait on".into(),
            ));
        }
        let mut devices = Vec::with_capacity(sessions.len());
        for session in sessions {
            if !session.belongs_to(self) {
                return Err(EngineError::InvalidArgument(format!(
                    "session {} belongs to another root context",
                    session.url()
                )));
            }
            devices.push(session.raw()?);
        }

        let status = unsafe { self.lib.wait_for_callbacks(api, &devices) };
        match translate(status) {
            None => Ok(true),
            Some(FailureKind::TimedOut) => Ok(false),
            Some(kind) => Err(self.lib.native_error("tobii_wait_for_callbacks", kind, status)),
        }
    }
}

impl Drop for RootContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close root context: {}", e);
            if let Some(slot) = self.log_slot.take() {
                slot.abandon();
            }
        }
    }
}

impl std::fmt::Debug for RootContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootContext")
            .field("version", &self.lib.version())
            .field("open", &self.handle.is_some())
            .field("sessions", &self.open_sessions.get())
            .finish()
    }
}
