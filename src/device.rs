//! Device sessions: one open native device and its stream subscriptions.
//!
//! Closing a session unsubscribes every stream before the device handle is
//! destroyed.

use crate::context::RootContext;
use crate::error::EngineError;
use crate::ffi::{self, RawDevice, ReadBlockFn, SupportQueryFn};
use crate::layout;
use crate::library::NativeLibrary;
use crate::stream::{
    resume_pending_panic, CallbackId, GazeOriginStream, GazePointStream, HeadPoseStream,
    NotificationStream, Registry, Stream, StreamKind, SubscriptionState, UserPositionGuideStream,
    UserPresenceStream,
};
use crate::types::{
    Capability, DeviceInfo, DisplayArea, EnabledEye, GazeOrigin, GazePoint, HeadPose,
    Notification, State, StateValue, StateValueKind, StreamId, TrackBox, UserPositionGuide,
    UserPresence,
};
use crate::Result;
use std::ffi::{c_char, c_int, c_void, CString};
use std::ptr::{self, NonNull};

/// An open device. Borrows the [`RootContext`] it was created from.
///
/// Callbacks registered through [`subscribe`](Self::subscribe) run only
/// inside [`process_callbacks`](Self::process_callbacks), on the calling
/// thread.
pub struct DeviceSession<'ctx> {
    context: &'ctx RootContext,
    handle: Option<NonNull<RawDevice>>,
    url: String,
    registry: Registry,
}

impl<'ctx> DeviceSession<'ctx> {
    /// Create the native device for `url`. From v4 the interactive field of
    /// use is always requested.
    pub fn open(context: &'ctx RootContext, url: &str) -> Result<Self> {
        let api = context.raw()?;
        let lib = context.library();
        let c_url = CString::new(url)
            .map_err(|_| EngineError::InvalidArgument(format!("device URL {:?} contains NUL", url)))?;

        let mut raw = ptr::null_mut();
        let status = unsafe { lib.device_create(api, &c_url, &mut raw) };
        lib.check("tobii_device_create", status)?;
        let handle = NonNull::new(raw).ok_or_else(|| {
            EngineError::Integrity("tobii_device_create returned a null handle".into())
        })?;

        context.session_opened();
        log::info!("Opened device {}", url);
        Ok(Self {
            context,
            handle: Some(handle),
            url: url.to_string(),
            registry: Registry::new(),
        })
    }

    pub(crate) fn raw(&self) -> Result<*mut RawDevice> {
        self.handle
            .map(NonNull::as_ptr)
            .ok_or(EngineError::Disposed("DeviceSession"))
    }

    pub(crate) fn belongs_to(&self, context: &RootContext) -> bool {
        ptr::eq(self.context, context)
    }

    fn lib(&self) -> &'ctx NativeLibrary {
        self.context.library()
    }

    /// URL the session was opened with.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn context(&self) -> &'ctx RootContext {
        self.context
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Re-establish a lost connection. The native handle and every
    /// registered callback stay in place; nothing is resubscribed.
    pub fn reconnect(&mut self) -> Result<()> {
        let device = self.raw()?;
        let status = unsafe { (self.lib().api.device_reconnect)(device) };
        self.lib().check("tobii_device_reconnect", status)?;
        log::info!("Reconnected device {}", self.url);
        Ok(())
    }

    fn read_block(&self, operation: &'static str, read: ReadBlockFn, size: usize) -> Result<Vec<u8>> {
        let device = self.raw()?;
        let mut block = vec![0u8; size];
        let status = unsafe { read(device, block.as_mut_ptr().cast()) };
        self.lib().check(operation, status)?;
        Ok(block)
    }

    /// Identification snapshot, decoded with the layout of the library
    /// version.
    pub fn info(&self) -> Result<DeviceInfo> {
        let layout = self.lib().version().info_layout();
        let block = self.read_block("tobii_get_device_info", self.lib().api.get_device_info, layout.size())?;
        layout::decode_device_info(&block, layout)
            .ok_or_else(|| EngineError::Integrity("short device info block".into()))
    }

    /// Tracking volume. Fails with `Unsupported` on devices without a
    /// physical track box, such as wearables.
    pub fn track_box(&self) -> Result<TrackBox> {
        let block = self.read_block("tobii_get_track_box", self.lib().api.get_track_box, ffi::TRACK_BOX_SIZE)?;
        layout::decode_track_box(&block)
            .ok_or_else(|| EngineError::Integrity("short track box block".into()))
    }

    pub fn display_area(&self) -> Result<DisplayArea> {
        let block = self.read_block(
            "tobii_get_display_area",
            self.lib().api.get_display_area,
            ffi::DISPLAY_AREA_SIZE,
        )?;
        layout::decode_display_area(&block)
            .ok_or_else(|| EngineError::Integrity("short display area block".into()))
    }

    pub fn enabled_eye(&self) -> Result<EnabledEye> {
        let device = self.raw()?;
        let mut raw: c_int = 0;
        let status = unsafe {
            (self.lib().api.get_enabled_eye)(device, &mut raw as *mut c_int as *mut c_void)
        };
        self.lib().check("tobii_get_enabled_eye", status)?;
        EnabledEye::from_raw(raw)
            .ok_or_else(|| EngineError::Integrity(format!("unknown enabled eye value {}", raw)))
    }

    /// User-assigned device name. `Unsupported` on libraries without the
    /// query.
    pub fn device_name(&self) -> Result<String> {
        let read = self.lib().api.get_device_name.ok_or_else(|| {
            EngineError::unsupported("tobii_get_device_name", "not exported by this library")
        })?;
        let block = self.read_block("tobii_get_device_name", read, ffi::DEVICE_NAME_SIZE)?;
        Ok(layout::extract_string(&block))
    }

    /// Sample output frequency in Hz. `Unsupported` on libraries without the
    /// query.
    pub fn output_frequency(&self) -> Result<f32> {
        let read = self.lib().api.get_output_frequency.ok_or_else(|| {
            EngineError::unsupported("tobii_get_output_frequency", "not exported by this library")
        })?;
        let device = self.raw()?;
        let mut hz = 0f32;
        let status = unsafe { read(device, &mut hz as *mut f32 as *mut c_void) };
        self.lib().check("tobii_get_output_frequency", status)?;
        Ok(hz)
    }

    fn support_query(&self, operation: &'static str, query: SupportQueryFn, id: c_int) -> Result<bool> {
        let device = self.raw()?;
        let mut supported = ffi::NOT_SUPPORTED;
        let status = unsafe { query(device, id, &mut supported) };
        // Enumerant sets grow across versions; an id this library does not
        // know is an unsupported feature, not a caller bug.
        if status == ffi::ERROR_INVALID_PARAMETER {
            return Err(EngineError::unsupported(
                operation,
                format!("identifier {} unknown to library {}", id, self.lib().version()),
            ));
        }
        self.lib().check(operation, status)?;
        Ok(supported == ffi::SUPPORTED)
    }

    pub fn capability_supported(&self, capability: Capability) -> Result<bool> {
        self.support_query(
            "tobii_capability_supported",
            self.lib().api.capability_supported,
            capability.raw(),
        )
    }

    pub fn stream_supported(&self, stream: StreamId) -> Result<bool> {
        self.support_query("tobii_stream_supported", self.lib().api.stream_supported, stream.raw())
    }

    fn expect_kind(state: State, kind: StateValueKind) -> Result<()> {
        if state.value_kind() == kind {
            Ok(())
        } else {
            Err(EngineError::InvalidArgument(format!(
                "{:?} holds a {:?} value, not {:?}",
                state,
                state.value_kind(),
                kind
            )))
        }
    }

    pub fn get_state_bool(&self, state: State) -> Result<bool> {
        Self::expect_kind(state, StateValueKind::Bool)?;
        let device = self.raw()?;
        let mut value = ffi::STATE_BOOL_FALSE;
        let status = unsafe { (self.lib().api.get_state_bool)(device, state.raw(), &mut value) };
        self.lib().check("tobii_get_state_bool", status)?;
        Ok(value == ffi::STATE_BOOL_TRUE)
    }

    pub fn get_state_uint(&self, state: State) -> Result<u32> {
        Self::expect_kind(state, StateValueKind::Uint)?;
        let device = self.raw()?;
        let mut value = 0u32;
        let status = unsafe { (self.lib().api.get_state_uint32)(device, state.raw(), &mut value) };
        self.lib().check("tobii_get_state_uint32", status)?;
        Ok(value)
    }

    pub fn get_state_string(&self, state: State) -> Result<String> {
        Self::expect_kind(state, StateValueKind::String)?;
        let device = self.raw()?;
        let mut buf = [0 as c_char; ffi::STATE_STRING_SIZE];
        let status =
            unsafe { (self.lib().api.get_state_string)(device, state.raw(), buf.as_mut_ptr()) };
        self.lib().check("tobii_get_state_string", status)?;
        let bytes: Vec<u8> = buf.iter().map(|&c| c as u8).collect();
        Ok(layout::extract_string(&bytes))
    }

    /// Read `state` through the accessor its value kind selects.
    pub fn state(&self, state: State) -> Result<StateValue> {
        match state.value_kind() {
            StateValueKind::Bool => self.get_state_bool(state).map(StateValue::Bool),
            StateValueKind::Uint => self.get_state_uint(state).map(StateValue::Uint),
            StateValueKind::String => self.get_state_string(state).map(StateValue::String),
        }
    }

    pub fn power_save_active(&self) -> Result<bool> {
        self.get_state_bool(State::PowerSaveActive)
    }

    pub fn device_paused(&self) -> Result<bool> {
        self.get_state_bool(State::DevicePaused)
    }

    pub fn calibration_id(&self) -> Result<u32> {
        self.get_state_uint(State::CalibrationId)
    }

    pub fn fault(&self) -> Result<String> {
        self.get_state_string(State::Fault)
    }

    pub fn warning(&self) -> Result<String> {
        self.get_state_string(State::Warning)
    }

    /// Drain the native callback queue, invoking registered callbacks once
    /// per queued sample in delivery order. Never blocks.
    ///
    /// A panic raised by a callback is re-raised here once the native call
    /// has returned.
    pub fn process_callbacks(&mut self) -> Result<()> {
        let device = self.raw()?;
        let status = unsafe { (self.lib().api.process_callbacks)(device) };
        resume_pending_panic();
        self.lib().check("tobii_device_process_callbacks", status)
    }

    /// Discard queued samples without invoking callbacks.
    pub fn clear_callback_buffers(&mut self) -> Result<()> {
        let device = self.raw()?;
        let status = unsafe { (self.lib().api.clear_callback_buffers)(device) };
        self.lib().check("tobii_device_clear_callback_buffers", status)
    }

    /// Re-estimate the host/device clock offset. Fails with
    /// `OperationAborted` when called too often; back off and retry.
    pub fn update_timesync(&mut self) -> Result<()> {
        let device = self.raw()?;
        let status = unsafe { (self.lib().api.update_timesync)(device) };
        self.lib().check("tobii_update_timesync", status)
    }

    /// Register `callback` for stream `S`. The first callback for a stream
    /// subscribes natively; later ones join the same subscription.
    pub fn subscribe<S: Stream>(
        &mut self,
        callback: impl FnMut(&S::Sample) + 'static,
    ) -> Result<CallbackId> {
        let device = self.raw()?;
        let lib = self.lib();
        self.registry.add::<S>(lib, device, Box::new(callback))
    }

    /// Forward samples of stream `S` into a bounded channel. Samples that
    /// arrive while the channel is full are dropped.
    pub fn subscribe_channel<S: Stream>(
        &mut self,
        capacity: usize,
    ) -> Result<(CallbackId, crossbeam_channel::Receiver<S::Sample>)>
    where
        S::Sample: Clone + Send,
    {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let id = self.subscribe::<S>(move |sample| {
            if let Err(e) = sender.try_send(sample.clone()) {
                match e {
                    crossbeam_channel::TrySendError::Full(_) => {
                        log::trace!("{:?} channel full, dropping sample", S::KIND);
                    }
                    crossbeam_channel::TrySendError::Disconnected(_) => {
                        log::trace!("{:?} channel disconnected, dropping sample", S::KIND);
                    }
                }
            }
        })?;
        Ok((id, receiver))
    }

    pub fn on_gaze_point(&mut self, callback: impl FnMut(&GazePoint) + 'static) -> Result<CallbackId> {
        self.subscribe::<GazePointStream>(callback)
    }

    pub fn on_gaze_origin(&mut self, callback: impl FnMut(&GazeOrigin) + 'static) -> Result<CallbackId> {
        self.subscribe::<GazeOriginStream>(callback)
    }

    pub fn on_user_presence(
        &mut self,
        callback: impl FnMut(&UserPresence) + 'static,
    ) -> Result<CallbackId> {
        self.subscribe::<UserPresenceStream>(callback)
    }

    pub fn on_head_pose(&mut self, callback: impl FnMut(&HeadPose) + 'static) -> Result<CallbackId> {
        self.subscribe::<HeadPoseStream>(callback)
    }

    pub fn on_notification(
        &mut self,
        callback: impl FnMut(&Notification) + 'static,
    ) -> Result<CallbackId> {
        self.subscribe::<NotificationStream>(callback)
    }

    /// Eye positions normalized to the track box; bound to the
    /// eye-position-normalized stream on v2 libraries.
    pub fn on_user_position_guide(
        &mut self,
        callback: impl FnMut(&UserPositionGuide) + 'static,
    ) -> Result<CallbackId> {
        self.subscribe::<UserPositionGuideStream>(callback)
    }

    /// Remove one callback. Removing the last callback of a stream
    /// unsubscribes natively; if that fails the subscription stays in place
    /// and is retried on [`close`](Self::close).
    pub fn unsubscribe(&mut self, id: CallbackId) -> Result<()> {
        let device = self.raw()?;
        let lib = self.lib();
        self.registry.remove(lib, device, id)
    }

    /// Remove every callback of `kind` and unsubscribe natively.
    pub fn unsubscribe_all(&mut self, kind: StreamKind) -> Result<()> {
        let device = self.raw()?;
        let lib = self.lib();
        self.registry.remove_all(lib, device, kind)
    }

    pub fn subscription_state(&self, kind: StreamKind) -> SubscriptionState {
        self.registry.state(kind)
    }

    pub fn callback_count(&self, kind: StreamKind) -> usize {
        self.registry.callback_count(kind)
    }

    /// Unsubscribe every stream, then destroy the native device. Idempotent.
    ///
    /// The device is only destroyed once every stream is unsubscribed. If an
    /// unsubscribe or the destroy fails, the error is returned, the session
    /// stays open and the call may be retried.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle else {
            return Ok(());
        };
        let lib = self.lib();
        let device = handle.as_ptr();

        self.registry.release_all(lib, device)?;
        debug_assert!(self.registry.is_empty());
        let status = unsafe { (lib.api.device_destroy)(device) };
        lib.check("tobii_device_destroy", status)?;

        self.handle = None;
        self.context.session_closed();
        log::info!("Closed device {}", self.url);
        Ok(())
    }
}

impl Drop for DeviceSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close device {}: {}", self.url, e);
            self.registry.abandon_all();
        }
    }
}

impl std::fmt::Debug for DeviceSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("url", &self.url)
            .field("open", &self.handle.is_some())
            .finish()
    }
}
