//! Subscribable streams and the per-device subscription registry.
//!
//! Each [`StreamKind`] has at most one native subscription per device. The
//! native side is handed one trampoline plus the address of a pinned
//! [`Dispatcher`]; application callbacks are added to and removed from that
//! dispatcher without further native calls. The native subscribe happens when
//! the first callback is added, the native unsubscribe when the last one is
//! removed.

use crate::error::EngineError;
use crate::ffi::{
    self, DataCallbackFn, PresenceCallbackFn, RawDevice, RawGazeOrigin,
    RawGazePoint, RawHeadPose, RawNotification, RawUserPositionGuide,
};
use crate::layout;
use crate::library::NativeLibrary;
use crate::pinned::PinnedSlot;
use crate::types::{
    EnabledEye, GazeOrigin, GazePoint, HeadPose, Notification, NotificationKind,
    NotificationValue, PresenceStatus, StreamId, Timestamp, UserPositionGuide, UserPresence,
    Validity,
};
use crate::version::Version;
use crate::Result;
use std::any::Any;
use std::cell::RefCell;
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};

/// Independently subscribable sample streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    GazePoint,
    GazeOrigin,
    UserPresence,
    HeadPose,
    Notification,
    UserPositionGuide,
}

impl StreamKind {
    pub const ALL: [StreamKind; 6] = [
        StreamKind::GazePoint,
        StreamKind::GazeOrigin,
        StreamKind::UserPresence,
        StreamKind::HeadPose,
        StreamKind::Notification,
        StreamKind::UserPositionGuide,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            StreamKind::GazePoint => 0,
            StreamKind::GazeOrigin => 1,
            StreamKind::UserPresence => 2,
            StreamKind::HeadPose => 3,
            StreamKind::Notification => 4,
            StreamKind::UserPositionGuide => 5,
        }
    }

    /// Identifier used by stream-support queries. Notifications are not a
    /// queryable stream.
    pub fn stream_id(self) -> Option<StreamId> {
        match self {
            StreamKind::GazePoint => Some(StreamId::GazePoint),
            StreamKind::GazeOrigin => Some(StreamId::GazeOrigin),
            StreamKind::UserPresence => Some(StreamId::UserPresence),
            StreamKind::HeadPose => Some(StreamId::HeadPose),
            StreamKind::Notification => None,
            StreamKind::UserPositionGuide => Some(StreamId::EyePositionNormalized),
        }
    }

    /// Subscribe/unsubscribe symbol pair for this stream on `version`.
    pub(crate) fn symbols(self, version: &Version) -> (&'static str, &'static str) {
        match self {
            StreamKind::GazePoint => ("tobii_gaze_point_subscribe", "tobii_gaze_point_unsubscribe"),
            StreamKind::GazeOrigin => {
                ("tobii_gaze_origin_subscribe", "tobii_gaze_origin_unsubscribe")
            }
            StreamKind::UserPresence => (
                "tobii_user_presence_subscribe",
                "tobii_user_presence_unsubscribe",
            ),
            StreamKind::HeadPose => ("tobii_head_pose_subscribe", "tobii_head_pose_unsubscribe"),
            StreamKind::Notification => (
                "tobii_notifications_subscribe",
                "tobii_notifications_unsubscribe",
            ),
            StreamKind::UserPositionGuide if version.has_user_position_guide() => (
                "tobii_user_position_guide_subscribe",
                "tobii_user_position_guide_unsubscribe",
            ),
            StreamKind::UserPositionGuide => (
                "tobii_eye_position_normalized_subscribe",
                "tobii_eye_position_normalized_unsubscribe",
            ),
        }
    }

    pub(crate) fn callback_shape(self) -> CallbackShape {
        match self {
            StreamKind::UserPresence => CallbackShape::Presence,
            _ => CallbackShape::Data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackShape {
    Data,
    Presence,
}

/// Callback handed to a native subscribe call.
#[derive(Clone, Copy)]
pub(crate) enum NativeCallback {
    Data(DataCallbackFn),
    Presence(PresenceCallbackFn),
}

/// Lifecycle of one stream's native subscription on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// Handle to one registered application callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId {
    kind: StreamKind,
    seq: u64,
}

impl CallbackId {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Marker type for one stream kind, carrying its decoded sample type.
pub trait Stream: sealed::Sealed + 'static {
    type Sample: 'static;
    const KIND: StreamKind;

    #[doc(hidden)]
    fn native_callback() -> NativeCallbackHandle;
}

/// Opaque wrapper so the trampoline type stays crate-private.
#[doc(hidden)]
pub struct NativeCallbackHandle(pub(crate) NativeCallback);

/// Streams whose native callback carries a pointer to a fixed struct.
trait DataStream: Stream {
    type Raw: Copy;

    fn decode(raw: &Self::Raw) -> Self::Sample;
}

pub struct GazePointStream;
pub struct GazeOriginStream;
pub struct UserPresenceStream;
pub struct HeadPoseStream;
pub struct NotificationStream;
pub struct UserPositionGuideStream;

impl sealed::Sealed for GazePointStream {}
impl sealed::Sealed for GazeOriginStream {}
impl sealed::Sealed for UserPresenceStream {}
impl sealed::Sealed for HeadPoseStream {}
impl sealed::Sealed for NotificationStream {}
impl sealed::Sealed for UserPositionGuideStream {}

impl Stream for GazePointStream {
    type Sample = GazePoint;
    const KIND: StreamKind = StreamKind::GazePoint;

    fn native_callback() -> NativeCallbackHandle {
        NativeCallbackHandle(NativeCallback::Data(data_trampoline::<Self>))
    }
}

impl DataStream for GazePointStream {
    type Raw = RawGazePoint;

    fn decode(raw: &RawGazePoint) -> GazePoint {
        GazePoint {
            timestamp: Timestamp(raw.timestamp_us),
            validity: Validity::from_raw(raw.validity),
            position_xy: raw.position_xy,
        }
    }
}

impl Stream for GazeOriginStream {
    type Sample = GazeOrigin;
    const KIND: StreamKind = StreamKind::GazeOrigin;

    fn native_callback() -> NativeCallbackHandle {
        NativeCallbackHandle(NativeCallback::Data(data_trampoline::<Self>))
    }
}

impl DataStream for GazeOriginStream {
    type Raw = RawGazeOrigin;

    fn decode(raw: &RawGazeOrigin) -> GazeOrigin {
        GazeOrigin {
            timestamp: Timestamp(raw.timestamp_us),
            left_validity: Validity::from_raw(raw.left_validity),
            left_xyz: raw.left_xyz,
            right_validity: Validity::from_raw(raw.right_validity),
            right_xyz: raw.right_xyz,
        }
    }
}

impl Stream for UserPresenceStream {
    type Sample = UserPresence;
    const KIND: StreamKind = StreamKind::UserPresence;

    fn native_callback() -> NativeCallbackHandle {
        NativeCallbackHandle(NativeCallback::Presence(presence_trampoline))
    }
}

impl Stream for HeadPoseStream {
    type Sample = HeadPose;
    const KIND: StreamKind = StreamKind::HeadPose;

    fn native_callback() -> NativeCallbackHandle {
        NativeCallbackHandle(NativeCallback::Data(data_trampoline::<Self>))
    }
}

impl DataStream for HeadPoseStream {
    type Raw = RawHeadPose;

    fn decode(raw: &RawHeadPose) -> HeadPose {
        HeadPose {
            timestamp: Timestamp(raw.timestamp_us),
            position_validity: Validity::from_raw(raw.position_validity),
            position_xyz: raw.position_xyz,
            rotation_validity_xyz: raw.rotation_validity_xyz.map(Validity::from_raw),
            rotation_xyz: raw.rotation_xyz,
        }
    }
}

impl Stream for NotificationStream {
    type Sample = Notification;
    const KIND: StreamKind = StreamKind::Notification;

    fn native_callback() -> NativeCallbackHandle {
        NativeCallbackHandle(NativeCallback::Data(data_trampoline::<Self>))
    }
}

impl DataStream for NotificationStream {
    type Raw = RawNotification;

    fn decode(raw: &RawNotification) -> Notification {
        // The active union member is selected by value_type.
        let value = unsafe {
            match raw.value_type {
                ffi::NOTIFICATION_VALUE_TYPE_FLOAT => NotificationValue::Float(raw.value.float_),
                ffi::NOTIFICATION_VALUE_TYPE_STATE => {
                    NotificationValue::State(raw.value.state == ffi::STATE_BOOL_TRUE)
                }
                ffi::NOTIFICATION_VALUE_TYPE_DISPLAY_AREA => NotificationValue::DisplayArea(
                    layout::display_area_from_floats(&raw.value.display_area),
                ),
                ffi::NOTIFICATION_VALUE_TYPE_UINT => NotificationValue::Uint(raw.value.uint_),
                ffi::NOTIFICATION_VALUE_TYPE_ENABLED_EYE => {
                    NotificationValue::EnabledEye(EnabledEye::from_raw(raw.value.enabled_eye))
                }
                ffi::NOTIFICATION_VALUE_TYPE_STRING => {
                    let bytes: Vec<u8> = raw.value.string_.iter().map(|&c| c as u8).collect();
                    NotificationValue::String(layout::extract_string(&bytes))
                }
                _ => NotificationValue::None,
            }
        };
        Notification {
            kind: NotificationKind::from_raw(raw.kind),
            value,
        }
    }
}

impl Stream for UserPositionGuideStream {
    type Sample = UserPositionGuide;
    const KIND: StreamKind = StreamKind::UserPositionGuide;

    fn native_callback() -> NativeCallbackHandle {
        NativeCallbackHandle(NativeCallback::Data(data_trampoline::<Self>))
    }
}

impl DataStream for UserPositionGuideStream {
    type Raw = RawUserPositionGuide;

    fn decode(raw: &RawUserPositionGuide) -> UserPositionGuide {
        UserPositionGuide {
            timestamp: Timestamp(raw.timestamp_us),
            left_validity: Validity::from_raw(raw.left_validity),
            left_xyz: raw.left_xyz,
            right_validity: Validity::from_raw(raw.right_validity),
            right_xyz: raw.right_xyz,
        }
    }
}

type Callback<T> = Box<dyn FnMut(&T)>;

/// Ordered callback list for one stream; lives inside a pinned slot.
pub(crate) struct Dispatcher<T> {
    callbacks: Vec<(u64, Callback<T>)>,
}

impl<T> Dispatcher<T> {
    fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Invoke every callback in registration order.
    fn dispatch(&mut self, sample: &T) {
        for (_, callback) in self.callbacks.iter_mut() {
            callback(sample);
        }
    }
}

thread_local! {
    static PENDING_PANIC: RefCell<Option<Box<dyn Any + Send>>> = const { RefCell::new(None) };
}

/// Run a callback body without letting a panic unwind into native frames.
/// The first panic is kept and re-raised by [`resume_pending_panic`].
pub(crate) fn guard_callback(body: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
        log::error!("Callback panicked inside a native call; re-raising after it returns");
        PENDING_PANIC.with(|p| {
            let mut pending = p.borrow_mut();
            if pending.is_none() {
                *pending = Some(payload);
            }
        });
    }
}

/// Re-raise a panic caught by [`guard_callback`] on the calling thread.
pub(crate) fn resume_pending_panic() {
    if let Some(payload) = PENDING_PANIC.with(|p| p.borrow_mut().take()) {
        panic::resume_unwind(payload);
    }
}

unsafe extern "C" fn data_trampoline<S: DataStream>(data: *const c_void, user_data: *mut c_void) {
    if data.is_null() || user_data.is_null() {
        return;
    }
    let raw = &*(data as *const S::Raw);
    let dispatcher = PinnedSlot::<Dispatcher<S::Sample>>::from_user_data(user_data);
    guard_callback(|| dispatcher.dispatch(&S::decode(raw)));
}

unsafe extern "C" fn presence_trampoline(status: c_int, timestamp_us: i64, user_data: *mut c_void) {
    if user_data.is_null() {
        return;
    }
    let dispatcher = PinnedSlot::<Dispatcher<UserPresence>>::from_user_data(user_data);
    let sample = UserPresence {
        timestamp: Timestamp(timestamp_us),
        status: PresenceStatus::from_raw(status),
    };
    guard_callback(|| dispatcher.dispatch(&sample));
}

/// Live native subscription for stream `S`: owns the pinned dispatcher.
struct Subscription<S: Stream> {
    slot: PinnedSlot<Dispatcher<S::Sample>>,
}

/// Type-erased view of a [`Subscription`] so one registry can hold all kinds.
trait ActiveSubscription {
    fn user_data(&self) -> *mut c_void;
    fn callback_count(&self) -> usize;
    fn remove(&mut self, seq: u64) -> bool;
    fn clear(&mut self);
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn release(self: Box<Self>);
    fn abandon(self: Box<Self>);
}

impl<S: Stream> ActiveSubscription for Subscription<S> {
    fn user_data(&self) -> *mut c_void {
        self.slot.user_data()
    }

    fn callback_count(&self) -> usize {
        self.slot.get().callbacks.len()
    }

    fn remove(&mut self, seq: u64) -> bool {
        let callbacks = &mut self.slot.get_mut().callbacks;
        let before = callbacks.len();
        callbacks.retain(|(s, _)| *s != seq);
        callbacks.len() != before
    }

    fn clear(&mut self) {
        self.slot.get_mut().callbacks.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn release(self: Box<Self>) {
        self.slot.release();
    }

    fn abandon(self: Box<Self>) {
        self.slot.abandon();
    }
}

struct Entry {
    state: SubscriptionState,
    subscription: Option<Box<dyn ActiveSubscription>>,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: SubscriptionState::Unsubscribed,
            subscription: None,
        }
    }
}

/// Per-device subscription registry.
pub(crate) struct Registry {
    entries: [Entry; 6],
    next_seq: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: [
                Entry::new(),
                Entry::new(),
                Entry::new(),
                Entry::new(),
                Entry::new(),
                Entry::new(),
            ],
            next_seq: 0,
        }
    }

    pub(crate) fn state(&self, kind: StreamKind) -> SubscriptionState {
        self.entries[kind.index()].state
    }

    pub(crate) fn callback_count(&self, kind: StreamKind) -> usize {
        self.entries[kind.index()]
            .subscription
            .as_ref()
            .map_or(0, |s| s.callback_count())
    }

    /// Add an application callback, subscribing natively if it is the first.
    pub(crate) fn add<S: Stream>(
        &mut self,
        lib: &NativeLibrary,
        device: *mut RawDevice,
        callback: Callback<S::Sample>,
    ) -> Result<CallbackId> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = CallbackId { kind: S::KIND, seq };
        let entry = &mut self.entries[S::KIND.index()];

        if let Some(active) = entry.subscription.as_mut() {
            let typed = active
                .as_any_mut()
                .downcast_mut::<Subscription<S>>()
                .ok_or_else(|| {
                    EngineError::InvalidArgument(format!("{:?} slot holds another stream", S::KIND))
                })?;
            typed.slot.get_mut().callbacks.push((seq, callback));
            log::debug!("Added {:?} callback #{} to existing subscription", S::KIND, seq);
            return Ok(id);
        }

        entry.state = SubscriptionState::Subscribing;
        log::trace!("{:?}: Unsubscribed -> Subscribing", S::KIND);

        let mut dispatcher = Dispatcher::new();
        dispatcher.callbacks.push((seq, callback));
        let slot = PinnedSlot::new(dispatcher);

        let status = unsafe { lib.subscribe(S::KIND, device, S::native_callback().0, slot.user_data()) };
        if let Err(e) = lib.check(lib.stream_symbols(S::KIND).0, status) {
            slot.release();
            entry.state = SubscriptionState::Unsubscribed;
            log::trace!("{:?}: Subscribing -> Unsubscribed ({})", S::KIND, e);
            return Err(e);
        }

        entry.subscription = Some(Box::new(Subscription::<S> { slot }));
        entry.state = SubscriptionState::Subscribed;
        log::debug!("Subscribed to {:?} (callback #{})", S::KIND, seq);
        Ok(id)
    }

    /// Remove one application callback, unsubscribing natively if it was the
    /// last.
    pub(crate) fn remove(
        &mut self,
        lib: &NativeLibrary,
        device: *mut RawDevice,
        id: CallbackId,
    ) -> Result<()> {
        let entry = &mut self.entries[id.kind.index()];
        let removed = entry
            .subscription
            .as_mut()
            .map_or(false, |s| s.remove(id.seq));
        if !removed {
            return Err(EngineError::InvalidArgument(format!(
                "callback #{} is not registered for {:?}",
                id.seq, id.kind
            )));
        }

        if self.callback_count(id.kind) > 0 {
            return Ok(());
        }
        self.unsubscribe(lib, device, id.kind)
    }

    /// Drop every callback for `kind` and unsubscribe natively.
    pub(crate) fn remove_all(
        &mut self,
        lib: &NativeLibrary,
        device: *mut RawDevice,
        kind: StreamKind,
    ) -> Result<()> {
        match self.entries[kind.index()].subscription.as_mut() {
            Some(active) => active.clear(),
            None => return Ok(()),
        }
        self.unsubscribe(lib, device, kind)
    }

    /// Native unsubscribe, then release of the pinned slot. On failure the
    /// slot stays owned and the state returns to `Subscribed`.
    fn unsubscribe(
        &mut self,
        lib: &NativeLibrary,
        device: *mut RawDevice,
        kind: StreamKind,
    ) -> Result<()> {
        let entry = &mut self.entries[kind.index()];
        if entry.subscription.is_none() {
            return Ok(());
        }

        entry.state = SubscriptionState::Unsubscribing;
        log::trace!("{:?}: Subscribed -> Unsubscribing", kind);

        let status = unsafe { lib.unsubscribe(kind, device) };
        // Not-subscribed means the native side holds no reference either.
        let result = if status == ffi::ERROR_NOT_SUBSCRIBED {
            Ok(())
        } else {
            lib.check(lib.stream_symbols(kind).1, status)
        };

        match result {
            Ok(()) => {
                if let Some(active) = entry.subscription.take() {
                    active.release();
                }
                entry.state = SubscriptionState::Unsubscribed;
                log::debug!("Unsubscribed from {:?}", kind);
                Ok(())
            }
            Err(e) => {
                entry.state = SubscriptionState::Subscribed;
                log::trace!("{:?}: Unsubscribing -> Subscribed ({})", kind, e);
                Err(e)
            }
        }
    }

    /// Unsubscribe every live stream. All are attempted; the first failure
    /// is returned.
    pub(crate) fn release_all(&mut self, lib: &NativeLibrary, device: *mut RawDevice) -> Result<()> {
        let mut first_err = None;
        for kind in StreamKind::ALL {
            if let Some(active) = self.entries[kind.index()].subscription.as_mut() {
                active.clear();
            }
            if let Err(e) = self.unsubscribe(lib, device, kind) {
                log::warn!("Failed to unsubscribe {:?} during teardown: {}", kind, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.subscription.is_none())
    }

    /// Give up slots that native code may still reference.
    pub(crate) fn abandon_all(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Some(active) = entry.subscription.take() {
                log::error!(
                    "Leaking callback slot at {:p}: native unsubscribe never succeeded",
                    active.user_data()
                );
                active.abandon();
            }
            entry.state = SubscriptionState::Unsubscribed;
        }
    }
}
