use std::ffi::c_int;
use std::fmt;
use std::time::Duration;

/// Library system-clock reading, in microseconds. Every sample is stamped
/// with this clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn as_micros(self) -> i64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        Duration::from_micros(delta.max(0) as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

/// Validity flag attached to every measured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Invalid,
    Valid,
}

impl Validity {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        if raw == crate::ffi::VALIDITY_VALID {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }

    pub fn is_valid(self) -> bool {
        self == Validity::Valid
    }
}

/// Native log level.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Parse a level name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

bitflags::bitflags! {
    /// Device generations accepted by URL enumeration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct DeviceGenerations: u32 {
        const G5  = 0x0000_0002;
        const IS3 = 0x0000_0004;
        const IS4 = 0x0000_0008;
    }
}

impl Default for DeviceGenerations {
    fn default() -> Self {
        DeviceGenerations::all()
    }
}

/// Device capability identifiers. Newer libraries may report values this
/// crate does not name; those round-trip through `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DisplayAreaWritable,
    Calibration2d,
    Calibration3d,
    PersistentStorage,
    CalibrationPerEye,
    CompoundStreamWearable3dGazeCombined,
    FaceType,
    CompoundStreamUserPositionGuideXy,
    CompoundStreamUserPositionGuideZ,
    Other(u32),
}

impl Capability {
    pub(crate) fn raw(self) -> c_int {
        let value = match self {
            Capability::DisplayAreaWritable => 0,
            Capability::Calibration2d => 1,
            Capability::Calibration3d => 2,
            Capability::PersistentStorage => 3,
            Capability::CalibrationPerEye => 4,
            Capability::CompoundStreamWearable3dGazeCombined => 5,
            Capability::FaceType => 6,
            Capability::CompoundStreamUserPositionGuideXy => 7,
            Capability::CompoundStreamUserPositionGuideZ => 8,
            Capability::Other(v) => v,
        };
        value as c_int
    }
}

/// Native stream identifiers used by support queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    GazePoint,
    GazeOrigin,
    /// Named `UserPositionGuide` from v3 onward; same identifier.
    EyePositionNormalized,
    UserPresence,
    HeadPose,
    GazeData,
    DigitalSyncport,
    DiagnosticsImage,
    Other(u32),
}

impl StreamId {
    pub(crate) fn raw(self) -> c_int {
        let value = match self {
            StreamId::GazePoint => 0,
            StreamId::GazeOrigin => 1,
            StreamId::EyePositionNormalized => 2,
            StreamId::UserPresence => 3,
            StreamId::HeadPose => 4,
            StreamId::GazeData => 5,
            StreamId::DigitalSyncport => 6,
            StreamId::DiagnosticsImage => 7,
            StreamId::Other(v) => v,
        };
        value as c_int
    }
}

/// Runtime state selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    PowerSaveActive,
    RemoteWakeActive,
    DevicePaused,
    ExclusiveMode,
    Fault,
    Warning,
    CalibrationId,
    CalibrationActive,
}

/// Declared value kind of a [`State`]; selects the native accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateValueKind {
    Bool,
    Uint,
    String,
}

impl State {
    pub(crate) fn raw(self) -> c_int {
        match self {
            State::PowerSaveActive => 0,
            State::RemoteWakeActive => 1,
            State::DevicePaused => 2,
            State::ExclusiveMode => 3,
            State::Fault => 4,
            State::Warning => 5,
            State::CalibrationId => 6,
            State::CalibrationActive => 7,
        }
    }

    pub fn value_kind(self) -> StateValueKind {
        match self {
            State::PowerSaveActive
            | State::RemoteWakeActive
            | State::DevicePaused
            | State::ExclusiveMode
            | State::CalibrationActive => StateValueKind::Bool,
            State::CalibrationId => StateValueKind::Uint,
            State::Fault | State::Warning => StateValueKind::String,
        }
    }
}

/// Value read through one of the three state accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    Bool(bool),
    Uint(u32),
    String(String),
}

/// Which eye(s) calibration and gaze use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnabledEye {
    Left,
    Right,
    Both,
}

impl EnabledEye {
    pub(crate) fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            0 => Some(EnabledEye::Left),
            1 => Some(EnabledEye::Right),
            2 => Some(EnabledEye::Both),
            _ => None,
        }
    }
}

/// Device identification snapshot. Fields introduced by the v3 layout are
/// `None` on v2 libraries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub model: String,
    pub generation: String,
    pub firmware_version: String,
    pub integration_id: Option<String>,
    pub hw_calibration_version: Option<String>,
    pub hw_calibration_date: Option<String>,
    pub lot_id: Option<String>,
    pub integration_type: Option<String>,
    pub runtime_build_version: Option<String>,
}

/// Tracking volume corners in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackBox {
    pub front_upper_right: [f32; 3],
    pub front_upper_left: [f32; 3],
    pub front_lower_left: [f32; 3],
    pub front_lower_right: [f32; 3],
    pub back_upper_right: [f32; 3],
    pub back_upper_left: [f32; 3],
    pub back_lower_left: [f32; 3],
    pub back_lower_right: [f32; 3],
}

/// Display plane corners in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayArea {
    pub top_left_mm: [f32; 3],
    pub top_right_mm: [f32; 3],
    pub bottom_left_mm: [f32; 3],
}

/// Normalized gaze point on the display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazePoint {
    pub timestamp: Timestamp,
    pub validity: Validity,
    pub position_xy: [f32; 2],
}

/// Eye positions in millimetres relative to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeOrigin {
    pub timestamp: Timestamp,
    pub left_validity: Validity,
    pub left_xyz: [f32; 3],
    pub right_validity: Validity,
    pub right_xyz: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Unknown,
    Away,
    Present,
}

impl PresenceStatus {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            1 => PresenceStatus::Away,
            2 => PresenceStatus::Present,
            _ => PresenceStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPresence {
    pub timestamp: Timestamp,
    pub status: PresenceStatus,
}

/// Head position (mm) and rotation (radians per axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub timestamp: Timestamp,
    pub position_validity: Validity,
    pub position_xyz: [f32; 3],
    pub rotation_validity_xyz: [Validity; 3],
    pub rotation_xyz: [f32; 3],
}

/// Normalized eye positions inside the track box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserPositionGuide {
    pub timestamp: Timestamp,
    pub left_validity: Validity,
    pub left_xyz: [f32; 3],
    pub right_validity: Validity,
    pub right_xyz: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    CalibrationStateChanged,
    ExclusiveModeStateChanged,
    TrackBoxChanged,
    DisplayAreaChanged,
    FramerateChanged,
    PowerSaveStateChanged,
    DevicePausedStateChanged,
    CalibrationEnabledEyeChanged,
    CalibrationIdChanged,
    CombinedGazeEyeSelectionChanged,
    FaultsChanged,
    WarningsChanged,
    Other(i32),
}

impl NotificationKind {
    pub(crate) fn from_raw(raw: c_int) -> Self {
        match raw {
            0 => NotificationKind::CalibrationStateChanged,
            1 => NotificationKind::ExclusiveModeStateChanged,
            2 => NotificationKind::TrackBoxChanged,
            3 => NotificationKind::DisplayAreaChanged,
            4 => NotificationKind::FramerateChanged,
            5 => NotificationKind::PowerSaveStateChanged,
            6 => NotificationKind::DevicePausedStateChanged,
            7 => NotificationKind::CalibrationEnabledEyeChanged,
            8 => NotificationKind::CalibrationIdChanged,
            9 => NotificationKind::CombinedGazeEyeSelectionChanged,
            10 => NotificationKind::FaultsChanged,
            11 => NotificationKind::WarningsChanged,
            other => NotificationKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationValue {
    None,
    Float(f32),
    State(bool),
    DisplayArea(DisplayArea),
    Uint(u32),
    EnabledEye(Option<EnabledEye>),
    String(String),
}

/// Device-side change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub value: NotificationValue,
}
