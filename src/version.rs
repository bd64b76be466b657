//! Native library version and the resolver that freezes it.
//!
//! Every version-dependent decision in the crate is a pure function of the
//! [`Version`] returned here. It is read once per [`crate::NativeLibrary`]
//! and never re-queried.

use crate::error::translate;
use crate::ffi::{self, GetApiVersionFn, RawVersion};
use crate::{EngineError, Result};
use std::fmt;

/// Oldest major version with a known ABI.
pub const MIN_SUPPORTED_MAJOR: u32 = 2;
/// Newest major version with a known ABI. Newer libraries are driven with
/// this version's call shapes.
pub const MAX_KNOWN_MAJOR: u32 = 4;

/// `major.minor.revision.build` of the loaded library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
    pub build: u32,
}

/// Device-info block layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoLayout {
    /// 384 bytes, four fields.
    V2,
    /// 2048 bytes, ten fields.
    V3,
}

impl InfoLayout {
    pub fn size(self) -> usize {
        match self {
            InfoLayout::V2 => ffi::DEVICE_INFO_V2_SIZE,
            InfoLayout::V3 => ffi::DEVICE_INFO_V3_SIZE,
        }
    }
}

impl Version {
    pub const fn new(major: u32, minor: u32, revision: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            revision,
            build,
        }
    }

    /// `tobii_wait_for_callbacks` dropped its root handle parameter in v3.
    pub fn wait_takes_api(&self) -> bool {
        self.major < 3
    }

    /// `tobii_device_create` gained the field-of-use selector in v4.
    pub fn device_create_takes_field_of_use(&self) -> bool {
        self.major >= 4
    }

    /// The eye-position-normalized stream was renamed user-position-guide in v3.
    pub fn has_user_position_guide(&self) -> bool {
        self.major >= 3
    }

    pub fn info_layout(&self) -> InfoLayout {
        if self.major < 3 {
            InfoLayout::V2
        } else {
            InfoLayout::V3
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.build
        )
    }
}

/// Query the library version through its version entry point.
///
/// Fails with [`EngineError::Integrity`] when the library cannot report a
/// version or reports one older than any known ABI.
pub(crate) fn resolve(get_api_version: GetApiVersionFn) -> Result<Version> {
    let mut raw = RawVersion::default();
    let status = unsafe { get_api_version(&mut raw) };
    if let Some(kind) = translate(status) {
        return Err(EngineError::Integrity(format!(
            "tobii_get_api_version returned {} ({:?})",
            status, kind
        )));
    }

    if raw.major < 0 || raw.minor < 0 || raw.revision < 0 || raw.build < 0 {
        return Err(EngineError::Integrity(format!(
            "negative version component {}.{}.{}.{}",
            raw.major, raw.minor, raw.revision, raw.build
        )));
    }

    let version = Version::new(
        raw.major as u32,
        raw.minor as u32,
        raw.revision as u32,
        raw.build as u32,
    );

    if version.major < MIN_SUPPORTED_MAJOR {
        return Err(EngineError::Integrity(format!(
            "library version {} predates the oldest supported ABI ({}.x)",
            version, MIN_SUPPORTED_MAJOR
        )));
    }
    if version.major > MAX_KNOWN_MAJOR {
        log::warn!(
            "Library version {} is newer than {}.x, using {}.x call shapes",
            version,
            MAX_KNOWN_MAJOR,
            MAX_KNOWN_MAJOR
        );
    }

    log::debug!("Resolved native library version {}", version);
    Ok(version)
}
