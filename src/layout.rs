//! Decoding of the fixed-size blocks the native queries fill in.
//!
//! All blocks are native-endian. String fields are NUL-terminated inside a
//! fixed-width slot; invalid UTF-8 decodes lossily.

use crate::ffi::{DISPLAY_AREA_SIZE, TRACK_BOX_SIZE};
use crate::types::{DeviceInfo, DisplayArea, TrackBox};
use crate::version::InfoLayout;

/// Slot widths of the v2 device-info block: serial, model, generation,
/// firmware.
const INFO_V2_FIELDS: [usize; 4] = [128, 64, 64, 128];

/// Slot widths of the v3 device-info block: serial, model, generation,
/// firmware, integration id, hw calibration version, hw calibration date,
/// lot id, integration type, runtime build version.
const INFO_V3_FIELDS: [usize; 10] = [256, 256, 256, 256, 128, 128, 128, 128, 256, 256];

fn field_widths(layout: InfoLayout) -> &'static [usize] {
    match layout {
        InfoLayout::V2 => &INFO_V2_FIELDS,
        InfoLayout::V3 => &INFO_V3_FIELDS,
    }
}

/// Extract a NUL-terminated string from a byte slice.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_ne_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_xyz(data: &[u8], offset: usize) -> [f32; 3] {
    [
        read_f32(data, offset),
        read_f32(data, offset + 4),
        read_f32(data, offset + 8),
    ]
}

/// Decode a device-info block. Returns `None` if the block is shorter than
/// the layout.
pub fn decode_device_info(block: &[u8], layout: InfoLayout) -> Option<DeviceInfo> {
    if block.len() < layout.size() {
        return None;
    }

    let mut offset = 0;
    let mut fields = Vec::with_capacity(10);
    for &width in field_widths(layout) {
        fields.push(extract_string(&block[offset..offset + width]));
        offset += width;
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or_default();
    let mut info = DeviceInfo {
        serial_number: next(),
        model: next(),
        generation: next(),
        firmware_version: next(),
        ..DeviceInfo::default()
    };

    if layout == InfoLayout::V3 {
        info.integration_id = Some(next());
        info.hw_calibration_version = Some(next());
        info.hw_calibration_date = Some(next());
        info.lot_id = Some(next());
        info.integration_type = Some(next());
        info.runtime_build_version = Some(next());
    }

    Some(info)
}

/// Decode the 96-byte track-box block: eight xyz corners, front face first.
pub fn decode_track_box(block: &[u8]) -> Option<TrackBox> {
    if block.len() < TRACK_BOX_SIZE {
        return None;
    }
    Some(TrackBox {
        front_upper_right: read_xyz(block, 0),
        front_upper_left: read_xyz(block, 12),
        front_lower_left: read_xyz(block, 24),
        front_lower_right: read_xyz(block, 36),
        back_upper_right: read_xyz(block, 48),
        back_upper_left: read_xyz(block, 60),
        back_lower_left: read_xyz(block, 72),
        back_lower_right: read_xyz(block, 84),
    })
}

/// Decode the 36-byte display-area block.
pub fn decode_display_area(block: &[u8]) -> Option<DisplayArea> {
    if block.len() < DISPLAY_AREA_SIZE {
        return None;
    }
    Some(DisplayArea {
        top_left_mm: read_xyz(block, 0),
        top_right_mm: read_xyz(block, 12),
        bottom_left_mm: read_xyz(block, 24),
    })
}

/// Display area carried inline in a notification payload.
pub(crate) fn display_area_from_floats(v: &[f32; 9]) -> DisplayArea {
    DisplayArea {
        top_left_mm: [v[0], v[1], v[2]],
        top_right_mm: [v[3], v[4], v[5]],
        bottom_left_mm: [v[6], v[7], v[8]],
    }
}
