mod hash;

pub use hash::{compute_file_hash, compute_hash};

use std::ffi::{OsStr, OsString};

/// Default category folders produced by the segmentation tool, merged across units
pub const DEFAULT_TARGETS: [&str; 3] = [
    "segmentation/corrected_crop",
    "segmentation/frame",
    "measurements",
];

/// Replace every space in a filename with an underscore.
///
/// This is the destination identity used for existence checks when merging.
pub fn sanitize_filename(name: &OsStr) -> OsString {
    replace_spaces(name, b'_')
}

/// Replace every ASCII space in `name` with `with`, leaving all other bytes intact.
///
/// Works on the raw OS string so names that are not valid UTF-8 keep their bytes.
#[cfg(unix)]
pub fn replace_spaces(name: &OsStr, with: u8) -> OsString {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let bytes = name
        .as_bytes()
        .iter()
        .map(|&b| if b == b' ' { with } else { b })
        .collect();
    OsString::from_vec(bytes)
}

#[cfg(windows)]
pub fn replace_spaces(name: &OsStr, with: u8) -> OsString {
    use std::os::windows::ffi::{OsStrExt, OsStringExt};

    let units: Vec<u16> = name
        .encode_wide()
        .map(|u| if u == u16::from(b' ') { u16::from(with) } else { u })
        .collect();
    OsString::from_wide(&units)
}

/// Human-readable local timestamp for progress logs
pub fn now_display() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
