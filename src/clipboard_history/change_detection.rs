//! NSPasteboard access below what arboard exposes
//!
//! `changeCount` is a cheap integer read, so polling it avoids touching the
//! payload until something actually changed. The typed-data and type-list
//! readers are used for RTF/HTML capture and sensitivity markers. All of
//! these return `None`/empty off macOS.

#[cfg(target_os = "macos")]
use objc::sel;
#[cfg(target_os = "macos")]
use objc::sel_impl;

use std::collections::HashSet;
use tracing::debug;

/// NSPasteboard.generalPasteboard.changeCount
#[cfg(target_os = "macos")]
pub fn get_pasteboard_change_count() -> Option<i64> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::nil;
    use objc::runtime::Object;

    unsafe {
        let pasteboard: *mut Object = NSPasteboard::generalPasteboard(nil);
        if pasteboard.is_null() {
            return None;
        }

        // NSInteger, i64 on 64-bit
        let change_count: i64 = objc::msg_send![pasteboard, changeCount];
        Some(change_count)
    }
}

#[cfg(not(target_os = "macos"))]
pub fn get_pasteboard_change_count() -> Option<i64> {
    None
}

/// Bytes stored on the general pasteboard under the given UTI.
#[cfg(target_os = "macos")]
pub fn read_pasteboard_data(uti: &str) -> Option<Vec<u8>> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::{id, nil};
    use cocoa::foundation::{NSData, NSString};

    unsafe {
        let pasteboard: id = NSPasteboard::generalPasteboard(nil);
        if pasteboard.is_null() {
            return None;
        }

        let data_type: id = NSString::alloc(nil).init_str(uti);
        let data: id = pasteboard.dataForType(data_type);
        let _: () = objc::msg_send![data_type, release];
        if data.is_null() {
            return None;
        }

        let len = data.length() as usize;
        let bytes = data.bytes() as *const u8;
        if bytes.is_null() || len == 0 {
            return None;
        }
        Some(std::slice::from_raw_parts(bytes, len).to_vec())
    }
}

#[cfg(not(target_os = "macos"))]
pub fn read_pasteboard_data(_uti: &str) -> Option<Vec<u8>> {
    None
}

/// Every type identifier currently declared on the general pasteboard.
#[cfg(target_os = "macos")]
pub fn read_pasteboard_types() -> HashSet<String> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::{id, nil};
    use cocoa::foundation::{NSArray, NSString};

    let mut markers = HashSet::new();
    unsafe {
        let pasteboard: id = NSPasteboard::generalPasteboard(nil);
        if pasteboard.is_null() {
            return markers;
        }
        let types: id = pasteboard.types();
        if types.is_null() {
            return markers;
        }
        for index in 0..types.count() {
            let item: id = types.objectAtIndex(index);
            if item.is_null() {
                continue;
            }
            let utf8 = item.UTF8String();
            if utf8.is_null() {
                continue;
            }
            markers.insert(std::ffi::CStr::from_ptr(utf8).to_string_lossy().into_owned());
        }
    }
    markers
}

#[cfg(not(target_os = "macos"))]
pub fn read_pasteboard_types() -> HashSet<String> {
    HashSet::new()
}

/// Tracks the last observed change counter.
#[derive(Debug, Default)]
pub struct ClipboardChangeDetector {
    last_change_count: Option<i64>,
}

impl ClipboardChangeDetector {
    pub fn new() -> Self {
        Self {
            last_change_count: None,
        }
    }

    /// Compare `current` against the last observed counter and remember it.
    ///
    /// - `Some(true)` when the counter moved, or on the first observation
    /// - `Some(false)` when it is unchanged
    /// - `None` when no counter is available; callers treat that as changed
    pub fn observe(&mut self, current: Option<i64>) -> Option<bool> {
        let current = current?;

        let changed = match self.last_change_count {
            Some(last) => current != last,
            None => true,
        };

        if changed {
            debug!(
                old_count = self.last_change_count,
                new_count = current,
                "Pasteboard change detected via changeCount"
            );
        }

        self.last_change_count = Some(current);
        Some(changed)
    }

    /// Forget the last counter so the next observation reports a change.
    pub fn reset(&mut self) {
        self.last_change_count = None;
    }

    pub fn last_count(&self) -> Option<i64> {
        self.last_change_count
    }
}
