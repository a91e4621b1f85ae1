//! Protocol constants for MagTek USB swipe readers.
//!
//! Derived from the MagTek USB HID swipe reader technical reference.

// ============================================================================
// Device Identification
// ============================================================================

/// MagTek Vendor ID
pub const MAGTEK_VENDOR_ID: u16 = 0x0801;

/// Product ID reported while the firmware emulates a keyboard (factory default)
pub const KB_PRODUCT_ID: u16 = 0x0001;
/// Product ID reported while the firmware is in raw HID mode
pub const HID_PRODUCT_ID: u16 = 0x0002;

// ============================================================================
// Report Sizes
// ============================================================================

/// Feature report size: 1 byte command, 1 byte length, 22 bytes data.
pub const FEATURE_REPORT_SIZE: usize = 24;
/// Largest data field a command or response can carry.
pub const MAX_COMMAND_DATA: usize = FEATURE_REPORT_SIZE - 2;

/// Card data arrives as one input report of this size.
pub const INPUT_REPORT_SIZE: usize = 337;

/// Width of each track data field inside the input report.
pub const TRACK_DATA_SIZE: usize = 109;

// ============================================================================
// HID Class Requests (HID 1.11, section 7.2)
// ============================================================================

/// bRequest for SET_REPORT
pub const BREQ_SET_REPORT: u8 = 0x09;
/// bRequest for GET_REPORT
pub const BREQ_GET_REPORT: u8 = 0x01;

/// bmRequestType for GET_REPORT (class, interface, device-to-host)
pub const BMREQ_GET_REPORT: u8 = 0xA1;
/// bmRequestType for SET_REPORT (class, interface, host-to-device)
pub const BMREQ_SET_REPORT: u8 = 0x21;

/// Report type 3 is a feature report.
pub const REPORT_TYPE_FEATURE: u8 = 0x03;
/// The reader does not use report IDs.
pub const REPORT_ID: u8 = 0x00;
/// wValue: report type in the high byte, report ID in the low byte.
pub const FEATURE_REPORT_WVALUE: u16 = ((REPORT_TYPE_FEATURE as u16) << 8) | REPORT_ID as u16;

/// The reader exposes a single interface.
pub const HID_INTERFACE: u8 = 0;
/// ... and a single configuration.
pub const USB_CONFIGURATION: u8 = 1;

// ============================================================================
// Vendor Status Codes
// ============================================================================

pub const RC_SUCCESS: u8 = 0x00;
pub const RC_FAIL: u8 = 0x01;
pub const RC_BADPARAM: u8 = 0x02;

// ============================================================================
// Commands
// ============================================================================

pub const CMD_GET_PROPERTY: u8 = 0x00;
pub const CMD_SET_PROPERTY: u8 = 0x01;
/// Reboots the reader. Not a USB bus reset.
pub const CMD_RESET_DEVICE: u8 = 0x02;

// ============================================================================
// Properties
// ============================================================================

/// Software ID string (read-only)
pub const PROP_SOFTWARE_ID: u8 = 0x00;
/// Track format byte
pub const PROP_TRACK_FORMAT: u8 = 0x03;
/// Interface type (0 = HID, 1 = KB)
pub const PROP_INTERFACE_TYPE: u8 = 0x10;

pub const INTERFACE_TYPE_HID: u8 = 0;
pub const INTERFACE_TYPE_KB: u8 = 1;

// ============================================================================
// Timeouts
// ============================================================================

/// Default timeout for feature report transfers.
pub const DEFAULT_CONTROL_TIMEOUT_MS: u64 = 1000;
/// Default timeout for one interrupt read while waiting for a swipe.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
/// Default timeout for the read that flushes trailing swipe data.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wvalue_layout() {
        assert_eq!(FEATURE_REPORT_WVALUE, 0x0300);
    }

    #[test]
    fn test_request_types_match_direction() {
        // Bit 7 of bmRequestType is the data direction.
        assert_eq!(BMREQ_GET_REPORT & 0x80, 0x80);
        assert_eq!(BMREQ_SET_REPORT & 0x80, 0x00);
    }

    #[test]
    fn test_report_layout_fits() {
        assert_eq!(MAX_COMMAND_DATA, 22);
        // status(3) + lengths(3) + card type(1) + 3 tracks with one reserved byte each
        assert_eq!(7 + 3 * (TRACK_DATA_SIZE + 1), INPUT_REPORT_SIZE);
    }
}
