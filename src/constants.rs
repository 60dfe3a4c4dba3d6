//! Application-wide constants for scanbutton.
//!
//! Groups the fixed numbers the rest of the crate relies on: serial link
//! parameters, acquisition resolutions, the page geometry table and the
//! naming formats for captured output.

use std::time::Duration;

// ============================================================================
// Serial link
// ============================================================================

/// Baud rate of the button controller link.
pub const SERIAL_BAUD_RATE: u32 = 9600;

/// Default read timeout for one bounded read on the serial link.
///
/// Also the worst-case shutdown latency of the listener, since the
/// cancellation flag is polled between reads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Smallest accepted read timeout. Shorter bounds make the read loop spin.
pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Byte that closes one framed record on the wire.
pub const FRAME_TERMINATOR: u8 = b')';

/// Size of the scratch buffer used for one bounded read.
pub const READ_CHUNK_SIZE: usize = 256;

/// Default serial device the button controller is attached to.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

// ============================================================================
// Acquisition
// ============================================================================

/// Resolution (dpi) used for JPEG output.
pub const JPG_RESOLUTION: u32 = 300;

/// Resolution (dpi) used for PDF output and when no mode is given.
pub const DEFAULT_RESOLUTION: u32 = 200;

/// Feeder source name passed to the acquisition tool.
pub const ADF_SOURCE: &str = "ADF Duplex";

/// Color mode passed to the acquisition tool.
pub const COLOR_MODE: &str = "Color";

/// Exit status `scanimage` uses when the document feeder ran out of paper.
pub const SCANIMAGE_FEEDER_EMPTY: i32 = 7;

// ============================================================================
// Geometry table (millimetres): page width, page height, scan width, scan height
// ============================================================================

/// ISO A4.
pub const A4_GEOMETRY: [f64; 4] = [210.0, 297.0, 210.0, 297.0];

/// US Legal.
pub const LEGAL_GEOMETRY: [f64; 4] = [215.9, 355.6, 215.9, 355.6];

/// Largest sheet the feeder accepts.
pub const MAX_GEOMETRY: [f64; 4] = [221.1, 863.6, 221.1, 863.6];

// ============================================================================
// Image adjustment
// ============================================================================

/// Fuzz factor for border trimming when cropping.
pub const CROP_FUZZ: &str = "10%";

/// Threshold handed to the deskew operation.
pub const DESKEW_THRESHOLD: &str = "40%";

// ============================================================================
// Output naming
// ============================================================================

/// `chrono` format of the capture identifier used to name output files.
pub const CAPTURE_ID_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Extension of per-page adjusted images.
pub const PAGE_EXTENSION: &str = "jpg";

/// Extension of aggregated documents.
pub const DOCUMENT_EXTENSION: &str = "pdf";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolutions_differ() {
        assert!(JPG_RESOLUTION > DEFAULT_RESOLUTION);
    }

    #[test]
    fn test_geometry_scan_area_fits_page() {
        for g in [A4_GEOMETRY, LEGAL_GEOMETRY, MAX_GEOMETRY] {
            assert!(g[2] <= g[0]);
            assert!(g[3] <= g[1]);
        }
    }

    #[test]
    fn test_read_timeout_is_bounded() {
        assert!(DEFAULT_READ_TIMEOUT <= Duration::from_secs(5));
        assert!(DEFAULT_READ_TIMEOUT > Duration::ZERO);
        assert!(MIN_READ_TIMEOUT < DEFAULT_READ_TIMEOUT);
    }
}
