//! # Utility Functions
//!
//! Byte-level helpers shared by the transport stream parsers:
//!
//! - Big-endian field readers for fixed-layout headers
//! - MPEG-2 CRC32 calculation and section validation
//!
//! ```rust
//! use tsdemux::utils::{read_pid, rb16};
//!
//! let header = [0x41, 0x00];
//! assert_eq!(rb16(&header), 0x4100);
//! assert_eq!(read_pid(&header), 0x0100);
//! ```

/// Big-endian integer field readers
pub mod bits;

/// CRC calculation for PSI sections
pub mod crc;

pub use bits::*;
pub use crc::{crc32_mpeg2, verify_section};
