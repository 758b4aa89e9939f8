use std::time::Duration;

// SLIP marker bytes (RFC 1055)
pub const SLIP_END: u8 = 0xC0;
pub const SLIP_ESC: u8 = 0xDB;
pub const SLIP_ESC_END: u8 = 0xDC;
pub const SLIP_ESC_ESC: u8 = 0xDD;

// Frame header layout
pub const FRAME_KIND_OFFSET: usize = 0;
pub const FRAME_SEQ_OFFSET: usize = 1;
pub const FRAME_ACK_OFFSET: usize = 5;
pub const FRAME_HEADER_SIZE: usize = 9;
pub const FRAME_CHECKSUM_SIZE: usize = 4;

/// Set in the kind byte when the ack field carries a cumulative acknowledgment.
pub const FRAME_ACK_PRESENT_FLAG: u8 = 0x80;

/// Mask selecting the `FrameKind` bits of the kind byte.
pub const FRAME_KIND_MASK: u8 = 0x0F;

/// Smallest valid frame: header plus checksum, no payload.
pub const FRAME_MIN_SIZE: usize = FRAME_HEADER_SIZE + FRAME_CHECKSUM_SIZE;

/// Maximum number of unacknowledged frames in flight. Both peers must agree.
pub const DEFAULT_WINDOW_SIZE: usize = 8;

/// Maximum payload bytes carried by a single data frame. Both peers must agree.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 1024;

pub const DEFAULT_INITIAL_RTO: Duration = Duration::from_secs(1);
pub const DEFAULT_MIN_RTO: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_RTO: Duration = Duration::from_secs(60);

/// Largest `max_rto` a configuration may ask for. Keeps deadline arithmetic
/// far from `Instant` overflow.
pub const MAX_RTO_LIMIT: Duration = Duration::from_secs(3600);

/// Transmissions allowed per frame (the first send included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How often the writer thread scans the window for expired frames.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Read buffer size used by channel adapters pumping bytes into the layer.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;
