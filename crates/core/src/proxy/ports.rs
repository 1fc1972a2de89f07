use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::session::transport::PortPair;
use crate::transport::UdpPair;

/// Pairs tried per connection before giving up.
const BIND_ATTEMPTS: usize = 16;

/// Hands out even RTP/RTCP port pairs from a fixed range, wrapping to the
/// bottom once the cursor passes the top.
///
/// One allocator is shared by every proxy connection; the cursor's
/// read-modify-write happens under its lock.
#[derive(Debug)]
pub struct PortAllocator {
    cursor: Mutex<u16>,
    low: u16,
    high: u16,
}

impl PortAllocator {
    /// Allocator over `low..=high`. `low` should be even.
    pub fn new(low: u16, high: u16) -> Self {
        Self {
            cursor: Mutex::new(low),
            low,
            high,
        }
    }

    /// Next pair in sequence.
    pub fn allocate(&self) -> PortPair {
        let mut cursor = self.cursor.lock();
        let pair = PortPair::starting_at(*cursor);
        *cursor = match cursor.checked_add(2) {
            Some(next) if next <= self.high => next,
            _ => self.low,
        };
        pair
    }

    /// Allocate and bind a pair, skipping ports that are already taken.
    pub fn bind(&self) -> Result<UdpPair> {
        for _ in 0..BIND_ATTEMPTS {
            let ports = self.allocate();
            match UdpPair::bind(ports) {
                Ok(pair) => return Ok(pair),
                Err(e) => tracing::debug!(%ports, error = %e, "proxy port pair busy"),
            }
        }
        Err(RtspError::PortRangeExhausted)
    }
}
