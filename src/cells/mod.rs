use std::fmt::Debug;

use tokio::time::Instant;

pub mod queue;

// Length of the Ethernet header carried in front of the network layer payload
pub const ETHER_HEADER_LENGTH: usize = 14;

pub trait Packet: Debug + 'static + Send {
    fn from_raw_buffer(buf: &[u8]) -> Self;

    // Raw buffer length
    fn length(&self) -> usize;
    // Network layer length
    fn l3_length(&self) -> usize;
    fn as_slice(&self) -> &[u8];

    // Arrival time, stamped when the packet is admitted to a queue
    fn get_timestamp(&self) -> Instant;
    fn set_timestamp(&mut self, timestamp: Instant);

    /// Leading bytes of the frame, formatted for trace logs.
    fn header_hex(&self) -> String {
        format!(
            "{:X?}",
            &self.as_slice()[0..std::cmp::min(56, self.length())]
        )
    }
}

#[derive(Clone, Debug)]
pub struct StdPacket {
    buf: Vec<u8>,
    timestamp: Instant,
}

impl Packet for StdPacket {
    fn from_raw_buffer(buf: &[u8]) -> Self {
        Self {
            buf: buf.to_vec(),
            timestamp: Instant::now(),
        }
    }

    fn length(&self) -> usize {
        self.buf.len()
    }

    fn l3_length(&self) -> usize {
        self.buf.len().saturating_sub(ETHER_HEADER_LENGTH)
    }

    fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    fn get_timestamp(&self) -> Instant {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: Instant) {
        self.timestamp = timestamp;
    }
}
