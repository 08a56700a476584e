//! Mock Ethernet interface
//!
//! Records every transmitted frame and lets tests take links down, withhold
//! buffers or make transmission fail per port.

use std::collections::HashSet;

use crate::interfaces::{EthIf, TxBuffer};
use crate::protocol::ptp::message::{MsgHeader, PtpMessageType};
use crate::protocol::ptp::timestamp::GlobalTimestamp;
use crate::types::PortIdx;

/// A frame handed to [`EthIf::transmit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// Egress port
    pub port: PortIdx,
    /// Frame bytes (exactly the transmitted length)
    pub data: Vec<u8>,
    /// Whether an egress timestamp was requested
    pub egress_ts: bool,
}

impl SentFrame {
    /// Decoded header
    #[must_use]
    pub fn header(&self) -> Option<MsgHeader> {
        MsgHeader::decode(&self.data).ok()
    }

    /// Message type
    #[must_use]
    pub fn message_type(&self) -> Option<PtpMessageType> {
        self.header().map(|h| h.message_type)
    }
}

/// Mock Ethernet interface
#[derive(Debug, Default)]
pub struct MockEthIf {
    /// Ports whose link is down
    pub links_down: HashSet<PortIdx>,
    /// Ports on which `transmit` fails
    pub failing_ports: HashSet<PortIdx>,
    /// Refuse every buffer request
    pub no_buffers: bool,
    /// Successfully transmitted frames
    pub sent: Vec<SentFrame>,
    /// Failed transmissions
    pub failed: usize,
    /// Buffers handed back unused
    pub released: usize,
    /// Hardware clock reading
    pub hw_time: Option<GlobalTimestamp>,
    next_index: u8,
}

impl MockEthIf {
    /// Create an interface with every link up
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a port's link up or down
    pub fn set_link(&mut self, port: PortIdx, up: bool) {
        if up {
            self.links_down.remove(&port);
        } else {
            self.links_down.insert(port);
        }
    }

    /// Make transmission on `port` fail or succeed
    pub fn set_failing(&mut self, port: PortIdx, failing: bool) {
        if failing {
            self.failing_ports.insert(port);
        } else {
            self.failing_ports.remove(&port);
        }
    }

    /// Frames of one message type, in transmission order
    #[must_use]
    pub fn frames_of(&self, message_type: PtpMessageType) -> Vec<&SentFrame> {
        self.sent
            .iter()
            .filter(|f| f.message_type() == Some(message_type))
            .collect()
    }

    /// Drain the transmitted frames
    pub fn take_sent(&mut self) -> Vec<SentFrame> {
        std::mem::take(&mut self.sent)
    }
}

impl EthIf for MockEthIf {
    fn is_link_active(&self, port: PortIdx) -> bool {
        !self.links_down.contains(&port)
    }

    fn acquire_tx_buffer(&mut self, _port: PortIdx, len: usize) -> Option<TxBuffer> {
        if self.no_buffers {
            return None;
        }
        self.next_index = self.next_index.wrapping_add(1);
        Some(TxBuffer::zeroed(self.next_index, len))
    }

    fn transmit(&mut self, port: PortIdx, buffer: TxBuffer, len: usize, egress_ts: bool) -> bool {
        if self.failing_ports.contains(&port) || !self.is_link_active(port) {
            self.failed += 1;
            return false;
        }
        self.sent.push(SentFrame {
            port,
            data: buffer.data[..len].to_vec(),
            egress_ts,
        });
        true
    }

    fn release_tx_buffer(&mut self, _port: PortIdx, _buffer: TxBuffer) {
        self.released += 1;
    }

    fn current_time(&self, _port: PortIdx) -> Option<GlobalTimestamp> {
        self.hw_time
    }
}
