//! Per-flow packet accounting.
//!
//! Packets are classified by their (source, destination) address pair. Flow
//! ids start at 1 and follow the order in which pairs are first seen, so the
//! reverse (ACK) direction of a connection is a separate flow.

use flowlab_abstract::{Address, FlowId, FlowStats, Packet, SimTime};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FlowMonitor {
    index: HashMap<(Address, Address), usize>,
    flows: Vec<FlowStats>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn classify(&mut self, packet: &Packet) -> &mut FlowStats {
        let key = (packet.header.src, packet.header.dst);
        let slot = *self.index.entry(key).or_insert(self.flows.len());
        if slot == self.flows.len() {
            self.flows.push(FlowStats {
                lost_packets: Some(0),
                ..FlowStats::new(slot as FlowId + 1)
            });
        }
        &mut self.flows[slot]
    }

    pub fn record_tx(&mut self, packet: &Packet, now: SimTime) -> FlowId {
        let stats = self.classify(packet);
        if stats.tx_packets == 0 {
            stats.time_first_tx_packet = now;
        }
        stats.time_last_tx_packet = now;
        stats.tx_packets += 1;
        stats.tx_bytes += packet.len() as u64;
        stats.flow_id
    }

    pub fn record_rx(&mut self, packet: &Packet, now: SimTime) {
        let stats = self.classify(packet);
        stats.delay_sum += now.saturating_sub(packet.header.sent_at);
        if stats.time_first_rx_packet.is_none() {
            stats.time_first_rx_packet = Some(now);
        }
        stats.time_last_rx_packet = Some(now);
        stats.rx_packets += 1;
        stats.rx_bytes += packet.len() as u64;
    }

    pub fn record_lost(&mut self, packet: &Packet) {
        let stats = self.classify(packet);
        stats.lost_packets = Some(stats.lost_packets.unwrap_or(0) + 1);
    }

    /// Flow statistics in creation order.
    pub fn flows(&self) -> &[FlowStats] {
        &self.flows
    }
}
