use tracing::trace;

use crate::config::*;
use crate::topograph::graph::{Interface, Node};

/// Hands a non ARP payload to the network layer. IP processing is not
/// implemented, so frames stop here.
pub fn promote_pkt_to_layer3(node: &Node,
                             interface: &Interface,
                             pkt: &[u8],
                             protocol_number: u16) {
    match protocol_number {
        ETH_IP | IP_IN_IP => layer3_ip_pkt_recv_from_bottom(node, interface, pkt),
        _ => trace!(node = node.get_name(), "no handler for ethertype {:#06x}", protocol_number),
    }
}

pub fn layer3_ip_pkt_recv_from_bottom(node: &Node, interface: &Interface, pkt: &[u8]) {
    trace!(node = node.get_name(), interface = interface.get_if_name(),
           len = pkt.len(), "IP packet handed to layer 3");
}
