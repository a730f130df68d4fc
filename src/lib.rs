//! Data plane of a simulated layer 2 network node: MAC learning and
//! switching, ARP resolution, and the ethernet/ARP wire format.

pub mod comm;
pub mod config;
pub mod data_link_layer;
mod error;
pub mod ip_layer;
pub mod logging;
pub mod topograph;

pub use comm::{send_pkt_flood_l2_intf_only, Transport, UdpTransport, Wire};
pub use data_link_layer::{
    arp::{send_arp_broadcast_request, ARPEntry, ARPHeader, ARPTable},
    compact_to_wire, decode_frame, dump_arp_table, dump_mac_table, encode_frame,
    layer2_frame_recv,
    switch::{L2ForwardAction, MACTable, MACTableEntry},
    EthernetHeader, InsertOutcome,
};
pub use error::{Error, Result};
pub use topograph::graph::{Graph, Interface, Link, LinkId, Node, NodeId};
pub use topograph::net_util::{InterfaceMode, IP, MAC};
