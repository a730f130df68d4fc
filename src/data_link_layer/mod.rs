use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use arp::*;
use switch::*;

use crate::comm::Transport;
use crate::config::*;
use crate::error::{Error, Result};
use crate::ip_layer::promote_pkt_to_layer3;
use crate::topograph::{
    graph::*,
    net_util::*,
};

pub mod arp;
pub mod switch;

/// Result of inserting into a MAC or ARP table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// No entry existed for the key.
    Inserted,
    /// An entry with the same key but different content was replaced.
    Replaced,
    /// An identical entry was already present.
    Unchanged,
}

/// Ethernet frame: 14 byte header, a payload of at most
/// [`ETH_PAYLOAD_CAPACITY`] bytes and a 4 byte FCS that follows the actual
/// payload, not the declared capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetHeader {
    dst_mac: MAC,
    src_mac: MAC,
    eth_type: u16,
    payload: Bytes,
    fcs: u32,
}

impl EthernetHeader {
    pub fn new(dst_mac: MAC, src_mac: MAC, eth_type: u16, payload: &[u8]) -> Self {
        Self {
            dst_mac,
            src_mac,
            eth_type,
            payload: Bytes::copy_from_slice(payload),
            fcs: 0,
        }
    }

    pub fn from_bytes(pkt: &[u8]) -> Result<Self> {
        if pkt.len() < ETH_HDR_SIZE + ETH_FCS_SIZE {
            return Err(Error::MalformedFrame { len: pkt.len() });
        }
        let payload_len = pkt.len() - ETH_HDR_SIZE - ETH_FCS_SIZE;
        let mut bytes = pkt;

        let mut dst_mac = MAC::default();
        bytes.copy_to_slice(&mut dst_mac.0);
        let mut src_mac = MAC::default();
        bytes.copy_to_slice(&mut src_mac.0);

        Ok(EthernetHeader {
            dst_mac,
            src_mac,
            eth_type: bytes.get_u16(),
            payload: bytes.copy_to_bytes(payload_len),
            fcs: bytes.get_u32(),
        })
    }

    /// Size of the frame on the wire.
    #[inline]
    pub fn wire_size(&self) -> usize {
        ETH_HDR_SIZE + self.payload.len() + ETH_FCS_SIZE
    }

    pub fn to_bytes(&self) -> Result<BytesMut> {
        let mut bytes = BytesMut::zeroed(self.wire_size());
        self.write_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Writes the frame at the start of `buf` and returns the number of
    /// bytes written. The FCS lands right after the payload.
    pub fn write_into(&self, buf: &mut [u8]) -> Result<usize> {
        if self.payload.len() > ETH_PAYLOAD_CAPACITY {
            return Err(Error::PayloadTooLarge { len: self.payload.len() });
        }
        let total = self.wire_size();
        if buf.len() < total {
            return Err(Error::Compaction { total, capacity: buf.len() });
        }
        let mut out = &mut buf[..total];
        out.put_slice(&self.dst_mac.0);
        out.put_slice(&self.src_mac.0);
        out.put_u16(self.eth_type);
        out.put_slice(&self.payload);
        out.put_u32(self.fcs);
        Ok(total)
    }

    #[inline]
    pub fn get_dst_mac(&self) -> MAC {
        self.dst_mac
    }

    #[inline]
    pub fn get_src_mac(&self) -> MAC {
        self.src_mac
    }

    #[inline]
    pub fn get_type(&self) -> u16 {
        self.eth_type
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn get_fcs(&self) -> u32 {
        self.fcs
    }

    #[inline]
    pub fn is_broadcast_mac(&self) -> bool {
        self.dst_mac.is_broadcast()
    }
}

/// Builds a wire frame of exactly `14 + payload.len() + 4` bytes with a
/// zeroed FCS.
pub fn encode_frame(dst_mac: MAC, src_mac: MAC, eth_type: u16, payload: &[u8]) -> Result<BytesMut> {
    EthernetHeader::new(dst_mac, src_mac, eth_type, payload).to_bytes()
}

pub fn decode_frame(pkt: &[u8]) -> Result<EthernetHeader> {
    EthernetHeader::from_bytes(pkt)
}

/// Turns a scratch buffer of `capacity` bytes, holding a frame of
/// `total_size` bytes at offset 0, into the minimal wire frame.
///
/// The frame is shifted to the tail of the scratch buffer first, so the
/// returned bytes are the last `total_size` bytes of the original allocation.
pub fn compact_to_wire(mut buffer: BytesMut, capacity: usize, total_size: usize) -> Result<Bytes> {
    if total_size > capacity || buffer.len() < capacity {
        return Err(Error::Compaction { total: total_size, capacity });
    }
    buffer.truncate(capacity);
    let start = capacity - total_size;
    buffer.copy_within(0..total_size, start);
    Ok(buffer.split_off(start).freeze())
}

/// Admission check for a frame received on `interface`.
///
/// Interfaces without an IP address accept everything. Addressed
/// interfaces accept frames sent to their own MAC or to broadcast only.
pub fn l2_frame_recv_qualify_on_interface(interface: &Interface, ethernet_hdr: &EthernetHeader) -> bool {
    if !interface.is_l3_mode() {
        return true;
    }
    if interface.get_mac_address().eq(&ethernet_hdr.dst_mac) {
        return true;
    }
    if ethernet_hdr.is_broadcast_mac() {
        return true;
    }
    false
}

/// Single ingress point for a frame received on `interface` of `node`.
///
/// ARP frames go to the ARP engine, everything else to the upper layer
/// hook. Independently of that, frames received on an access or trunk
/// interface are handed to the switch.
pub fn layer2_frame_recv(node: &Node,
                         interface: &Interface,
                         pkt: &[u8],
                         transport: &mut dyn Transport) -> Result<()> {
    let ethernet_hdr = EthernetHeader::from_bytes(pkt)?;

    if !l2_frame_recv_qualify_on_interface(interface, &ethernet_hdr) {
        debug!(node = node.get_name(),
               interface = interface.get_if_name(),
               dst = %ethernet_hdr.dst_mac,
               "L2 frame rejected");
        return Err(Error::FrameRejected {
            node: node.get_name().to_string(),
            interface: interface.get_if_name().to_string(),
        });
    }
    debug!(node = node.get_name(), interface = interface.get_if_name(), "L2 frame accepted");

    let classified = match ethernet_hdr.eth_type {
        ARP_MSG => process_arp_msg(node, interface, &ethernet_hdr, transport),
        eth_type => {
            promote_pkt_to_layer3(node, interface, ethernet_hdr.payload(), eth_type);
            Ok(())
        }
    };
    if let Err(err) = &classified {
        warn!(node = node.get_name(), interface = interface.get_if_name(), "{}", err);
    }

    match interface.l2_mode() {
        InterfaceMode::ACCESS | InterfaceMode::TRUNK => {
            switch_recv_frame(node, interface, &ethernet_hdr, pkt, transport)?;
        }
        InterfaceMode::UNKNOWN => {}
    }
    classified
}

pub fn dump_mac_table(node: &Node) -> String {
    node.node_nw_props().mac_table().to_string()
}

pub fn dump_arp_table(node: &Node) -> String {
    node.node_nw_props().arp_table().to_string()
}
