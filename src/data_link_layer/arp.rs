use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::*;

/// ARP payload for ethernet/IPv4, 28 bytes on the wire. All multi-byte
/// fields are carried in network byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARPHeader {
    /*1 for ethernet cable*/
    hw_type: u16,
    /*0x0800 for IPV4*/
    proto_type: u16,
    /*6 for MAC*/
    hw_addr_len: u8,
    /*4 for IPV4*/
    proto_addr_len: u8,
    /*req or reply*/
    op_code: u16,
    src_mac: MAC,
    src_ip: IP,
    des_mac: MAC,
    des_ip: IP,
}


impl ARPHeader {
    fn new(op_code: u16, src_mac: MAC, src_ip: IP, des_mac: MAC, des_ip: IP) -> Self {
        Self {
            hw_type: ARP_HW_ETHERNET,
            proto_type: ETH_IP,
            hw_addr_len: 6,
            proto_addr_len: 4,
            op_code,
            src_mac,
            src_ip,
            des_mac,
            des_ip,
        }
    }

    /// Broadcast request asking who owns `des_ip`. The target MAC is unknown
    /// and left zeroed.
    pub fn request(src_mac: MAC, src_ip: IP, des_ip: IP) -> Self {
        Self::new(ARP_BROAD_REQ, src_mac, src_ip, MAC::ZERO, des_ip)
    }

    pub fn reply(src_mac: MAC, src_ip: IP, des_mac: MAC, des_ip: IP) -> Self {
        Self::new(ARP_REPLY, src_mac, src_ip, des_mac, des_ip)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ARP_HDR_SIZE {
            return Err(Error::MalformedArp { len: bytes.len() });
        }
        let mut bytes = bytes;
        let hw_type = bytes.get_u16();
        let proto_type = bytes.get_u16();
        let hw_addr_len = bytes.get_u8();
        let proto_addr_len = bytes.get_u8();
        let op_code = bytes.get_u16();

        let mut src_mac = MAC::default();
        bytes.copy_to_slice(&mut src_mac.0);
        let mut src_ip = IP::default();
        bytes.copy_to_slice(&mut src_ip.0);
        let mut des_mac = MAC::default();
        bytes.copy_to_slice(&mut des_mac.0);
        let mut des_ip = IP::default();
        bytes.copy_to_slice(&mut des_ip.0);

        Ok(Self {
            hw_type,
            proto_type,
            hw_addr_len,
            proto_addr_len,
            op_code,
            src_mac,
            src_ip,
            des_mac,
            des_ip,
        })
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(ARP_HDR_SIZE);
        bytes.put_u16(self.hw_type);
        bytes.put_u16(self.proto_type);
        bytes.put_u8(self.hw_addr_len);
        bytes.put_u8(self.proto_addr_len);
        bytes.put_u16(self.op_code);
        bytes.put_slice(&self.src_mac.0);
        bytes.put_slice(&self.src_ip.0);
        bytes.put_slice(&self.des_mac.0);
        bytes.put_slice(&self.des_ip.0);
        bytes
    }

    #[inline]
    pub fn op_code(&self) -> u16 {
        self.op_code
    }

    #[inline]
    pub fn src_mac(&self) -> MAC {
        self.src_mac
    }

    #[inline]
    pub fn src_ip(&self) -> IP {
        self.src_ip
    }

    #[inline]
    pub fn des_mac(&self) -> MAC {
        self.des_mac
    }

    #[inline]
    pub fn des_ip(&self) -> IP {
        self.des_ip
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ARPEntry {
    ip_addr: IP,
    mac_addr: MAC,
    oif_name: String,
}

impl ARPEntry {
    pub fn new(ip_addr: IP, mac_addr: MAC, oif_name: &str) -> Self {
        Self { ip_addr, mac_addr, oif_name: oif_name.to_string() }
    }

    #[inline]
    pub fn ip_addr(&self) -> IP {
        self.ip_addr
    }

    #[inline]
    pub fn mac_addr(&self) -> MAC {
        self.mac_addr
    }

    #[inline]
    pub fn oif_name(&self) -> &str {
        &self.oif_name
    }
}

/// Resolved IP to MAC bindings of one node, most recent first.
#[derive(Debug, Default)]
pub struct ARPTable {
    arp_entries: VecDeque<ARPEntry>,
}

impl ARPTable {
    pub fn init() -> Self {
        Self {
            arp_entries: VecDeque::new(),
        }
    }

    pub fn lookup(&self, ip: &IP) -> Option<&ARPEntry> {
        self.arp_entries.iter().find(|&entry| entry.ip_addr.eq(ip))
    }

    /// At most one entry per IP. An identical entry is left in place,
    /// a differing one is removed and the new entry goes to the head.
    pub fn add_arp_entry(&mut self, arp_entry: ARPEntry) -> InsertOutcome {
        let index = self.arp_entries.iter()
            .position(|entry| entry.ip_addr.eq(&arp_entry.ip_addr));

        let outcome = match index {
            Some(index) if self.arp_entries[index] == arp_entry => return InsertOutcome::Unchanged,
            Some(index) => {
                self.arp_entries.remove(index);
                InsertOutcome::Replaced
            }
            None => InsertOutcome::Inserted,
        };
        self.arp_entries.push_front(arp_entry);
        outcome
    }

    pub fn delete_arp_entry(&mut self, ip: &IP) -> Option<ARPEntry> {
        let index = self.arp_entries.iter().position(|entry| entry.ip_addr.eq(ip))?;
        self.arp_entries.remove(index)
    }

    pub fn clear(&mut self) {
        self.arp_entries.clear();
    }

    pub fn update_from_arp_reply(&mut self, arp_hdr: &ARPHeader, iif: &Interface) -> Result<InsertOutcome> {
        if arp_hdr.op_code != ARP_REPLY {
            return Err(Error::NotArpReply { op_code: arp_hdr.op_code });
        }
        let arp_entry = ARPEntry::new(arp_hdr.src_ip, arp_hdr.src_mac, iif.get_if_name());
        Ok(self.add_arp_entry(arp_entry))
    }

    /// Entries head first.
    pub fn entries(&self) -> impl Iterator<Item = &ARPEntry> {
        self.arp_entries.iter()
    }

    pub fn len(&self) -> usize {
        self.arp_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arp_entries.is_empty()
    }
}

impl Display for ARPTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for entry in self.arp_entries.iter() {
            writeln!(f, "IP : {}, MAC : {}, OIF = {}",
                     entry.ip_addr,
                     entry.mac_addr,
                     entry.oif_name)?;
        }
        Ok(())
    }
}

/// Resolves `ip` by broadcasting a request out of `oif`, or out of the
/// interface whose subnet contains `ip` when no interface is given.
pub fn send_arp_broadcast_request(node: &Node,
                                  oif: Option<&str>,
                                  ip: IP,
                                  transport: &mut dyn Transport) -> Result<()> {
    let interface = match oif {
        Some(if_name) => node.resolve_interface_by_name(if_name)?,
        None => match node.get_matching_subnet_interface(ip) {
            Some(interface) => interface,
            None => {
                let err = Error::NoRouteForArpTarget {
                    node: node.get_name().to_string(),
                    ip: ip.to_string(),
                };
                warn!("{}", err);
                return Err(err);
            }
        },
    };

    if interface.get_ip_address() == Some(ip) {
        return Err(Error::ArpLocalAddress {
            node: node.get_name().to_string(),
            ip: ip.to_string(),
        });
    }

    let arp_hdr = ARPHeader::request(interface.get_mac_address(),
                                     interface.get_ip_address().unwrap_or_default(),
                                     ip);
    let frame = encode_frame(MAC::BROADCAST,
                             interface.get_mac_address(),
                             ARP_MSG,
                             &arp_hdr.to_bytes())?;

    info!(node = node.get_name(), interface = interface.get_if_name(),
          "ARP broadcast request for {}", ip);
    transport.transmit(node, interface, &frame)
}

/// Answers `arp_hdr_in` out of `oif`. The reply is assembled in a scratch
/// buffer of [`MAX_PACKET_BUFFER_SIZE`] bytes and compacted before sending.
pub fn send_arp_reply_msg(node: &Node,
                          arp_hdr_in: &ARPHeader,
                          oif: &Interface,
                          transport: &mut dyn Transport) -> Result<()> {
    let arp_hdr_reply = ARPHeader::reply(oif.get_mac_address(),
                                         oif.get_ip_address().unwrap_or_default(),
                                         arp_hdr_in.src_mac,
                                         arp_hdr_in.src_ip);
    let ethernet_hdr_reply = EthernetHeader::new(arp_hdr_in.src_mac,
                                                 oif.get_mac_address(),
                                                 ARP_MSG,
                                                 &arp_hdr_reply.to_bytes());

    let mut scratch = BytesMut::zeroed(MAX_PACKET_BUFFER_SIZE);
    let total_pkt_size = ethernet_hdr_reply.write_into(&mut scratch)?;
    let pkt = compact_to_wire(scratch, MAX_PACKET_BUFFER_SIZE, total_pkt_size)?;

    info!(node = node.get_name(), interface = oif.get_if_name(),
          "ARP reply to {} ({})", arp_hdr_in.src_ip, arp_hdr_in.src_mac);
    transport.transmit(node, oif, &pkt)
}

pub fn process_arp_broadcast_request(node: &Node,
                                     iif: &Interface,
                                     arp_hdr_in: &ARPHeader,
                                     transport: &mut dyn Transport) -> Result<()> {
    debug!("ARP Broadcast msg recvd on interface {} of node {}",
           iif.get_if_name(), node.get_name());

    if iif.get_ip_address() != Some(arp_hdr_in.des_ip) {
        debug!("{} : ARP Broadcast req msg dropped, Dst IP address {} \
            did not match with interface ip : {}",
               node.get_name(),
               arp_hdr_in.des_ip,
               iif.get_ip_address().map(|ip| ip.to_string()).unwrap_or_default());
        return Ok(());
    }
    send_arp_reply_msg(node, arp_hdr_in, iif, transport)
}

/// Replies are applied whether or not a request was sent for them.
pub fn process_arp_reply_msg(node: &Node,
                             iif: &Interface,
                             arp_hdr_in: &ARPHeader) -> Result<InsertOutcome> {
    debug!("ARP reply msg recvd on interface {} of node {}",
           iif.get_if_name(), node.get_name());

    let outcome = node.node_nw_props()
        .get_arp_table()
        .update_from_arp_reply(arp_hdr_in, iif)?;
    if outcome != InsertOutcome::Unchanged {
        info!(node = node.get_name(), "ARP entry {} -> {} via {}",
              arp_hdr_in.src_ip, arp_hdr_in.src_mac, iif.get_if_name());
    }
    Ok(outcome)
}

pub(crate) fn process_arp_msg(node: &Node,
                              iif: &Interface,
                              ethernet_hdr: &EthernetHeader,
                              transport: &mut dyn Transport) -> Result<()> {
    let arp_hdr = ARPHeader::from_bytes(ethernet_hdr.payload())?;
    match arp_hdr.op_code() {
        ARP_BROAD_REQ => process_arp_broadcast_request(node, iif, &arp_hdr, transport),
        ARP_REPLY => process_arp_reply_msg(node, iif, &arp_hdr).map(|_| ()),
        op_code => {
            debug!(node = node.get_name(), "unknown ARP op code {} ignored", op_code);
            Ok(())
        }
    }
}


#[cfg(test)]
mod test {
    use crate::comm::Wire;

    use super::*;

    const B_MAC: MAC = MAC([0xbb, 0, 0, 0, 0, 0x02]);

    fn eth0_of(graph: &Graph, node: &str) -> MAC {
        graph.get_node_by_node_name(node).unwrap()
            .get_node_if_by_name("eth0").unwrap()
            .get_mac_address()
    }

    #[test]
    fn test_arp_hdr_layout() -> Result<()> {
        let arp = ARPHeader::request(MAC([1, 2, 3, 4, 5, 6]), IP([10, 0, 0, 1]), IP([10, 0, 0, 2]));
        let bytes = arp.to_bytes();
        assert_eq!(ARP_HDR_SIZE, bytes.len());
        assert_eq!(&[0, 1, 8, 0, 6, 4, 0, 1], &bytes[..8]);
        assert_eq!(&[10, 0, 0, 1], &bytes[14..18]);
        assert_eq!(&[0; 6], &bytes[18..24]);
        assert_eq!(&[10, 0, 0, 2], &bytes[24..28]);
        assert_eq!(arp, ARPHeader::from_bytes(&bytes)?);
        Ok(())
    }

    #[test]
    fn test_short_arp_is_malformed() {
        let res = ARPHeader::from_bytes(&[0u8; 27]);
        assert!(matches!(res, Err(Error::MalformedArp { len: 27 })));
    }

    #[test]
    fn test_arp_table_replace() {
        let mut table = ARPTable::init();
        let ip = IP([10, 0, 0, 2]);

        assert_eq!(InsertOutcome::Inserted, table.add_arp_entry(ARPEntry::new(ip, B_MAC, "eth0")));
        assert_eq!(InsertOutcome::Unchanged, table.add_arp_entry(ARPEntry::new(ip, B_MAC, "eth0")));
        assert_eq!(1, table.len());

        assert_eq!(InsertOutcome::Replaced, table.add_arp_entry(ARPEntry::new(ip, B_MAC, "eth1")));
        assert_eq!(InsertOutcome::Replaced, table.add_arp_entry(ARPEntry::new(ip, MAC::ZERO, "eth1")));
        assert_eq!(1, table.len());
        let entry = table.lookup(&ip).unwrap();
        assert_eq!("eth1", entry.oif_name());
        assert_eq!(MAC::ZERO, entry.mac_addr());
    }

    #[test]
    fn test_arp_table_order_delete_clear() {
        let mut table = ARPTable::init();
        table.add_arp_entry(ARPEntry::new(IP([10, 0, 0, 1]), B_MAC, "eth0"));
        table.add_arp_entry(ARPEntry::new(IP([10, 0, 0, 2]), B_MAC, "eth0"));
        table.add_arp_entry(ARPEntry::new(IP([10, 0, 0, 1]), B_MAC, "eth1"));

        let ips: Vec<IP> = table.entries().map(|e| e.ip_addr()).collect();
        assert_eq!(vec![IP([10, 0, 0, 1]), IP([10, 0, 0, 2])], ips);
        assert_eq!("IP : 10.0.0.1, MAC : bb:00:00:00:00:02, OIF = eth1\n\
                    IP : 10.0.0.2, MAC : bb:00:00:00:00:02, OIF = eth0\n",
                   table.to_string());

        assert!(table.delete_arp_entry(&IP([10, 0, 0, 9])).is_none());
        assert!(table.delete_arp_entry(&IP([10, 0, 0, 2])).is_some());
        assert_eq!(1, table.len());
        table.clear();
        assert!(table.is_empty());
    }

    fn arp_graph() -> Result<Graph> {
        let mut graph = Graph::new("arp_graph")?;
        let a = graph.add_node("A")?;
        let b = graph.add_node("B")?;
        graph.insert_link(a, b, "eth0", "eth0", 1)?;
        graph.get_node_mut(a).unwrap().set_intf_ip_address("eth0", IP([10, 0, 0, 1]), 24)?;
        graph.get_node_mut(b).unwrap().set_intf_ip_address("eth0", IP([10, 0, 0, 2]), 24)?;
        Ok(graph)
    }

    #[test]
    fn test_update_from_reply_requires_reply() -> Result<()> {
        let graph = arp_graph()?;
        let a = graph.get_node_by_node_name("A").unwrap();
        let iif = a.get_node_if_by_name("eth0").unwrap();
        let mut table = ARPTable::init();

        let request = ARPHeader::request(B_MAC, IP([10, 0, 0, 2]), IP([10, 0, 0, 1]));
        assert!(matches!(table.update_from_arp_reply(&request, iif),
                         Err(Error::NotArpReply { op_code: ARP_BROAD_REQ })));

        let reply = ARPHeader::reply(B_MAC, IP([10, 0, 0, 2]), MAC::ZERO, IP([10, 0, 0, 1]));
        assert_eq!(InsertOutcome::Inserted, table.update_from_arp_reply(&reply, iif)?);
        assert_eq!(&ARPEntry::new(IP([10, 0, 0, 2]), B_MAC, "eth0"),
                   table.lookup(&IP([10, 0, 0, 2])).unwrap());
        Ok(())
    }

    #[test]
    fn test_broadcast_request_frame() -> Result<()> {
        let graph = arp_graph()?;
        let mut wire = Wire::new(&graph);
        let a = graph.get_node_by_node_name("A").unwrap();

        send_arp_broadcast_request(a, None, IP([10, 0, 0, 2]), &mut wire)?;
        assert_eq!(1, wire.sent().len());
        let sent = &wire.sent()[0];
        assert_eq!("eth0", sent.oif);
        assert_eq!(ETH_HDR_SIZE + ARP_HDR_SIZE + ETH_FCS_SIZE, sent.frame.len());

        let hdr = decode_frame(&sent.frame)?;
        assert!(hdr.is_broadcast_mac());
        assert_eq!(ARP_MSG, hdr.get_type());
        let arp = ARPHeader::from_bytes(hdr.payload())?;
        assert_eq!(ARP_BROAD_REQ, arp.op_code());
        assert_eq!(eth0_of(&graph, "A"), arp.src_mac());
        assert_eq!(IP([10, 0, 0, 1]), arp.src_ip());
        assert_eq!(MAC::ZERO, arp.des_mac());
        assert_eq!(IP([10, 0, 0, 2]), arp.des_ip());
        Ok(())
    }

    #[test]
    fn test_broadcast_request_errors() -> Result<()> {
        let graph = arp_graph()?;
        let mut wire = Wire::new(&graph);
        let a = graph.get_node_by_node_name("A").unwrap();

        let res = send_arp_broadcast_request(a, None, IP([192, 168, 1, 1]), &mut wire);
        assert!(matches!(res, Err(Error::NoRouteForArpTarget { .. })));

        let res = send_arp_broadcast_request(a, None, IP([10, 0, 0, 1]), &mut wire);
        assert!(matches!(res, Err(Error::ArpLocalAddress { .. })));

        let res = send_arp_broadcast_request(a, Some("eth9"), IP([10, 0, 0, 2]), &mut wire);
        assert!(matches!(res, Err(Error::InterfaceNotFound { .. })));
        assert!(wire.sent().is_empty());

        // an explicit egress skips the subnet lookup
        send_arp_broadcast_request(a, Some("eth0"), IP([192, 168, 1, 1]), &mut wire)?;
        assert_eq!(1, wire.sent().len());
        Ok(())
    }

    #[test]
    fn test_request_for_other_ip_is_dropped() -> Result<()> {
        let graph = arp_graph()?;
        let mut wire = Wire::new(&graph);
        let b = graph.get_node_by_node_name("B").unwrap();
        let iif = b.get_node_if_by_name("eth0").unwrap();

        let request = ARPHeader::request(eth0_of(&graph, "A"), IP([10, 0, 0, 1]), IP([10, 0, 0, 3]));
        process_arp_broadcast_request(b, iif, &request, &mut wire)?;
        assert!(wire.sent().is_empty());
        Ok(())
    }

    #[test]
    fn test_request_is_answered() -> Result<()> {
        let graph = arp_graph()?;
        let mut wire = Wire::new(&graph);
        let b = graph.get_node_by_node_name("B").unwrap();
        let iif = b.get_node_if_by_name("eth0").unwrap();
        let a_mac = eth0_of(&graph, "A");

        let request = ARPHeader::request(a_mac, IP([10, 0, 0, 1]), IP([10, 0, 0, 2]));
        process_arp_broadcast_request(b, iif, &request, &mut wire)?;

        assert_eq!(1, wire.sent().len());
        let sent = &wire.sent()[0];
        assert_eq!(46, sent.frame.len());
        let hdr = decode_frame(&sent.frame)?;
        assert_eq!(a_mac, hdr.get_dst_mac());
        assert_eq!(iif.get_mac_address(), hdr.get_src_mac());
        let reply = ARPHeader::from_bytes(hdr.payload())?;
        assert_eq!(ARPHeader::reply(iif.get_mac_address(), IP([10, 0, 0, 2]),
                                    a_mac, IP([10, 0, 0, 1])),
                   reply);
        Ok(())
    }

    #[test]
    fn test_unsolicited_reply_is_accepted() -> Result<()> {
        let graph = arp_graph()?;
        let a = graph.get_node_by_node_name("A").unwrap();
        let iif = a.get_node_if_by_name("eth0").unwrap();

        let reply = ARPHeader::reply(B_MAC, IP([10, 0, 0, 7]), iif.get_mac_address(), IP([10, 0, 0, 1]));
        assert_eq!(InsertOutcome::Inserted, process_arp_reply_msg(a, iif, &reply)?);
        assert_eq!(InsertOutcome::Unchanged, process_arp_reply_msg(a, iif, &reply)?);
        assert_eq!(B_MAC, a.node_nw_props().arp_table().lookup(&IP([10, 0, 0, 7])).unwrap().mac_addr());
        assert_eq!("IP : 10.0.0.7, MAC : bb:00:00:00:00:02, OIF = eth0\n", dump_arp_table(a));
        Ok(())
    }
}
