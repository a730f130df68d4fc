use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use tracing::{debug, trace};

use crate::comm::send_pkt_flood_l2_intf_only;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MACTableEntry {
    mac_addr: MAC,
    oif_name: String,
}

impl MACTableEntry {
    pub fn new(mac_addr: MAC, oif_name: &str) -> Self {
        Self { mac_addr, oif_name: oif_name.to_string() }
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

/// Learned MAC to egress interface bindings of one node, most recent first.
#[derive(Debug, Default)]
pub struct MACTable {
    mac_entries: VecDeque<MACTableEntry>,
}


impl MACTable {
    pub fn init() -> Self {
        Self { mac_entries: VecDeque::new() }
    }

    pub fn lookup(&self, mac: &MAC) -> Option<&MACTableEntry> {
        self.mac_entries.iter().find(|&entry| entry.mac_addr.eq(mac))
    }

    pub fn add(&mut self, new_entry: MACTableEntry) -> InsertOutcome {
        let index = self.mac_entries.iter()
            .position(|entry| entry.mac_addr.eq(&new_entry.mac_addr));

        let outcome = match index {
            Some(index) if self.mac_entries[index] == new_entry => return InsertOutcome::Unchanged,
            Some(index) => {
                self.mac_entries.remove(index);
                InsertOutcome::Replaced
            }
            None => InsertOutcome::Inserted,
        };
        self.mac_entries.push_front(new_entry);
        outcome
    }

    pub fn delete(&mut self, mac: &MAC) -> Option<MACTableEntry> {
        let index = self.mac_entries.iter()
            .position(|entry| entry.mac_addr.eq(mac))?;
        self.mac_entries.remove(index)
    }

    pub fn clear(&mut self) {
        self.mac_entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &MACTableEntry> {
        self.mac_entries.iter()
    }

    pub fn len(&self) -> usize {
        self.mac_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mac_entries.is_empty()
    }
}

impl Display for MACTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for entry in &self.mac_entries {
            writeln!(f, "MAC : {} | Interface : {}", entry.mac_addr, entry.oif_name)?;
        }
        Ok(())
    }
}

/// What the switch did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L2ForwardAction {
    /// Sent out of the single learned egress interface.
    Forward { oif: String },
    /// Broadcast or unknown unicast, sent out of `sent` interfaces.
    Flood { sent: usize },
    /// The learned egress interface no longer exists on the node.
    Drop,
}

pub fn switch_perform_mac_learning(node: &Node,
                                   src_mac: MAC,
                                   if_name: &str) -> InsertOutcome {
    let new_entry = MACTableEntry::new(src_mac, if_name);
    let outcome = node.node_nw_props().get_mac_table().add(new_entry);
    if outcome != InsertOutcome::Unchanged {
        debug!(node = node.get_name(), "learned {} on {}", src_mac, if_name);
    }
    outcome
}

pub fn switch_forward_frame(node: &Node,
                            ethernet_hdr: &EthernetHeader,
                            pkt: &[u8],
                            recv_intf: &Interface,
                            transport: &mut dyn Transport) -> Result<L2ForwardAction> {
    if ethernet_hdr.is_broadcast_mac() {
        let sent = send_pkt_flood_l2_intf_only(node, recv_intf, pkt, transport);
        return Ok(L2ForwardAction::Flood { sent });
    }

    let oif_name = node.node_nw_props()
        .mac_table()
        .lookup(&ethernet_hdr.get_dst_mac())
        .map(|entry| entry.oif_name.clone());

    match oif_name {
        None => {
            trace!(node = node.get_name(), "unknown unicast {}, flooding", ethernet_hdr.get_dst_mac());
            let sent = send_pkt_flood_l2_intf_only(node, recv_intf, pkt, transport);
            Ok(L2ForwardAction::Flood { sent })
        }
        Some(oif_name) => match node.get_node_if_by_name(&oif_name) {
            None => Ok(L2ForwardAction::Drop),
            Some(oif) => {
                transport.transmit(node, oif, pkt)?;
                Ok(L2ForwardAction::Forward { oif: oif_name })
            }
        },
    }
}

/// Learns the source address on `interface`, then forwards or floods.
pub fn switch_recv_frame(node: &Node,
                         interface: &Interface,
                         ethernet_hdr: &EthernetHeader,
                         pkt: &[u8],
                         transport: &mut dyn Transport) -> Result<L2ForwardAction> {
    switch_perform_mac_learning(node, ethernet_hdr.get_src_mac(), interface.get_if_name());
    switch_forward_frame(node, ethernet_hdr, pkt, interface, transport)
}


#[cfg(test)]
mod test {
    use crate::comm::Wire;

    use super::*;

    const H1: MAC = MAC([0x02, 0, 0, 0, 0, 0x01]);
    const H2: MAC = MAC([0x02, 0, 0, 0, 0, 0x02]);

    #[test]
    fn test_mac_table_replace() {
        let mut table = MACTable::init();
        assert_eq!(InsertOutcome::Inserted, table.add(MACTableEntry::new(H1, "eth0")));
        assert_eq!(InsertOutcome::Unchanged, table.add(MACTableEntry::new(H1, "eth0")));
        assert_eq!(1, table.len());

        for oif in ["eth1", "eth2", "eth1"] {
            assert_eq!(InsertOutcome::Replaced, table.add(MACTableEntry::new(H1, oif)));
        }
        assert_eq!(1, table.len());
        assert_eq!("eth1", table.lookup(&H1).unwrap().oif_name());
    }

    #[test]
    fn test_mac_table_dump_is_most_recent_first() {
        let mut table = MACTable::init();
        table.add(MACTableEntry::new(H1, "eth0"));
        table.add(MACTableEntry::new(H2, "eth1"));
        assert_eq!("MAC : 02:00:00:00:00:02 | Interface : eth1\n\
                    MAC : 02:00:00:00:00:01 | Interface : eth0\n",
                   table.to_string());

        table.add(MACTableEntry::new(H1, "eth3"));
        let order: Vec<MAC> = table.entries().map(|e| e.mac_addr()).collect();
        assert_eq!(vec![H1, H2], order);

        assert!(table.delete(&MAC::BROADCAST).is_none());
        assert_eq!(Some(MACTableEntry::new(H2, "eth1")), table.delete(&H2));
        table.clear();
        assert!(table.is_empty());
    }

    /// A switch with three access ports, each linked to a host.
    fn switch_graph() -> Result<Graph> {
        let mut graph = Graph::new("switch_graph")?;
        let sw = graph.add_node("SW")?;
        for (i, host) in ["H1", "H2", "H3"].iter().enumerate() {
            let id = graph.add_node(host)?;
            graph.insert_link(id, sw, "eth0", &format!("eth{}", i), 1)?;
        }
        graph.get_node_mut(sw).unwrap().set_interfaces_mode(InterfaceMode::ACCESS);
        Ok(graph)
    }

    fn frame(dst: MAC, src: MAC) -> BytesMut {
        encode_frame(dst, src, ETH_IP, &[1, 2, 3]).unwrap()
    }

    fn sent_oifs(wire: &Wire) -> Vec<&str> {
        let mut oifs: Vec<&str> = wire.sent().iter().map(|s| s.oif.as_str()).collect();
        oifs.sort();
        oifs
    }

    #[test]
    fn test_flood_excludes_ingress() -> Result<()> {
        let graph = switch_graph()?;
        let mut wire = Wire::new(&graph);
        let sw = graph.get_node_by_node_name("SW").unwrap();
        let eth0 = sw.get_node_if_by_name("eth0").unwrap();

        let pkt = frame(MAC::BROADCAST, H1);
        let hdr = decode_frame(&pkt)?;
        let action = switch_recv_frame(sw, eth0, &hdr, &pkt, &mut wire)?;
        assert_eq!(L2ForwardAction::Flood { sent: 2 }, action);
        assert_eq!(vec!["eth1", "eth2"], sent_oifs(&wire));
        assert!(wire.sent().iter().all(|s| s.frame[..] == pkt[..]));
        Ok(())
    }

    #[test]
    fn test_learning_then_unicast_forward() -> Result<()> {
        let graph = switch_graph()?;
        let mut wire = Wire::new(&graph);
        let sw = graph.get_node_by_node_name("SW").unwrap();
        let eth0 = sw.get_node_if_by_name("eth0").unwrap();
        let eth1 = sw.get_node_if_by_name("eth1").unwrap();

        // unknown unicast floods, and still teaches the switch where H1 is
        let pkt = frame(H2, H1);
        let action = switch_recv_frame(sw, eth0, &decode_frame(&pkt)?, &pkt, &mut wire)?;
        assert_eq!(L2ForwardAction::Flood { sent: 2 }, action);
        assert_eq!("eth0", sw.node_nw_props().mac_table().lookup(&H1).unwrap().oif_name());

        wire.clear_history();
        let pkt = frame(H1, H2);
        let action = switch_recv_frame(sw, eth1, &decode_frame(&pkt)?, &pkt, &mut wire)?;
        assert_eq!(L2ForwardAction::Forward { oif: "eth0".to_string() }, action);
        assert_eq!(vec!["eth0"], sent_oifs(&wire));
        assert_eq!(2, sw.node_nw_props().mac_table().len());
        Ok(())
    }

    #[test]
    fn test_stale_egress_is_dropped() -> Result<()> {
        let graph = switch_graph()?;
        let mut wire = Wire::new(&graph);
        let sw = graph.get_node_by_node_name("SW").unwrap();
        let eth0 = sw.get_node_if_by_name("eth0").unwrap();
        sw.node_nw_props().get_mac_table().add(MACTableEntry::new(H2, "eth7"));

        let pkt = frame(H2, H1);
        let action = switch_recv_frame(sw, eth0, &decode_frame(&pkt)?, &pkt, &mut wire)?;
        assert_eq!(L2ForwardAction::Drop, action);
        assert!(wire.sent().is_empty());
        Ok(())
    }

    #[test]
    fn test_flood_skips_non_l2_interfaces() -> Result<()> {
        let mut graph = switch_graph()?;
        let sw_id = graph.get_node_by_node_name("SW").unwrap().get_id();
        graph.get_node_mut(sw_id)
            .unwrap()
            .set_intf_ip_address("eth2", IP([10, 0, 0, 1]), 24)?;
        let mut wire = Wire::new(&graph);
        let sw = graph.get_node_by_node_name("SW").unwrap();
        let eth0 = sw.get_node_if_by_name("eth0").unwrap();

        let pkt = frame(MAC::BROADCAST, H1);
        let action = switch_recv_frame(sw, eth0, &decode_frame(&pkt)?, &pkt, &mut wire)?;
        assert_eq!(L2ForwardAction::Flood { sent: 1 }, action);
        assert_eq!(vec!["eth1"], sent_oifs(&wire));
        Ok(())
    }
}
