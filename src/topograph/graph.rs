use tracing::debug;

use crate::config::*;
use crate::error::{Error, Result};
use crate::topograph::net_util::*;

/// Handle of a node inside its owning [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Handle of a link inside its owning [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(usize);

pub struct Interface {
    if_name: String,
    att_node: NodeId,
    link: Option<LinkId>,
    intf_nw_props: InterfaceProperty,
}

impl Interface {
    fn new(if_name: &str, att_node: NodeId, link: LinkId, mac: MAC) -> Self {
        let mut intf_nw_props = InterfaceProperty::init();
        intf_nw_props.set_interface_mac_address(mac);
        Self {
            if_name: if_name.to_string(),
            att_node,
            link: Some(link),
            intf_nw_props,
        }
    }

    #[inline]
    pub fn get_if_name(&self) -> &str {
        &self.if_name
    }

    #[inline]
    pub fn get_att_node(&self) -> NodeId {
        self.att_node
    }

    #[inline]
    pub fn get_link(&self) -> Option<LinkId> {
        self.link
    }

    #[inline]
    pub fn get_mac_address(&self) -> MAC {
        self.intf_nw_props.get_mac()
    }

    #[inline]
    pub fn get_ip_address(&self) -> Option<IP> {
        self.intf_nw_props.get_ip()
    }

    #[inline]
    pub fn get_mask(&self) -> u8 {
        self.intf_nw_props.get_mask()
    }

    #[inline]
    pub fn l2_mode(&self) -> InterfaceMode {
        self.intf_nw_props.get_interface_mode()
    }

    #[inline]
    pub fn is_l3_mode(&self) -> bool {
        self.intf_nw_props.is_l3_mode()
    }

    #[inline]
    pub fn is_l2_managed(&self) -> bool {
        self.intf_nw_props.is_l2_managed()
    }
}

/// An undirected link. The link names its two endpoints by node handle and
/// interface name; the interfaces themselves live in their nodes.
pub struct Link {
    endpoints: [(NodeId, String); 2],
    cost: u32,
}

impl Link {
    #[inline]
    pub fn get_cost(&self) -> u32 {
        self.cost
    }

    #[inline]
    pub fn endpoints(&self) -> &[(NodeId, String); 2] {
        &self.endpoints
    }

    /// The endpoint opposite to `(node, if_name)`, if that pair is one of
    /// this link's endpoints.
    pub fn other_end(&self, node: NodeId, if_name: &str) -> Option<(NodeId, &str)> {
        let [a, b] = &self.endpoints;
        if a.0 == node && a.1 == if_name {
            Some((b.0, b.1.as_str()))
        } else if b.0 == node && b.1 == if_name {
            Some((a.0, a.1.as_str()))
        } else {
            None
        }
    }
}

pub struct Node {
    id: NodeId,
    node_name: String,
    interfaces: Vec<Interface>,
    node_nw_props: NetWorkNodeProperty,
}

impl Node {
    fn new(id: NodeId, node_name: &str) -> Self {
        Self {
            id,
            node_name: node_name.to_string(),
            interfaces: Vec::with_capacity(MAX_INTF_PER_NODE),
            node_nw_props: NetWorkNodeProperty::init(),
        }
    }

    #[inline]
    pub fn get_id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn get_name(&self) -> &str {
        &self.node_name
    }

    #[inline]
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    #[inline]
    pub fn node_nw_props(&self) -> &NetWorkNodeProperty {
        &self.node_nw_props
    }

    #[inline]
    pub fn get_node_intf_available_slot(&self) -> Option<usize> {
        let used = self.interfaces.len();
        (used < MAX_INTF_PER_NODE).then_some(used)
    }

    #[inline]
    pub fn get_node_if_by_name(&self, if_name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|intf| intf.if_name == if_name)
    }

    fn get_node_if_by_name_mut(&mut self, if_name: &str) -> Result<&mut Interface> {
        let node = self.node_name.clone();
        self.interfaces.iter_mut()
            .find(|intf| intf.if_name == if_name)
            .ok_or(Error::InterfaceNotFound { node, name: if_name.to_string() })
    }

    pub fn resolve_interface_by_name(&self, if_name: &str) -> Result<&Interface> {
        self.get_node_if_by_name(if_name)
            .ok_or_else(|| Error::InterfaceNotFound {
                node: self.node_name.clone(),
                name: if_name.to_string(),
            })
    }

    /// The first addressed interface whose subnet contains `ip`.
    pub fn get_matching_subnet_interface(&self, ip: IP) -> Option<&Interface> {
        self.interfaces.iter().find(|intf| {
            match intf.get_ip_address() {
                Some(if_ip) => {
                    let mask = intf.get_mask();
                    apply_mask(if_ip, mask) == apply_mask(ip, mask)
                }
                None => false,
            }
        })
    }

    #[inline]
    pub fn resolve_subnet_interface(&self, ip: IP) -> Option<&Interface> {
        self.get_matching_subnet_interface(ip)
    }

    #[inline]
    pub fn set_loopback_address(&mut self, ip: IP) {
        self.node_nw_props.set_loopback_address(ip);
    }

    #[inline]
    pub fn get_loopback_address(&self) -> Option<IP> {
        self.node_nw_props.get_loopback_address()
    }

    pub fn set_intf_ip_address(&mut self, if_name: &str, ip: IP, mask: u8) -> Result<()> {
        if mask > 32 {
            return Err(Error::InvalidAddress(format!("{}/{}", ip, mask)));
        }
        let intf = self.get_node_if_by_name_mut(if_name)?;
        intf.intf_nw_props.set_interface_ip_address(ip, mask);
        debug!(node = %self.node_name, interface = if_name, "ip address set to {}/{}", ip, mask);
        Ok(())
    }

    pub fn unset_intf_ip_address(&mut self, if_name: &str) -> Result<()> {
        self.get_node_if_by_name_mut(if_name)?
            .intf_nw_props
            .unset_interface_ip_address();
        Ok(())
    }

    pub fn set_intf_mac_address(&mut self, if_name: &str, mac: MAC) -> Result<()> {
        self.get_node_if_by_name_mut(if_name)?
            .intf_nw_props
            .set_interface_mac_address(mac);
        Ok(())
    }

    pub fn set_intf_l2_mode(&mut self, if_name: &str, mode: InterfaceMode) -> Result<()> {
        self.get_node_if_by_name_mut(if_name)?
            .intf_nw_props
            .set_interface_mode(mode);
        debug!(node = %self.node_name, interface = if_name, "l2 mode set to {}", mode);
        Ok(())
    }

    pub fn set_interfaces_mode(&mut self, mode: InterfaceMode) {
        for intf in self.interfaces.iter_mut() {
            intf.intf_nw_props.set_interface_mode(mode);
        }
    }
}

pub struct Graph {
    topology_name: String,
    nodes: Vec<Node>,
    links: Vec<Link>,
}

fn check_name(name: &str, max: usize) -> Result<()> {
    if name.is_empty() || name.len() > max {
        return Err(Error::NameTooLong { name: name.to_string(), max });
    }
    Ok(())
}

impl Graph {
    pub fn new(topology_name: &str) -> Result<Self> {
        check_name(topology_name, TOPOLOGY_NAME_SIZE)?;
        Ok(Self {
            topology_name: topology_name.to_string(),
            nodes: Vec::new(),
            links: Vec::new(),
        })
    }

    #[inline]
    pub fn get_name(&self) -> &str {
        &self.topology_name
    }

    pub fn add_node(&mut self, node_name: &str) -> Result<NodeId> {
        check_name(node_name, NODE_NAME_SIZE)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, node_name));
        Ok(id)
    }

    #[inline]
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    #[inline]
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn get_node_by_node_name(&self, node_name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.node_name == node_name)
    }

    #[inline]
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    #[inline]
    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    #[inline]
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    fn node_ref(&self, id: NodeId) -> Result<&Node> {
        self.get_node(id)
            .ok_or_else(|| Error::NodeNotFound { name: format!("{:?}", id) })
    }

    fn check_free_interface(&self, id: NodeId, if_name: &str) -> Result<()> {
        let node = self.node_ref(id)?;
        check_name(if_name, IF_NAME_SIZE)?;
        if node.get_node_if_by_name(if_name).is_some() {
            return Err(Error::InterfaceAlreadyLinked {
                node: node.node_name.clone(),
                name: if_name.to_string(),
            });
        }
        if node.get_node_intf_available_slot().is_none() {
            return Err(Error::NoInterfaceSlot { node: node.node_name.clone() });
        }
        Ok(())
    }

    /// Connects `node1.from_if_name` to `node2.to_if_name`. Both interfaces
    /// are created here and get a MAC derived from node and interface name.
    pub fn insert_link(&mut self,
                       node1: NodeId,
                       node2: NodeId,
                       from_if_name: &str,
                       to_if_name: &str,
                       cost: u32) -> Result<LinkId> {
        self.check_free_interface(node1, from_if_name)?;
        self.check_free_interface(node2, to_if_name)?;
        if node1 == node2 {
            // a self link takes two slots of the same node
            let node = self.node_ref(node1)?;
            if from_if_name == to_if_name {
                return Err(Error::InterfaceAlreadyLinked {
                    node: node.node_name.clone(),
                    name: to_if_name.to_string(),
                });
            }
            if MAX_INTF_PER_NODE - node.interfaces.len() < 2 {
                return Err(Error::NoInterfaceSlot { node: node.node_name.clone() });
            }
        }

        let link = LinkId(self.links.len());
        self.links.push(Link {
            endpoints: [(node1, from_if_name.to_string()), (node2, to_if_name.to_string())],
            cost,
        });

        for (id, if_name) in [(node1, from_if_name), (node2, to_if_name)] {
            let node = &mut self.nodes[id.0];
            let seed = [node.node_name.as_bytes(), if_name.as_bytes()].concat();
            let mac = hash_code_to_mac(hash_code(&seed));
            node.interfaces.push(Interface::new(if_name, id, link, mac));
        }
        Ok(link)
    }

    /// The node and interface name at the other end of `interface`'s link.
    pub fn get_nbr(&self, interface: &Interface) -> Option<(NodeId, &str)> {
        self.get_link(interface.get_link()?)?
            .other_end(interface.get_att_node(), interface.get_if_name())
    }

    pub fn get_nbr_node(&self, interface: &Interface) -> Option<&Node> {
        let (nbr, _) = self.get_nbr(interface)?;
        self.get_node(nbr)
    }
}
