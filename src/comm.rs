//! Moving frames between nodes.
//!
//! The frame processing code only sees the [`Transport`] trait. Two
//! transports are provided: [`Wire`], an in-process queue that delivers frames
//! across links when [`Wire::run`] is called, and [`UdpTransport`], which gives
//! every node a UDP socket on the loopback address and carries one frame per
//! datagram.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace, warn};

use crate::config::*;
use crate::data_link_layer::layer2_frame_recv;
use crate::error::{Error, Result};
use crate::topograph::graph::{Graph, Interface, Node, NodeId};

/// Upper bound on deliveries per [`Wire::run`], so that flooding loops in a
/// cyclic L2 topology terminate.
pub const MAX_WIRE_DELIVERIES: usize = 4096;

pub trait Transport {
    /// Sends a fully encoded frame out of `oif` of `node`.
    fn transmit(&mut self, node: &Node, oif: &Interface, frame: &[u8]) -> Result<()>;
}

/// Sends `frame` out of every L2 managed interface of `node` except
/// `exempted_intf`. A failure on one interface does not stop the others.
/// Returns the number of successful sends.
pub fn send_pkt_flood_l2_intf_only(node: &Node,
                                   exempted_intf: &Interface,
                                   frame: &[u8],
                                   transport: &mut dyn Transport) -> usize {
    let mut sent = 0;
    for intf in node.interfaces() {
        if !intf.is_l2_managed() || intf.get_if_name() == exempted_intf.get_if_name() {
            continue;
        }
        match transport.transmit(node, intf, frame) {
            Ok(()) => sent += 1,
            Err(err) => warn!(node = node.get_name(), interface = intf.get_if_name(),
                              "flood: {}", err),
        }
    }
    sent
}

type Endpoint = (NodeId, String);

fn link_peers(graph: &Graph) -> HashMap<Endpoint, Endpoint> {
    let mut peers = HashMap::new();
    for link in graph.links() {
        let [a, b] = link.endpoints().clone();
        peers.insert(a.clone(), b.clone());
        peers.insert(b, a);
    }
    peers
}

fn send_failure(oif: &Interface, reason: &str) -> Error {
    Error::SendFailure {
        interface: oif.get_if_name().to_string(),
        reason: reason.to_string(),
    }
}

/// A frame handed to a transport.
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub node: NodeId,
    pub oif: String,
    pub frame: Bytes,
}

struct Delivery {
    node: NodeId,
    iif: String,
    frame: Bytes,
}

/// In-process transport. The link map is taken from the graph when the
/// wire is created.
pub struct Wire {
    peers: HashMap<Endpoint, Endpoint>,
    pending: VecDeque<Delivery>,
    sent: Vec<SentFrame>,
}

impl Wire {
    pub fn new(graph: &Graph) -> Self {
        Self {
            peers: link_peers(graph),
            pending: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Every frame transmitted so far, in order.
    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    pub fn sent_by(&self, node: NodeId) -> impl Iterator<Item = &SentFrame> {
        self.sent.iter().filter(move |s| s.node == node)
    }

    pub fn clear_history(&mut self) {
        self.sent.clear();
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queues `frame` as if it had arrived on `iif` of `node`.
    pub fn inject(&mut self, node: NodeId, iif: &str, frame: &[u8]) {
        self.pending.push_back(Delivery {
            node,
            iif: iif.to_string(),
            frame: Bytes::copy_from_slice(frame),
        });
    }

    /// Delivers queued frames until none are left or
    /// [`MAX_WIRE_DELIVERIES`] is reached. Frames that fail processing are
    /// logged and skipped. Returns the number of deliveries.
    pub fn run(&mut self, graph: &Graph) -> usize {
        let mut delivered = 0;
        while let Some(delivery) = self.pending.pop_front() {
            if delivered == MAX_WIRE_DELIVERIES {
                warn!("wire: delivery limit reached, {} frames discarded", self.pending.len() + 1);
                self.pending.clear();
                break;
            }
            delivered += 1;

            let Some(node) = graph.get_node(delivery.node) else {
                warn!("wire: no node {:?}", delivery.node);
                continue;
            };
            let Some(iif) = node.get_node_if_by_name(&delivery.iif) else {
                warn!(node = node.get_name(), "wire: no interface {}", delivery.iif);
                continue;
            };
            if let Err(err) = layer2_frame_recv(node, iif, &delivery.frame, self) {
                debug!(node = node.get_name(), interface = iif.get_if_name(), "{}", err);
            }
        }
        delivered
    }
}

impl Transport for Wire {
    fn transmit(&mut self, node: &Node, oif: &Interface, frame: &[u8]) -> Result<()> {
        let key = (node.get_id(), oif.get_if_name().to_string());
        let (peer_node, peer_if) = self.peers.get(&key)
            .cloned()
            .ok_or_else(|| send_failure(oif, "interface is not linked"))?;

        let frame = Bytes::copy_from_slice(frame);
        trace!(node = node.get_name(), interface = oif.get_if_name(), len = frame.len(), "wire: transmit");
        self.sent.push(SentFrame {
            node: node.get_id(),
            oif: key.1,
            frame: frame.clone(),
        });
        self.pending.push_back(Delivery { node: peer_node, iif: peer_if, frame });
        Ok(())
    }
}

/// Prefixes `frame` with the receiving interface name, zero padded to
/// [`IF_NAME_SIZE`] bytes.
fn encode_datagram(iif: &str, frame: &[u8]) -> BytesMut {
    let mut bytes = BytesMut::with_capacity(IF_NAME_SIZE + frame.len());
    bytes.put_slice(iif.as_bytes());
    bytes.put_bytes(0, IF_NAME_SIZE - iif.len());
    bytes.put_slice(frame);
    bytes
}

fn decode_datagram(datagram: &[u8]) -> Option<(&str, &[u8])> {
    if datagram.len() < IF_NAME_SIZE {
        return None;
    }
    let (name, frame) = datagram.split_at(IF_NAME_SIZE);
    let end = name.iter().position(|&b| b == 0).unwrap_or(IF_NAME_SIZE);
    let name = std::str::from_utf8(&name[..end]).ok()?;
    Some((name, frame))
}

struct NodeSocket {
    node: NodeId,
    socket: UdpSocket,
    addr: SocketAddr,
}

/// One non blocking UDP socket per node, bound to an ephemeral port on
/// 127.0.0.1.
pub struct UdpTransport {
    poll: Poll,
    sockets: Vec<NodeSocket>,
    peers: HashMap<Endpoint, Endpoint>,
}

impl UdpTransport {
    pub fn new(graph: &Graph) -> Result<Self> {
        let poll = Poll::new()?;
        let mut sockets = Vec::new();
        for (index, node) in graph.nodes().enumerate() {
            let mut socket = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0)))?;
            let addr = socket.local_addr()?;
            poll.registry().register(&mut socket, Token(index), Interest::READABLE)?;
            debug!(node = node.get_name(), "udp transport bound to {}", addr);
            sockets.push(NodeSocket { node: node.get_id(), socket, addr });
        }
        Ok(Self {
            poll,
            sockets,
            peers: link_peers(graph),
        })
    }

    pub fn local_addr(&self, node: NodeId) -> Option<SocketAddr> {
        self.sockets.iter().find(|s| s.node == node).map(|s| s.addr)
    }

    /// Waits up to `timeout` for datagrams and hands every received frame
    /// to the frame dispatcher. Returns the number of frames received.
    pub fn poll_once(&mut self, graph: &Graph, timeout: Option<Duration>) -> Result<usize> {
        let mut events = Events::with_capacity(64);
        self.poll.poll(&mut events, timeout)?;
        let ready: Vec<usize> = events.iter().map(|event| event.token().0).collect();

        let mut received = 0;
        let mut buf = [0u8; IF_NAME_SIZE + MAX_PACKET_BUFFER_SIZE];
        for index in ready {
            let Some(node_id) = self.sockets.get(index).map(|s| s.node) else {
                continue;
            };
            loop {
                let len = match self.sockets[index].socket.recv(&mut buf) {
                    Ok(len) => len,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err.into()),
                };
                received += 1;
                self.deliver(graph, node_id, &buf[..len]);
            }
        }
        Ok(received)
    }

    fn deliver(&mut self, graph: &Graph, node_id: NodeId, datagram: &[u8]) {
        let Some(node) = graph.get_node(node_id) else {
            return;
        };
        let Some((if_name, frame)) = decode_datagram(datagram) else {
            warn!(node = node.get_name(), "udp: short datagram of {} bytes", datagram.len());
            return;
        };
        let Some(iif) = node.get_node_if_by_name(if_name) else {
            warn!(node = node.get_name(), "udp: no interface {}", if_name);
            return;
        };
        if let Err(err) = layer2_frame_recv(node, iif, frame, self) {
            debug!(node = node.get_name(), interface = if_name, "{}", err);
        }
    }
}

impl Transport for UdpTransport {
    fn transmit(&mut self, node: &Node, oif: &Interface, frame: &[u8]) -> Result<()> {
        let key = (node.get_id(), oif.get_if_name().to_string());
        let (peer_node, peer_if) = self.peers.get(&key)
            .ok_or_else(|| send_failure(oif, "interface is not linked"))?;
        let peer_addr = self.local_addr(*peer_node)
            .ok_or_else(|| send_failure(oif, "peer node has no socket"))?;
        let from = self.sockets.iter()
            .find(|s| s.node == node.get_id())
            .ok_or_else(|| send_failure(oif, "node has no socket"))?;

        let datagram = encode_datagram(peer_if, frame);
        let sent = from.socket.send_to(&datagram, peer_addr)
            .map_err(|err| send_failure(oif, &err.to_string()))?;
        if sent != datagram.len() {
            return Err(send_failure(oif, "short write"));
        }
        Ok(())
    }
}
