use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    IOError(#[from] std::io::Error),

    #[error("malformed ethernet frame: {len} bytes")]
    MalformedFrame { len: usize },

    #[error("malformed arp packet: {len} bytes")]
    MalformedArp { len: usize },

    #[error("payload of {len} bytes exceeds frame capacity")]
    PayloadTooLarge { len: usize },

    #[error("{node} : no eligible subnet for ARP resolution for Ip-address : {ip}")]
    NoRouteForArpTarget { node: String, ip: String },

    #[error("{node} : attempt to resolve ARP for local Ip-address : {ip}")]
    ArpLocalAddress { node: String, ip: String },

    #[error("arp table can only be updated from a reply, got op code {op_code}")]
    NotArpReply { op_code: u16 },

    #[error("send failure on interface {interface}: {reason}")]
    SendFailure { interface: String, reason: String },

    #[error("L2 frame rejected on interface {interface} of node {node}")]
    FrameRejected { node: String, interface: String },

    #[error("interface {name} not found on node {node}")]
    InterfaceNotFound { node: String, name: String },

    #[error("node {name} not found")]
    NodeNotFound { name: String },

    #[error("no interface slot available on node {node}")]
    NoInterfaceSlot { node: String },

    #[error("name {name} is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },

    #[error("interface {name} of node {node} is already linked")]
    InterfaceAlreadyLinked { node: String, name: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("cannot compact {total} bytes out of a {capacity} byte buffer")]
    Compaction { total: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
