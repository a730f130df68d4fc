use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::data_link_layer::{arp::ARPTable, switch::MACTable};
use crate::error::Error;

#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub struct IP(pub [u8; 4]);

#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub struct MAC(pub [u8; 6]);

impl MAC {
    pub const BROADCAST: MAC = MAC([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pub const ZERO: MAC = MAC([0; 6]);

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        is_broadcast_mac_address(self)
    }
}

impl Display for IP {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}.{}",
               self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl Display for MAC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
               self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5])
    }
}

/// Parses the canonical dotted decimal form (A.B.C.D).
impl FromStr for IP {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 4];
        let mut parts = s.split('.');
        for byte in bytes.iter_mut() {
            let part = parts.next()
                .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
            *byte = part.parse::<u8>()
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(IP(bytes))
    }
}

impl FromStr for MAC {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next()
                .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(MAC(bytes))
    }
}

/// Switching role of an interface. `UNKNOWN` means the interface takes no
/// part in learning or forwarding.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterfaceMode {
    ACCESS,
    TRUNK,
    UNKNOWN,
}

impl Display for InterfaceMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ACCESS => { write!(f, "ACCESS") }
            Self::TRUNK => { write!(f, "TRUNK") }
            Self::UNKNOWN => { write!(f, "L2_MODE_UNKNOWN") }
        }
    }
}

/// Per node network state. The tables sit behind `RefCell` so frame
/// processing can hold a shared borrow of the node and its receiving
/// interface while updating them.
pub struct NetWorkNodeProperty {
    // L2 Data link layer properties
    arp_table: RefCell<ARPTable>,
    mac_table: RefCell<MACTable>,
    // L3 network layer porperties
    is_lb_addr_config: bool,
    loopback_addr: IP,
}

impl NetWorkNodeProperty {
    pub fn init() -> NetWorkNodeProperty {
        NetWorkNodeProperty {
            arp_table: RefCell::new(ARPTable::init()),
            mac_table: RefCell::new(MACTable::init()),
            is_lb_addr_config: false,
            loopback_addr: IP([0u8; 4]),
        }
    }

    #[inline]
    pub fn get_arp_table(&self) -> RefMut<ARPTable> {
        self.arp_table.borrow_mut()
    }

    #[inline]
    pub fn arp_table(&self) -> Ref<ARPTable> {
        self.arp_table.borrow()
    }

    #[inline]
    pub fn get_mac_table(&self) -> RefMut<MACTable> {
        self.mac_table.borrow_mut()
    }

    #[inline]
    pub fn mac_table(&self) -> Ref<MACTable> {
        self.mac_table.borrow()
    }

    #[inline]
    pub fn get_loopback_address(&self) -> Option<IP> {
        self.is_lb_addr_config.then_some(self.loopback_addr)
    }

    #[inline]
    pub fn set_loopback_address(&mut self, ip: IP) {
        self.loopback_addr = ip;
        self.is_lb_addr_config = true;
    }
}

pub struct InterfaceProperty {
    // L2 Data link layer properties
    mac_addr: MAC,
    interface_mode: InterfaceMode,
    //L3 network layer properties
    is_ipaddr_config: bool,
    ip_addr: IP,
    mask: u8,
}

impl InterfaceProperty {
    pub fn init() -> InterfaceProperty {
        InterfaceProperty {
            mac_addr: MAC([0u8; 6]),
            interface_mode: InterfaceMode::UNKNOWN,
            is_ipaddr_config: false,
            ip_addr: IP([0u8; 4]),
            mask: 0,
        }
    }

    #[inline]
    pub fn get_mac(&self) -> MAC {
        self.mac_addr
    }

    #[inline]
    pub fn get_interface_mode(&self) -> InterfaceMode {
        self.interface_mode
    }

    /// The configured address, if any.
    #[inline]
    pub fn get_ip(&self) -> Option<IP> {
        self.is_ipaddr_config.then_some(self.ip_addr)
    }

    #[inline]
    pub fn get_mask(&self) -> u8 {
        self.mask
    }

    #[inline]
    pub fn is_l3_mode(&self) -> bool {
        self.is_ipaddr_config
    }

    #[inline]
    pub fn is_l2_managed(&self) -> bool {
        matches!(self.interface_mode, InterfaceMode::ACCESS | InterfaceMode::TRUNK)
    }

    /// An interface is either L3 (addressed) or L2 (switched), so
    /// configuring an address drops any switching mode.
    #[inline]
    pub fn set_interface_ip_address(&mut self, ip: IP, mask: u8) {
        self.ip_addr = ip;
        self.mask = mask;
        self.is_ipaddr_config = true;
        self.interface_mode = InterfaceMode::UNKNOWN;
    }

    #[inline]
    pub fn unset_interface_ip_address(&mut self) {
        self.ip_addr = IP::default();
        self.mask = 0;
        self.is_ipaddr_config = false;
    }

    #[inline]
    pub fn set_interface_mac_address(&mut self, mac: MAC) {
        self.mac_addr = mac;
    }

    #[inline]
    pub fn set_interface_mode(&mut self, mode: InterfaceMode) {
        if mode != InterfaceMode::UNKNOWN {
            self.unset_interface_ip_address();
        }
        self.interface_mode = mode;
    }
}

pub fn hash_code(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |value, &b| {
        value.wrapping_add(b as u64).wrapping_mul(97)
    })
}

pub fn hash_code_to_mac(value: u64) -> MAC {
    let b0: u8 = ((value >> 40) & 0xff) as u8;
    let b1: u8 = ((value >> 32) & 0xff) as u8;
    let b2: u8 = ((value >> 24) & 0xff) as u8;
    let b3: u8 = ((value >> 16) & 0xff) as u8;
    let b4: u8 = ((value >> 8) & 0xff) as u8;
    let b5: u8 = (value & 0xff) as u8;

    // keep the group bit clear so a derived address is never broadcast
    MAC([b0 & 0xfe, b1, b2, b3, b4, b5])
}

///Get ip address prefix
pub fn apply_mask(ip: IP, mask: u8) -> [u8; 4] {
    let mask = mask.min(32);
    let (n, m) = (mask as usize / 8, mask % 8);
    let mut bytes = ip.0;
    if n < bytes.len() {
        match m == 0 {
            false => bytes[n] &= !((1 << (8 - m)) - 1),
            true => bytes[n] = 0,
        }
        for byte in bytes.iter_mut().skip(n + 1) {
            *byte = 0;
        }
    }
    bytes
}

#[inline]
pub fn is_broadcast_mac_address(mac_addr: &MAC) -> bool {
    mac_addr.0.eq(&[255, 255, 255, 255, 255, 255])
}
