//! 接口数据模型
//!
//! 每条命令都从内核重新读取这些结构, 用完即丢, 不做缓存。

use bitflags::bitflags;
use ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use crate::error::{IfshError, Result};

bitflags! {
    /// Interface flag bits. The low 16 bits follow the kernel's
    /// `ifr_flags` layout; the link-mode bits sit above it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InterfaceFlags: u32 {
        const UP = 0x1;
        const BROADCAST = 0x2;
        const DEBUG = 0x4;
        const LOOPBACK = 0x8;
        const POINTOPOINT = 0x10;
        const NOTRAILERS = 0x20;
        const RUNNING = 0x40;
        const NOARP = 0x80;
        const PROMISC = 0x100;
        const ALLMULTI = 0x200;
        const MASTER = 0x400;
        const SLAVE = 0x800;
        const MULTICAST = 0x1000;
        const PORTSEL = 0x2000;
        const AUTOMEDIA = 0x4000;
        const DYNAMIC = 0x8000;
        const LINK0 = 0x10_0000;
        const LINK1 = 0x20_0000;
        const LINK2 = 0x40_0000;
    }
}

impl InterfaceFlags {
    pub const LINK_MODES: InterfaceFlags = InterfaceFlags::LINK0
        .union(InterfaceFlags::LINK1)
        .union(InterfaceFlags::LINK2);

    /// `1043<UP,BROADCAST,RUNNING,MULTICAST>`
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        format!("{:x}<{}>", self.bits(), names.join(","))
    }
}

/// IANA ifType code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IfType(pub u8);

impl IfType {
    pub const OTHER: IfType = IfType(0x01);
    pub const X25DDN: IfType = IfType(0x04);
    pub const ETHER: IfType = IfType(0x06);
    pub const ISO88025: IfType = IfType(0x09);
    pub const ISDNBASIC: IfType = IfType(0x14);
    pub const ISDNPRIMARY: IfType = IfType(0x15);
    pub const PPP: IfType = IfType(0x17);
    pub const LOOP: IfType = IfType(0x18);
    pub const EON: IfType = IfType(0x19);
    pub const NSIP: IfType = IfType(0x1b);
    pub const SLIP: IfType = IfType(0x1c);
    pub const ARCNET: IfType = IfType(0x23);
    pub const ATM: IfType = IfType(0x25);
    pub const V35: IfType = IfType(0x2d);
    pub const HSSI: IfType = IfType(0x2e);
    pub const PROPVIRTUAL: IfType = IfType(0x35);
    pub const IEEE80211: IfType = IfType(0x47);
    pub const ISDNS: IfType = IfType(0x4b);
    pub const ISDNU: IfType = IfType(0x4c);
    pub const ATMLOGICAL: IfType = IfType(0x50);
    pub const ATMDXI: IfType = IfType(0x69);
    pub const HDLC: IfType = IfType(0x76);
    pub const TUNNEL: IfType = IfType(0x83);
    pub const COFFEE: IfType = IfType(0x84);
    pub const L2VLAN: IfType = IfType(0x87);
    pub const ATMVIRTUAL: IfType = IfType(0x95);
    pub const BRIDGE: IfType = IfType(0xd1);
    pub const GIF: IfType = IfType(0xf0);
    pub const FAITH: IfType = IfType(0xf3);
    pub const ENC: IfType = IfType(0xf4);
    pub const PFLOG: IfType = IfType(0xf5);

    /// 类型码到可读名称的映射, 未知类型返回 "Unknown"
    pub fn label(self) -> &'static str {
        match self {
            IfType::PFLOG => "Packet Filter Logging",
            IfType::ENC => "IPsec Loopback",
            IfType::GIF => "Generic Tunnel",
            IfType::FAITH => "IPv6-IPv4 TCP relay",
            IfType::BRIDGE => "Ethernet Bridge",
            IfType::ISO88025 => "Token Ring",
            IfType::EON => "ISO over IP",
            IfType::NSIP => "XNS over IP",
            IfType::X25DDN => "X.25 to IMP",
            IfType::ATMDXI => "ATM Data Exchange Interface",
            IfType::ATMLOGICAL => "ATM Logical",
            IfType::ATMVIRTUAL => "ATM Virtual",
            IfType::ATM => "ATM",
            IfType::ETHER => "Ethernet",
            IfType::ARCNET => "ARCNET",
            IfType::HDLC => "HDLC",
            IfType::L2VLAN => "IEEE 802.1Q",
            IfType::PROPVIRTUAL => "Virtual",
            IfType::PPP => "PPP",
            IfType::SLIP => "SLIP",
            IfType::LOOP => "Loopback",
            IfType::ISDNS => "ISDN S",
            IfType::ISDNU => "ISDN U",
            IfType::ISDNBASIC => "ISDN BRI",
            IfType::ISDNPRIMARY => "ISDN PRI",
            IfType::V35 => "V.35",
            IfType::HSSI => "HSSI",
            IfType::TUNNEL => "Network Tunnel",
            IfType::COFFEE => "Coffee Pot",
            IfType::IEEE80211 => "IEEE 802.11",
            IfType::OTHER => "Unspecified",
            _ => "Unknown",
        }
    }

    /// Only these types bump the collision counter.
    pub fn reports_collisions(self) -> bool {
        matches!(
            self,
            IfType::ETHER | IfType::SLIP | IfType::PROPVIRTUAL | IfType::IEEE80211
        )
    }

    pub fn is_tunnel(self) -> bool {
        matches!(self, IfType::TUNNEL | IfType::GIF)
    }

    /// Types whose link-layer address is worth showing.
    pub fn has_ether_address(self) -> bool {
        matches!(self, IfType::ETHER | IfType::IEEE80211)
    }

    /// MTU restored by `no mtu`.
    pub fn default_mtu(self) -> u32 {
        match self {
            IfType::ETHER | IfType::IEEE80211 | IfType::L2VLAN | IfType::BRIDGE => 1500,
            IfType::PROPVIRTUAL | IfType::PPP => 1500,
            IfType::LOOP => 32768,
            IfType::SLIP => 296,
            IfType::GIF => 1280,
            IfType::TUNNEL => 1476,
            _ => DEFAULT_MTU,
        }
    }
}

impl fmt::Display for IfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fallback MTU for link types without a better default.
pub const DEFAULT_MTU: u32 = 576;

/// Smallest Ethernet payload; an average below it means the byte counter wrapped.
pub const ETHERMIN: u64 = 46;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub ipackets: u64,
    pub ibytes: u64,
    pub ierrors: u64,
    pub iqdrops: u64,
    pub opackets: u64,
    pub obytes: u64,
    pub oerrors: u64,
    pub oqdrops: u64,
    pub collisions: u64,
}

impl Counters {
    pub fn avg_input_size(&self) -> Option<u64> {
        average_size(self.ibytes, self.ipackets)
    }

    pub fn avg_output_size(&self) -> Option<u64> {
        average_size(self.obytes, self.opackets)
    }
}

fn average_size(bytes: u64, packets: u64) -> Option<u64> {
    if bytes == 0 || packets == 0 {
        return None;
    }
    let avg = bytes / packets;
    (avg >= ETHERMIN).then_some(avg)
}

/// 接口数据块, 对应一次统计查询的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IfData {
    pub if_type: IfType,
    pub mtu: u32,
    pub metric: u32,
    /// 标称线速, bit/s
    pub baudrate: u64,
    /// 最近一次状态变化; 内核记录为 0 时视为未知, 报告中省略
    pub last_change: Option<SystemTime>,
    pub counters: Counters,
}

/// Largest tag that fits the 12-bit VLAN field (4095 is reserved).
pub const MAX_VLAN_TAG: u16 = 4094;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlanConfig {
    pub tag: u16,
    pub parent: String,
}

impl VlanConfig {
    pub fn new(tag: u16, parent: impl Into<String>) -> Self {
        Self {
            tag,
            parent: parent.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.tag != 0 || !self.parent.is_empty()
    }

    pub fn parse_tag(arg: &str) -> Result<u16> {
        arg.parse::<u16>()
            .ok()
            .filter(|tag| *tag <= MAX_VLAN_TAG)
            .ok_or_else(|| IfshError::Validation(format!("Invalid vlan tag {}", arg)))
    }
}

/// Second address given with `ip`/`alias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Destination(Ipv4Addr),
    Broadcast(Ipv4Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressAssignment {
    pub network: Ipv4Network,
    pub peer: Option<Peer>,
}

impl AddressAssignment {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self> {
        let network = Ipv4Network::new(address, prefix)
            .map_err(|_| IfshError::Validation(format!("Invalid prefix length {}", prefix)))?;
        Ok(Self {
            network,
            peer: None,
        })
    }

    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn address(&self) -> Ipv4Addr {
        self.network.ip()
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    pub fn network_address(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        match self.peer {
            Some(Peer::Broadcast(bcast)) => bcast,
            _ => self.network.broadcast(),
        }
    }
}

impl fmt::Display for AddressAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.prefix())
    }
}

/// Token bucket regulator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// bit/s
    pub rate: u64,
    /// bytes
    pub bucket: u64,
}

pub const DEFAULT_POWERSAVE_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSave {
    pub enabled: bool,
    pub timeout_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelEndpoints {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StpState {
    Disabled,
    Listening,
    Learning,
    Forwarding,
    Blocking,
}

impl StpState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StpState::Disabled),
            1 => Some(StpState::Listening),
            2 => Some(StpState::Learning),
            3 => Some(StpState::Forwarding),
            4 => Some(StpState::Blocking),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StpState::Disabled => "disabled",
            StpState::Listening => "listening",
            StpState::Learning => "learning",
            StpState::Forwarding => "forwarding",
            StpState::Blocking => "blocking",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeMember {
    pub name: String,
    pub state: StpState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeAddress {
    pub mac: MacAddr,
    pub member: String,
    pub age: Duration,
    pub local: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaInfo {
    /// e.g. `1000baseT full-duplex`
    pub current: Option<String>,
    pub autoselect: bool,
    pub supported: Vec<String>,
}
