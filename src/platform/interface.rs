use std::net::Ipv4Addr;

use pnet::util::MacAddr;

use crate::error::Result;
use crate::iface::types::{
    AddressAssignment, BridgeAddress, BridgeMember, IfData, InterfaceFlags, MediaInfo, PowerSave,
    RateLimit, TunnelEndpoints, VlanConfig,
};

/// 与操作系统网络子系统之间的控制通道
///
/// 每个方法对应一次请求/应答。失败时返回 `IfshError::Kernel`,
/// 其中保留内核给出的原始错误。通道在 drop 时释放底层 socket。
#[cfg_attr(test, mockall::automock)]
pub trait ControlChannel {
    /// Names of every live interface.
    fn interface_names(&self) -> Result<Vec<String>>;

    fn flags(&self, name: &str) -> Result<InterfaceFlags>;
    fn set_flags(&self, name: &str, flags: InterfaceFlags) -> Result<()>;

    fn set_mtu(&self, name: &str, mtu: u32) -> Result<()>;

    fn metric(&self, name: &str) -> Result<u32>;
    fn set_metric(&self, name: &str, metric: u32) -> Result<()>;

    fn vlan(&self, name: &str) -> Result<VlanConfig>;
    fn set_vlan(&self, name: &str, vlan: &VlanConfig) -> Result<()>;

    fn nwid(&self, name: &str) -> Result<Vec<u8>>;
    fn set_nwid(&self, name: &str, nwid: &[u8]) -> Result<()>;
    fn nwkey(&self, name: &str) -> Result<Option<String>>;

    fn powersave(&self, name: &str) -> Result<PowerSave>;
    fn set_powersave(&self, name: &str, power: PowerSave) -> Result<()>;

    /// IPv4 addresses, primary first.
    fn addresses(&self, name: &str) -> Result<Vec<AddressAssignment>>;
    /// Delete `address`, or the primary address when `None`.
    fn delete_address(&self, name: &str, address: Option<Ipv4Addr>) -> Result<()>;
    /// Add an address, updating it in place if it is already present.
    fn add_address(&self, name: &str, assignment: &AddressAssignment) -> Result<()>;

    fn if_data(&self, name: &str) -> Result<IfData>;
    fn link_address(&self, name: &str) -> Result<Option<MacAddr>>;
    fn tunnel_endpoints(&self, name: &str) -> Result<Option<TunnelEndpoints>>;
    fn token_bucket(&self, name: &str) -> Result<Option<RateLimit>>;

    fn is_bridge(&self, name: &str) -> Result<bool>;
    fn bridge_members(&self, name: &str) -> Result<Vec<BridgeMember>>;
    fn bridge_addresses(&self, name: &str) -> Result<Vec<BridgeAddress>>;

    fn media(&self, name: &str) -> Result<Option<MediaInfo>>;
}

/// Opens a fresh control channel per command.
pub trait ControlPlatform: Send + Sync {
    fn open(&self) -> Result<Box<dyn ControlChannel>>;
}
