//! In-memory kernel used by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;
use pnet::util::MacAddr;

use super::interface::{ControlChannel, ControlPlatform};
use crate::error::{IfshError, Result};
use crate::iface::types::{
    AddressAssignment, BridgeAddress, BridgeMember, IfData, IfType, InterfaceFlags, MediaInfo,
    PowerSave, RateLimit, TunnelEndpoints, VlanConfig, DEFAULT_POWERSAVE_MS,
};

#[derive(Debug, Clone)]
pub struct SimWireless {
    pub nwid: Vec<u8>,
    pub nwkey: Option<String>,
    pub power: PowerSave,
}

#[derive(Debug, Clone)]
pub struct SimInterface {
    pub flags: InterfaceFlags,
    pub metric: u32,
    /// `None` when the driver has no VLAN support
    pub vlan: Option<VlanConfig>,
    pub wireless: Option<SimWireless>,
    pub addresses: Vec<AddressAssignment>,
    pub data: IfData,
    pub lladdr: Option<MacAddr>,
    pub tunnel: Option<TunnelEndpoints>,
    pub tbr: Option<RateLimit>,
    pub bridge: bool,
    pub members: Vec<BridgeMember>,
    pub fdb: Vec<BridgeAddress>,
    pub media: Option<MediaInfo>,
}

impl SimInterface {
    pub fn new(if_type: IfType) -> Self {
        Self {
            flags: InterfaceFlags::UP | InterfaceFlags::RUNNING,
            metric: 0,
            vlan: None,
            wireless: None,
            addresses: Vec::new(),
            data: IfData {
                if_type,
                mtu: if_type.default_mtu(),
                ..Default::default()
            },
            lladdr: None,
            tunnel: None,
            tbr: None,
            bridge: false,
            members: Vec::new(),
            fdb: Vec::new(),
            media: None,
        }
    }

    pub fn ethernet() -> Self {
        let mut iface = Self::new(IfType::ETHER);
        iface.flags |= InterfaceFlags::BROADCAST | InterfaceFlags::MULTICAST;
        iface.lladdr = Some(MacAddr::new(0x00, 0x0c, 0x29, 0x01, 0x02, 0x03));
        iface
    }

    pub fn vlan() -> Self {
        let mut iface = Self::new(IfType::L2VLAN);
        iface.flags |= InterfaceFlags::BROADCAST;
        iface.vlan = Some(VlanConfig::default());
        iface
    }

    pub fn bridge() -> Self {
        let mut iface = Self::new(IfType::BRIDGE);
        iface.bridge = true;
        iface
    }

    pub fn wireless() -> Self {
        let mut iface = Self::new(IfType::IEEE80211);
        iface.flags |= InterfaceFlags::BROADCAST;
        iface.wireless = Some(SimWireless {
            nwid: Vec::new(),
            nwkey: None,
            power: PowerSave {
                enabled: false,
                timeout_ms: DEFAULT_POWERSAVE_MS,
            },
        });
        iface
    }
}

#[derive(Default)]
struct SimState {
    interfaces: BTreeMap<String, SimInterface>,
    /// one-shot failures keyed by request name
    failures: HashMap<&'static str, i32>,
    open_channels: usize,
    requests: Vec<String>,
}

impl SimState {
    fn check(&mut self, op: &'static str) -> Result<()> {
        self.requests.push(op.to_string());
        match self.failures.remove(op) {
            Some(errno) => Err(os_error(op, errno)),
            None => Ok(()),
        }
    }

    fn iface(&mut self, op: &'static str, name: &str) -> Result<&mut SimInterface> {
        self.check(op)?;
        self.interfaces
            .get_mut(name)
            .ok_or_else(|| os_error(op, libc::ENXIO))
    }
}

fn os_error(op: &'static str, errno: i32) -> IfshError {
    IfshError::kernel(op, io::Error::from_raw_os_error(errno))
}

#[derive(Clone, Default)]
pub struct SimKernel {
    state: Arc<Mutex<SimState>>,
}

impl SimKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(self, name: &str, iface: SimInterface) -> Self {
        self.state.lock().interfaces.insert(name.to_string(), iface);
        self
    }

    pub fn fail(&self, op: &'static str, errno: i32) {
        self.state.lock().failures.insert(op, errno);
    }

    pub fn interface(&self, name: &str) -> SimInterface {
        self.state.lock().interfaces[name].clone()
    }

    pub fn open_channels(&self) -> usize {
        self.state.lock().open_channels
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn channel(&self) -> SimChannel {
        self.state.lock().open_channels += 1;
        SimChannel {
            state: self.state.clone(),
        }
    }
}

impl ControlPlatform for SimKernel {
    fn open(&self) -> Result<Box<dyn ControlChannel>> {
        Ok(Box::new(self.channel()))
    }
}

pub struct SimChannel {
    state: Arc<Mutex<SimState>>,
}

impl Drop for SimChannel {
    fn drop(&mut self) {
        self.state.lock().open_channels -= 1;
    }
}

impl ControlChannel for SimChannel {
    fn interface_names(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.check("if_nameindex")?;
        Ok(state.interfaces.keys().cloned().collect())
    }

    fn flags(&self, name: &str) -> Result<InterfaceFlags> {
        Ok(self.state.lock().iface("SIOCGIFFLAGS", name)?.flags)
    }

    fn set_flags(&self, name: &str, flags: InterfaceFlags) -> Result<()> {
        self.state.lock().iface("SIOCSIFFLAGS", name)?.flags = flags;
        Ok(())
    }

    fn set_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCSIFMTU", name)?;
        if !(68..=65535).contains(&mtu) {
            return Err(os_error("SIOCSIFMTU", libc::EINVAL));
        }
        iface.data.mtu = mtu;
        Ok(())
    }

    fn metric(&self, name: &str) -> Result<u32> {
        Ok(self.state.lock().iface("SIOCGIFMETRIC", name)?.metric)
    }

    fn set_metric(&self, name: &str, metric: u32) -> Result<()> {
        self.state.lock().iface("SIOCSIFMETRIC", name)?.metric = metric;
        Ok(())
    }

    fn vlan(&self, name: &str) -> Result<VlanConfig> {
        self.state
            .lock()
            .iface("SIOCGETVLAN", name)?
            .vlan
            .clone()
            .ok_or_else(|| os_error("SIOCGETVLAN", libc::EINVAL))
    }

    fn set_vlan(&self, name: &str, vlan: &VlanConfig) -> Result<()> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCSETVLAN", name)?;
        let current = iface
            .vlan
            .as_mut()
            .ok_or_else(|| os_error("SIOCSETVLAN", libc::EINVAL))?;
        if !current.parent.is_empty() && !vlan.parent.is_empty() && *current != *vlan {
            return Err(os_error("SIOCSETVLAN", libc::EBUSY));
        }
        *current = vlan.clone();
        Ok(())
    }

    fn nwid(&self, name: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCG80211NWID", name)?;
        iface
            .wireless
            .as_ref()
            .map(|w| w.nwid.clone())
            .ok_or_else(|| os_error("SIOCG80211NWID", libc::ENOTTY))
    }

    fn set_nwid(&self, name: &str, nwid: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCS80211NWID", name)?;
        let wireless = iface
            .wireless
            .as_mut()
            .ok_or_else(|| os_error("SIOCS80211NWID", libc::ENOTTY))?;
        wireless.nwid = nwid.to_vec();
        Ok(())
    }

    fn nwkey(&self, name: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCG80211NWKEY", name)?;
        Ok(iface.wireless.as_ref().and_then(|w| w.nwkey.clone()))
    }

    fn powersave(&self, name: &str) -> Result<PowerSave> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCG80211POWER", name)?;
        iface
            .wireless
            .as_ref()
            .map(|w| w.power)
            .ok_or_else(|| os_error("SIOCG80211POWER", libc::ENOTTY))
    }

    fn set_powersave(&self, name: &str, power: PowerSave) -> Result<()> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCS80211POWER", name)?;
        let wireless = iface
            .wireless
            .as_mut()
            .ok_or_else(|| os_error("SIOCS80211POWER", libc::ENOTTY))?;
        wireless.power = power;
        Ok(())
    }

    fn addresses(&self, name: &str) -> Result<Vec<AddressAssignment>> {
        Ok(self.state.lock().iface("SIOCGIFADDR", name)?.addresses.clone())
    }

    fn delete_address(&self, name: &str, address: Option<Ipv4Addr>) -> Result<()> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCDIFADDR", name)?;
        let position = match address {
            Some(addr) => iface.addresses.iter().position(|a| a.address() == addr),
            None if iface.addresses.is_empty() => None,
            None => Some(0),
        };
        match position {
            Some(i) => {
                iface.addresses.remove(i);
                Ok(())
            }
            None => Err(os_error("SIOCDIFADDR", libc::EADDRNOTAVAIL)),
        }
    }

    fn add_address(&self, name: &str, assignment: &AddressAssignment) -> Result<()> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCAIFADDR", name)?;
        match iface
            .addresses
            .iter_mut()
            .find(|a| a.address() == assignment.address())
        {
            Some(existing) => *existing = *assignment,
            None => iface.addresses.push(*assignment),
        }
        Ok(())
    }

    fn if_data(&self, name: &str) -> Result<IfData> {
        let mut state = self.state.lock();
        let iface = state.iface("SIOCGIFDATA", name)?;
        let mut data = iface.data.clone();
        data.metric = iface.metric;
        Ok(data)
    }

    fn link_address(&self, name: &str) -> Result<Option<MacAddr>> {
        Ok(self.state.lock().iface("getifaddrs", name)?.lladdr)
    }

    fn tunnel_endpoints(&self, name: &str) -> Result<Option<TunnelEndpoints>> {
        Ok(self.state.lock().iface("SIOCGIFPSRCADDR", name)?.tunnel)
    }

    fn token_bucket(&self, name: &str) -> Result<Option<RateLimit>> {
        Ok(self.state.lock().iface("ALTQTBRGET", name)?.tbr)
    }

    fn is_bridge(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.check("SIOCBRDGRTS")?;
        Ok(state.interfaces.get(name).map(|i| i.bridge).unwrap_or(false))
    }

    fn bridge_members(&self, name: &str) -> Result<Vec<BridgeMember>> {
        Ok(self.state.lock().iface("SIOCBRDGIFS", name)?.members.clone())
    }

    fn bridge_addresses(&self, name: &str) -> Result<Vec<BridgeAddress>> {
        Ok(self.state.lock().iface("SIOCBRDGRTS", name)?.fdb.clone())
    }

    fn media(&self, name: &str) -> Result<Option<MediaInfo>> {
        Ok(self.state.lock().iface("SIOCGIFMEDIA", name)?.media.clone())
    }
}
