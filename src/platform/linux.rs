use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, RawFd};

use ipnetwork::IpNetwork;
use log::debug;
use parking_lot::Mutex;
use pnet::datalink;
use pnet::util::MacAddr;
use socket2::{Domain, Socket, Type};

use super::interface::{ControlChannel, ControlPlatform};
use super::netlink::NetlinkSocket;
use super::sysfs;
use crate::error::{IfshError, Result};
use crate::iface::types::{
    AddressAssignment, BridgeAddress, BridgeMember, IfData, InterfaceFlags, MediaInfo, PowerSave,
    RateLimit, TunnelEndpoints, VlanConfig,
};

const SIOCGIFFLAGS: libc::c_ulong = 0x8913;
const SIOCSIFFLAGS: libc::c_ulong = 0x8914;
const SIOCGIFMETRIC: libc::c_ulong = 0x891d;
const SIOCSIFMETRIC: libc::c_ulong = 0x891e;
const SIOCSIFMTU: libc::c_ulong = 0x8922;
const SIOCETHTOOL: libc::c_ulong = 0x8946;
const SIOCGIFVLAN: libc::c_ulong = 0x8982;
const SIOCGETTUNNEL: libc::c_ulong = 0x89f0;
const SIOCSIWESSID: libc::c_ulong = 0x8b1a;
const SIOCGIWESSID: libc::c_ulong = 0x8b1b;
const SIOCGIWENCODE: libc::c_ulong = 0x8b2b;
const SIOCSIWPOWER: libc::c_ulong = 0x8b2c;
const SIOCGIWPOWER: libc::c_ulong = 0x8b2d;

const GET_VLAN_REALDEV_NAME_CMD: libc::c_int = 8;
const GET_VLAN_VID_CMD: libc::c_int = 9;

const ETHTOOL_GSET: u32 = 0x1;

const IW_ESSID_MAX_SIZE: usize = 32;
const IW_ENCODING_TOKEN_MAX: usize = 64;
const IW_ENCODE_DISABLED: u16 = 0x8000;
const IW_POWER_TIMEOUT: u16 = 0x2000;

#[repr(C)]
#[derive(Clone, Copy)]
union IfrIfru {
    flags: libc::c_short,
    value: libc::c_int,
    data: *mut libc::c_void,
    _pad: [u8; 24],
}

#[repr(C)]
struct IfReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    ifru: IfrIfru,
}

impl IfReq {
    fn new(name: &str) -> io::Result<Self> {
        let mut req: IfReq = unsafe { mem::zeroed() };
        copy_ifname(&mut req.name, name)?;
        Ok(req)
    }
}

#[repr(C)]
union VlanArgsU {
    device2: [libc::c_char; 24],
    vid: libc::c_int,
}

#[repr(C)]
struct VlanIoctlArgs {
    cmd: libc::c_int,
    device1: [libc::c_char; 24],
    u: VlanArgsU,
    vlan_qos: libc::c_short,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct IwPoint {
    pointer: *mut libc::c_void,
    length: u16,
    flags: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct IwParam {
    value: i32,
    fixed: u8,
    disabled: u8,
    flags: u16,
}

#[repr(C)]
union IwReqData {
    point: IwPoint,
    param: IwParam,
    _pad: [u8; 16],
}

#[repr(C)]
struct IwReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    u: IwReqData,
}

impl IwReq {
    fn new(name: &str) -> io::Result<Self> {
        let mut req: IwReq = unsafe { mem::zeroed() };
        copy_ifname(&mut req.name, name)?;
        Ok(req)
    }
}

#[repr(C)]
#[derive(Default)]
struct EthtoolCmd {
    cmd: u32,
    supported: u32,
    advertising: u32,
    speed: u16,
    duplex: u8,
    port: u8,
    phy_address: u8,
    transceiver: u8,
    autoneg: u8,
    mdio_support: u8,
    maxtxpkt: u32,
    maxrxpkt: u32,
    speed_hi: u16,
    eth_tp_mdix: u8,
    eth_tp_mdix_ctrl: u8,
    lp_advertising: u32,
    reserved: [u32; 2],
}

/// struct ip_tunnel_parm, with the IPv4 header split around the endpoints
#[repr(C)]
struct IpTunnelParm {
    name: [libc::c_char; libc::IFNAMSIZ],
    link: libc::c_int,
    i_flags: u16,
    o_flags: u16,
    i_key: u32,
    o_key: u32,
    iph_head: [u8; 12],
    saddr: u32,
    daddr: u32,
}

fn copy_ifname(dest: &mut [libc::c_char], name: &str) -> io::Result<()> {
    let bytes = name.as_bytes();
    if bytes.len() >= dest.len() || bytes.contains(&0) {
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }
    for (d, s) in dest.iter_mut().zip(bytes) {
        *d = *s as libc::c_char;
    }
    Ok(())
}

fn c_name(raw: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn ioctl<T>(fd: RawFd, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(fd, request as _, arg as *mut T as *mut libc::c_void) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

pub struct LinuxPlatform;

impl LinuxPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl ControlPlatform for LinuxPlatform {
    fn open(&self) -> Result<Box<dyn ControlChannel>> {
        Ok(Box::new(LinuxChannel::open()?))
    }
}

/// ioctl socket plus a lazily opened rtnetlink socket, both closed on drop.
pub struct LinuxChannel {
    socket: Socket,
    netlink: Mutex<Option<NetlinkSocket>>,
}

impl LinuxChannel {
    pub fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)
            .map_err(|e| IfshError::kernel("socket", e))?;
        Ok(Self {
            socket,
            netlink: Mutex::new(None),
        })
    }

    fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    fn ifreq(&self, op: &'static str, request: libc::c_ulong, req: &mut IfReq) -> Result<()> {
        ioctl(self.fd(), request, req).map_err(|e| IfshError::kernel(op, e))
    }

    fn iwreq(&self, op: &'static str, request: libc::c_ulong, req: &mut IwReq) -> Result<()> {
        ioctl(self.fd(), request, req).map_err(|e| IfshError::kernel(op, e))
    }

    fn interface(&self, name: &str) -> Option<datalink::NetworkInterface> {
        datalink::interfaces().into_iter().find(|iface| iface.name == name)
    }

    fn with_netlink<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut NetlinkSocket) -> io::Result<T>,
    ) -> Result<T> {
        let mut guard = self.netlink.lock();
        if guard.is_none() {
            *guard = Some(NetlinkSocket::open().map_err(|e| IfshError::kernel("netlink", e))?);
        }
        match guard.as_mut() {
            Some(sock) => f(sock).map_err(|e| IfshError::kernel(op, e)),
            None => Err(IfshError::kernel(op, io::Error::from_raw_os_error(libc::EBADF))),
        }
    }

    fn index(&self, op: &'static str, name: &str) -> Result<u32> {
        let cname = std::ffi::CString::new(name)
            .map_err(|_| IfshError::kernel(op, io::Error::from_raw_os_error(libc::EINVAL)))?;
        let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
        if index == 0 {
            Err(IfshError::kernel(op, io::Error::last_os_error()))
        } else {
            Ok(index)
        }
    }

    fn vlan_request(&self, name: &str, cmd: libc::c_int) -> Result<VlanIoctlArgs> {
        let mut args: VlanIoctlArgs = unsafe { mem::zeroed() };
        args.cmd = cmd;
        copy_ifname(&mut args.device1, name).map_err(|e| IfshError::kernel("SIOCGIFVLAN", e))?;
        ioctl(self.fd(), SIOCGIFVLAN, &mut args).map_err(|e| IfshError::kernel("SIOCGIFVLAN", e))?;
        Ok(args)
    }
}

fn not_supported(op: &'static str) -> IfshError {
    IfshError::kernel(op, io::Error::from_raw_os_error(libc::EOPNOTSUPP))
}

impl ControlChannel for LinuxChannel {
    fn interface_names(&self) -> Result<Vec<String>> {
        Ok(datalink::interfaces()
            .into_iter()
            .map(|iface| iface.name)
            .collect())
    }

    fn flags(&self, name: &str) -> Result<InterfaceFlags> {
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCGIFFLAGS", e))?;
        self.ifreq("SIOCGIFFLAGS", SIOCGIFFLAGS, &mut req)?;
        let raw = unsafe { req.ifru.flags } as u16 as u32;
        Ok(InterfaceFlags::from_bits_retain(raw))
    }

    fn set_flags(&self, name: &str, flags: InterfaceFlags) -> Result<()> {
        // Linux has no link-mode bits
        if flags.intersects(InterfaceFlags::LINK_MODES) {
            return Err(not_supported("SIOCSIFFLAGS"));
        }
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCSIFFLAGS", e))?;
        req.ifru.flags = (flags.bits() & 0xffff) as u16 as libc::c_short;
        debug!("{}: SIOCSIFFLAGS {:#x}", name, flags.bits());
        self.ifreq("SIOCSIFFLAGS", SIOCSIFFLAGS, &mut req)
    }

    fn set_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCSIFMTU", e))?;
        req.ifru.value = mtu as libc::c_int;
        self.ifreq("SIOCSIFMTU", SIOCSIFMTU, &mut req)
    }

    fn metric(&self, name: &str) -> Result<u32> {
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCGIFMETRIC", e))?;
        self.ifreq("SIOCGIFMETRIC", SIOCGIFMETRIC, &mut req)?;
        Ok(unsafe { req.ifru.value } as u32)
    }

    fn set_metric(&self, name: &str, metric: u32) -> Result<()> {
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCSIFMETRIC", e))?;
        req.ifru.value = metric as libc::c_int;
        self.ifreq("SIOCSIFMETRIC", SIOCSIFMETRIC, &mut req)
    }

    fn vlan(&self, name: &str) -> Result<VlanConfig> {
        let vid = self.vlan_request(name, GET_VLAN_VID_CMD)?;
        let parent = self.vlan_request(name, GET_VLAN_REALDEV_NAME_CMD)?;
        let tag = unsafe { vid.u.vid } as u16;
        let parent = c_name(unsafe { &parent.u.device2 });
        Ok(VlanConfig::new(tag, parent))
    }

    fn set_vlan(&self, _name: &str, _vlan: &VlanConfig) -> Result<()> {
        // 8021q devices are bound to their parent at creation time
        Err(not_supported("SIOCSIFVLAN"))
    }

    fn nwid(&self, name: &str) -> Result<Vec<u8>> {
        let mut buf = [0u8; IW_ESSID_MAX_SIZE + 1];
        let mut req = IwReq::new(name).map_err(|e| IfshError::kernel("SIOCGIWESSID", e))?;
        req.u.point = IwPoint {
            pointer: buf.as_mut_ptr() as *mut libc::c_void,
            length: buf.len() as u16,
            flags: 0,
        };
        self.iwreq("SIOCGIWESSID", SIOCGIWESSID, &mut req)?;
        let len = (unsafe { req.u.point.length } as usize).min(IW_ESSID_MAX_SIZE);
        let essid = buf[..len].iter().copied().take_while(|&b| b != 0).collect();
        Ok(essid)
    }

    fn set_nwid(&self, name: &str, nwid: &[u8]) -> Result<()> {
        let mut buf = [0u8; IW_ESSID_MAX_SIZE + 1];
        let len = nwid.len().min(IW_ESSID_MAX_SIZE);
        buf[..len].copy_from_slice(&nwid[..len]);
        let mut req = IwReq::new(name).map_err(|e| IfshError::kernel("SIOCSIWESSID", e))?;
        req.u.point = IwPoint {
            pointer: buf.as_mut_ptr() as *mut libc::c_void,
            length: len as u16,
            flags: u16::from(len > 0),
        };
        self.iwreq("SIOCSIWESSID", SIOCSIWESSID, &mut req)
    }

    fn nwkey(&self, name: &str) -> Result<Option<String>> {
        let mut buf = [0u8; IW_ENCODING_TOKEN_MAX];
        let mut req = IwReq::new(name).map_err(|e| IfshError::kernel("SIOCGIWENCODE", e))?;
        req.u.point = IwPoint {
            pointer: buf.as_mut_ptr() as *mut libc::c_void,
            length: buf.len() as u16,
            flags: 0,
        };
        self.iwreq("SIOCGIWENCODE", SIOCGIWENCODE, &mut req)?;
        let point = unsafe { req.u.point };
        if point.flags & IW_ENCODE_DISABLED != 0 {
            return Ok(None);
        }
        let len = (point.length as usize).min(IW_ENCODING_TOKEN_MAX);
        if len == 0 {
            return Ok(Some("<hidden>".to_string()));
        }
        let hex: String = buf[..len].iter().map(|b| format!("{:02x}", b)).collect();
        Ok(Some(format!("0x{}", hex)))
    }

    fn powersave(&self, name: &str) -> Result<PowerSave> {
        let mut req = IwReq::new(name).map_err(|e| IfshError::kernel("SIOCGIWPOWER", e))?;
        self.iwreq("SIOCGIWPOWER", SIOCGIWPOWER, &mut req)?;
        let param = unsafe { req.u.param };
        let timeout_ms = if param.flags & IW_POWER_TIMEOUT != 0 {
            (param.value.max(0) / 1000) as u32
        } else {
            0
        };
        Ok(PowerSave {
            enabled: param.disabled == 0,
            timeout_ms,
        })
    }

    fn set_powersave(&self, name: &str, power: PowerSave) -> Result<()> {
        let mut req = IwReq::new(name).map_err(|e| IfshError::kernel("SIOCSIWPOWER", e))?;
        req.u.param = IwParam {
            value: power.timeout_ms.saturating_mul(1000).min(i32::MAX as u32) as i32,
            fixed: 0,
            disabled: u8::from(!power.enabled),
            flags: if power.enabled { IW_POWER_TIMEOUT } else { 0 },
        };
        self.iwreq("SIOCSIWPOWER", SIOCSIWPOWER, &mut req)
    }

    fn addresses(&self, name: &str) -> Result<Vec<AddressAssignment>> {
        let iface = self
            .interface(name)
            .ok_or_else(|| IfshError::kernel("getifaddrs", io::Error::from_raw_os_error(libc::ENXIO)))?;
        Ok(iface
            .ips
            .iter()
            .filter_map(|ip| match ip {
                IpNetwork::V4(net) => Some(AddressAssignment {
                    network: *net,
                    peer: None,
                }),
                IpNetwork::V6(_) => None,
            })
            .collect())
    }

    fn delete_address(&self, name: &str, address: Option<Ipv4Addr>) -> Result<()> {
        let current = self.addresses(name)?;
        let target = match address {
            Some(addr) => current.into_iter().find(|a| a.address() == addr),
            None => current.into_iter().next(),
        };
        let target = target.ok_or_else(|| {
            IfshError::kernel("RTM_DELADDR", io::Error::from_raw_os_error(libc::EADDRNOTAVAIL))
        })?;
        let index = self.index("RTM_DELADDR", name)?;
        debug!("{}: RTM_DELADDR {}", name, target);
        self.with_netlink("RTM_DELADDR", |nl| nl.delete_address(index, &target))
    }

    fn add_address(&self, name: &str, assignment: &AddressAssignment) -> Result<()> {
        let index = self.index("RTM_NEWADDR", name)?;
        debug!("{}: RTM_NEWADDR {}", name, assignment);
        self.with_netlink("RTM_NEWADDR", |nl| nl.add_address(index, assignment))
    }

    fn if_data(&self, name: &str) -> Result<IfData> {
        let mut data = sysfs::if_data(name).map_err(|e| IfshError::kernel("statistics", e))?;
        if let Ok(metric) = self.metric(name) {
            data.metric = metric;
        }
        Ok(data)
    }

    fn link_address(&self, name: &str) -> Result<Option<MacAddr>> {
        Ok(self.interface(name).and_then(|iface| iface.mac))
    }

    fn tunnel_endpoints(&self, name: &str) -> Result<Option<TunnelEndpoints>> {
        let mut parm: IpTunnelParm = unsafe { mem::zeroed() };
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCGETTUNNEL", e))?;
        req.ifru.data = &mut parm as *mut IpTunnelParm as *mut libc::c_void;
        self.ifreq("SIOCGETTUNNEL", SIOCGETTUNNEL, &mut req)?;
        // addresses are stored in network byte order
        let source = Ipv4Addr::from(parm.saddr.to_ne_bytes());
        let destination = Ipv4Addr::from(parm.daddr.to_ne_bytes());
        if source.is_unspecified() && destination.is_unspecified() {
            return Ok(None);
        }
        Ok(Some(TunnelEndpoints {
            source,
            destination,
        }))
    }

    fn token_bucket(&self, _name: &str) -> Result<Option<RateLimit>> {
        Ok(None)
    }

    fn is_bridge(&self, name: &str) -> Result<bool> {
        Ok(sysfs::is_bridge(name))
    }

    fn bridge_members(&self, name: &str) -> Result<Vec<BridgeMember>> {
        sysfs::bridge_members(name).map_err(|e| IfshError::kernel("brif", e))
    }

    fn bridge_addresses(&self, name: &str) -> Result<Vec<BridgeAddress>> {
        sysfs::bridge_addresses(name).map_err(|e| IfshError::kernel("brforward", e))
    }

    fn media(&self, name: &str) -> Result<Option<MediaInfo>> {
        let mut cmd = EthtoolCmd {
            cmd: ETHTOOL_GSET,
            ..Default::default()
        };
        let mut req = IfReq::new(name).map_err(|e| IfshError::kernel("SIOCETHTOOL", e))?;
        req.ifru.data = &mut cmd as *mut EthtoolCmd as *mut libc::c_void;
        self.ifreq("SIOCETHTOOL", SIOCETHTOOL, &mut req)?;
        Ok(Some(media_from_ethtool(&cmd)))
    }
}

const SUPPORTED_MEDIA: &[(u32, &str)] = &[
    (1 << 0, "10baseT half-duplex"),
    (1 << 1, "10baseT full-duplex"),
    (1 << 2, "100baseTX half-duplex"),
    (1 << 3, "100baseTX full-duplex"),
    (1 << 4, "1000baseT half-duplex"),
    (1 << 5, "1000baseT full-duplex"),
    (1 << 6, "autoselect"),
    (1 << 12, "10GbaseT full-duplex"),
    (1 << 15, "2500baseX full-duplex"),
];

fn media_subtype(speed: u32) -> String {
    match speed {
        10 => "10baseT".to_string(),
        100 => "100baseTX".to_string(),
        1000 => "1000baseT".to_string(),
        2500 => "2500baseX".to_string(),
        10000 => "10GbaseT".to_string(),
        other => format!("{}Mbps", other),
    }
}

fn media_from_ethtool(cmd: &EthtoolCmd) -> MediaInfo {
    let speed = (u32::from(cmd.speed_hi) << 16) | u32::from(cmd.speed);
    let current = if speed == 0 || speed == u32::MAX || cmd.speed == u16::MAX {
        None
    } else {
        let duplex = match cmd.duplex {
            0 => " half-duplex",
            1 => " full-duplex",
            _ => "",
        };
        Some(format!("{}{}", media_subtype(speed), duplex))
    };
    let supported = SUPPORTED_MEDIA
        .iter()
        .filter(|(bit, _)| cmd.supported & bit != 0)
        .map(|(_, label)| label.to_string())
        .collect();
    MediaInfo {
        current,
        autoselect: cmd.autoneg != 0,
        supported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_layouts() {
        assert_eq!(mem::size_of::<EthtoolCmd>(), 44);
        assert_eq!(mem::size_of::<IpTunnelParm>(), 52);
        assert_eq!(mem::size_of::<IfReq>(), 40);
        assert_eq!(mem::size_of::<IwReq>(), 32);
    }

    #[test]
    fn test_copy_ifname_bounds() {
        let mut name = [0 as libc::c_char; libc::IFNAMSIZ];
        assert!(copy_ifname(&mut name, "eth0").is_ok());
        assert_eq!(c_name(&name), "eth0");
        assert!(copy_ifname(&mut name, "a-very-long-ifname").is_err());
    }

    #[test]
    fn test_media_from_ethtool() {
        let cmd = EthtoolCmd {
            supported: (1 << 3) | (1 << 5) | (1 << 6),
            speed: 1000,
            duplex: 1,
            autoneg: 1,
            ..Default::default()
        };
        let media = media_from_ethtool(&cmd);
        assert_eq!(media.current.as_deref(), Some("1000baseT full-duplex"));
        assert!(media.autoselect);
        assert_eq!(
            media.supported,
            vec!["100baseTX full-duplex", "1000baseT full-duplex", "autoselect"]
        );

        let unknown = EthtoolCmd {
            speed: u16::MAX,
            speed_hi: u16::MAX,
            ..Default::default()
        };
        assert_eq!(media_from_ethtool(&unknown).current, None);
    }
}
