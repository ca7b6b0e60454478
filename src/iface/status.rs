//! 接口状态报告
//!
//! 依次查询内核的多个独立数据源, 汇总成一份报告后再统一输出。
//! 可选数据源 (介质, 隧道, 令牌桶, vlan, 网桥, 无线) 查询失败时只是不显示对应行。

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use pnet::util::MacAddr;

use super::resolver;
use super::types::{
    AddressAssignment, BridgeAddress, BridgeMember, IfData, InterfaceFlags, MediaInfo, RateLimit,
    TunnelEndpoints, VlanConfig,
};
use super::InterfaceHandle;
use crate::context::Context;
use crate::error::Result;
use crate::platform::ControlPlatform;

const SECS_PER_MIN: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MIN;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Bucket sizes from here on are shown in Kbytes.
const BUCKET_KBYTES_THRESHOLD: u64 = 10240;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WirelessStatus {
    pub nwid: String,
    pub nwkey: Option<String>,
    /// timeout in ms, present only while power saving is enabled
    pub powersave_ms: Option<u32>,
}

/// Everything one report shows, gathered before anything is printed.
#[derive(Debug, Clone)]
pub struct InterfaceStatus {
    pub name: String,
    pub bridge: bool,
    pub flags: InterfaceFlags,
    pub data: IfData,
    pub lladdr: Option<MacAddr>,
    pub media: Option<MediaInfo>,
    pub address: Option<AddressAssignment>,
    pub tunnel: Option<TunnelEndpoints>,
    pub rate_limit: Option<RateLimit>,
    pub vlan: Option<VlanConfig>,
    pub members: Vec<BridgeMember>,
    pub learned: Vec<BridgeAddress>,
    pub wireless: Option<WirelessStatus>,
}

/// `[Nd ]HH:MM:SS`
pub fn format_elapsed(secs: u64) -> String {
    let days = secs / SECS_PER_DAY;
    let rem = secs % SECS_PER_DAY;
    let clock = format!(
        "{:02}:{:02}:{:02}",
        rem / SECS_PER_HOUR,
        (rem % SECS_PER_HOUR) / SECS_PER_MIN,
        rem % SECS_PER_MIN
    );
    if days > 0 {
        format!("{}d {}", days, clock)
    } else {
        clock
    }
}

fn is_whole_mbps(rate: u64) -> bool {
    rate % 1_000_000 == 0
}

/// Nominal line rate, e.g. `100 Mbps` or `1544 Kbps`.
pub fn format_line_rate(baudrate: u64) -> String {
    if is_whole_mbps(baudrate) {
        format!("{} Mbps", baudrate / 1_000_000)
    } else {
        format!("{} Kbps", baudrate / 1000)
    }
}

pub fn format_token_rate(rate: u64) -> String {
    if is_whole_mbps(rate) {
        format!("{:.2} Mbps", rate as f64 / 1_000_000.0)
    } else {
        format!("{:.2} Kbps", rate as f64 / 1000.0)
    }
}

pub fn format_bucket(bucket: u64) -> String {
    if bucket < BUCKET_KBYTES_THRESHOLD {
        format!("{} bytes", bucket)
    } else {
        format!("{:.2} Kbytes", bucket as f64 / 1024.0)
    }
}

fn up_down(up: bool) -> &'static str {
    if up {
        "up"
    } else {
        "down"
    }
}

/// 查询一个接口的全部状态
///
/// 标志位, 数据块和地址查询失败会中止; 其他查询失败只是缺省。
pub fn gather(handle: &InterfaceHandle, verbose: bool) -> Result<InterfaceStatus> {
    let channel = handle.channel();
    let name = handle.name();
    debug!("{}: gathering status", name);

    let bridge = channel.is_bridge(name).unwrap_or(false);
    let flags = channel.flags(name)?;
    let data = channel.if_data(name)?;

    let lladdr = if data.if_type.has_ether_address() {
        channel
            .link_address(name)
            .ok()
            .flatten()
            .filter(|mac| *mac != MacAddr::zero())
    } else {
        None
    };

    let media = channel.media(name).ok().flatten();

    let address = match channel.addresses(name) {
        Ok(list) => list.into_iter().next(),
        Err(e) if e.errno() == Some(libc::EADDRNOTAVAIL) => None,
        Err(e) => return Err(e),
    };

    let (mut tunnel, mut rate_limit, mut vlan) = (None, None, None);
    if !bridge {
        if data.if_type.is_tunnel() {
            tunnel = channel.tunnel_endpoints(name).ok().flatten();
        }
        rate_limit = channel
            .token_bucket(name)
            .ok()
            .flatten()
            .filter(|tbr| tbr.rate != 0 && tbr.bucket != 0);
        vlan = channel.vlan(name).ok().filter(VlanConfig::is_configured);
    }

    let (mut members, mut learned, mut wireless) = (Vec::new(), Vec::new(), None);
    if verbose {
        if bridge {
            members = channel.bridge_members(name).unwrap_or_default();
            learned = channel.bridge_addresses(name).unwrap_or_default();
        }
        if let Ok(nwid) = channel.nwid(name) {
            wireless = Some(WirelessStatus {
                nwid: String::from_utf8_lossy(&nwid).into_owned(),
                nwkey: channel.nwkey(name).ok().flatten(),
                powersave_ms: channel
                    .powersave(name)
                    .ok()
                    .filter(|p| p.enabled && p.timeout_ms != 0)
                    .map(|p| p.timeout_ms),
            });
        }
    }

    Ok(InterfaceStatus {
        name: name.to_string(),
        bridge,
        flags,
        data,
        lladdr,
        media,
        address,
        tunnel,
        rate_limit,
        vlan,
        members,
        learned,
        wireless,
    })
}

impl InterfaceStatus {
    pub fn render(&self, out: &mut dyn Write, now: SystemTime, verbose: bool) -> std::io::Result<()> {
        let data = &self.data;
        let c = &data.counters;

        writeln!(out, "% {}", self.name)?;
        write!(
            out,
            "  {} is {}",
            if self.bridge { "Bridge" } else { "Interface" },
            up_down(self.flags.contains(InterfaceFlags::UP))
        )?;
        if let Some(changed) = data.last_change.filter(|t| *t != UNIX_EPOCH) {
            let secs = now.duration_since(changed).map(|d| d.as_secs()).unwrap_or(0);
            write!(out, " (last change {})", format_elapsed(secs))?;
        }
        writeln!(
            out,
            ", protocol is {}",
            up_down(self.flags.contains(InterfaceFlags::RUNNING))
        )?;

        write!(out, "  Interface type {}", data.if_type.label())?;
        if self.flags.contains(InterfaceFlags::BROADCAST) {
            write!(out, " (Broadcast)")?;
        } else if self.flags.contains(InterfaceFlags::POINTOPOINT) {
            write!(out, " (PointToPoint)")?;
        }
        if let Some(mac) = self.lladdr {
            write!(out, ", hardware address {}", mac)?;
        }
        writeln!(out)?;

        if let Some(current) = self.media.as_ref().and_then(|m| m.current.as_ref()) {
            let auto = self.media.as_ref().map(|m| m.autoselect).unwrap_or(false);
            writeln!(
                out,
                "  Media type {}{}",
                current,
                if auto { " (autoselect)" } else { "" }
            )?;
        }

        if let Some(addr) = &self.address {
            writeln!(
                out,
                "  Internet address is {}, network {}, broadcast {}",
                addr,
                addr.network_address(),
                addr.broadcast()
            )?;
        }

        if !self.bridge {
            if let Some(tunnel) = &self.tunnel {
                writeln!(
                    out,
                    "  Tunnel source {} destination {}",
                    tunnel.source, tunnel.destination
                )?;
            }

            write!(out, "  MTU {} bytes", data.mtu)?;
            if data.metric != 0 {
                write!(out, ", Metric {}", data.metric)?;
            }
            if data.baudrate != 0 {
                write!(out, ", Line Rate {}", format_line_rate(data.baudrate))?;
            }
            writeln!(out)?;

            if let Some(tbr) = &self.rate_limit {
                writeln!(
                    out,
                    "  Token Rate {}, Bucket {}",
                    format_token_rate(tbr.rate),
                    format_bucket(tbr.bucket)
                )?;
            }

            if let Some(vlan) = &self.vlan {
                let parent = if vlan.parent.is_empty() {
                    "<none>"
                } else {
                    vlan.parent.as_str()
                };
                writeln!(out, "  802.1Q vlan tag {}, parent {}", vlan.tag, parent)?;
            }
        }

        writeln!(
            out,
            "  {} packets input, {} bytes, {} errors, {} drops",
            c.ipackets, c.ibytes, c.ierrors, c.iqdrops
        )?;
        writeln!(
            out,
            "  {} packets output, {} bytes, {} errors, {} drops",
            c.opackets, c.obytes, c.oerrors, c.oqdrops
        )?;

        let mut averages = Vec::new();
        if let Some(avg) = c.avg_input_size() {
            averages.push(format!("{} avg input size", avg));
        }
        if let Some(avg) = c.avg_output_size() {
            averages.push(format!("{} avg output size", avg));
        }
        if !averages.is_empty() {
            writeln!(out, "  {}", averages.join(", "))?;
        }

        if data.if_type.reports_collisions() {
            writeln!(out, "  {} collisions", c.collisions)?;
        }

        if verbose {
            self.render_verbose(out)?;
        }
        Ok(())
    }

    fn render_verbose(&self, out: &mut dyn Write) -> std::io::Result<()> {
        if !self.flags.is_empty() {
            writeln!(out, "  Flags:")?;
            writeln!(out, "    {}", self.flags.describe())?;
        }

        if self.bridge {
            if !self.members.is_empty() {
                let plural = if self.members.len() > 1 { "s" } else { "" };
                writeln!(out, "  STP member state{}:", plural)?;
                for member in &self.members {
                    writeln!(out, "    {} {}", member.name, member.state.as_str())?;
                }
            }
            if !self.learned.is_empty() {
                writeln!(out, "  Learned addresses:")?;
                for entry in &self.learned {
                    writeln!(
                        out,
                        "    {} {} age {}s{}",
                        entry.mac,
                        entry.member,
                        entry.age.as_secs(),
                        if entry.local { " local" } else { "" }
                    )?;
                }
            }
        }

        if let Some(wireless) = &self.wireless {
            writeln!(out, "  IEEE 802.11:")?;
            writeln!(out, "    network id {}", wireless.nwid)?;
            if let Some(key) = &wireless.nwkey {
                writeln!(out, "    network key {}", key)?;
            }
            if let Some(ms) = wireless.powersave_ms {
                writeln!(out, "    powersaving ({} ms)", ms)?;
            }
        }

        if let Some(media) = &self.media {
            if !media.supported.is_empty() {
                writeln!(out, "  Supported media:")?;
                for m in &media.supported {
                    writeln!(out, "    {}", m)?;
                }
            }
        }
        Ok(())
    }
}

fn show_one(platform: &dyn ControlPlatform, ctx: &Context, name: &str, out: &mut dyn Write) -> Result<()> {
    let channel = platform.open()?;
    let name = resolver::resolve_unique(channel.as_ref(), name)?;
    let handle = InterfaceHandle::new(channel, name);
    let status = gather(&handle, ctx.verbose)?;
    drop(handle);
    status.render(out, SystemTime::now(), ctx.verbose)?;
    Ok(())
}

/// `show interface [name]`
///
/// 不带接口名时逐个显示所有接口, 单个接口出错只输出错误行并继续。
pub fn show(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    name: Option<&str>,
    out: &mut dyn Write,
) -> Result<()> {
    if let Some(name) = name {
        return show_one(platform, ctx, name, out);
    }

    let names = platform.open()?.interface_names()?;
    for name in names {
        if ctx.cancel.is_cancelled() {
            debug!("show interrupted before {}", name);
            break;
        }
        if let Err(e) = show_one(platform, ctx, &name, out) {
            for line in e.to_string().lines() {
                writeln!(out, "% {}", line)?;
            }
        }
    }
    Ok(())
}
