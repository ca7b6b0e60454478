//! Interface facets read from /sys/class/net.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pnet::util::MacAddr;

use crate::iface::types::{BridgeAddress, BridgeMember, Counters, IfData, IfType, StpState};

const SYS_CLASS_NET: &str = "/sys/class/net";

const ARPHRD_ARCNET: u16 = 7;
const ARPHRD_ATM: u16 = 19;
const ARPHRD_ETHER: u16 = 1;
const ARPHRD_SLIP: u16 = 256;
const ARPHRD_PPP: u16 = 512;
const ARPHRD_CISCO: u16 = 513;
const ARPHRD_TUNNEL: u16 = 768;
const ARPHRD_TUNNEL6: u16 = 769;
const ARPHRD_LOOPBACK: u16 = 772;
const ARPHRD_SIT: u16 = 776;
const ARPHRD_IPGRE: u16 = 778;
const ARPHRD_IEEE802_TR: u16 = 800;
const ARPHRD_IEEE80211: u16 = 801;
const ARPHRD_IEEE80211_RADIOTAP: u16 = 803;
const ARPHRD_NONE: u16 = 0xfffe;

/// sizeof(struct __fdb_entry)
const FDB_ENTRY_LEN: usize = 16;
/// ageing timers are reported in USER_HZ ticks
const USER_HZ: u64 = 100;

fn base(name: &str) -> PathBuf {
    Path::new(SYS_CLASS_NET).join(name)
}

fn read_u64(path: &Path) -> io::Result<u64> {
    let raw = fs::read_to_string(path)?;
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn devtype(dir: &Path) -> Option<String> {
    let uevent = fs::read_to_string(dir.join("uevent")).ok()?;
    uevent
        .lines()
        .find_map(|line| line.strip_prefix("DEVTYPE=").map(str::to_string))
}

/// Map a Linux ARPHRD code (plus sysfs hints) to an IANA ifType.
pub fn iana_type(arphrd: u16, devtype: Option<&str>, bridge: bool, wireless: bool) -> IfType {
    match arphrd {
        ARPHRD_ETHER if bridge || devtype == Some("bridge") => IfType::BRIDGE,
        ARPHRD_ETHER if wireless || devtype == Some("wlan") => IfType::IEEE80211,
        ARPHRD_ETHER if devtype == Some("vlan") => IfType::L2VLAN,
        ARPHRD_ETHER => IfType::ETHER,
        ARPHRD_LOOPBACK => IfType::LOOP,
        ARPHRD_PPP => IfType::PPP,
        ARPHRD_SLIP => IfType::SLIP,
        ARPHRD_CISCO => IfType::HDLC,
        ARPHRD_TUNNEL | ARPHRD_IPGRE => IfType::TUNNEL,
        ARPHRD_SIT | ARPHRD_TUNNEL6 => IfType::GIF,
        ARPHRD_IEEE80211 | ARPHRD_IEEE80211_RADIOTAP => IfType::IEEE80211,
        ARPHRD_IEEE802_TR => IfType::ISO88025,
        ARPHRD_ATM => IfType::ATM,
        ARPHRD_ARCNET => IfType::ARCNET,
        ARPHRD_NONE => IfType::PROPVIRTUAL,
        _ => IfType(0),
    }
}

pub fn is_bridge(name: &str) -> bool {
    base(name).join("bridge").is_dir()
}

pub fn if_data(name: &str) -> io::Result<IfData> {
    let dir = base(name);
    let arphrd = read_u64(&dir.join("type"))? as u16;
    let wireless = dir.join("wireless").exists() || dir.join("phy80211").exists();
    let devtype = devtype(&dir);
    let if_type = iana_type(arphrd, devtype.as_deref(), is_bridge(name), wireless);

    let stats = dir.join("statistics");
    let stat = |file: &str| read_u64(&stats.join(file)).unwrap_or(0);
    let counters = Counters {
        ipackets: stat("rx_packets"),
        ibytes: stat("rx_bytes"),
        ierrors: stat("rx_errors"),
        iqdrops: stat("rx_dropped"),
        opackets: stat("tx_packets"),
        obytes: stat("tx_bytes"),
        oerrors: stat("tx_errors"),
        oqdrops: stat("tx_dropped"),
        collisions: stat("collisions"),
    };

    // speed is in Mb/s and reads as -1 (or fails) when the link is down
    let baudrate = fs::read_to_string(dir.join("speed"))
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|speed| *speed > 0)
        .map(|speed| speed as u64 * 1_000_000)
        .unwrap_or(0);

    Ok(IfData {
        if_type,
        mtu: read_u64(&dir.join("mtu")).unwrap_or(0) as u32,
        metric: 0,
        baudrate,
        last_change: None,
        counters,
    })
}

pub fn bridge_members(name: &str) -> io::Result<Vec<BridgeMember>> {
    let brif = base(name).join("brif");
    let mut members = Vec::new();
    for entry in fs::read_dir(&brif)? {
        let entry = entry?;
        let member = entry.file_name().to_string_lossy().into_owned();
        let code = read_u64(&entry.path().join("state")).unwrap_or(0);
        let state = StpState::from_code(code as u8).unwrap_or(StpState::Disabled);
        members.push(BridgeMember {
            name: member,
            state,
        });
    }
    members.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(members)
}

fn bridge_ports(name: &str) -> io::Result<HashMap<u16, String>> {
    let brif = base(name).join("brif");
    let mut ports = HashMap::new();
    for entry in fs::read_dir(&brif)? {
        let entry = entry?;
        if let Ok(port) = read_u64(&entry.path().join("port_no")) {
            ports.insert(port as u16, entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(ports)
}

pub fn bridge_addresses(name: &str) -> io::Result<Vec<BridgeAddress>> {
    let data = fs::read(base(name).join("brforward"))?;
    let ports = bridge_ports(name)?;
    Ok(parse_fdb(&data, &ports))
}

/// Decode `struct __fdb_entry` records.
pub fn parse_fdb(data: &[u8], ports: &HashMap<u16, String>) -> Vec<BridgeAddress> {
    data.chunks_exact(FDB_ENTRY_LEN)
        .map(|entry| {
            let mac = MacAddr::new(entry[0], entry[1], entry[2], entry[3], entry[4], entry[5]);
            let port = (u16::from(entry[12]) << 8) | u16::from(entry[6]);
            let ticks = u32::from_ne_bytes([entry[8], entry[9], entry[10], entry[11]]);
            BridgeAddress {
                mac,
                member: ports
                    .get(&port)
                    .cloned()
                    .unwrap_or_else(|| format!("port{}", port)),
                age: Duration::from_millis(u64::from(ticks) * 1000 / USER_HZ),
                local: entry[7] != 0,
            }
        })
        .collect()
}
