//! 带参数的接口属性: mtu, metric, vlan, nwid, powersave

use log::debug;

use super::resolver::{self, Resolution};
use super::types::{PowerSave, VlanConfig};
use super::{Directive, InterfaceHandle};
use crate::context::Context;
use crate::error::{IfshError, Result};

/// IEEE 802.11 network id length limit.
pub const MAX_NWID_LEN: usize = 32;

fn parse_number(arg: &str, what: &str) -> Result<u32> {
    arg.parse::<u32>()
        .map_err(|_| IfshError::Validation(format!("Invalid {}", what)))
}

/// `mtu <mtu>` / `no mtu [mtu]`
pub fn set_mtu(handle: &InterfaceHandle, ctx: &Context, directive: &Directive) -> Result<()> {
    let argc = directive.arg_count();
    if (directive.negate && argc > 1) || (!directive.negate && argc != 1) {
        return Err(IfshError::usage(&["mtu <mtu>", "no mtu [mtu]"]));
    }

    let mtu = if directive.negate {
        let data = handle.channel().if_data(handle.name())?;
        ctx.default_mtu(data.if_type)
    } else {
        parse_number(&directive.args[0], "MTU")?
    };

    debug!("{}: set mtu {}", handle.name(), mtu);
    handle.channel().set_mtu(handle.name(), mtu)
}

/// `metric <metric>` / `no metric [metric]`
pub fn set_metric(handle: &InterfaceHandle, directive: &Directive) -> Result<()> {
    let argc = directive.arg_count();
    if (directive.negate && argc > 1) || (!directive.negate && argc != 1) {
        return Err(IfshError::usage(&["metric <metric>", "no metric [metric]"]));
    }

    let metric = if directive.negate {
        0
    } else {
        parse_number(&directive.args[0], "metric")?
    };

    debug!("{}: set metric {}", handle.name(), metric);
    handle.channel().set_metric(handle.name(), metric)
}

/// `vlan <tag> <parent interface>` / `no vlan [tag] [parent interface]`
pub fn set_vlan(handle: &InterfaceHandle, directive: &Directive) -> Result<()> {
    let argc = directive.arg_count();
    if (!directive.negate && argc != 2) || (directive.negate && argc > 2) {
        return Err(IfshError::usage(&[
            "vlan <tag> <parent interface>",
            "no vlan [tag] [parent interface]",
        ]));
    }

    let tag = if directive.negate {
        0
    } else {
        VlanConfig::parse_tag(&directive.args[0])?
    };

    let channel = handle.channel();
    if let Err(e) = channel.vlan(handle.name()) {
        return Err(match e.errno() {
            Some(libc::EINVAL) => {
                IfshError::Unsupported("This interface does not support vlan tagging".to_string())
            }
            _ => e,
        });
    }

    let config = if directive.negate {
        VlanConfig::default()
    } else {
        let parent = &directive.args[1];
        let invalid = || IfshError::Validation(format!("Invalid vlan parent {}", parent));
        let parent = match resolver::resolve(channel, parent)? {
            Resolution::Unique(found) => found,
            _ => return Err(invalid()),
        };
        if channel.is_bridge(&parent)? {
            return Err(invalid());
        }
        VlanConfig::new(tag, parent)
    };

    debug!("{}: set vlan {:?}", handle.name(), config);
    channel.set_vlan(handle.name(), &config).map_err(|e| match e.errno() {
        Some(libc::EBUSY) => IfshError::Busy(
            "Please disconnect the current vlan parent before setting a new one".to_string(),
        ),
        _ => e,
    })
}

/// Plain, double-quoted or `0x` hex network id.
pub fn parse_nwid(arg: &str) -> Result<Vec<u8>> {
    let bad = || IfshError::Validation("bad input".to_string());

    let bytes = if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        if !hex.is_ascii() || hex.len() % 2 != 0 {
            return Err(bad());
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| bad())?
    } else if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        arg[1..arg.len() - 1].as_bytes().to_vec()
    } else {
        arg.as_bytes().to_vec()
    };

    if bytes.len() > MAX_NWID_LEN {
        return Err(bad());
    }
    Ok(bytes)
}

/// `nwid <nwid>` / `no nwid [nwid]`
pub fn set_nwid(handle: &InterfaceHandle, directive: &Directive) -> Result<()> {
    let argc = directive.arg_count();
    if (!directive.negate && argc != 1) || (directive.negate && argc > 1) {
        return Err(IfshError::usage(&["nwid <nwid>", "no nwid [nwid]"]));
    }

    let nwid = if directive.negate {
        Vec::new()
    } else {
        parse_nwid(&directive.args[0])?
    };

    debug!("{}: set nwid ({} bytes)", handle.name(), nwid.len());
    handle.channel().set_nwid(handle.name(), &nwid)
}

/// `powersave [milisec]` / `no powersave [milisec]`
pub fn set_powersave(handle: &InterfaceHandle, ctx: &Context, directive: &Directive) -> Result<()> {
    if directive.arg_count() > 1 {
        return Err(IfshError::usage(&["powersave [milisec]", "no powersave [milisec]"]));
    }

    let timeout_ms = match directive.args.first() {
        Some(arg) => parse_number(arg, "powersave timeout")?,
        None => ctx.powersave_timeout_ms,
    };

    let channel = handle.channel();
    let current = channel.powersave(handle.name())?;
    let power = PowerSave {
        enabled: !directive.negate,
        timeout_ms,
    };
    debug!("{}: powersave {:?} -> {:?}", handle.name(), current, power);
    channel.set_powersave(handle.name(), power)
}
