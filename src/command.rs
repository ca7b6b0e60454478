//! 命令分发
//!
//! `show [interface] [name]` 与 `interface <name> [no] <keyword> <args...>` 两类命令。

use std::io::Write;

use log::debug;

use crate::context::Context;
use crate::error::{IfshError, Result};
use crate::iface::address::{self, AddressMode};
use crate::iface::{attrs, flags, resolver, status, Directive, InterfaceHandle};
use crate::platform::ControlPlatform;

pub const HELP: &str = "\
show [interface] [name]                 interface status
interface <name> ip <addr>/<bits> [peer] set primary address
interface <name> alias <addr>/<bits>     add address
interface <name> mtu <mtu>
interface <name> metric <metric>
interface <name> vlan <tag> <parent>
interface <name> link <012>
interface <name> nwid <nwid>
interface <name> powersave [milisec]
interface <name> debug | shutdown | arp
  prefix any interface keyword with 'no' to clear it
  on Linux, vlan <tag> <parent> and link <012> are not supported
quit                                     leave the shell";

fn is_keyword(word: &str, keyword: &str, min: usize) -> bool {
    word.len() >= min && keyword.starts_with(&word.to_ascii_lowercase())
}

fn dispatch(handle: &InterfaceHandle, ctx: &Context, directive: &Directive) -> Result<()> {
    if let Some(mode) = AddressMode::from_keyword(&directive.keyword) {
        return address::configure(handle, mode, directive);
    }
    if let Some(attr) = flags::attribute(&directive.keyword) {
        return flags::set_attribute(handle, attr, directive);
    }
    match directive.keyword.as_str() {
        "mtu" => attrs::set_mtu(handle, ctx, directive),
        "metric" => attrs::set_metric(handle, directive),
        "vlan" => attrs::set_vlan(handle, directive),
        "link" => flags::set_link(handle, directive),
        "nwid" => attrs::set_nwid(handle, directive),
        "powersave" => attrs::set_powersave(handle, ctx, directive),
        other => Err(IfshError::Validation(format!(
            "Unknown interface command: {}",
            other
        ))),
    }
}

/// Run one interface directive against `ifname`.
pub fn configure<S: AsRef<str>>(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    ifname: &str,
    words: &[S],
) -> Result<()> {
    let directive = Directive::parse(words)
        .ok_or_else(|| IfshError::usage(&["interface <name> [no] <keyword> [args...]"]))?;
    if !ctx.privileged {
        return Err(IfshError::Privilege);
    }

    let channel = platform.open()?;
    let name = resolver::resolve_unique(channel.as_ref(), ifname)?;
    debug!("{}: {:?}", name, directive);
    let handle = InterfaceHandle::new(channel, name);
    dispatch(&handle, ctx, &directive)
}

/// Execute one tokenized command line.
pub fn run<S: AsRef<str>>(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    words: &[S],
    out: &mut dyn Write,
) -> Result<()> {
    let words: Vec<&str> = words.iter().map(|w| w.as_ref()).collect();
    let Some((first, rest)) = words.split_first() else {
        return Ok(());
    };

    if is_keyword(first, "show", 2) {
        let rest = match rest.split_first() {
            Some((word, tail)) if is_keyword(word, "interfaces", 3) => tail,
            _ => rest,
        };
        if rest.len() > 1 {
            return Err(IfshError::usage(&["show [interface] [name]"]));
        }
        return status::show(platform, ctx, rest.first().copied(), out);
    }

    if is_keyword(first, "interface", 3) {
        return match rest.split_first() {
            Some((ifname, directive)) => configure(platform, ctx, ifname, directive),
            None => Err(IfshError::usage(&["interface <name> [no] <keyword> [args...]"])),
        };
    }

    if first.eq_ignore_ascii_case("help") || *first == "?" {
        writeln!(out, "{}", HELP)?;
        return Ok(());
    }

    Err(IfshError::Validation(format!("Invalid command: {}", first)))
}
