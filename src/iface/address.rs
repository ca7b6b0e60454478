//! IPv4 地址配置 (`ip` / `alias`)

use std::net::Ipv4Addr;

use ipnetwork::ipv4_mask_to_prefix;
use log::{debug, warn};

use super::flags;
use super::types::{AddressAssignment, InterfaceFlags, Peer};
use super::{Directive, InterfaceHandle};
use crate::error::{IfshError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// replaces the primary address
    Primary,
    Alias,
}

impl AddressMode {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "ip" => Some(AddressMode::Primary),
            "alias" => Some(AddressMode::Alias),
            _ => None,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            AddressMode::Primary => "ip",
            AddressMode::Alias => "alias",
        }
    }
}

/// Kind of the optional second argument, decided by the interface flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerKind {
    Destination,
    Broadcast,
}

impl PeerKind {
    fn for_flags(flags: InterfaceFlags) -> Option<Self> {
        if flags.contains(InterfaceFlags::POINTOPOINT) {
            Some(PeerKind::Destination)
        } else if flags.contains(InterfaceFlags::BROADCAST) {
            Some(PeerKind::Broadcast)
        } else {
            None
        }
    }

    fn label(self) -> &'static str {
        match self {
            PeerKind::Destination => "destination",
            PeerKind::Broadcast => "broadcast",
        }
    }

    fn peer(self, addr: Ipv4Addr) -> Peer {
        match self {
            PeerKind::Destination => Peer::Destination(addr),
            PeerKind::Broadcast => Peer::Broadcast(addr),
        }
    }
}

fn usage(mode: AddressMode, kind: Option<PeerKind>) -> IfshError {
    let cmd = mode.keyword();
    let peer = kind
        .map(|k| format!(" [{}]", k.label()))
        .unwrap_or_default();
    IfshError::Usage(
        [
            format!("{} <address>/<bits>{}", cmd, peer),
            format!("{} <address>/<netmask>{}", cmd, peer),
            format!("no {} <address>[/bits]", cmd),
            format!("no {} <address>[/netmask]", cmd),
        ]
        .join("\n"),
    )
}

/// `a.b.c.d/bits` or `a.b.c.d/w.x.y.z`
pub fn parse_address(arg: &str) -> Result<AddressAssignment> {
    let (addr, mask) = arg
        .split_once('/')
        .ok_or_else(|| IfshError::Validation("Netmask not specified".to_string()))?;
    if mask.is_empty() {
        return Err(IfshError::Validation("Netmask not specified".to_string()));
    }

    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| IfshError::Validation(format!("Invalid address {}", arg)))?;

    let prefix = if mask.contains('.') {
        let mask: Ipv4Addr = mask
            .parse()
            .map_err(|_| IfshError::Validation(format!("Invalid netmask {}", mask)))?;
        ipv4_mask_to_prefix(mask)
            .map_err(|_| IfshError::Validation(format!("Invalid netmask {}", mask)))?
    } else {
        mask.parse::<u8>()
            .ok()
            .filter(|bits| *bits <= 32)
            .ok_or_else(|| IfshError::Validation(format!("Invalid prefix length {}", mask)))?
    };

    AddressAssignment::new(addr, prefix)
}

/// Add or remove an IPv4 address.
///
/// 非 alias 的添加会先删除当前主地址; 删除时报告 "no such address" 以外的任何错误。
/// 添加失败时不回滚之前的删除。
pub fn configure(handle: &InterfaceHandle, mode: AddressMode, directive: &Directive) -> Result<()> {
    let argc = directive.arg_count();
    let assignment = match directive.args.first() {
        Some(arg) if argc <= 2 => Some(parse_address(arg)?),
        _ => None,
    };

    let kind = PeerKind::for_flags(flags::get(handle)?);
    let max_args = if kind.is_some() { 2 } else { 1 };
    let mut assignment = match assignment {
        Some(a) if argc <= max_args => a,
        _ => return Err(usage(mode, kind)),
    };

    if let (Some(arg), Some(kind)) = (directive.args.get(1), kind) {
        let addr: Ipv4Addr = arg
            .parse()
            .map_err(|_| IfshError::Validation(format!("Invalid {} address", kind.label())))?;
        assignment = assignment.with_peer(kind.peer(addr));
    }

    let channel = handle.channel();
    let name = handle.name();

    if directive.negate {
        debug!("{}: delete address {}", name, assignment.address());
        return channel.delete_address(name, Some(assignment.address()));
    }

    if mode == AddressMode::Primary {
        debug!("{}: delete primary address", name);
        match channel.delete_address(name, None) {
            Ok(()) => {}
            Err(e) if e.errno() == Some(libc::EADDRNOTAVAIL) => {
                warn!("{}: no primary address to replace", name);
            }
            Err(e) => return Err(e),
        }
    }

    debug!("{}: add address {} ({:?})", name, assignment, mode);
    channel.add_address(name, &assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::interface::MockControlChannel;
    use crate::platform::sim::{SimInterface, SimKernel};

    fn handle(kernel: &SimKernel, name: &str) -> InterfaceHandle {
        InterfaceHandle::new(Box::new(kernel.channel()), name)
    }

    fn run(h: &InterfaceHandle, words: &[&str]) -> Result<()> {
        let directive = Directive::parse(words).unwrap();
        let mode = AddressMode::from_keyword(&directive.keyword).unwrap();
        configure(h, mode, &directive)
    }

    fn addresses(kernel: &SimKernel, name: &str) -> Vec<String> {
        kernel
            .interface(name)
            .addresses
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    #[test]
    fn test_parse_address_forms() {
        let a = parse_address("10.0.0.1/24").unwrap();
        assert_eq!(a.prefix(), 24);
        let b = parse_address("10.0.0.1/255.255.255.0").unwrap();
        assert_eq!(a, b);
        assert_eq!(parse_address("0.0.0.0/0").unwrap().prefix(), 0);

        assert_eq!(
            parse_address("10.0.0.1").unwrap_err().to_string(),
            "Netmask not specified"
        );
        assert!(parse_address("10.0.0.1/").is_err());
        assert!(parse_address("10.0.0.1/33").is_err());
        assert!(parse_address("10.0.0.1/255.0.255.0").is_err());
        assert!(parse_address("10.0.0/24").is_err());
    }

    #[test]
    fn test_primary_replace_is_idempotent() {
        let kernel = SimKernel::new().with_interface("em0", SimInterface::ethernet());
        let h = handle(&kernel, "em0");

        run(&h, &["ip", "10.0.0.1/24"]).unwrap();
        run(&h, &["ip", "10.0.0.1/24"]).unwrap();
        assert_eq!(addresses(&kernel, "em0"), vec!["10.0.0.1/24"]);
    }

    #[test]
    fn test_alias_adds_primary_replaces() {
        let kernel = SimKernel::new()
            .with_interface("em0", SimInterface::ethernet())
            .with_interface("em1", SimInterface::ethernet());

        let h = handle(&kernel, "em0");
        run(&h, &["ip", "10.0.0.1/24"]).unwrap();
        run(&h, &["alias", "10.0.0.2/24"]).unwrap();
        assert_eq!(addresses(&kernel, "em0").len(), 2);

        let h = handle(&kernel, "em1");
        run(&h, &["ip", "10.0.0.1/24"]).unwrap();
        run(&h, &["ip", "10.0.0.3/24"]).unwrap();
        assert_eq!(addresses(&kernel, "em1"), vec!["10.0.0.3/24"]);
    }

    #[test]
    fn test_request_order() {
        let kernel = SimKernel::new().with_interface("em0", SimInterface::ethernet());
        let h = handle(&kernel, "em0");
        run(&h, &["ip", "192.168.1.1/255.255.255.0"]).unwrap();
        run(&h, &["alias", "192.168.2.1/24"]).unwrap();
        assert_eq!(
            kernel.requests(),
            vec![
                "SIOCGIFFLAGS",
                "SIOCDIFADDR",
                "SIOCAIFADDR",
                "SIOCGIFFLAGS",
                "SIOCAIFADDR",
            ]
        );
    }

    #[test]
    fn test_remove_surfaces_missing_address() {
        let kernel = SimKernel::new().with_interface("em0", SimInterface::ethernet());
        let h = handle(&kernel, "em0");
        let err = run(&h, &["no", "ip", "10.0.0.9/24"]).unwrap_err();
        assert_eq!(err.errno(), Some(libc::EADDRNOTAVAIL));

        run(&h, &["ip", "10.0.0.1/24"]).unwrap();
        run(&h, &["alias", "10.0.0.2/24"]).unwrap();
        run(&h, &["no", "alias", "10.0.0.2/24"]).unwrap();
        assert_eq!(addresses(&kernel, "em0"), vec!["10.0.0.1/24"]);
    }

    #[test]
    fn test_add_failure_does_not_roll_back() {
        let kernel = SimKernel::new().with_interface("em0", SimInterface::ethernet());
        let h = handle(&kernel, "em0");
        run(&h, &["ip", "10.0.0.1/24"]).unwrap();

        kernel.fail("SIOCAIFADDR", libc::EEXIST);
        assert!(run(&h, &["ip", "10.0.0.5/24"]).is_err());
        assert!(addresses(&kernel, "em0").is_empty());
    }

    #[test]
    fn test_pre_delete_error_other_than_missing_aborts() {
        let kernel = SimKernel::new().with_interface("em0", SimInterface::ethernet());
        let h = handle(&kernel, "em0");
        kernel.fail("SIOCDIFADDR", libc::EPERM);
        assert!(run(&h, &["ip", "10.0.0.1/24"]).is_err());
        assert!(!kernel.requests().iter().any(|r| r == "SIOCAIFADDR"));
    }

    #[test]
    fn test_peer_argument_depends_on_flags() {
        let mut p2p = SimInterface::new(crate::iface::types::IfType::PPP);
        p2p.flags |= InterfaceFlags::POINTOPOINT;
        let kernel = SimKernel::new()
            .with_interface("ppp0", p2p)
            .with_interface("lo0", SimInterface::new(crate::iface::types::IfType::LOOP))
            .with_interface("em0", SimInterface::ethernet());

        let h = handle(&kernel, "ppp0");
        run(&h, &["ip", "10.1.1.1/32", "10.1.1.2"]).unwrap();
        assert_eq!(
            kernel.interface("ppp0").addresses[0].peer,
            Some(Peer::Destination(Ipv4Addr::new(10, 1, 1, 2)))
        );

        let h = handle(&kernel, "em0");
        let err = run(&h, &["ip", "10.0.0.1/24", "bogus"]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid broadcast address");

        let h = handle(&kernel, "lo0");
        let err = run(&h, &["ip", "127.0.0.2/8", "127.0.0.3"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ip <address>/<bits>\nip <address>/<netmask>\nno ip <address>[/bits]\nno ip <address>[/netmask]"
        );
    }

    #[test]
    fn test_missing_netmask_never_reaches_kernel() {
        let h = InterfaceHandle::new(Box::new(MockControlChannel::new()), "em0");
        let err = run(&h, &["ip", "10.0.0.1"]).unwrap_err();
        assert_eq!(err.to_string(), "Netmask not specified");
    }

    #[test]
    fn test_usage_mentions_peer_kind() {
        let mut mock = MockControlChannel::new();
        mock.expect_flags()
            .returning(|_| Ok(InterfaceFlags::UP | InterfaceFlags::BROADCAST));
        let h = InterfaceHandle::new(Box::new(mock), "em0");
        let err = run(&h, &["alias"]).unwrap_err();
        assert!(err.to_string().starts_with("alias <address>/<bits> [broadcast]\n"));
    }
}
