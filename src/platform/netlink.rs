//! Minimal rtnetlink client for IPv4 address add/delete.

use std::io::{self, Read, Write};
use std::mem;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::iface::types::{AddressAssignment, Peer};

const NLMSG_HDRLEN: usize = 16;
const NLMSG_ERROR: u16 = 2;
const RTM_NEWADDR: u16 = 20;
const RTM_DELADDR: u16 = 21;

const NLM_F_REQUEST: u16 = 0x001;
const NLM_F_ACK: u16 = 0x004;
const NLM_F_REPLACE: u16 = 0x100;
const NLM_F_CREATE: u16 = 0x400;

const IFA_ADDRESS: u16 = 1;
const IFA_LOCAL: u16 = 2;
const IFA_BROADCAST: u16 = 4;

pub struct NetlinkSocket {
    socket: Socket,
    seq: u32,
}

fn kernel_addr() -> SockAddr {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let nl = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_nl;
    unsafe {
        (*nl).nl_family = libc::AF_NETLINK as libc::sa_family_t;
        SockAddr::new(storage, mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t)
    }
}

/// nlmsghdr + ifaddrmsg + IPv4 attributes
fn encode_address_request(
    msg_type: u16,
    flags: u16,
    seq: u32,
    index: u32,
    prefix: u8,
    attrs: &[(u16, Ipv4Addr)],
) -> BytesMut {
    let mut payload = BytesMut::with_capacity(8 + attrs.len() * 8);
    payload.put_u8(libc::AF_INET as u8);
    payload.put_u8(prefix);
    payload.put_u8(0); // ifa_flags
    payload.put_u8(0); // RT_SCOPE_UNIVERSE
    payload.put_u32_ne(index);
    for (kind, addr) in attrs {
        payload.put_u16_ne(8);
        payload.put_u16_ne(*kind);
        payload.put_slice(&addr.octets());
    }

    let mut msg = BytesMut::with_capacity(NLMSG_HDRLEN + payload.len());
    msg.put_u32_ne((NLMSG_HDRLEN + payload.len()) as u32);
    msg.put_u16_ne(msg_type);
    msg.put_u16_ne(flags | NLM_F_REQUEST | NLM_F_ACK);
    msg.put_u32_ne(seq);
    msg.put_u32_ne(0);
    msg.extend_from_slice(&payload);
    msg
}

/// Scan a receive buffer for the ack of `seq`.
fn parse_ack(mut data: &[u8], seq: u32) -> Option<io::Result<()>> {
    while data.len() >= NLMSG_HDRLEN {
        let mut hdr = &data[..NLMSG_HDRLEN];
        let len = hdr.get_u32_ne() as usize;
        let kind = hdr.get_u16_ne();
        let _flags = hdr.get_u16_ne();
        let msg_seq = hdr.get_u32_ne();

        if len < NLMSG_HDRLEN || len > data.len() {
            return Some(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "truncated netlink message",
            )));
        }
        if kind == NLMSG_ERROR && msg_seq == seq {
            let mut body = &data[NLMSG_HDRLEN..len];
            if body.len() < 4 {
                return Some(Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "short netlink error message",
                )));
            }
            let code = body.get_i32_ne();
            return Some(if code == 0 {
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(-code))
            });
        }

        let aligned = (len + 3) & !3;
        if aligned >= data.len() {
            break;
        }
        data = &data[aligned..];
    }
    None
}

impl NetlinkSocket {
    pub fn open() -> io::Result<Self> {
        let socket = Socket::new(
            Domain::from(libc::AF_NETLINK),
            Type::from(libc::SOCK_RAW),
            Some(Protocol::from(libc::NETLINK_ROUTE)),
        )?;
        socket.connect(&kernel_addr())?;
        Ok(Self { socket, seq: 0 })
    }

    pub fn add_address(&mut self, index: u32, assignment: &AddressAssignment) -> io::Result<()> {
        let local = assignment.address();
        let mut attrs = vec![(IFA_LOCAL, local)];
        match assignment.peer {
            Some(Peer::Destination(dst)) => attrs.push((IFA_ADDRESS, dst)),
            _ => {
                attrs.push((IFA_ADDRESS, local));
                if assignment.prefix() < 31 {
                    attrs.push((IFA_BROADCAST, assignment.broadcast()));
                }
            }
        }
        self.request(
            RTM_NEWADDR,
            NLM_F_CREATE | NLM_F_REPLACE,
            index,
            assignment.prefix(),
            &attrs,
        )
    }

    pub fn delete_address(&mut self, index: u32, assignment: &AddressAssignment) -> io::Result<()> {
        self.request(
            RTM_DELADDR,
            0,
            index,
            assignment.prefix(),
            &[(IFA_LOCAL, assignment.address())],
        )
    }

    fn request(
        &mut self,
        msg_type: u16,
        flags: u16,
        index: u32,
        prefix: u8,
        attrs: &[(u16, Ipv4Addr)],
    ) -> io::Result<()> {
        self.seq = self.seq.wrapping_add(1);
        let msg = encode_address_request(msg_type, flags, self.seq, index, prefix, attrs);
        (&self.socket).write_all(&msg)?;

        let mut buf = vec![0u8; 8192];
        loop {
            let n = (&self.socket).read(&mut buf)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "netlink socket closed",
                ));
            }
            if let Some(result) = parse_ack(&buf[..n], self.seq) {
                return result;
            }
        }
    }
}
