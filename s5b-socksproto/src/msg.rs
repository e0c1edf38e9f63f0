//! Structures that represent SOCKS5 messages.

use crate::reader::Reader;
use crate::{Error, Result};

use caret::caret_int;
use std::fmt;
use std::net::IpAddr;

/// A completed SOCKS5 request, as received by a stream host.
///
/// For a bytestream this will be a CONNECT whose address is the
/// 40-character rendezvous digest and whose port is zero.  Keep this
/// object around after parsing: it knows how to format the reply.
#[derive(Clone, Debug)]
pub struct SocksRequest {
    /// The command requested by the client.
    cmd: SocksCmd,
    /// The target address.
    addr: SocksAddr,
    /// The target port.  Zero for bytestream rendezvous requests.
    port: u16,
}

/// An address sent or received as part of a SOCKS5 message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum SocksAddr {
    /// A domain name.  In a bytestream exchange this carries the
    /// rendezvous digest rather than a resolvable name.
    Hostname(String),
    /// An IP address literal.
    Ip(IpAddr),
}

caret_int! {
    /// Command from the SOCKS5 client telling the server what to do.
    pub struct SocksCmd(u8) {
        /// Connect to an address:port.  The only command bytestreams use.
        CONNECT = 1,
        /// Never used by bytestreams.
        BIND = 2,
        /// Never used by bytestreams.
        UDP_ASSOCIATE = 3,
    }
}

caret_int! {
    /// Possible reply status values from a SOCKS5 exchange.
    ///
    /// A stream host only ever sends SUCCEEDED or HOST_UNREACHABLE, but
    /// a client must be ready to hear the full RFC 1928 set.
    pub struct SocksStatus(u8) {
        /// RFC 1928: "succeeded"
        SUCCEEDED = 0x00,
        /// RFC 1928: "general SOCKS server failure"
        GENERAL_FAILURE = 0x01,
        /// RFC 1928: "connection not allowable by ruleset"
        NOT_ALLOWED = 0x02,
        /// RFC 1928: "Network unreachable"
        NETWORK_UNREACHABLE = 0x03,
        /// RFC 1928: "Host unreachable"
        ///
        /// Sent by a stream host when no transfer is pending under the
        /// requested digest.
        HOST_UNREACHABLE = 0x04,
        /// RFC 1928: "Connection refused"
        CONNECTION_REFUSED = 0x05,
        /// RFC 1928: "TTL expired"
        TTL_EXPIRED = 0x06,
        /// RFC 1928: "Command not supported"
        COMMAND_NOT_SUPPORTED = 0x07,
        /// RFC 1928: "Address type not supported"
        ADDRTYPE_NOT_SUPPORTED = 0x08,
    }
}

impl SocksAddr {
    /// Try to parse an address (ATYP byte included) from `r`.
    pub(crate) fn take_from(r: &mut Reader<'_>) -> Result<SocksAddr> {
        let atyp = r.take_u8()?;
        match atyp {
            1 => {
                let b = r.take(4)?;
                let ip4: std::net::Ipv4Addr = [b[0], b[1], b[2], b[3]].into();
                Ok(SocksAddr::Ip(ip4.into()))
            }
            3 => {
                let hlen = r.take_u8()?;
                let hostname = r.take(hlen as usize)?;
                let hostname = std::str::from_utf8(hostname)
                    .map_err(|_| Error::Syntax)?
                    .to_string();
                Ok(SocksAddr::Hostname(hostname))
            }
            4 => {
                let b = r.take(16)?;
                let mut oct = [0_u8; 16];
                oct.copy_from_slice(b);
                let ip6: std::net::Ipv6Addr = oct.into();
                Ok(SocksAddr::Ip(ip6.into()))
            }
            _ => Err(Error::Syntax),
        }
    }

    /// Append this address (ATYP byte included) onto `w`.
    ///
    /// Returns an error if a hostname is too long for the length octet.
    pub(crate) fn write_onto(&self, w: &mut Vec<u8>) -> Result<()> {
        match self {
            SocksAddr::Ip(IpAddr::V4(ip)) => {
                w.push(1);
                w.extend_from_slice(&ip.octets());
            }
            SocksAddr::Ip(IpAddr::V6(ip)) => {
                w.push(4);
                w.extend_from_slice(&ip.octets());
            }
            SocksAddr::Hostname(h) => {
                if h.len() > 255 {
                    return Err(Error::Syntax);
                }
                w.push(3);
                w.push(h.len() as u8);
                w.extend_from_slice(h.as_bytes());
            }
        }
        Ok(())
    }
}

impl SocksRequest {
    /// Create a SocksRequest with a given set of fields.
    ///
    /// Unlike general-purpose SOCKS5, a port of zero is allowed here:
    /// bytestream rendezvous requests always carry port zero.
    pub(crate) fn new(cmd: SocksCmd, addr: SocksAddr, port: u16) -> Result<Self> {
        if cmd != SocksCmd::CONNECT {
            return Err(Error::NoSupport);
        }
        Ok(SocksRequest { cmd, addr, port })
    }

    /// Return the command that the client requested.
    pub fn command(&self) -> SocksCmd {
        self.cmd
    }

    /// Return the requested address.
    pub fn addr(&self) -> &SocksAddr {
        &self.addr
    }

    /// Return the requested port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Format a reply to this request, indicating success or failure.
    ///
    /// The bound address echoes the requested one, which is what
    /// bytestream targets expect to hear back.
    pub fn reply(&self, status: SocksStatus) -> Vec<u8> {
        let mut w = Vec::new();
        w.push(5);
        w.push(status.into());
        w.push(0); // reserved
        self.addr
            .write_onto(&mut w)
            .expect("parsed address did not re-encode");
        w.extend_from_slice(&self.port.to_be_bytes());
        w
    }
}

impl fmt::Display for SocksAddr {
    /// Format a string (a hostname or IP address) corresponding to
    /// this SocksAddr.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksAddr::Ip(a) => write!(f, "{}", a),
            SocksAddr::Hostname(h) => write!(f, "{}", h),
        }
    }
}
