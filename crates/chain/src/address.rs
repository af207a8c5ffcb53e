use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

/// Network endpoint as carried by `addr` and `version` payloads.
///
/// The 16 byte address field holds an IPv6 address; IPv4 endpoints use
/// the conventional `::ffff:a.b.c.d` mapping.  The timestamp is present
/// on the wire inside `addr` lists but omitted inside `version`
/// payloads, so serialization takes an explicit flag.
#[derive(Clone, Copy, Debug)]
pub struct NetworkAddress {
    pub timestamp: u32,
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(ip: [u8; 16], port: u16, services: u64) -> Self {
        Self {
            timestamp: 0,
            services,
            ip,
            port,
        }
    }

    pub fn from_socket_addr(addr: SocketAddr, services: u64) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self::new(ip, addr.port(), services)
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        let v6 = Ipv6Addr::from(self.ip);
        match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), self.port),
            None => SocketAddr::new(IpAddr::V6(v6), self.port),
        }
    }

    pub fn is_ipv4(&self) -> bool {
        Ipv6Addr::from(self.ip).to_ipv4_mapped().is_some()
    }

    /// An unroutable placeholder used when the local endpoint is unknown.
    pub fn unspecified() -> Self {
        Self::from_socket_addr(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            0,
        )
    }

    pub fn write<W: Write>(&self, writer: &mut W, with_timestamp: bool) -> io::Result<()> {
        if with_timestamp {
            writer.write_u32::<LittleEndian>(self.timestamp)?;
        }
        writer.write_u64::<LittleEndian>(self.services)?;
        writer.write_all(&self.ip)?;
        writer.write_u16::<BigEndian>(self.port)
    }

    pub fn read<R: Read>(reader: &mut R, with_timestamp: bool) -> io::Result<Self> {
        let timestamp = if with_timestamp {
            reader.read_u32::<LittleEndian>()?
        } else {
            0
        };
        let services = reader.read_u64::<LittleEndian>()?;
        let mut ip = [0u8; 16];
        reader.read_exact(&mut ip)?;
        let port = reader.read_u16::<BigEndian>()?;
        Ok(Self {
            timestamp,
            services,
            ip,
            port,
        })
    }
}

// Host-store identity is the endpoint alone: a refreshed timestamp or
// services mask replaces an entry rather than duplicating it.
impl PartialEq for NetworkAddress {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip && self.port == other.port
    }
}

impl Eq for NetworkAddress {}

impl Hash for NetworkAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip.hash(state);
        self.port.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn socket_addr_round_trips_for_v4_and_v6() {
        let v4: SocketAddr = "10.0.0.1:8333".parse().expect("addr");
        let v6: SocketAddr = "[2001:db8::1]:18333".parse().expect("addr");
        assert_eq!(NetworkAddress::from_socket_addr(v4, 1).to_socket_addr(), v4);
        assert_eq!(NetworkAddress::from_socket_addr(v6, 1).to_socket_addr(), v6);
    }

    #[test]
    fn wire_forms_differ_by_timestamp_prefix() {
        let address = NetworkAddress {
            timestamp: 1_700_000_000,
            services: 1,
            ip: Ipv4Addr::new(192, 168, 1, 1).to_ipv6_mapped().octets(),
            port: 8333,
        };
        let mut with = Vec::new();
        let mut without = Vec::new();
        address.write(&mut with, true).expect("encode");
        address.write(&mut without, false).expect("encode");
        assert_eq!(with.len(), 30);
        assert_eq!(without.len(), 26);
        assert_eq!(&with[4..], &without[..]);

        let decoded = NetworkAddress::read(&mut Cursor::new(with), true).expect("decode");
        assert_eq!(decoded, address);
        assert_eq!(decoded.timestamp, address.timestamp);
    }

    #[test]
    fn identity_ignores_timestamp_and_services() {
        let base = NetworkAddress::from_socket_addr("1.2.3.4:8333".parse().expect("addr"), 1);
        let mut refreshed = base;
        refreshed.timestamp = 99;
        refreshed.services = 1024;
        assert_eq!(base, refreshed);
    }

    #[test]
    fn port_is_big_endian_on_the_wire() {
        let address = NetworkAddress::from_socket_addr("1.2.3.4:8333".parse().expect("addr"), 0);
        let mut buf = Vec::new();
        address.write(&mut buf, false).expect("encode");
        assert_eq!(&buf[buf.len() - 2..], &8333u16.to_be_bytes());
    }
}
