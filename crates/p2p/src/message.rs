use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chain::NetworkAddress;
use codec::{read_var_int, read_var_string, write_var_int, write_var_string};

/// Service bit advertising a full relay node.
pub const NODE_NETWORK: u64 = 1;

/// Hard cap on entries accepted from one `addr` payload.
const MAX_ADDRESSES: u64 = 1000;

const MAX_USER_AGENT: usize = 256;

/// Handshake payload describing the remote peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub protocol: u32,
    pub services: u64,
    pub timestamp: i64,
    pub address_receiver: NetworkAddress,
    pub address_sender: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: u32,
}

/// Typed wire messages understood by the session layer.
///
/// Commands outside this set are skipped by the channel; the heading
/// layer has already validated framing by the time decoding runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Version(Version),
    Verack,
    Ping(u64),
    Pong(u64),
    GetAddr,
    Addr(Vec<NetworkAddress>),
}

impl Message {
    pub fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
        }
    }

    /// Serialize the payload portion of the frame.
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.write_payload(&mut payload).expect("encode payload");
        payload
    }

    fn write_payload<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Message::Version(version) => {
                writer.write_u32::<LittleEndian>(version.protocol)?;
                writer.write_u64::<LittleEndian>(version.services)?;
                writer.write_i64::<LittleEndian>(version.timestamp)?;
                version.address_receiver.write(writer, false)?;
                version.address_sender.write(writer, false)?;
                writer.write_u64::<LittleEndian>(version.nonce)?;
                write_var_string(writer, &version.user_agent)?;
                writer.write_u32::<LittleEndian>(version.start_height)?;
                writer.write_u8(1) // relay
            }
            Message::Verack | Message::GetAddr => Ok(()),
            Message::Ping(nonce) | Message::Pong(nonce) => {
                writer.write_u64::<LittleEndian>(*nonce)
            }
            Message::Addr(addresses) => {
                write_var_int(writer, addresses.len() as u64)?;
                for address in addresses {
                    address.write(writer, true)?;
                }
                Ok(())
            }
        }
    }

    /// Decode a payload by command name.
    ///
    /// Returns the message and the number of unconsumed payload bytes,
    /// or `None` for commands this layer does not carry.
    pub fn decode(command: &str, payload: &[u8]) -> io::Result<Option<(Message, usize)>> {
        let mut cursor = Cursor::new(payload);
        let message = match command {
            "version" => Message::Version(read_version(&mut cursor)?),
            "verack" => Message::Verack,
            "ping" => Message::Ping(cursor.read_u64::<LittleEndian>()?),
            "pong" => Message::Pong(cursor.read_u64::<LittleEndian>()?),
            "getaddr" => Message::GetAddr,
            "addr" => Message::Addr(read_addresses(&mut cursor)?),
            _ => return Ok(None),
        };
        let unconsumed = payload.len() - cursor.position() as usize;
        Ok(Some((message, unconsumed)))
    }
}

fn read_version<R: Read>(reader: &mut R) -> io::Result<Version> {
    let protocol = reader.read_u32::<LittleEndian>()?;
    let services = reader.read_u64::<LittleEndian>()?;
    let timestamp = reader.read_i64::<LittleEndian>()?;
    let address_receiver = NetworkAddress::read(reader, false)?;
    let address_sender = NetworkAddress::read(reader, false)?;
    let nonce = reader.read_u64::<LittleEndian>()?;
    let user_agent = read_var_string(reader, MAX_USER_AGENT)?;
    let start_height = reader.read_u32::<LittleEndian>()?;
    // The relay flag trails on newer protocols; absence is fine.
    let mut relay = [0u8; 1];
    let _ = reader.read(&mut relay)?;
    Ok(Version {
        protocol,
        services,
        timestamp,
        address_receiver,
        address_sender,
        nonce,
        user_agent,
        start_height,
    })
}

fn read_addresses<R: Read>(reader: &mut R) -> io::Result<Vec<NetworkAddress>> {
    let count = read_var_int(reader)?;
    if count > MAX_ADDRESSES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("addr count {count} exceeds limit"),
        ));
    }
    let mut addresses = Vec::with_capacity(count as usize);
    for _ in 0..count {
        addresses.push(NetworkAddress::read(reader, true)?);
    }
    Ok(addresses)
}
