use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use codec::{read_var_bytes, read_var_int, write_var_bytes, write_var_int};

use crate::TxHash;

/// Consensus bound on a serialized script embedded in a transaction.
const MAX_SCRIPT_LEN: usize = 10_000;

/// Upper bound on input/output counts accepted from the wire.
const MAX_SLOTS: u64 = 1 << 20;

/// Reference to an output of a prior transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub hash: TxHash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: TxHash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The sentinel previous output carried by a coinbase input.
    pub fn null() -> Self {
        Self {
            hash: TxHash([0u8; 32]),
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.hash.0 == [0u8; 32]
    }
}

/// Transaction input: spent output, unlocking script, sequence number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub script: Vec<u8>,
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, script: Vec<u8>) -> Self {
        Self {
            previous_output,
            script,
            sequence: u32::MAX,
        }
    }
}

/// Transaction output: value in satoshis and locking script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script: Vec<u8>) -> Self {
        Self { value, script }
    }

    /// A blanked output as used by `SIGHASH_SINGLE` canonicalization.
    pub fn blank() -> Self {
        Self {
            value: u64::MAX,
            script: Vec::new(),
        }
    }
}

/// Canonical transaction structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub locktime: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: 1,
            inputs,
            outputs,
            locktime: 0,
        }
    }

    /// Serialize into canonical Bitcoin wire form.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.version)?;
        write_var_int(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            writer.write_all(&input.previous_output.hash.0)?;
            writer.write_u32::<LittleEndian>(input.previous_output.index)?;
            write_var_bytes(writer, &input.script)?;
            writer.write_u32::<LittleEndian>(input.sequence)?;
        }
        write_var_int(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            writer.write_u64::<LittleEndian>(output.value)?;
            write_var_bytes(writer, &output.script)?;
        }
        writer.write_u32::<LittleEndian>(self.locktime)
    }

    /// Decode from canonical Bitcoin wire form.
    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let version = reader.read_u32::<LittleEndian>()?;

        let input_count = read_slot_count(reader)?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let mut hash = [0u8; 32];
            reader.read_exact(&mut hash)?;
            let index = reader.read_u32::<LittleEndian>()?;
            let script = read_var_bytes(reader, MAX_SCRIPT_LEN)?;
            let sequence = reader.read_u32::<LittleEndian>()?;
            inputs.push(TxInput {
                previous_output: OutPoint::new(TxHash(hash), index),
                script,
                sequence,
            });
        }

        let output_count = read_slot_count(reader)?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = reader.read_u64::<LittleEndian>()?;
            let script = read_var_bytes(reader, MAX_SCRIPT_LEN)?;
            outputs.push(TxOutput { value, script });
        }

        let locktime = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            locktime,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("encode transaction");
        buf
    }

    /// Compute the transaction identifier.
    pub fn hash(&self) -> TxHash {
        TxHash(codec::sha256d(&self.encode()))
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }
}

fn read_slot_count<R: Read>(reader: &mut R) -> io::Result<u64> {
    let count = read_var_int(reader)?;
    if count > MAX_SLOTS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("item count {count} exceeds limit"),
        ));
    }
    Ok(count)
}
