use std::fmt;

use chain::Transaction;

use crate::engine;
use crate::opcode::Opcode;
use crate::ScriptError;

/// Largest payload a direct push byte can carry.
const MAX_DIRECT_PUSH: usize = 0x4b;

/// One decoded script operation: an opcode and, for push variants, its
/// payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub code: Opcode,
    pub data: Vec<u8>,
}

impl Operation {
    pub fn new(code: Opcode) -> Self {
        Self {
            code,
            data: Vec::new(),
        }
    }

    /// A push operation tagged with the smallest encoding that fits.
    pub fn push(data: Vec<u8>) -> Self {
        let code = match data.len() {
            0 => Opcode::Special,
            1..=MAX_DIRECT_PUSH => Opcode::RawData,
            len if len <= 0xff => Opcode::Pushdata1,
            len if len <= 0xffff => Opcode::Pushdata2,
            _ => Opcode::Pushdata4,
        };
        Self { code, data }
    }
}

/// Payment type derived from the operation sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentType {
    Pubkey,
    PubkeyHash,
    ScriptHash,
    Multisig,
    NonStandard,
}

/// An ordered operation sequence.
///
/// `run` is evaluated on the *output* script, carrying the stack the
/// input script produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    operations: Vec<Operation>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operations(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn push_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Append the other script's operations.
    pub fn join(&mut self, other: &Script) {
        self.operations.extend(other.operations.iter().cloned());
    }

    /// Evaluate the input script, then this script, against a shared
    /// stack.  True iff the final stack top is a truthy byte string.
    pub fn run(&self, input_script: &Script, parent_tx: &Transaction, input_index: u32) -> bool {
        let mut stack = Vec::new();
        if !engine::evaluate(input_script, &mut stack, parent_tx, input_index) {
            return false;
        }
        if !engine::evaluate(self, &mut stack, parent_tx, input_index) {
            return false;
        }
        match stack.last() {
            Some(top) => engine::cast_to_bool(top),
            None => false,
        }
    }

    /// Classify against the standard payment templates.
    pub fn payment_type(&self) -> PaymentType {
        let ops = self.operations.as_slice();
        if is_pubkey_hash_template(ops) {
            PaymentType::PubkeyHash
        } else if is_pubkey_template(ops) {
            PaymentType::Pubkey
        } else if is_script_hash_template(ops) {
            PaymentType::ScriptHash
        } else if is_multisig_template(ops) {
            PaymentType::Multisig
        } else {
            PaymentType::NonStandard
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, operation) in self.operations.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            if operation.code.is_push() {
                write!(f, "[ ")?;
                for byte in &operation.data {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, " ]")?;
            } else {
                write!(f, "{}", operation.code)?;
            }
        }
        Ok(())
    }
}

fn is_pubkey_hash_template(ops: &[Operation]) -> bool {
    ops.len() == 5
        && ops[0].code == Opcode::Dup
        && ops[1].code == Opcode::Hash160
        && ops[2].code.is_push()
        && ops[2].data.len() == 20
        && ops[3].code == Opcode::EqualVerify
        && ops[4].code == Opcode::CheckSig
}

fn is_pubkey_template(ops: &[Operation]) -> bool {
    ops.len() == 2
        && ops[0].code.is_push()
        && matches!(ops[0].data.len(), 33 | 65)
        && ops[1].code == Opcode::CheckSig
}

fn is_script_hash_template(ops: &[Operation]) -> bool {
    ops.len() == 3
        && ops[0].code == Opcode::Hash160
        && ops[1].code.is_push()
        && ops[1].data.len() == 20
        && ops[2].code == Opcode::Equal
}

fn is_multisig_template(ops: &[Operation]) -> bool {
    if ops.len() < 4 || ops[ops.len() - 1].code != Opcode::CheckMultisig {
        return false;
    }
    let (Some(required), Some(total)) = (
        ops[0].code.numeric_value(),
        ops[ops.len() - 2].code.numeric_value(),
    ) else {
        return false;
    };
    let keys = &ops[1..ops.len() - 2];
    required <= total
        && keys.len() == total as usize
        && keys
            .iter()
            .all(|op| op.code.is_push() && matches!(op.data.len(), 33 | 65))
}

/// Decode raw script bytes into an operation sequence.
///
/// Unknown opcodes decode to `bad_operation` and are still emitted;
/// execution fails if one is ever reached.  Running out of bytes inside
/// a declared push is the only parse fault.
pub fn parse_script(raw: &[u8]) -> Result<Script, ScriptError> {
    let mut operations = Vec::new();
    let mut cursor = 0usize;
    while cursor < raw.len() {
        let byte = raw[cursor];
        cursor += 1;
        let operation = match byte {
            0x00 => Operation::new(Opcode::Special),
            0x01..=0x4b => take_push(raw, &mut cursor, byte as usize, Opcode::RawData)?,
            0x4c => {
                let len = take_le_int(raw, &mut cursor, 1)?;
                take_push(raw, &mut cursor, len, Opcode::Pushdata1)?
            }
            0x4d => {
                let len = take_le_int(raw, &mut cursor, 2)?;
                take_push(raw, &mut cursor, len, Opcode::Pushdata2)?
            }
            0x4e => {
                let len = take_le_int(raw, &mut cursor, 4)?;
                take_push(raw, &mut cursor, len, Opcode::Pushdata4)?
            }
            other => Operation::new(Opcode::from_wire_byte(other)),
        };
        operations.push(operation);
    }
    Ok(Script::from_operations(operations))
}

/// Wrap a coinbase body without interpreting it: the whole script
/// becomes a single push.
pub fn coinbase_script(raw: &[u8]) -> Script {
    Script::from_operations(vec![Operation {
        code: Opcode::RawData,
        data: raw.to_vec(),
    }])
}

/// Serialize an operation sequence back to raw bytes.
///
/// Push tags are honored when they can carry the payload, so parsing
/// and serializing are inverse on well-formed scripts; a payload too
/// large for its tag falls back to the smallest encoding that fits.
pub fn save_script(script: &Script) -> Vec<u8> {
    let mut raw = Vec::new();
    for operation in script.operations() {
        if operation.code.is_push() {
            write_push(&mut raw, operation);
        } else if let Some(byte) = operation.code.to_wire_byte() {
            raw.push(byte);
        }
        // Sentinel opcodes with no wire form serialize to nothing.
    }
    raw
}

fn write_push(raw: &mut Vec<u8>, operation: &Operation) {
    let len = operation.data.len();
    let code = match operation.code {
        Opcode::Pushdata1 if len <= 0xff => Opcode::Pushdata1,
        Opcode::Pushdata2 if len <= 0xffff => Opcode::Pushdata2,
        Opcode::Pushdata4 => Opcode::Pushdata4,
        _ => Operation::push(operation.data.clone()).code,
    };
    match code {
        Opcode::Special => raw.push(0x00),
        Opcode::RawData => {
            raw.push(len as u8);
            raw.extend_from_slice(&operation.data);
        }
        Opcode::Pushdata1 => {
            raw.push(0x4c);
            raw.push(len as u8);
            raw.extend_from_slice(&operation.data);
        }
        Opcode::Pushdata2 => {
            raw.push(0x4d);
            raw.extend_from_slice(&(len as u16).to_le_bytes());
            raw.extend_from_slice(&operation.data);
        }
        _ => {
            raw.push(0x4e);
            raw.extend_from_slice(&(len as u32).to_le_bytes());
            raw.extend_from_slice(&operation.data);
        }
    }
}

fn take_push(
    raw: &[u8],
    cursor: &mut usize,
    len: usize,
    code: Opcode,
) -> Result<Operation, ScriptError> {
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= raw.len())
        .ok_or(ScriptError::TruncatedPush(len))?;
    let data = raw[*cursor..end].to_vec();
    *cursor = end;
    Ok(Operation { code, data })
}

fn take_le_int(raw: &[u8], cursor: &mut usize, width: usize) -> Result<usize, ScriptError> {
    let end = cursor
        .checked_add(width)
        .filter(|end| *end <= raw.len())
        .ok_or(ScriptError::TruncatedPush(width))?;
    let mut value = 0usize;
    for (shift, byte) in raw[*cursor..end].iter().enumerate() {
        value |= (*byte as usize) << (8 * shift);
    }
    *cursor = end;
    Ok(value)
}
