use std::fmt;

/// Script operation codes.
///
/// `RawData` tags direct pushes (wire bytes `0x01..=0x4b` and coinbase
/// bodies), `Special` the empty push (`0x00`).  `BadOperation` stands in
/// for any byte this engine does not implement; it parses but fails when
/// executed.  `CheckMultisig` is recognized for payment-type template
/// matching only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    RawData,
    Special,
    Pushdata1,
    Pushdata2,
    Pushdata4,
    Op1,
    Op2,
    Op3,
    Op4,
    Op5,
    Op6,
    Op7,
    Op8,
    Op9,
    Op10,
    Op11,
    Op12,
    Op13,
    Op14,
    Op15,
    Op16,
    Nop,
    Drop,
    Dup,
    Equal,
    EqualVerify,
    Sha256,
    Hash160,
    CodeSeparator,
    CheckSig,
    CheckMultisig,
    BadOperation,
}

impl Opcode {
    /// Map a non-push wire byte to its opcode.
    pub fn from_wire_byte(byte: u8) -> Self {
        match byte {
            0x51..=0x60 => Self::numeric(byte - 0x50),
            0x61 => Opcode::Nop,
            0x75 => Opcode::Drop,
            0x76 => Opcode::Dup,
            0x87 => Opcode::Equal,
            0x88 => Opcode::EqualVerify,
            0xa8 => Opcode::Sha256,
            0xa9 => Opcode::Hash160,
            0xab => Opcode::CodeSeparator,
            0xac => Opcode::CheckSig,
            0xae => Opcode::CheckMultisig,
            _ => Opcode::BadOperation,
        }
    }

    /// Wire byte for a non-push opcode.
    pub fn to_wire_byte(self) -> Option<u8> {
        let byte = match self {
            Opcode::Nop => 0x61,
            Opcode::Drop => 0x75,
            Opcode::Dup => 0x76,
            Opcode::Equal => 0x87,
            Opcode::EqualVerify => 0x88,
            Opcode::Sha256 => 0xa8,
            Opcode::Hash160 => 0xa9,
            Opcode::CodeSeparator => 0xab,
            Opcode::CheckSig => 0xac,
            Opcode::CheckMultisig => 0xae,
            other => return other.numeric_value().map(|n| 0x50 + n),
        };
        Some(byte)
    }

    /// The `op_N` opcode for `1..=16`.
    pub fn numeric(value: u8) -> Self {
        match value {
            1 => Opcode::Op1,
            2 => Opcode::Op2,
            3 => Opcode::Op3,
            4 => Opcode::Op4,
            5 => Opcode::Op5,
            6 => Opcode::Op6,
            7 => Opcode::Op7,
            8 => Opcode::Op8,
            9 => Opcode::Op9,
            10 => Opcode::Op10,
            11 => Opcode::Op11,
            12 => Opcode::Op12,
            13 => Opcode::Op13,
            14 => Opcode::Op14,
            15 => Opcode::Op15,
            16 => Opcode::Op16,
            _ => Opcode::BadOperation,
        }
    }

    /// `Some(N)` when this is `op_N`.
    pub fn numeric_value(self) -> Option<u8> {
        let value = match self {
            Opcode::Op1 => 1,
            Opcode::Op2 => 2,
            Opcode::Op3 => 3,
            Opcode::Op4 => 4,
            Opcode::Op5 => 5,
            Opcode::Op6 => 6,
            Opcode::Op7 => 7,
            Opcode::Op8 => 8,
            Opcode::Op9 => 9,
            Opcode::Op10 => 10,
            Opcode::Op11 => 11,
            Opcode::Op12 => 12,
            Opcode::Op13 => 13,
            Opcode::Op14 => 14,
            Opcode::Op15 => 15,
            Opcode::Op16 => 16,
            _ => return None,
        };
        Some(value)
    }

    /// Whether the opcode carries a payload.
    pub fn is_push(self) -> bool {
        matches!(
            self,
            Opcode::RawData
                | Opcode::Special
                | Opcode::Pushdata1
                | Opcode::Pushdata2
                | Opcode::Pushdata4
        )
    }

    /// Inverse of `Display`; unknown names yield `BadOperation`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "raw_data" => Opcode::RawData,
            "special" => Opcode::Special,
            "pushdata1" => Opcode::Pushdata1,
            "pushdata2" => Opcode::Pushdata2,
            "pushdata4" => Opcode::Pushdata4,
            "nop" => Opcode::Nop,
            "drop" => Opcode::Drop,
            "dup" => Opcode::Dup,
            "equal" => Opcode::Equal,
            "equalverify" => Opcode::EqualVerify,
            "sha256" => Opcode::Sha256,
            "hash160" => Opcode::Hash160,
            "codeseparator" => Opcode::CodeSeparator,
            "checksig" => Opcode::CheckSig,
            "checkmultisig" => Opcode::CheckMultisig,
            _ => {
                if let Some(digits) = name.strip_prefix("op_") {
                    if let Ok(value) = digits.parse::<u8>() {
                        return Self::numeric(value);
                    }
                }
                Opcode::BadOperation
            }
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(value) = self.numeric_value() {
            return write!(f, "op_{value}");
        }
        let name = match self {
            Opcode::RawData => "raw_data",
            Opcode::Special => "special",
            Opcode::Pushdata1 => "pushdata1",
            Opcode::Pushdata2 => "pushdata2",
            Opcode::Pushdata4 => "pushdata4",
            Opcode::Nop => "nop",
            Opcode::Drop => "drop",
            Opcode::Dup => "dup",
            Opcode::Equal => "equal",
            Opcode::EqualVerify => "equalverify",
            Opcode::Sha256 => "sha256",
            Opcode::Hash160 => "hash160",
            Opcode::CodeSeparator => "codeseparator",
            Opcode::CheckSig => "checksig",
            Opcode::CheckMultisig => "checkmultisig",
            _ => "bad_operation",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for code in [
            Opcode::RawData,
            Opcode::Special,
            Opcode::Pushdata2,
            Opcode::Op1,
            Opcode::Op16,
            Opcode::Nop,
            Opcode::Drop,
            Opcode::Dup,
            Opcode::Equal,
            Opcode::EqualVerify,
            Opcode::Sha256,
            Opcode::Hash160,
            Opcode::CodeSeparator,
            Opcode::CheckSig,
            Opcode::CheckMultisig,
            Opcode::BadOperation,
        ] {
            assert_eq!(Opcode::from_name(&code.to_string()), code);
        }
        assert_eq!(Opcode::from_name("no_such_op"), Opcode::BadOperation);
    }

    #[test]
    fn wire_bytes_round_trip_for_executable_opcodes() {
        for byte in [0x51u8, 0x60, 0x61, 0x75, 0x76, 0x87, 0x88, 0xa8, 0xa9, 0xab, 0xac, 0xae] {
            let code = Opcode::from_wire_byte(byte);
            assert_ne!(code, Opcode::BadOperation);
            assert_eq!(code.to_wire_byte(), Some(byte));
        }
    }

    #[test]
    fn unknown_wire_byte_maps_to_bad_operation() {
        assert_eq!(Opcode::from_wire_byte(0xba), Opcode::BadOperation);
        assert_eq!(Opcode::BadOperation.to_wire_byte(), None);
    }
}
