//! Transaction signature hashing.
//!
//! The digest covers a canonicalized copy of the spending transaction,
//! masked by the hash type, with the sub-script spliced into the signed
//! input.  The result must match the reference implementation
//! byte-for-byte, including its historical quirks.

use chain::{Transaction, TxOutput};

use crate::opcode::Opcode;
use crate::script::{save_script, Script};

pub const SIGHASH_ALL: u32 = 1;
pub const SIGHASH_NONE: u32 = 2;
pub const SIGHASH_SINGLE: u32 = 3;
pub const SIGHASH_ANYONE_CAN_PAY: u32 = 0x80;

/// Compute the 32 byte digest a `checksig` endorsement signs.
///
/// The caller's transaction is taken by value: every step mutates the
/// copy and the original is never observable in the result beyond what
/// the hash type keeps.
pub fn generate_signature_hash(
    mut parent_tx: Transaction,
    input_index: u32,
    script_code: &Script,
    hash_type: u32,
) -> [u8; 32] {
    let index = input_index as usize;
    if index >= parent_tx.inputs.len() {
        return one_hash();
    }

    // Splice the sub-script into the signed input; every other input
    // script is cleared.  Code separators never reach the digest.
    let clean_code = Script::from_operations(
        script_code
            .operations()
            .iter()
            .filter(|op| op.code != Opcode::CodeSeparator)
            .cloned()
            .collect(),
    );
    for input in &mut parent_tx.inputs {
        input.script.clear();
    }
    parent_tx.inputs[index].script = save_script(&clean_code);

    match hash_type & 0x1f {
        SIGHASH_NONE => {
            parent_tx.outputs.clear();
            zero_other_sequences(&mut parent_tx, index);
        }
        SIGHASH_SINGLE => {
            if index >= parent_tx.outputs.len() {
                // Historical out-of-range behavior, preserved for
                // consensus: the digest is the constant one value.
                return one_hash();
            }
            parent_tx.outputs.truncate(index + 1);
            for output in &mut parent_tx.outputs[..index] {
                *output = TxOutput::blank();
            }
            zero_other_sequences(&mut parent_tx, index);
        }
        _ => {}
    }

    if hash_type & SIGHASH_ANYONE_CAN_PAY != 0 {
        let own = parent_tx.inputs.swap_remove(index);
        parent_tx.inputs = vec![own];
    }

    let mut preimage = parent_tx.encode();
    preimage.extend_from_slice(&hash_type.to_le_bytes());
    codec::sha256d(&preimage)
}

fn zero_other_sequences(tx: &mut Transaction, index: usize) {
    for (i, input) in tx.inputs.iter_mut().enumerate() {
        if i != index {
            input.sequence = 0;
        }
    }
}

fn one_hash() -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest[31] = 1;
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Operation;
    use chain::{OutPoint, TxHash, TxInput};

    fn script_code() -> Script {
        Script::from_operations(vec![
            Operation::new(Opcode::Dup),
            Operation::new(Opcode::Hash160),
            Operation::push(vec![0x33; 20]),
            Operation::new(Opcode::EqualVerify),
            Operation::new(Opcode::CheckSig),
        ])
    }

    fn two_input_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![
                TxInput {
                    previous_output: OutPoint::new(TxHash([0xaa; 32]), 0),
                    script: vec![0x51],
                    sequence: u32::MAX,
                },
                TxInput {
                    previous_output: OutPoint::new(TxHash([0xbb; 32]), 1),
                    script: vec![0x52],
                    sequence: u32::MAX,
                },
            ],
            outputs: vec![
                TxOutput::new(10_000, vec![0xac]),
                TxOutput::new(20_000, vec![0xad]),
            ],
            locktime: 0,
        }
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let tx = two_input_tx();
        let a = generate_signature_hash(tx.clone(), 0, &script_code(), SIGHASH_ALL);
        let b = generate_signature_hash(tx, 0, &script_code(), SIGHASH_ALL);
        assert_eq!(a, b);
    }

    #[test]
    fn independent_of_other_input_scripts() {
        let tx = two_input_tx();
        let mut mutated = tx.clone();
        mutated.inputs[1].script = vec![0xde, 0xad, 0xbe, 0xef];
        mutated.inputs[0].script = Vec::new();
        assert_eq!(
            generate_signature_hash(tx, 0, &script_code(), SIGHASH_ALL),
            generate_signature_hash(mutated, 0, &script_code(), SIGHASH_ALL),
        );
    }

    #[test]
    fn code_separators_never_reach_the_digest() {
        let mut with_separator = script_code();
        with_separator.push_operation(Operation::new(Opcode::CodeSeparator));
        let tx = two_input_tx();
        assert_eq!(
            generate_signature_hash(tx.clone(), 0, &script_code(), SIGHASH_ALL),
            generate_signature_hash(tx, 0, &with_separator, SIGHASH_ALL),
        );
    }

    #[test]
    fn hash_type_changes_the_digest() {
        let tx = two_input_tx();
        let all = generate_signature_hash(tx.clone(), 0, &script_code(), SIGHASH_ALL);
        let none = generate_signature_hash(tx.clone(), 0, &script_code(), SIGHASH_NONE);
        let anyone = generate_signature_hash(
            tx,
            0,
            &script_code(),
            SIGHASH_ALL | SIGHASH_ANYONE_CAN_PAY,
        );
        assert_ne!(all, none);
        assert_ne!(all, anyone);
        assert_ne!(none, anyone);
    }

    #[test]
    fn single_out_of_range_yields_the_one_constant() {
        let tx = two_input_tx();
        let mut expected = [0u8; 32];
        expected[31] = 1;
        // Input 1 exists but output 1 is gone once outputs shrink.
        let mut short = tx.clone();
        short.outputs.truncate(1);
        assert_eq!(
            generate_signature_hash(short, 1, &script_code(), SIGHASH_SINGLE),
            expected
        );
        // In range, the digest is a real hash.
        assert_ne!(
            generate_signature_hash(tx, 1, &script_code(), SIGHASH_SINGLE),
            expected
        );
    }

    #[test]
    fn none_ignores_every_output() {
        let tx = two_input_tx();
        let mut mutated = tx.clone();
        mutated.outputs[0].value = 1;
        mutated.outputs[1].script = vec![0x00];
        assert_eq!(
            generate_signature_hash(tx, 0, &script_code(), SIGHASH_NONE),
            generate_signature_hash(mutated, 0, &script_code(), SIGHASH_NONE),
        );
    }

    #[test]
    fn anyone_can_pay_ignores_other_inputs_entirely() {
        let tx = two_input_tx();
        let mut mutated = tx.clone();
        mutated.inputs[1].previous_output = OutPoint::new(TxHash([0xcc; 32]), 9);
        mutated.inputs[1].sequence = 5;
        let hash_type = SIGHASH_ALL | SIGHASH_ANYONE_CAN_PAY;
        assert_eq!(
            generate_signature_hash(tx, 0, &script_code(), hash_type),
            generate_signature_hash(mutated, 0, &script_code(), hash_type),
        );
    }

    #[test]
    fn out_of_range_input_index_is_defensive() {
        let tx = two_input_tx();
        let mut expected = [0u8; 32];
        expected[31] = 1;
        assert_eq!(
            generate_signature_hash(tx, 7, &script_code(), SIGHASH_ALL),
            expected
        );
    }
}
