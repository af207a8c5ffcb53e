//! Stack machine executing one script against a shared evaluation
//! stack.  Failure reasons are deliberately not surfaced; the verdict
//! is the only consensus-visible output.

use chain::Transaction;
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use sha2::{Digest, Sha256};

use crate::opcode::Opcode;
use crate::script::Script;
use crate::sighash::generate_signature_hash;

type Stack = Vec<Vec<u8>>;

/// Execute every operation of `script`, mutating `stack` in place.
/// Returns false as soon as an operation fails.
pub(crate) fn evaluate(
    script: &Script,
    stack: &mut Stack,
    parent_tx: &Transaction,
    input_index: u32,
) -> bool {
    for operation in script.operations() {
        let ok = if operation.code.is_push() {
            stack.push(operation.data.clone());
            true
        } else if let Some(value) = operation.code.numeric_value() {
            stack.push(vec![value]);
            true
        } else {
            match operation.code {
                Opcode::Nop | Opcode::CodeSeparator => true,
                Opcode::Drop => stack.pop().is_some(),
                Opcode::Dup => op_dup(stack),
                Opcode::Sha256 => op_sha256(stack),
                Opcode::Hash160 => op_hash160(stack),
                Opcode::Equal => op_equal(stack),
                Opcode::EqualVerify => op_equal_verify(stack),
                Opcode::CheckSig => op_checksig(stack, script, parent_tx, input_index),
                // CheckMultisig, BadOperation and anything unimplemented.
                _ => false,
            }
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Script truthiness: any non-zero byte, except that a lone sign bit in
/// the final byte still counts as zero.
pub(crate) fn cast_to_bool(data: &[u8]) -> bool {
    for (index, byte) in data.iter().enumerate() {
        if *byte != 0 {
            return !(index == data.len() - 1 && *byte == 0x80);
        }
    }
    false
}

fn op_dup(stack: &mut Stack) -> bool {
    match stack.last() {
        Some(top) => {
            let copy = top.clone();
            stack.push(copy);
            true
        }
        None => false,
    }
}

fn op_sha256(stack: &mut Stack) -> bool {
    match stack.pop() {
        Some(item) => {
            stack.push(Sha256::digest(&item).to_vec());
            true
        }
        None => false,
    }
}

fn op_hash160(stack: &mut Stack) -> bool {
    match stack.pop() {
        Some(item) => {
            stack.push(hash160(&item).to_vec());
            true
        }
        None => false,
    }
}

fn op_equal(stack: &mut Stack) -> bool {
    let Some((a, b)) = pop_two(stack) else {
        return false;
    };
    stack.push(if a == b { vec![1] } else { Vec::new() });
    true
}

fn op_equal_verify(stack: &mut Stack) -> bool {
    match pop_two(stack) {
        Some((a, b)) => a == b,
        None => false,
    }
}

fn pop_two(stack: &mut Stack) -> Option<(Vec<u8>, Vec<u8>)> {
    let a = stack.pop()?;
    let b = stack.pop()?;
    Some((a, b))
}

fn op_checksig(
    stack: &mut Stack,
    script_code: &Script,
    parent_tx: &Transaction,
    input_index: u32,
) -> bool {
    let Some((pubkey, signature)) = pop_two(stack) else {
        return false;
    };
    let valid = check_signature(&signature, &pubkey, script_code, parent_tx, input_index);
    stack.push(if valid { vec![1] } else { Vec::new() });
    true
}

/// Verify an endorsement: the final signature byte selects the hash
/// type, the rest is the DER encoded ECDSA signature.  Malformed keys
/// or signatures verify false rather than aborting the script.
fn check_signature(
    signature: &[u8],
    pubkey: &[u8],
    script_code: &Script,
    parent_tx: &Transaction,
    input_index: u32,
) -> bool {
    let Some((&hash_type_byte, der)) = signature.split_last() else {
        return false;
    };
    let Ok(pubkey) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(der) else {
        return false;
    };
    let sighash = generate_signature_hash(
        parent_tx.clone(),
        input_index,
        script_code,
        u32::from(hash_type_byte),
    );
    let Ok(message) = Message::from_digest_slice(&sighash) else {
        return false;
    };
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// RIPEMD-160 over SHA-256.
pub(crate) fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}
