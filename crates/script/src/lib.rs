//! Script execution engine for transaction spend authorization.
//!
//! Raw script bytes parse into operation sequences; an input/output
//! script pair evaluates over a shared stack; `OP_CHECKSIG` verifies an
//! ECDSA signature against the transaction signature hash.  Everything
//! here is a pure function of the scripts, the spending transaction and
//! the input index — networking never reaches into this crate.

mod engine;
mod opcode;
mod script;
mod sighash;

use thiserror::Error;

pub use opcode::Opcode;
pub use script::{coinbase_script, parse_script, save_script, Operation, PaymentType, Script};
pub use sighash::{
    generate_signature_hash, SIGHASH_ALL, SIGHASH_ANYONE_CAN_PAY, SIGHASH_NONE, SIGHASH_SINGLE,
};

/// Parse-level faults.  Execution verdicts are plain booleans; the
/// engine never reports why a script failed.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script ends inside a push of {0} bytes")]
    TruncatedPush(usize),
}
