//! Stack evaluation for the supported script subset.

use basaltd_consensus::constants::{MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE};
use basaltd_primitives::hash::{hash160, sha256, sha256d};
use basaltd_primitives::transaction::Transaction;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};

use crate::opcodes::*;
use crate::sigcache::SignatureCache;
use crate::sighash::{signature_hash, SighashError, SIGHASH_ALL};

const MAX_STACK_SIZE: usize = 1_000;
const MAX_OPS_PER_SCRIPT: usize = 201;
const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptError {
    ScriptTooLarge,
    PushSizeExceeded,
    OpCountExceeded,
    StackOverflow,
    StackUnderflow,
    BadOpcode(u8),
    UnbalancedPush,
    PushOnlyRequired,
    VerifyFailed,
    ReturnEncountered,
    EvalFalse,
    InvalidSignatureEncoding,
    InvalidPublicKey,
    SignatureCheckFailed,
    PubkeyCountOutOfRange,
    SigCountOutOfRange,
    NumberOutOfRange,
    InputIndexOutOfRange,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::ScriptTooLarge => write!(f, "script exceeds size limit"),
            ScriptError::PushSizeExceeded => write!(f, "push exceeds element size limit"),
            ScriptError::OpCountExceeded => write!(f, "operation count exceeded"),
            ScriptError::StackOverflow => write!(f, "stack size exceeded"),
            ScriptError::StackUnderflow => write!(f, "stack underflow"),
            ScriptError::BadOpcode(opcode) => write!(f, "bad opcode {opcode:#04x}"),
            ScriptError::UnbalancedPush => write!(f, "push runs past end of script"),
            ScriptError::PushOnlyRequired => write!(f, "scriptSig must be push-only"),
            ScriptError::VerifyFailed => write!(f, "verify failed"),
            ScriptError::ReturnEncountered => write!(f, "OP_RETURN in executed branch"),
            ScriptError::EvalFalse => write!(f, "script evaluated to false"),
            ScriptError::InvalidSignatureEncoding => write!(f, "invalid signature encoding"),
            ScriptError::InvalidPublicKey => write!(f, "invalid public key"),
            ScriptError::SignatureCheckFailed => write!(f, "signature check failed"),
            ScriptError::PubkeyCountOutOfRange => write!(f, "pubkey count out of range"),
            ScriptError::SigCountOutOfRange => write!(f, "signature count out of range"),
            ScriptError::NumberOutOfRange => write!(f, "script number out of range"),
            ScriptError::InputIndexOutOfRange => write!(f, "input index out of range"),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<SighashError> for ScriptError {
    fn from(err: SighashError) -> Self {
        match err {
            SighashError::InputIndexOutOfRange => ScriptError::InputIndexOutOfRange,
            SighashError::UnsupportedHashType(_) => ScriptError::InvalidSignatureEncoding,
        }
    }
}

/// One parsed script instruction.
enum Instruction<'a> {
    Push(&'a [u8]),
    Op(u8),
}

struct InstructionIter<'a> {
    script: &'a [u8],
    cursor: usize,
}

impl<'a> InstructionIter<'a> {
    fn new(script: &'a [u8]) -> Self {
        Self { script, cursor: 0 }
    }

    fn next_instruction(&mut self) -> Option<Result<Instruction<'a>, ScriptError>> {
        if self.cursor >= self.script.len() {
            return None;
        }
        let opcode = self.script[self.cursor];
        self.cursor += 1;
        let push_len = match opcode {
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => match self.take(1) {
                Some(bytes) => Some(bytes[0] as usize),
                None => return Some(Err(ScriptError::UnbalancedPush)),
            },
            OP_PUSHDATA2 => match self.take(2) {
                Some(bytes) => Some(u16::from_le_bytes([bytes[0], bytes[1]]) as usize),
                None => return Some(Err(ScriptError::UnbalancedPush)),
            },
            OP_PUSHDATA4 => match self.take(4) {
                Some(bytes) => {
                    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
                }
                None => return Some(Err(ScriptError::UnbalancedPush)),
            },
            _ => None,
        };
        match push_len {
            Some(length) => {
                if length > MAX_SCRIPT_ELEMENT_SIZE {
                    return Some(Err(ScriptError::PushSizeExceeded));
                }
                match self.take(length) {
                    Some(bytes) => Some(Ok(Instruction::Push(bytes))),
                    None => Some(Err(ScriptError::UnbalancedPush)),
                }
            }
            None => Some(Ok(Instruction::Op(opcode))),
        }
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        if self.script.len() - self.cursor < count {
            return None;
        }
        let slice = &self.script[self.cursor..self.cursor + count];
        self.cursor += count;
        Some(slice)
    }
}

fn is_push_only(script: &[u8]) -> Result<(), ScriptError> {
    let mut iter = InstructionIter::new(script);
    while let Some(instruction) = iter.next_instruction() {
        match instruction? {
            Instruction::Push(_) => {}
            // OP_0 through OP_16 and OP_1NEGATE also only push data.
            Instruction::Op(op) if op == OP_0 || op == OP_1NEGATE || (OP_1..=OP_16).contains(&op) => {}
            Instruction::Op(_) => return Err(ScriptError::PushOnlyRequired),
        }
    }
    Ok(())
}

fn cast_to_bool(element: &[u8]) -> bool {
    for (index, byte) in element.iter().enumerate() {
        if *byte != 0 {
            // Negative zero counts as false.
            return !(index == element.len() - 1 && *byte == 0x80);
        }
    }
    false
}

/// Minimal-size script number decoding, limited to four bytes.
pub fn decode_script_num(element: &[u8]) -> Result<i64, ScriptError> {
    if element.len() > 4 {
        return Err(ScriptError::NumberOutOfRange);
    }
    if element.is_empty() {
        return Ok(0);
    }
    let mut value = 0i64;
    for (index, byte) in element.iter().enumerate() {
        value |= i64::from(*byte & if index == element.len() - 1 { 0x7f } else { 0xff })
            << (8 * index);
    }
    if element[element.len() - 1] & 0x80 != 0 {
        value = -value;
    }
    Ok(value)
}

pub fn encode_script_num(mut value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    if negative {
        value = -value;
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push((value & 0xff) as u8);
        value >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

struct SigChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    script_code: &'a [u8],
    cache: Option<&'a SignatureCache>,
}

impl SigChecker<'_> {
    /// Verify one signature/pubkey pair, consulting the cache first.
    fn check_signature(&self, signature: &[u8], pubkey: &[u8]) -> Result<bool, ScriptError> {
        let Some((der, hash_type)) = signature.split_last().map(|(last, rest)| (rest, *last))
        else {
            return Ok(false);
        };
        if hash_type != SIGHASH_ALL {
            return Err(ScriptError::InvalidSignatureEncoding);
        }

        let cache_key = self.cache.map(|_| {
            SignatureCache::entry_key(
                &self.tx.txid(),
                self.input_index as u32,
                self.script_code,
                signature,
                pubkey,
            )
        });
        if let (Some(cache), Some(key)) = (self.cache, cache_key.as_ref()) {
            if cache.contains(key) {
                return Ok(true);
            }
        }

        let Ok(parsed_sig) = Signature::from_der(der) else {
            return Ok(false);
        };
        let Ok(parsed_key) = PublicKey::from_slice(pubkey) else {
            return Err(ScriptError::InvalidPublicKey);
        };
        let digest = signature_hash(self.tx, self.input_index, self.script_code, hash_type)?;
        let message = Message::from_digest(digest);
        let secp = Secp256k1::verification_only();
        let ok = secp.verify_ecdsa(&message, &parsed_sig, &parsed_key).is_ok();
        if ok {
            if let (Some(cache), Some(key)) = (self.cache, cache_key) {
                cache.insert(key);
            }
        }
        Ok(ok)
    }
}

fn eval_script(
    script: &[u8],
    stack: &mut Vec<Vec<u8>>,
    checker: &SigChecker<'_>,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptTooLarge);
    }
    let mut op_count = 0usize;
    let mut iter = InstructionIter::new(script);
    while let Some(instruction) = iter.next_instruction() {
        match instruction? {
            Instruction::Push(bytes) => {
                push(stack, bytes.to_vec())?;
            }
            Instruction::Op(opcode) => {
                if opcode > OP_16 {
                    op_count += 1;
                    if op_count > MAX_OPS_PER_SCRIPT {
                        return Err(ScriptError::OpCountExceeded);
                    }
                }
                match opcode {
                    OP_0 => push(stack, Vec::new())?,
                    OP_1NEGATE => push(stack, encode_script_num(-1))?,
                    OP_1..=OP_16 => {
                        let value = i64::from(opcode - OP_1 + 1);
                        push(stack, encode_script_num(value))?;
                    }
                    OP_NOP => {}
                    OP_VERIFY => {
                        let top = pop(stack)?;
                        if !cast_to_bool(&top) {
                            return Err(ScriptError::VerifyFailed);
                        }
                    }
                    OP_RETURN => return Err(ScriptError::ReturnEncountered),
                    OP_DROP => {
                        pop(stack)?;
                    }
                    OP_DUP => {
                        let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
                        push(stack, top)?;
                    }
                    OP_SWAP => {
                        let len = stack.len();
                        if len < 2 {
                            return Err(ScriptError::StackUnderflow);
                        }
                        stack.swap(len - 1, len - 2);
                    }
                    OP_EQUAL | OP_EQUALVERIFY => {
                        let b = pop(stack)?;
                        let a = pop(stack)?;
                        let equal = a == b;
                        if opcode == OP_EQUALVERIFY {
                            if !equal {
                                return Err(ScriptError::VerifyFailed);
                            }
                        } else {
                            push(stack, bool_element(equal))?;
                        }
                    }
                    OP_SHA256 => {
                        let top = pop(stack)?;
                        push(stack, sha256(&top).to_vec())?;
                    }
                    OP_HASH160 => {
                        let top = pop(stack)?;
                        push(stack, hash160(&top).to_vec())?;
                    }
                    OP_HASH256 => {
                        let top = pop(stack)?;
                        push(stack, sha256d(&top).to_vec())?;
                    }
                    OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                        let pubkey = pop(stack)?;
                        let signature = pop(stack)?;
                        let ok = checker.check_signature(&signature, &pubkey)?;
                        if opcode == OP_CHECKSIGVERIFY {
                            if !ok {
                                return Err(ScriptError::SignatureCheckFailed);
                            }
                        } else {
                            push(stack, bool_element(ok))?;
                        }
                    }
                    OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                        let key_count = decode_script_num(&pop(stack)?)?;
                        if !(0..=MAX_PUBKEYS_PER_MULTISIG as i64).contains(&key_count) {
                            return Err(ScriptError::PubkeyCountOutOfRange);
                        }
                        op_count += key_count as usize;
                        if op_count > MAX_OPS_PER_SCRIPT {
                            return Err(ScriptError::OpCountExceeded);
                        }
                        let mut pubkeys = Vec::with_capacity(key_count as usize);
                        for _ in 0..key_count {
                            pubkeys.push(pop(stack)?);
                        }
                        pubkeys.reverse();
                        let sig_count = decode_script_num(&pop(stack)?)?;
                        if sig_count < 0 || sig_count > key_count {
                            return Err(ScriptError::SigCountOutOfRange);
                        }
                        let mut signatures = Vec::with_capacity(sig_count as usize);
                        for _ in 0..sig_count {
                            signatures.push(pop(stack)?);
                        }
                        signatures.reverse();
                        // Historical off-by-one: one extra element is consumed.
                        pop(stack)?;

                        let mut key_cursor = 0usize;
                        let mut ok = true;
                        for signature in &signatures {
                            let mut matched = false;
                            while key_cursor < pubkeys.len() {
                                let candidate = &pubkeys[key_cursor];
                                key_cursor += 1;
                                if checker.check_signature(signature, candidate)? {
                                    matched = true;
                                    break;
                                }
                            }
                            if !matched {
                                ok = false;
                                break;
                            }
                        }
                        if opcode == OP_CHECKMULTISIGVERIFY {
                            if !ok {
                                return Err(ScriptError::SignatureCheckFailed);
                            }
                        } else {
                            push(stack, bool_element(ok))?;
                        }
                    }
                    other => return Err(ScriptError::BadOpcode(other)),
                }
            }
        }
    }
    Ok(())
}

fn push(stack: &mut Vec<Vec<u8>>, element: Vec<u8>) -> Result<(), ScriptError> {
    if element.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(ScriptError::PushSizeExceeded);
    }
    if stack.len() >= MAX_STACK_SIZE {
        return Err(ScriptError::StackOverflow);
    }
    stack.push(element);
    Ok(())
}

fn pop(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::StackUnderflow)
}

fn bool_element(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

/// Verify one input: run the unlocking script, then the locking script
/// over the resulting stack, and require a truthy final top element.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    tx: &Transaction,
    input_index: usize,
    cache: Option<&SignatureCache>,
) -> Result<(), ScriptError> {
    if script_sig.len() > MAX_SCRIPT_SIZE || script_pubkey.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptTooLarge);
    }
    if input_index >= tx.vin.len() {
        return Err(ScriptError::InputIndexOutOfRange);
    }
    is_push_only(script_sig)?;

    let checker = SigChecker {
        tx,
        input_index,
        script_code: script_pubkey,
        cache,
    };
    let mut stack: Vec<Vec<u8>> = Vec::new();
    eval_script(script_sig, &mut stack, &checker)?;
    eval_script(script_pubkey, &mut stack, &checker)?;
    match stack.last() {
        Some(top) if cast_to_bool(top) => Ok(()),
        _ => Err(ScriptError::EvalFalse),
    }
}

/// Signature-operation cost of a script. With `accurate`, a multisig
/// preceded by a small-integer push counts that many operations instead
/// of the worst-case twenty.
pub fn count_sigops(script: &[u8], accurate: bool) -> u32 {
    let mut count = 0u32;
    let mut previous_op: Option<u8> = None;
    let mut iter = InstructionIter::new(script);
    while let Some(instruction) = iter.next_instruction() {
        let Ok(instruction) = instruction else {
            // Unparseable tails still count what was seen so far.
            break;
        };
        match instruction {
            Instruction::Push(_) => previous_op = None,
            Instruction::Op(opcode) => {
                match opcode {
                    OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                    OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                        count += match previous_op {
                            Some(op) if accurate && (OP_1..=OP_16).contains(&op) => {
                                u32::from(op - OP_1 + 1)
                            }
                            _ => MAX_PUBKEYS_PER_MULTISIG as u32,
                        };
                    }
                    _ => {}
                }
                previous_op = Some(opcode);
            }
        }
    }
    count
}
