//! Construction and recognition of standard locking scripts.

use crate::opcodes::*;

/// Prefix a data blob with the appropriate push opcode.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 5);
    match data.len() {
        0 => out.push(OP_0),
        1..=0x4b => {
            out.push(data.len() as u8);
            out.extend_from_slice(data);
        }
        0x4c..=0xff => {
            out.push(OP_PUSHDATA1);
            out.push(data.len() as u8);
            out.extend_from_slice(data);
        }
        _ => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
    }
    out
}

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn pay_to_pubkey_hash(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// `<pubkey> OP_CHECKSIG`
pub fn pay_to_pubkey_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = push_data(pubkey);
    script.push(OP_CHECKSIG);
    script
}

pub fn is_pay_to_pubkey_hash(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_shape() {
        let script = pay_to_pubkey_hash(&[7u8; 20]);
        assert!(is_pay_to_pubkey_hash(&script));
        assert!(!is_pay_to_pubkey_hash(&script[..24]));
    }

    #[test]
    fn push_data_prefixes() {
        assert_eq!(push_data(&[]), vec![OP_0]);
        assert_eq!(push_data(&[9])[0], 1);
        let long = vec![0xaa; 0x60];
        assert_eq!(push_data(&long)[0], OP_PUSHDATA1);
    }
}
