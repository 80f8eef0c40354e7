//! Output compression for stored coin and undo records.
//!
//! The CoinRecord and undo codecs treat the compressor as a black box behind
//! [`OutputCompressor`]. [`CoreCompressor`] is byte-exact with the layout
//! existing chainstate databases use: a VARINT-encoded compressed amount
//! followed by a template-compressed script.

use secp256k1::PublicKey;

use crate::constants::{
    MAX_MONEY, MAX_SCRIPT_SIZE, OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
    OP_RETURN,
};
use crate::encode::{ByteReader, write_varint};
use crate::error::CodecError;
use crate::types::TxOut;

/// Number of script templates with a one-byte tag instead of a length.
const SPECIAL_SCRIPTS: u32 = 6;

/// Encodes one output (amount + script) into a compact byte form.
pub trait OutputCompressor {
    fn write_output(&self, buf: &mut Vec<u8>, output: &TxOut) -> Result<(), CodecError>;

    fn read_output(&self, reader: &mut ByteReader<'_>) -> Result<TxOut, CodecError>;

    fn compress(&self, output: &TxOut) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(output.script_pubkey.len() + 9);
        self.write_output(&mut buf, output)?;
        Ok(buf)
    }

    /// Decode exactly one output; trailing bytes are an error.
    fn decompress(&self, bytes: &[u8]) -> Result<TxOut, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let output = self.read_output(&mut reader)?;
        reader.finish()?;
        Ok(output)
    }
}

/// The standard amount and script compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreCompressor;

impl OutputCompressor for CoreCompressor {
    fn write_output(&self, buf: &mut Vec<u8>, output: &TxOut) -> Result<(), CodecError> {
        write_varint(buf, compress_amount(output.value)?);
        match compress_script(&output.script_pubkey) {
            Some(compressed) => buf.extend_from_slice(&compressed),
            None => {
                write_varint(buf, output.script_pubkey.len() as u64 + u64::from(SPECIAL_SCRIPTS));
                buf.extend_from_slice(&output.script_pubkey);
            }
        }
        Ok(())
    }

    fn read_output(&self, reader: &mut ByteReader<'_>) -> Result<TxOut, CodecError> {
        let value = decompress_amount(reader.read_varint()?)?;
        let size = reader.read_varint_u32()?;
        let script_pubkey = if size < SPECIAL_SCRIPTS {
            let payload = reader.read_bytes(special_size(size))?;
            decompress_script(size as u8, payload)?
        } else {
            let len = (size - SPECIAL_SCRIPTS) as usize;
            if len > MAX_SCRIPT_SIZE {
                reader.skip(len)?;
                vec![OP_RETURN]
            } else {
                reader.read_bytes(len)?.to_vec()
            }
        };
        Ok(TxOut { value, script_pubkey })
    }
}

/// Compress an amount. Defined for `0 <= value <= MAX_MONEY`.
///
/// Trailing decimal zeros are folded into an exponent so round amounts take
/// one or two bytes once VARINT-encoded.
pub fn compress_amount(value: u64) -> Result<u64, CodecError> {
    if value > MAX_MONEY {
        return Err(CodecError::AmountOutOfRange(value));
    }
    if value == 0 {
        return Ok(0);
    }
    let mut n = value;
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    Ok(if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    })
}

pub fn decompress_amount(x: u64) -> Result<u64, CodecError> {
    if x == 0 {
        return Ok(0);
    }
    let overflow = || CodecError::AmountOverflow(x);
    let mut x1 = x - 1;
    let e = x1 % 10;
    x1 /= 10;
    let mut n = if e < 9 {
        let d = (x1 % 9) + 1;
        x1 /= 9;
        x1.checked_mul(10).and_then(|v| v.checked_add(d)).ok_or_else(overflow)?
    } else {
        x1 + 1
    };
    for _ in 0..e {
        n = n.checked_mul(10).ok_or_else(overflow)?;
    }
    Ok(n)
}

fn special_size(tag: u32) -> usize {
    match tag {
        0 | 1 => 20,
        _ => 32,
    }
}

fn compress_script(script: &[u8]) -> Option<Vec<u8>> {
    match script.len() {
        // P2PKH
        25 if script[0] == OP_DUP
            && script[1] == OP_HASH160
            && script[2] == 20
            && script[23] == OP_EQUALVERIFY
            && script[24] == OP_CHECKSIG =>
        {
            let mut out = Vec::with_capacity(21);
            out.push(0x00);
            out.extend_from_slice(&script[3..23]);
            Some(out)
        }
        // P2SH
        23 if script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL => {
            let mut out = Vec::with_capacity(21);
            out.push(0x01);
            out.extend_from_slice(&script[2..22]);
            Some(out)
        }
        // P2PK, compressed key
        35 if script[0] == 33
            && script[34] == OP_CHECKSIG
            && (script[1] == 0x02 || script[1] == 0x03) =>
        {
            Some(script[1..34].to_vec())
        }
        // P2PK, uncompressed key; only points on the curve are compressible.
        67 if script[0] == 65
            && script[66] == OP_CHECKSIG
            && script[1] == 0x04
            && PublicKey::from_slice(&script[1..66]).is_ok() =>
        {
            let mut out = Vec::with_capacity(33);
            out.push(0x04 | (script[65] & 0x01));
            out.extend_from_slice(&script[2..34]);
            Some(out)
        }
        _ => None,
    }
}

fn decompress_script(tag: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut script = Vec::with_capacity(67);
    match tag {
        0x00 => {
            script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
            script.extend_from_slice(payload);
            script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        }
        0x01 => {
            script.extend_from_slice(&[OP_HASH160, 20]);
            script.extend_from_slice(payload);
            script.push(OP_EQUAL);
        }
        0x02 | 0x03 => {
            script.extend_from_slice(&[33, tag]);
            script.extend_from_slice(payload);
            script.push(OP_CHECKSIG);
        }
        _ => {
            let mut compressed = [0u8; 33];
            compressed[0] = tag - 2;
            compressed[1..].copy_from_slice(payload);
            let key = PublicKey::from_slice(&compressed).map_err(|_| CodecError::InvalidPublicKey)?;
            script.push(65);
            script.extend_from_slice(&key.serialize_uncompressed());
            script.push(OP_CHECKSIG);
        }
    }
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    const GENESIS_PUBKEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

    fn p2pkh(hash: [u8; 20]) -> Vec<u8> {
        let mut s = vec![OP_DUP, OP_HASH160, 20];
        s.extend_from_slice(&hash);
        s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        s
    }

    // ----- Amounts -----

    #[test]
    fn amount_known_values() {
        let cases = [
            (0, 0),
            (1, 1),
            (1_000_000, 7),
            (COIN, 9),
            (50 * COIN, 50),
            (21_000_000 * COIN, 21_000_000),
        ];
        for (value, compressed) in cases {
            assert_eq!(compress_amount(value).unwrap(), compressed, "compress {value}");
            assert_eq!(decompress_amount(compressed).unwrap(), value, "decompress {compressed}");
        }
    }

    #[test]
    fn amount_above_max_money_rejected() {
        assert_eq!(
            compress_amount(MAX_MONEY + 1),
            Err(CodecError::AmountOutOfRange(MAX_MONEY + 1))
        );
    }

    #[test]
    fn amount_decompress_overflow_detected() {
        assert!(matches!(decompress_amount(u64::MAX), Err(CodecError::AmountOverflow(_))));
    }

    // ----- Scripts -----

    #[test]
    fn p2pkh_uses_template() {
        let out = TxOut { value: 60_000_000_000, script_pubkey: p2pkh([0xab; 20]) };
        let bytes = CoreCompressor.compress(&out).unwrap();
        // amount, tag, hash
        assert_eq!(bytes.len(), 2 + 1 + 20);
        assert_eq!(bytes[2], 0x00);
        assert_eq!(CoreCompressor.decompress(&bytes).unwrap(), out);
    }

    #[test]
    fn p2sh_uses_template() {
        let mut script = vec![OP_HASH160, 20];
        script.extend_from_slice(&[0x11; 20]);
        script.push(OP_EQUAL);
        let out = TxOut { value: 5, script_pubkey: script };
        let bytes = CoreCompressor.compress(&out).unwrap();
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes.len(), 22);
        assert_eq!(CoreCompressor.decompress(&bytes).unwrap(), out);
    }

    #[test]
    fn uncompressed_p2pk_recovers_full_key() {
        let mut script = vec![65];
        script.extend(hex::decode(GENESIS_PUBKEY).unwrap());
        script.push(OP_CHECKSIG);
        let out = TxOut { value: 50 * COIN, script_pubkey: script };

        let bytes = CoreCompressor.compress(&out).unwrap();
        assert_eq!(bytes.len(), 1 + 33);
        // Odd y coordinate.
        assert_eq!(bytes[1], 0x05);
        assert_eq!(CoreCompressor.decompress(&bytes).unwrap(), out);
    }

    #[test]
    fn off_curve_key_stored_raw() {
        let mut script = vec![65, 0x04];
        script.extend_from_slice(&[0u8; 64]);
        script.push(OP_CHECKSIG);
        let out = TxOut { value: 1, script_pubkey: script.clone() };
        let bytes = CoreCompressor.compress(&out).unwrap();
        assert_eq!(bytes[1], 67 + 6);
        assert_eq!(&bytes[2..], script.as_slice());
        assert_eq!(CoreCompressor.decompress(&bytes).unwrap(), out);
    }

    #[test]
    fn oversized_script_reads_as_op_return() {
        let out = TxOut { value: 0, script_pubkey: vec![0x51; MAX_SCRIPT_SIZE + 1] };
        let bytes = CoreCompressor.compress(&out).unwrap();
        let decoded = CoreCompressor.decompress(&bytes).unwrap();
        assert_eq!(decoded.script_pubkey, vec![OP_RETURN]);
    }

    #[test]
    fn truncated_script_fails() {
        // Amount 0, raw script of length 1 with no payload.
        assert!(matches!(
            CoreCompressor.decompress(&[0x00, 0x07]),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn invalid_compressed_point_rejected() {
        let mut bytes = vec![0x00, 0x04];
        bytes.extend_from_slice(&[0xff; 32]);
        assert_eq!(CoreCompressor.decompress(&bytes), Err(CodecError::InvalidPublicKey));
    }
}
