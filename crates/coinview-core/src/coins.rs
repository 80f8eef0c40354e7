//! The unspent-output state of one transaction and its compact stored form.
//!
//! Stored layout:
//!
//! ```text
//! VARINT(version) | VARINT(code) | mask bytes* | compressed outputs* | VARINT(height)
//! ```
//!
//! `code` packs the coinbase flag (bit 0), whether outputs 0 and 1 are live
//! (bits 1 and 2), and the number of non-zero mask bytes that follow (bits 3+).
//! When neither output 0 nor 1 is live the stored count is one less, since at
//! least one mask byte must then be non-zero. Each mask byte covers eight
//! outputs starting at index 2, one bit per live output.

use serde::Serialize;

use crate::compressor::{CoreCompressor, OutputCompressor};
use crate::encode::{ByteReader, write_varint};
use crate::error::CodecError;
use crate::types::{Transaction, TxOut};
use crate::undo::{CoinMeta, SpentOutput};

/// Unspent outputs of one transaction.
///
/// Trailing spent slots are always trimmed, so a record with no live outputs
/// has no slots at all and is "pruned".
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoinRecord {
    is_coinbase: bool,
    outputs: Vec<Option<TxOut>>,
    height: u32,
    version: u32,
    total_unspent_value: u64,
}

impl CoinRecord {
    pub fn new(is_coinbase: bool, outputs: Vec<Option<TxOut>>, height: u32, version: u32) -> Self {
        let mut record = Self {
            is_coinbase,
            outputs,
            height,
            version,
            total_unspent_value: 0,
        };
        record.cleanup();
        record
    }

    /// Outputs of `tx` as created at `height`. Unspendable outputs start spent.
    pub fn from_transaction(tx: &Transaction, height: u32) -> Self {
        let mut record = Self::new(
            tx.is_coinbase(),
            tx.outputs.iter().cloned().map(Some).collect(),
            height,
            tx.version,
        );
        record.clear_unspendable();
        record
    }

    /// A pruned record carrying the metadata of a fully spent transaction,
    /// ready for its outputs to be restored.
    pub fn from_meta(meta: CoinMeta) -> Self {
        Self::new(meta.is_coinbase, Vec::new(), meta.height, meta.version)
    }

    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn outputs(&self) -> &[Option<TxOut>] {
        &self.outputs
    }

    pub fn output(&self, vout: u32) -> Option<&TxOut> {
        self.outputs.get(vout as usize).and_then(Option::as_ref)
    }

    /// Live outputs with their indices.
    pub fn live_outputs(&self) -> impl Iterator<Item = (u32, &TxOut)> {
        self.outputs
            .iter()
            .enumerate()
            .filter_map(|(i, out)| out.as_ref().map(|o| (i as u32, o)))
    }

    pub fn total_unspent_value(&self) -> u64 {
        self.total_unspent_value
    }

    pub fn meta(&self) -> CoinMeta {
        CoinMeta {
            height: self.height,
            version: self.version,
            is_coinbase: self.is_coinbase,
        }
    }

    pub fn is_available(&self, vout: u32) -> bool {
        self.output(vout).is_some()
    }

    pub fn is_pruned(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Mark output `vout` spent.
    ///
    /// Returns the snapshot needed to undo the spend, or `None` if the output
    /// was not live. The snapshot carries the record's metadata only when this
    /// spend pruned the record.
    pub fn spend(&mut self, vout: u32) -> Option<SpentOutput> {
        let output = self.outputs.get_mut(vout as usize)?.take()?;
        self.cleanup();
        let creation = self.is_pruned().then(|| self.meta());
        Some(SpentOutput { output, creation })
    }

    /// Put `output` back into slot `vout`. Returns false, changing nothing,
    /// if the slot is already live.
    pub fn restore(&mut self, vout: u32, output: TxOut) -> bool {
        if self.is_available(vout) {
            return false;
        }
        let idx = vout as usize;
        if self.outputs.len() <= idx {
            self.outputs.resize(idx + 1, None);
        }
        self.outputs[idx] = Some(output);
        self.cleanup();
        true
    }

    /// Null every provably unspendable output.
    pub fn clear_unspendable(&mut self) {
        for slot in &mut self.outputs {
            if slot.as_ref().is_some_and(TxOut::is_unspendable) {
                *slot = None;
            }
        }
        self.cleanup();
    }

    fn cleanup(&mut self) {
        while matches!(self.outputs.last(), Some(None)) {
            self.outputs.pop();
        }
        if self.outputs.is_empty() {
            self.outputs = Vec::new();
        }
        self.total_unspent_value = self
            .outputs
            .iter()
            .flatten()
            .fold(0u64, |acc, out| acc.saturating_add(out.value));
    }

    /// Mask bytes needed to cover outputs from index 2 onward, and how many of
    /// them are non-zero.
    fn mask_size(&self) -> (usize, usize) {
        let mut last_used = 0;
        let mut nonzero = 0;
        let tail = self.outputs.get(2..).unwrap_or(&[]);
        for (b, group) in tail.chunks(8).enumerate() {
            if group.iter().any(|slot| slot.is_some()) {
                last_used = b + 1;
                nonzero += 1;
            }
        }
        (last_used, nonzero)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        self.encode_with(&CoreCompressor)
    }

    pub fn encode_with<C: OutputCompressor + ?Sized>(&self, compressor: &C) -> Result<Vec<u8>, CodecError> {
        if self.is_pruned() {
            return Err(CodecError::PrunedRecord);
        }
        let (mask_bytes, mask_code) = self.mask_size();
        let first = self.is_available(0);
        let second = self.is_available(1);
        let code = 8 * (mask_code as u64 - u64::from(!(first || second)))
            + u64::from(self.is_coinbase)
            + if first { 2 } else { 0 }
            + if second { 4 } else { 0 };

        let mut buf = Vec::with_capacity(16 + 24 * self.outputs.len());
        write_varint(&mut buf, u64::from(self.version));
        write_varint(&mut buf, code);
        for b in 0..mask_bytes {
            let mut avail = 0u8;
            for i in 0..8 {
                if self.is_available((2 + b * 8 + i) as u32) {
                    avail |= 1 << i;
                }
            }
            buf.push(avail);
        }
        for out in self.outputs.iter().flatten() {
            compressor.write_output(&mut buf, out)?;
        }
        write_varint(&mut buf, u64::from(self.height));
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::decode_with(bytes, &CoreCompressor)
    }

    pub fn decode_with<C: OutputCompressor + ?Sized>(bytes: &[u8], compressor: &C) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.read_varint_u32()?;
        let code = reader.read_varint()?;
        let is_coinbase = code & 1 != 0;
        let mut avail = vec![code & 2 != 0, code & 4 != 0];
        let mut mask_code = code / 8 + u64::from(code & 6 == 0);
        while mask_code > 0 {
            let byte = reader.read_u8()?;
            avail.extend((0..8).map(|p| byte & (1 << p) != 0));
            if byte != 0 {
                mask_code -= 1;
            }
        }
        let mut outputs = Vec::with_capacity(avail.len());
        for live in avail {
            outputs.push(if live { Some(compressor.read_output(&mut reader)?) } else { None });
        }
        let height = reader.read_varint_u32()?;
        reader.finish()?;
        Ok(Self::new(is_coinbase, outputs, height, version))
    }
}

/// Two pruned records are equal whatever their metadata.
impl PartialEq for CoinRecord {
    fn eq(&self, other: &Self) -> bool {
        if self.is_pruned() && other.is_pruned() {
            return true;
        }
        self.is_coinbase == other.is_coinbase
            && self.height == other.height
            && self.version == other.version
            && self.outputs == other.outputs
    }
}

impl Eq for CoinRecord {}
