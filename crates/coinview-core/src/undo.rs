//! Rollback records written when a block is connected.
//!
//! For every input a block spends, a [`SpentOutput`] captures the output as it
//! was. A [`BlockUndo`] holds one [`TxUndo`] per non-coinbase transaction, in
//! block order. Stored undo records are sealed with a SHA-256d checksum over
//! the previous block hash and the record bytes.

use serde::Serialize;

use crate::compressor::{CoreCompressor, OutputCompressor};
use crate::encode::{ByteReader, sha256d, write_compact_size, write_varint};
use crate::error::CodecError;
use crate::types::{Hash256, TxOut};

/// Creation metadata of a transaction's outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoinMeta {
    pub height: u32,
    pub version: u32,
    pub is_coinbase: bool,
}

/// One output as it was before an input spent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpentOutput {
    pub output: TxOut,
    /// Present only when the spend emptied the owning record, so that the
    /// record can be rebuilt on disconnect.
    pub creation: Option<CoinMeta>,
}

impl SpentOutput {
    fn write<C: OutputCompressor + ?Sized>(&self, buf: &mut Vec<u8>, compressor: &C) -> Result<(), CodecError> {
        match self.creation {
            Some(meta) => {
                write_varint(buf, u64::from(meta.height) * 2 + u64::from(meta.is_coinbase));
                if meta.height > 0 {
                    write_varint(buf, u64::from(meta.version));
                }
            }
            None => write_varint(buf, 0),
        }
        compressor.write_output(buf, &self.output)
    }

    fn read<C: OutputCompressor + ?Sized>(reader: &mut ByteReader<'_>, compressor: &C) -> Result<Self, CodecError> {
        let code = reader.read_varint()?;
        let height = u32::try_from(code / 2).map_err(|_| CodecError::ValueOutOfRange {
            value: code / 2,
            target: "u32",
        })?;
        let creation = if height > 0 {
            Some(CoinMeta {
                height,
                version: reader.read_varint_u32()?,
                is_coinbase: code & 1 != 0,
            })
        } else {
            None
        };
        let output = compressor.read_output(reader)?;
        Ok(Self { output, creation })
    }
}

/// Snapshots for one transaction, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxUndo {
    pub spent: Vec<SpentOutput>,
}

/// Snapshots for one block, one entry per non-coinbase transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockUndo {
    pub txs: Vec<TxUndo>,
}

impl BlockUndo {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        self.encode_with(&CoreCompressor)
    }

    pub fn encode_with<C: OutputCompressor + ?Sized>(&self, compressor: &C) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, self.txs.len() as u64);
        for tx in &self.txs {
            write_compact_size(&mut buf, tx.spent.len() as u64);
            for spent in &tx.spent {
                spent.write(&mut buf, compressor)?;
            }
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::decode_with(bytes, &CoreCompressor)
    }

    pub fn decode_with<C: OutputCompressor + ?Sized>(bytes: &[u8], compressor: &C) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let tx_count = reader.read_compact_size()?;
        let mut txs = Vec::new();
        for _ in 0..tx_count {
            let input_count = reader.read_compact_size()?;
            let mut spent = Vec::new();
            for _ in 0..input_count {
                spent.push(SpentOutput::read(&mut reader, compressor)?);
            }
            txs.push(TxUndo { spent });
        }
        reader.finish()?;
        Ok(Self { txs })
    }

    /// Number of inputs covered.
    pub fn input_count(&self) -> usize {
        self.txs.iter().map(|tx| tx.spent.len()).sum()
    }
}

/// Checksum binding an undo record to the block it follows.
pub fn undo_checksum(prev_block: &Hash256, body: &[u8]) -> Hash256 {
    let mut data = Vec::with_capacity(32 + body.len());
    data.extend_from_slice(prev_block.as_bytes());
    data.extend_from_slice(body);
    sha256d(&data)
}

/// Stored form: `encode(undo) || checksum(prev_block, encode(undo))`.
pub fn seal(prev_block: &Hash256, undo: &BlockUndo) -> Result<Vec<u8>, CodecError> {
    let mut bytes = undo.encode()?;
    let checksum = undo_checksum(prev_block, &bytes);
    bytes.extend_from_slice(checksum.as_bytes());
    Ok(bytes)
}

/// Verify the checksum of a sealed record, then decode it.
pub fn open(prev_block: &Hash256, sealed: &[u8]) -> Result<BlockUndo, CodecError> {
    let Some(split) = sealed.len().checked_sub(32) else {
        return Err(CodecError::UnexpectedEof { needed: 32 - sealed.len() });
    };
    let (body, checksum) = sealed.split_at(split);
    if undo_checksum(prev_block, body).as_bytes()[..] != *checksum {
        return Err(CodecError::ChecksumMismatch);
    }
    BlockUndo::decode(body)
}
