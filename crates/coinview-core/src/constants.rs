//! Protocol constants. All monetary values in base units (1 coin = 10^8 units).

pub const COIN: u64 = 100_000_000;

/// Largest amount any single output or sum of outputs may carry.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

pub const INITIAL_SUBSIDY: u64 = 50 * COIN;
pub const HALVING_INTERVAL: u32 = 210_000;
pub const COINBASE_MATURITY: u32 = 100;
pub const MAX_BLOCK_SIGOPS: usize = 20_000;

/// Scripts longer than this are unspendable.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Pay-to-script-hash enforcement starts with blocks timestamped at or after this.
pub const BIP16_SWITCH_TIME: u32 = 1_333_238_400;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// Sigops charged for a bare CHECKMULTISIG when the key count is not counted accurately.
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Returns true if `value` is a valid amount.
pub fn money_range(value: u64) -> bool {
    value <= MAX_MONEY
}
