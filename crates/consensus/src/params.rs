//! Per-network chain parameters.
//!
//! Economic parameters (block size, subsidy schedule, maturity) are
//! configuration rather than hard-coded rules so that independent chain
//! instances can be stood up for tests.

/// Which network a chain instance validates for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        }
    }
}

/// Rule used to order two best-chain candidates with equal cumulative work.
///
/// The deployed network's nodes must agree on this; it is explicit
/// configuration rather than an inferred default.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TieBreak {
    /// The candidate whose header was seen first wins (historical behavior).
    FirstSeen,
    /// The candidate with the numerically lowest block hash wins.
    LowestHash,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    /// Maximum serialized block size in bytes.
    pub max_block_size: usize,
    /// Maximum accumulated signature-operation cost per block.
    pub max_block_sigops: u32,
    /// Number of confirmations before a coinbase output may be spent.
    pub coinbase_maturity: i32,
    /// Easiest allowed difficulty, in compact form.
    pub pow_limit_bits: u32,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: i32,
    /// Equal-work candidate ordering.
    pub tie_break: TieBreak,
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
    /// Unix timestamp of the genesis block header.
    pub genesis_time: u32,
    /// Compact difficulty of the genesis block header.
    pub genesis_bits: u32,
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Main => ChainParams {
            network,
            consensus: ConsensusParams {
                max_block_size: 1_000_000,
                max_block_sigops: 20_000,
                coinbase_maturity: 100,
                pow_limit_bits: 0x1d00_ffff,
                subsidy_halving_interval: 210_000,
                tie_break: TieBreak::FirstSeen,
            },
            genesis_time: 1_231_006_505,
            genesis_bits: 0x1d00_ffff,
        },
        Network::Test => ChainParams {
            network,
            consensus: ConsensusParams {
                max_block_size: 1_000_000,
                max_block_sigops: 20_000,
                coinbase_maturity: 100,
                pow_limit_bits: 0x1d00_ffff,
                subsidy_halving_interval: 210_000,
                tie_break: TieBreak::FirstSeen,
            },
            genesis_time: 1_296_688_602,
            genesis_bits: 0x1d00_ffff,
        },
        Network::Regtest => ChainParams {
            network,
            consensus: ConsensusParams {
                max_block_size: 1_000_000,
                max_block_sigops: 20_000,
                coinbase_maturity: 100,
                pow_limit_bits: 0x207f_ffff,
                subsidy_halving_interval: 150,
                tie_break: TieBreak::FirstSeen,
            },
            genesis_time: 1_296_688_602,
            genesis_bits: 0x207f_ffff,
        },
    }
}
