//! HD-style wallet with plain, blind and anon balances.
//!
//! Keys are blake3 derivations of the imported seed; there is no signing.
//! A send spends the whole balance of its source kind and pays the change
//! back to a fresh change address, so balances stay consistent once the
//! transaction is credited.

use crate::chain::{COIN, Chain, OutputKind, Transaction, TxOutput, digest};
use crate::error::{RpcFailure, RpcResult};
use serde_json::{Value, json};
use std::collections::HashSet;

/// Seed of the wallet that receives the genesis allocation.
pub const FUNDED_MNEMONIC: &str =
    "abandon baby cabbage dad eager fabric gadget habit ice kangaroo lab absorb";

pub const GENESIS_ALLOCATION_SAT: u64 = 100_000 * COIN;

pub const FEE_SAT: u64 = 10_000;

const WORDS: [&str; 32] = [
    "acid", "amber", "anchor", "apple", "arrow", "badge", "basin", "cable", "cedar", "cliff",
    "copper", "dawn", "delta", "ember", "fabric", "falcon", "glass", "harbor", "ivory", "jungle",
    "kettle", "lemon", "marble", "nectar", "orbit", "pepper", "quartz", "raven", "saddle",
    "timber", "velvet", "willow",
];

fn normalize(seed: &str) -> String {
    seed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn derive(seed: &str, purpose: &str, index: u32) -> String {
    digest(&[seed.as_bytes(), purpose.as_bytes(), &index.to_le_bytes()])
}

/// Default receive address of the account derived from `seed`.
pub fn root_address(seed: &str) -> String {
    format!("p{}", &derive(&normalize(seed), "root", 0)[..33])
}

/// Twelve words and a master key derived from `entropy`.
pub fn new_mnemonic(entropy: &[u8]) -> (String, String) {
    let hash = blake3::hash(entropy);
    let words: Vec<&str> = hash.as_bytes()[..12]
        .iter()
        .map(|b| WORDS[usize::from(*b) % WORDS.len()])
        .collect();
    let mnemonic = words.join(" ");
    let master = format!("tprv{}", &derive(&mnemonic, "master", 0)[..64]);
    (mnemonic, master)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balances {
    pub part: u64,
    pub blind: u64,
    pub anon: u64,
}

impl Balances {
    fn get_mut(&mut self, kind: OutputKind) -> &mut u64 {
        match kind {
            OutputKind::Part => &mut self.part,
            OutputKind::Blind => &mut self.blind,
            OutputKind::Anon => &mut self.anon,
        }
    }

    pub fn get(&self, kind: OutputKind) -> u64 {
        match kind {
            OutputKind::Part => self.part,
            OutputKind::Blind => self.blind,
            OutputKind::Anon => self.anon,
        }
    }

    pub fn total(&self) -> u64 {
        self.part + self.blind + self.anon
    }
}

fn coins(sat: u64) -> f64 {
    sat as f64 / COIN as f64
}

/// Converts a coin amount parameter to satoshis.
pub fn to_sat(amount: f64) -> RpcResult<u64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(RpcFailure::new(-3, "Invalid amount"));
    }
    Ok((amount * COIN as f64).round() as u64)
}

#[derive(Debug, Clone, Default)]
pub struct Wallet {
    seed: Option<String>,
    account_id: String,
    issued: u32,
    stealth_issued: u32,
    change_issued: u32,
    receiving: Vec<String>,
    owned: HashSet<String>,
    balances: Balances,
    credited: HashSet<String>,
    reserved: bool,
    stake_limit: u64,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    fn seed(&self) -> RpcResult<&str> {
        self.seed
            .as_deref()
            .ok_or_else(|| RpcFailure::wallet("Wallet has no master key; use extkeyimportmaster"))
    }

    pub fn has_master(&self) -> bool {
        self.seed.is_some()
    }

    /// Imports a master key, replacing the current one, and rescans `chain`.
    pub fn import_master(&mut self, seed: &str, chain: &Chain) -> RpcResult<Value> {
        let seed = normalize(seed);
        if seed.is_empty() {
            return Err(RpcFailure::invalid_parameter("Empty mnemonic or master key"));
        }
        let reserved = self.reserved;
        let stake_limit = self.stake_limit;
        *self = Self {
            account_id: format!("a{}", &derive(&seed, "account", 0)[..33]),
            reserved,
            stake_limit,
            ..Self::default()
        };
        self.owned.insert(root_address(&seed));
        self.seed = Some(seed);

        for tx in chain.all_txs() {
            self.credit(tx);
        }

        Ok(json!({
            "result": "Success.",
            "account_id": self.account_id,
            "account_label": "Default Account",
        }))
    }

    pub fn new_address(&mut self) -> RpcResult<String> {
        self.issued += 1;
        let address = format!("p{}", &derive(self.seed()?, "receive", self.issued)[..33]);
        self.owned.insert(address.clone());
        self.receiving.push(address.clone());
        Ok(address)
    }

    pub fn new_stealth_address(&mut self) -> RpcResult<String> {
        self.stealth_issued += 1;
        let scan = derive(self.seed()?, "scan", self.stealth_issued);
        let spend = derive(self.seed()?, "spend", self.stealth_issued);
        let address = format!("T{scan}{spend}");
        self.owned.insert(address.clone());
        Ok(address)
    }

    fn new_change_address(&mut self) -> RpcResult<String> {
        self.change_issued += 1;
        let address = format!("p{}", &derive(self.seed()?, "change", self.change_issued)[..33]);
        self.owned.insert(address.clone());
        Ok(address)
    }

    pub fn owns(&self, address: &str) -> bool {
        self.owned.contains(address)
    }

    /// Addresses handed out by `getnewaddress`.
    pub fn receiving(&self) -> &[String] {
        &self.receiving
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    /// Credits outputs paying this wallet. Each transaction counts once.
    pub fn credit(&mut self, tx: &Transaction) {
        if !self.has_master() || !self.credited.insert(tx.txid.clone()) {
            return;
        }
        for output in &tx.outputs {
            if self.owned.contains(&output.address) {
                *self.balances.get_mut(output.kind) += output.value_sat;
            }
        }
    }

    /// Builds a send of `amount` from `from` funds to a `to` output.
    pub fn build_send(
        &mut self,
        address: &str,
        amount: u64,
        from: OutputKind,
        to: OutputKind,
        narration: &str,
        now: u64,
    ) -> RpcResult<Transaction> {
        self.seed()?;
        let valid = match to {
            OutputKind::Part => address.starts_with('p'),
            OutputKind::Blind | OutputKind::Anon => address.starts_with('T'),
        };
        if !valid {
            return Err(RpcFailure::new(-5, format!("Invalid address {address}")));
        }

        let input = self.balances.get(from);
        let change = input
            .checked_sub(amount + FEE_SAT)
            .ok_or_else(RpcFailure::insufficient_funds)?;

        let mut outputs = vec![TxOutput {
            address: address.to_string(),
            value_sat: amount,
            kind: to,
        }];
        if change > 0 {
            outputs.push(TxOutput {
                address: self.new_change_address()?,
                value_sat: change,
                kind: from,
            });
        }

        let salt = format!("{}:{}", self.account_id, self.change_issued);
        let tx = Transaction::new(outputs, narration, now, &salt);
        *self.balances.get_mut(from) = 0;
        Ok(tx)
    }

    pub fn set_reserved(&mut self, reserved: bool) {
        self.reserved = reserved;
    }

    pub fn set_stake_limit(&mut self, height: u64) {
        self.stake_limit = height;
    }

    pub fn stake_limit(&self) -> u64 {
        self.stake_limit
    }

    /// Whether this wallet may produce the block above `height`.
    pub fn can_stake(&self, height: u64) -> bool {
        self.has_master()
            && self.balances.part > 0
            && !self.reserved
            && (self.stake_limit == 0 || height < self.stake_limit)
    }

    /// Balance fields of `getinfo`.
    pub fn info(&self) -> Value {
        json!({
            "balance": coins(self.balances.part),
            "blind_balance": coins(self.balances.blind),
            "anon_balance": coins(self.balances.anon),
            "total_balance": coins(self.balances.total()),
            "reserve": self.reserved,
            "stakelimit": self.stake_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Block;

    fn funded_chain() -> Chain {
        Chain::new(Block::genesis(&root_address(FUNDED_MNEMONIC), GENESIS_ALLOCATION_SAT))
    }

    #[test]
    fn test_funded_import_finds_genesis_allocation() {
        let chain = funded_chain();
        let mut wallet = Wallet::new();
        let ro = wallet.import_master(FUNDED_MNEMONIC, &chain).unwrap();
        assert!(!ro["account_id"].as_str().unwrap().is_empty());
        assert_eq!(wallet.info()["total_balance"], 100_000.0);

        let mut other = Wallet::new();
        other.import_master("some other words", &chain).unwrap();
        assert_eq!(other.balances().total(), 0);
    }

    #[test]
    fn test_addresses_require_master() {
        let mut wallet = Wallet::new();
        assert_eq!(wallet.new_address().unwrap_err().code, -4);

        wallet.import_master("seed words", &funded_chain()).unwrap();
        let a = wallet.new_address().unwrap();
        let b = wallet.new_address().unwrap();
        assert_ne!(a, b);
        assert!(wallet.owns(&a));
        assert_eq!(wallet.receiving(), &[a, b]);
        assert!(wallet.new_stealth_address().unwrap().starts_with('T'));
    }

    #[test]
    fn test_send_pays_recipient_and_returns_change() {
        let chain = funded_chain();
        let mut sender = Wallet::new();
        sender.import_master(FUNDED_MNEMONIC, &chain).unwrap();
        let mut receiver = Wallet::new();
        receiver.import_master("receiver", &chain).unwrap();
        let to = receiver.new_stealth_address().unwrap();

        let tx = sender
            .build_send(&to, 10 * COIN, OutputKind::Part, OutputKind::Anon, "n", 1)
            .unwrap();
        assert_eq!(tx.outputs.len(), 2);
        sender.credit(&tx);
        receiver.credit(&tx);
        receiver.credit(&tx);

        assert_eq!(receiver.balances().anon, 10 * COIN);
        assert_eq!(
            sender.balances().part,
            GENESIS_ALLOCATION_SAT - 10 * COIN - FEE_SAT
        );
    }

    #[test]
    fn test_send_rejects_bad_input() {
        let chain = funded_chain();
        let mut wallet = Wallet::new();
        wallet.import_master(FUNDED_MNEMONIC, &chain).unwrap();

        let short = wallet.build_send("Tx", COIN, OutputKind::Blind, OutputKind::Anon, "", 1);
        assert_eq!(short.unwrap_err().code, -6);

        let wrong = wallet.build_send("Tx", COIN, OutputKind::Part, OutputKind::Part, "", 1);
        assert_eq!(wrong.unwrap_err().code, -5);
        assert!(to_sat(0.0).is_err());
        assert_eq!(to_sat(0.1).unwrap(), 10_000_000);
    }

    #[test]
    fn test_staking_rules() {
        let chain = funded_chain();
        let mut wallet = Wallet::new();
        assert!(!wallet.can_stake(0));

        wallet.import_master(FUNDED_MNEMONIC, &chain).unwrap();
        assert!(wallet.can_stake(0));

        wallet.set_stake_limit(2);
        assert!(wallet.can_stake(1));
        assert!(!wallet.can_stake(2));

        wallet.set_reserved(true);
        assert!(!wallet.can_stake(1));
    }

    #[test]
    fn test_new_mnemonic_shape() {
        let (mnemonic, master) = new_mnemonic(b"entropy");
        assert_eq!(mnemonic.split(' ').count(), 12);
        assert!(master.starts_with("tprv"));
        assert_ne!(new_mnemonic(b"other").1, master);
    }
}
