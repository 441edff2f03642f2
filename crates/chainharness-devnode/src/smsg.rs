//! Secure message store.
//!
//! Every node keeps every message it has seen, which is what `smsgbuckets`
//! counts. Inbox, outbox and view are filtered by wallet ownership.

use crate::chain::digest;
use crate::error::{RpcFailure, RpcResult};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Width of a message bucket, in seconds.
const BUCKET_SECS: u64 = 600;

/// Public key a wallet address advertises for messaging.
pub fn public_key(address: &str) -> String {
    format!("02{}", digest(&[b"smsg-pubkey", address.as_bytes()]))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsgMessage {
    pub msgid: String,
    pub from: String,
    pub from_pubkey: String,
    pub to: String,
    pub text: String,
    pub sent: u64,
}

impl SmsgMessage {
    fn render(&self, received: u64) -> Value {
        json!({
            "msgid": self.msgid,
            "version": "0300",
            "received": received,
            "sent": self.sent,
            "from": self.from,
            "to": self.to,
            "text": self.text,
        })
    }
}

#[derive(Debug, Clone)]
struct Stored {
    message: SmsgMessage,
    received: u64,
    read: bool,
}

#[derive(Debug, Clone)]
pub struct SmsgStore {
    enabled: bool,
    scan_incoming: bool,
    messages: Vec<Stored>,
    ids: HashSet<String>,
    keys: HashMap<String, String>,
}

fn listing(messages: Vec<Value>) -> Value {
    let shown = messages.len();
    json!({"messages": messages, "result": format!("{shown} messages shown.")})
}

impl SmsgStore {
    pub fn new(scan_incoming: bool) -> Self {
        Self {
            enabled: true,
            scan_incoming,
            messages: Vec::new(),
            ids: HashSet::new(),
            keys: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fails the call when messaging is switched off.
    pub fn require_enabled(&self) -> RpcResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(RpcFailure::misc("Secure messaging is disabled."))
        }
    }

    pub fn enable(&mut self) -> RpcResult<Value> {
        if self.enabled {
            return Err(RpcFailure::misc("Secure messaging is already enabled."));
        }
        self.enabled = true;
        Ok(json!({"result": "Enabled secure messaging."}))
    }

    pub fn disable(&mut self) -> RpcResult<Value> {
        self.require_enabled()?;
        self.enabled = false;
        Ok(json!({"result": "Disabled secure messaging."}))
    }

    pub fn local_keys(&self, wallet: &Wallet) -> RpcResult<Value> {
        self.require_enabled()?;
        let keys: Vec<Value> = wallet
            .receiving()
            .iter()
            .map(|address| {
                json!({
                    "address": address,
                    "public_key": public_key(address),
                    "receive": "1",
                })
            })
            .collect();
        Ok(json!({"wallet_keys": [], "keys": keys}))
    }

    pub fn add_key(&mut self, address: &str, pubkey: &str) -> RpcResult<Value> {
        self.require_enabled()?;
        if pubkey.is_empty() {
            return Err(RpcFailure::invalid_parameter("Invalid public key"));
        }
        self.keys.insert(address.to_string(), pubkey.to_string());
        Ok(json!({"result": "Added public key to db."}))
    }

    /// Composes and stores an outgoing message.
    pub fn compose(
        &mut self,
        wallet: &Wallet,
        from: &str,
        to: &str,
        text: &str,
        now: u64,
    ) -> RpcResult<SmsgMessage> {
        self.require_enabled()?;
        if !wallet.owns(from) {
            return Err(RpcFailure::misc(format!("Unknown private key for from address {from}")));
        }
        if !wallet.owns(to) && !self.keys.contains_key(to) {
            return Err(RpcFailure::misc(format!("Unknown public key for address {to}")));
        }

        let sequence = self.messages.len() as u64;
        let message = SmsgMessage {
            msgid: digest(&[
                from.as_bytes(),
                to.as_bytes(),
                text.as_bytes(),
                &now.to_le_bytes(),
                &sequence.to_le_bytes(),
            ]),
            from: from.to_string(),
            from_pubkey: public_key(from),
            to: to.to_string(),
            text: text.to_string(),
            sent: now,
        };
        self.store(message.clone(), wallet, now);
        Ok(message)
    }

    /// Stores a gossiped message. Returns false if it was dropped or known.
    pub fn receive(&mut self, message: SmsgMessage, wallet: &Wallet, now: u64) -> bool {
        if !self.enabled || self.ids.contains(&message.msgid) {
            return false;
        }
        if self.scan_incoming || wallet.owns(&message.to) {
            self.keys
                .insert(message.from.clone(), message.from_pubkey.clone());
        }
        self.store(message, wallet, now);
        true
    }

    fn store(&mut self, message: SmsgMessage, wallet: &Wallet, now: u64) {
        self.ids.insert(message.msgid.clone());
        // Own outgoing mail never shows as unread
        let read = wallet.owns(&message.from) && !wallet.owns(&message.to);
        self.messages.push(Stored {
            message,
            received: now,
            read,
        });
    }

    /// Unread messages to this wallet; marks them read.
    pub fn inbox(&mut self, wallet: &Wallet) -> RpcResult<Value> {
        self.require_enabled()?;
        let mut shown = Vec::new();
        for stored in &mut self.messages {
            if !stored.read && wallet.owns(&stored.message.to) {
                stored.read = true;
                shown.push(stored.message.render(stored.received));
            }
        }
        Ok(listing(shown))
    }

    pub fn outbox(&self, wallet: &Wallet) -> RpcResult<Value> {
        self.require_enabled()?;
        Ok(listing(self.filtered(|m| wallet.owns(&m.from))))
    }

    /// Every stored message to or from this wallet.
    pub fn view(&self, wallet: &Wallet) -> RpcResult<Value> {
        self.require_enabled()?;
        Ok(listing(
            self.filtered(|m| wallet.owns(&m.from) || wallet.owns(&m.to)),
        ))
    }

    fn filtered(&self, keep: impl Fn(&SmsgMessage) -> bool) -> Vec<Value> {
        self.messages
            .iter()
            .filter(|s| keep(&s.message))
            .map(|s| s.message.render(s.received))
            .collect()
    }

    /// Counts reported as decimal strings.
    pub fn buckets(&self) -> RpcResult<Value> {
        self.require_enabled()?;
        let buckets: BTreeSet<u64> = self
            .messages
            .iter()
            .map(|s| s.message.sent / BUCKET_SECS)
            .collect();
        Ok(json!({
            "buckets": [],
            "total": {
                "buckets": buckets.len().to_string(),
                "messages": self.messages.len().to_string(),
                "active messages": self.messages.len().to_string(),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Block, Chain};

    fn wallet(seed: &str) -> (Wallet, String) {
        let chain = Chain::new(Block::genesis("p", 1));
        let mut wallet = Wallet::new();
        wallet.import_master(seed, &chain).unwrap();
        let address = wallet.new_address().unwrap();
        (wallet, address)
    }

    #[test]
    fn test_exchange_learns_sender_key() {
        let (wallet_a, addr_a) = wallet("a");
        let (wallet_b, addr_b) = wallet("b");
        let mut store_a = SmsgStore::new(false);
        let mut store_b = SmsgStore::new(false);

        // b needs a's key before it can write
        assert!(store_b.compose(&wallet_b, &addr_b, &addr_a, "hi", 10).is_err());
        store_b.add_key(&addr_a, &public_key(&addr_a)).unwrap();
        let message = store_b.compose(&wallet_b, &addr_b, &addr_a, "hi", 10).unwrap();

        assert!(store_a.receive(message.clone(), &wallet_a, 11));
        assert!(!store_a.receive(message, &wallet_a, 12));

        let inbox = store_a.inbox(&wallet_a).unwrap();
        assert_eq!(inbox["messages"][0]["text"], "hi");
        assert_eq!(inbox["messages"][0]["from"], addr_b.as_str());
        assert_eq!(store_a.inbox(&wallet_a).unwrap()["messages"], json!([]));

        // a can reply without smsgaddkey
        store_a.compose(&wallet_a, &addr_a, &addr_b, "back", 20).unwrap();
        assert_eq!(store_a.view(&wallet_a).unwrap()["messages"].as_array().unwrap().len(), 2);
        assert_eq!(store_a.outbox(&wallet_a).unwrap()["messages"].as_array().unwrap().len(), 1);
        assert_eq!(store_a.buckets().unwrap()["total"]["messages"], "2");
    }

    #[test]
    fn test_disabled_store_rejects_calls() {
        let (wallet_a, addr_a) = wallet("a");
        let mut store = SmsgStore::new(true);
        store.disable().unwrap();

        let err = store
            .compose(&wallet_a, &addr_a, &addr_a, "x", 1)
            .unwrap_err();
        assert_eq!(err.message, "Secure messaging is disabled.");
        assert!(store.buckets().is_err());
        assert!(store.disable().is_err());

        store.enable().unwrap();
        assert!(store.is_enabled());
        assert!(store.compose(&wallet_a, &addr_a, &addr_a, "x", 1).is_ok());
    }

    #[test]
    fn test_relayed_messages_count_everywhere() {
        let (wallet_a, addr_a) = wallet("a");
        let (wallet_c, _) = wallet("c");
        let mut sender = SmsgStore::new(false);
        let message = sender.compose(&wallet_a, &addr_a, &addr_a, "self", 5).unwrap();

        let mut bystander = SmsgStore::new(false);
        assert!(bystander.receive(message, &wallet_c, 6));
        assert_eq!(bystander.buckets().unwrap()["total"]["messages"], "1");
        assert_eq!(bystander.view(&wallet_c).unwrap()["messages"], json!([]));
    }
}
