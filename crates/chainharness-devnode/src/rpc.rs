//! JSON-RPC 1.0 server.

use crate::chain::{COIN, OutputKind};
use crate::error::{RpcFailure, RpcResult, codes};
use crate::node::{Node, NodeState, unix_now};
use crate::p2p::PROTOCOL_VERSION;
use crate::wallet::{new_mnemonic, to_sat};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

const VERSION: u64 = 300;

#[derive(Clone)]
struct RpcState {
    node: Arc<Node>,
    /// Expected `Authorization` header value.
    auth: Arc<str>,
}

pub fn router(node: Arc<Node>, user: &str, password: &str) -> Router {
    let auth = format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{password}")));
    Router::new().route("/", post(handle)).with_state(RpcState {
        node,
        auth: auth.into(),
    })
}

#[derive(Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

async fn handle(State(rpc): State<RpcState>, headers: HeaderMap, body: Bytes) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == &*rpc.auth);
    if !authorized {
        warn!("rejected RPC request with bad credentials");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let request: Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = RpcFailure::new(-32700, format!("Parse error: {e}"));
            let body = json!({"result": null, "error": error.to_json(), "id": null});
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let params = match request.params {
        Value::Array(params) => params,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    debug!(method = %request.method, "rpc");

    match dispatch(&rpc.node, &request.method, &Params(&params)) {
        Ok(result) => Json(json!({"result": result, "error": null, "id": request.id})).into_response(),
        Err(failure) => {
            debug!(method = %request.method, error = %failure, "rpc error");
            let status = if failure.code == codes::METHOD_NOT_FOUND {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let body = json!({"result": null, "error": failure.to_json(), "id": request.id});
            (status, Json(body)).into_response()
        }
    }
}

/// Positional parameters.
struct Params<'a>(&'a [Value]);

impl Params<'_> {
    fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index).filter(|v| !v.is_null())
    }

    fn str(&self, index: usize, name: &str) -> RpcResult<&str> {
        self.get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcFailure::invalid_parameter(format!("{name} must be a string")))
    }

    fn u64(&self, index: usize, name: &str) -> RpcResult<u64> {
        self.get(index)
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcFailure::invalid_parameter(format!("{name} must be a non-negative integer")))
    }

    /// Accepts `true`/`false` or `1`/`0`.
    fn flag(&self, index: usize, default: bool) -> bool {
        match self.get(index) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() != Some(0),
            _ => default,
        }
    }

    fn amount(&self, index: usize) -> RpcResult<u64> {
        let amount = match self.get(index) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| RpcFailure::new(-3, "Amount is not a number"))?;
        to_sat(amount)
    }

    /// Optional integer in `range`.
    fn bounded(&self, index: usize, name: &str, range: std::ops::RangeInclusive<u64>) -> RpcResult<()> {
        if self.get(index).is_none() {
            return Ok(());
        }
        let value = self.u64(index, name)?;
        if range.contains(&value) {
            Ok(())
        } else {
            Err(RpcFailure::invalid_parameter(format!(
                "{name} must be between {} and {}",
                range.start(),
                range.end()
            )))
        }
    }
}

/// Source and destination value types of the `send<a>to<b>` family.
fn send_kinds(method: &str) -> Option<(OutputKind, OutputKind)> {
    let kind = |name: &str| match name {
        "part" => Some(OutputKind::Part),
        "blind" => Some(OutputKind::Blind),
        "anon" => Some(OutputKind::Anon),
        _ => None,
    };
    let (from, to) = method.strip_prefix("send")?.split_once("to")?;
    Some((kind(from)?, kind(to)?))
}

fn coins(sat: u64) -> f64 {
    sat as f64 / COIN as f64
}

fn dispatch(node: &Arc<Node>, method: &str, params: &Params<'_>) -> RpcResult<Value> {
    if !node.is_ready() {
        return Err(RpcFailure::warmup());
    }

    if let Some((from, to)) = send_kinds(method) {
        return send(node, params, from, to, 5);
    }

    match method {
        "stop" => {
            node.request_shutdown();
            Ok(json!("chainharness-devnode stopping"))
        }

        // Chain
        "getblockcount" => Ok(json!(node.state().chain.height())),
        "getbestblockhash" => Ok(json!(node.state().chain.tip().hash)),
        "getblockhash" => {
            let height = params.u64(0, "height")?;
            node.state()
                .chain
                .block_at(height)
                .map(|b| json!(b.hash))
                .ok_or_else(|| RpcFailure::invalid_parameter("Block height out of range"))
        }
        "getblock" => {
            let hash = params.str(0, "blockhash")?;
            let state = node.state();
            state
                .chain
                .block_by_hash(hash)
                .map(|b| b.summary(state.chain.height()))
                .ok_or_else(|| RpcFailure::not_found("Block not found"))
        }
        "getblockhashes" => {
            if !node.args().timestampindex {
                return Err(RpcFailure::misc("Timestamp index not enabled"));
            }
            let high = params.u64(0, "high")?;
            let low = params.u64(1, "low")?;
            Ok(json!(node.state().chain.hashes_between(high, low)))
        }
        "getrawmempool" => Ok(json!(node.state().chain.raw_mempool())),
        "getmempoolentry" => {
            let txid = params.str(0, "txid")?;
            node.state()
                .chain
                .mempool_entry(txid)
                .ok_or_else(|| RpcFailure::not_found("Transaction not in mempool"))
        }
        "getrawtransaction" => raw_transaction(node, params),

        // Node
        "getinfo" => {
            let state = node.state();
            let mut info = json!({
                "version": VERSION,
                "protocolversion": PROTOCOL_VERSION,
                "blocks": state.chain.height(),
                "connections": state.peers.entries().len(),
            });
            if let (Some(info), Value::Object(wallet)) = (info.as_object_mut(), state.wallet.info()) {
                info.extend(wallet);
            }
            Ok(info)
        }
        "getnetworkinfo" => {
            let state = node.state();
            let services = if state.smsg.is_enabled() {
                "NETWORK SMSG"
            } else {
                "NETWORK"
            };
            Ok(json!({
                "version": VERSION,
                "subversion": "/chainharness-devnode/",
                "protocolversion": PROTOCOL_VERSION,
                "localservices_str": services,
                "connections": state.peers.entries().len(),
            }))
        }
        "getpeerinfo" => Ok(Value::Array(
            node.state()
                .peers
                .entries()
                .iter()
                .map(|p| p.to_json())
                .collect(),
        )),
        "addnode" => {
            let addr = params.str(0, "node")?.to_string();
            match params.str(1, "command")? {
                "onetry" | "add" => {}
                other => return Err(RpcFailure::invalid_parameter(format!("unsupported command {other}"))),
            }
            let node = Arc::clone(node);
            tokio::spawn(async move {
                if let Err(e) = node.connect_peer(&addr).await {
                    warn!(peer = %addr, error = %e, "connection attempt failed");
                }
            });
            Ok(Value::Null)
        }

        // Wallet
        "mnemonic" => match params.str(0, "mode")? {
            "new" => {
                let (mnemonic, master) = new_mnemonic(&node.entropy());
                Ok(json!({"mnemonic": mnemonic, "master": master}))
            }
            other => Err(RpcFailure::invalid_parameter(format!("Unknown mode {other}"))),
        },
        "extkeyimportmaster" => {
            let seed = params.str(0, "mnemonic")?;
            let mut guard = node.state();
            let state: &mut NodeState = &mut guard;
            state.wallet.import_master(seed, &state.chain)
        }
        "getnewaddress" => Ok(json!(node.state().wallet.new_address()?)),
        "getnewstealthaddress" => Ok(json!(node.state().wallet.new_stealth_address()?)),
        "sendtoaddress" => send(node, params, OutputKind::Part, OutputKind::Part, 2),
        "reservebalance" => {
            let reserve = params.flag(0, true);
            node.state().wallet.set_reserved(reserve);
            let amount = if reserve {
                params.amount(1).unwrap_or(0)
            } else {
                0
            };
            Ok(json!({"reserve": reserve, "amount": coins(amount)}))
        }
        "walletsettings" => wallet_settings(node, params),

        // Secure messaging
        "smsgenable" => node.state().smsg.enable(),
        "smsgdisable" => node.state().smsg.disable(),
        "smsgbuckets" => node.state().smsg.buckets(),
        "smsglocalkeys" => {
            let state = node.state();
            state.smsg.local_keys(&state.wallet)
        }
        "smsgaddkey" => {
            let address = params.str(0, "address")?;
            let pubkey = params.str(1, "pubkey")?;
            node.state().smsg.add_key(address, pubkey)
        }
        "smsgsend" => {
            let from = params.str(0, "address_from")?;
            let to = params.str(1, "address_to")?;
            let text = params.str(2, "message")?;
            let message = {
                let mut guard = node.state();
                let state: &mut NodeState = &mut guard;
                state.smsg.compose(&state.wallet, from, to, text, unix_now())?
            };
            node.relay_smsg(&message, None);
            Ok(json!({"result": "Sent.", "msgid": message.msgid}))
        }
        "smsginbox" => {
            let mut guard = node.state();
            let state: &mut NodeState = &mut guard;
            state.smsg.inbox(&state.wallet)
        }
        "smsgoutbox" => {
            let state = node.state();
            state.smsg.outbox(&state.wallet)
        }
        "smsgview" => {
            let state = node.state();
            state.smsg.view(&state.wallet)
        }

        _ => Err(RpcFailure::method_not_found()),
    }
}

/// Builds, admits and relays a send. `narration_at` is the narration's
/// parameter position.
fn send(
    node: &Arc<Node>,
    params: &Params<'_>,
    from: OutputKind,
    to: OutputKind,
    narration_at: usize,
) -> RpcResult<Value> {
    let address = params.str(0, "address")?;
    let amount = params.amount(1)?;
    let narration = params.get(narration_at).and_then(Value::as_str).unwrap_or_default();
    if from == OutputKind::Anon {
        params.bounded(6, "ring_size", 3..=32)?;
        params.bounded(7, "inputs_per_sig", 1..=32)?;
    }

    let tx = {
        let mut guard = node.state();
        let state: &mut NodeState = &mut guard;
        let tx = state
            .wallet
            .build_send(address, amount, from, to, narration, unix_now())?;
        state.accept_tx(&tx);
        tx
    };
    node.relay_tx(&tx, None);
    Ok(json!(tx.txid))
}

fn raw_transaction(node: &Node, params: &Params<'_>) -> RpcResult<Value> {
    let txid = params.str(0, "txid")?;
    let verbose = params.flag(1, false);
    let state = node.state();
    let render = |tx: &crate::chain::Transaction, block| {
        if verbose {
            tx.verbose(block)
        } else {
            json!(tx.hex())
        }
    };

    if let Some(tx) = state.chain.mempool_tx(txid) {
        return Ok(render(tx, None));
    }
    if !node.args().txindex {
        return Err(RpcFailure::not_found(
            "No such mempool transaction. Use -txindex to enable blockchain transaction queries.",
        ));
    }
    let tip = state.chain.height();
    state
        .chain
        .confirmed_tx(txid)
        .map(|(tx, block)| render(tx, Some((block, tip - block.height + 1))))
        .ok_or_else(|| RpcFailure::not_found("No such mempool or blockchain transaction"))
}

fn wallet_settings(node: &Node, params: &Params<'_>) -> RpcResult<Value> {
    let setting = params.str(0, "setting")?;
    if setting != "stakelimit" {
        return Err(RpcFailure::invalid_parameter(format!("Unknown setting {setting}")));
    }
    let mut state = node.state();
    if let Some(value) = params.get(1) {
        let height = value
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcFailure::invalid_parameter("stakelimit needs a height"))?;
        state.wallet.set_stake_limit(height);
    }
    Ok(json!({"stakelimit": {"height": state.wallet.stake_limit()}}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_kinds() {
        assert_eq!(
            send_kinds("sendparttoanon"),
            Some((OutputKind::Part, OutputKind::Anon))
        );
        assert_eq!(
            send_kinds("sendblindtoanon"),
            Some((OutputKind::Blind, OutputKind::Anon))
        );
        assert_eq!(send_kinds("sendtoaddress"), None);
        assert_eq!(send_kinds("smsgsend"), None);
    }

    #[test]
    fn test_params() {
        let values = vec![json!("addr"), json!(1.5), json!(null), json!(true), json!(0)];
        let params = Params(&values);
        assert_eq!(params.str(0, "a").unwrap(), "addr");
        assert_eq!(params.amount(1).unwrap(), 150_000_000);
        assert!(params.get(2).is_none());
        assert!(params.flag(3, false));
        assert!(!params.flag(4, true));
        assert!(params.flag(9, true));
        assert_eq!(params.u64(0, "n").unwrap_err().code, codes::INVALID_PARAMETER);
        assert!(params.bounded(4, "ring_size", 3..=32).is_err());
        assert!(params.bounded(9, "ring_size", 3..=32).is_ok());
    }
}
