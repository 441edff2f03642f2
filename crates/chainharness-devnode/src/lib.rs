//! A lightweight stand-in ledger node.
//!
//! Speaks the RPC surface the harness drives (wallet, staking, mempool,
//! secure messaging, indexes) and gossips blocks, transactions and messages
//! to its peers over HTTP. There is no consensus or cryptography; it exists
//! so the orchestrator can be exercised end to end without a real node.
//!
//! ```text
//! chainharness-devnode -datadir=<dir> [-conf=<file>] [-regtest] [-txindex]
//!                      [-timestampindex] [-smsgscanincoming] [-debug]
//!                      [-staketime=<ms>]
//! ```

pub mod args;
pub mod chain;
pub mod error;
pub mod node;
pub mod p2p;
pub mod rpc;
pub mod smsg;
pub mod wallet;

pub use args::{NodeArgs, NodeConf};
pub use error::{Error, Result, RpcFailure};
pub use node::Node;

use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Time after binding during which RPC answers "warming up".
const WARMUP: Duration = Duration::from_millis(150);

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}

async fn serve(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) {
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await;
    if let Err(e) = served {
        warn!(error = %e, "server stopped with error");
    }
}

/// Runs a node until `stop` or Ctrl-C.
pub async fn run(args: NodeArgs) -> Result<()> {
    let conf = NodeConf::load(&args.conf_path())?;
    std::fs::create_dir_all(&args.data_dir)?;

    let p2p_addr = SocketAddr::new(conf.bind, conf.port);
    let rpc_addr = SocketAddr::new(conf.bind, conf.rpcport);
    let p2p_listener = bind(p2p_addr).await?;
    let rpc_listener = bind(rpc_addr).await?;

    let node = Node::new(args, p2p_addr.to_string())?;
    info!(
        pid = std::process::id(),
        datadir = %node.args().data_dir.display(),
        %p2p_addr,
        %rpc_addr,
        regtest = conf.regtest || node.args().regtest,
        txindex = node.args().txindex,
        timestampindex = node.args().timestampindex,
        "devnode starting"
    );

    let rpc_app = rpc::router(node.clone(), &conf.rpcuser, &conf.rpcpassword);
    let p2p_app = p2p::router(node.clone());
    let rpc_task = tokio::spawn(serve(rpc_listener, rpc_app, node.shutdown_signal()));
    let p2p_task = tokio::spawn(serve(p2p_listener, p2p_app, node.shutdown_signal()));
    let staker = tokio::spawn(node.clone().run_staker());

    tokio::time::sleep(WARMUP).await;
    node.mark_ready();
    info!("devnode ready");

    let mut stop = node.shutdown_signal();
    tokio::select! {
        _ = stop.wait_for(|stop| *stop) => info!("stop requested over RPC"),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            node.request_shutdown();
        }
    }

    for task in [rpc_task, p2p_task, staker] {
        if let Err(e) = task.await {
            warn!(error = %e, "task failed during shutdown");
        }
    }
    info!(height = node.state().chain.height(), "devnode stopped");
    Ok(())
}
