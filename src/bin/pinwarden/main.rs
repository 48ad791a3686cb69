#[macro_use]
extern crate log;

use pinwarden::claim_submitter::DefaultClaimSubmitter;
use pinwarden::daemon::Daemon;
use pinwarden::executor::DefaultExecutor;
use pinwarden::filter::DefaultFilter;
use pinwarden::gateway::ReqwestGateway;
use pinwarden::hunter::{DefaultFlagSubmitter, DefaultVerifier, Hunter, HunterScheduler, PinnerRegistryCache};
use pinwarden::identity::OperatorIdentity;
use pinwarden::ipc::{IpcContext, IpcServer};
use pinwarden::ledger::RpcLedgerClient;
use pinwarden::logging;
use pinwarden::mode::ModeController;
use pinwarden::pipeline::Pipeline;
use pinwarden::poller::DefaultPoller;
use pinwarden::settings::Settings;
use pinwarden::storage_node::KuboClient;
use pinwarden::store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Entry point for the pinwarden daemon binary. Kept small; all real logic
/// lives in the library so it can be exercised by integration tests.
#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|msg| {
        error!("panicked with: {msg}");
        std::process::exit(101);
    }));

    logging::init("pinwarden", std::env::var("PINWARDEN_LOG_DIR").ok().as_deref());

    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = settings.validate() {
        error!("invalid configuration: {e}");
        std::process::exit(1);
    }

    let identity = match std::env::var("PINWARDEN_OPERATOR_KEYFILE") {
        Ok(path) => OperatorIdentity::from_keyfile(&path),
        Err(_) => OperatorIdentity::from_env("PINWARDEN_OPERATOR_KEY"),
    };
    let identity = match identity {
        Ok(identity) => Arc::new(identity),
        Err(e) => {
            error!("failed to load operator identity: {e}");
            std::process::exit(1);
        }
    };
    let operator_address = identity.address();
    info!("operator address: {operator_address}");

    let store: Arc<SqliteStore> = match SqliteStore::open(&settings.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open store at {}: {e}", settings.db_path);
            std::process::exit(1);
        }
    };

    let ledger = Arc::new(RpcLedgerClient::new(
        settings.ledger.rpc_url.clone(),
        settings.ledger.contract_id.clone(),
        identity.clone(),
        Duration::from_secs(30),
    ));
    let storage_node = Arc::new(KuboClient::new(settings.storage_node.rpc_url.clone()));
    let gateway = Arc::new(ReqwestGateway::new(settings.fetch_timeout()));

    let poller = Arc::new(DefaultPoller::new(
        store.clone(),
        ledger.clone(),
        Duration::from_millis(500),
        Duration::from_secs(30),
        Duration::from_secs(120),
    ));

    let filter = Arc::new(DefaultFilter::new(
        store.clone(),
        ledger.clone(),
        gateway.clone(),
        settings.safety_factor,
        settings.ledger.fallback_tx_fee,
        operator_address.clone(),
    ));

    let executor = Arc::new(DefaultExecutor::new(
        gateway.clone(),
        storage_node.clone(),
        settings.executor.max_retries,
        Duration::from_millis(settings.executor.backoff_initial_ms),
        Duration::from_secs(settings.executor.backoff_max_secs),
        Duration::from_secs(settings.executor.pin_timeout_secs),
    ));

    let claim_submitter = Arc::new(DefaultClaimSubmitter::new(ledger.clone()));

    let pipeline = Arc::new(Pipeline {
        store: store.clone(),
        executor: executor.clone(),
        claim_submitter: claim_submitter.clone(),
        operator_address: operator_address.clone(),
    });

    let mode_controller = Arc::new(ModeController::new(store.clone(), pipeline.clone()));

    let registry_cache = Arc::new(PinnerRegistryCache::new(store.clone(), ledger.clone(), settings.hunter.pinner_cache_ttl_secs));
    let hunter = Hunter::new(store.clone(), registry_cache.clone(), operator_address.clone());

    let verifier = Arc::new(DefaultVerifier::new(
        storage_node.clone(),
        Duration::from_secs(settings.hunter.check_timeout_secs),
        settings.hunter.retrieval_enabled,
    ));
    let flag_submitter = Arc::new(DefaultFlagSubmitter::new(ledger.clone(), store.clone(), operator_address.clone()));
    let scheduler = Arc::new(HunterScheduler::new(
        store.clone(),
        verifier.clone(),
        flag_submitter.clone(),
        settings.hunter.max_concurrent_checks,
        settings.hunter.failure_threshold,
        settings.hunter.cooldown_after_flag_secs,
    ));

    let daemon = Daemon::new(
        store.clone(),
        poller,
        filter,
        mode_controller.clone(),
        pipeline,
        hunter,
        operator_address.clone(),
        Duration::from_secs(settings.poll_interval_secs),
        settings.unpin_on_unpin_event,
        storage_node,
    );

    let ipc_ctx = Arc::new(IpcContext {
        store: store.clone(),
        ledger: ledger.clone(),
        mode_controller,
        verifier,
        flag_submitter,
    });
    let bind_address = match settings.ipc.bind_address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid ipc.bind_address {}: {e}", settings.ipc.bind_address);
            std::process::exit(1);
        }
    };
    let ipc_server = IpcServer::new(ipc_ctx, bind_address);

    let cancel = CancellationToken::new();
    let shutdown_signal = {
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_err() {
                error!("failed to install SIGINT handler");
            }
            info!("shutdown signal received");
            cancel.cancel();
        }
    };

    let daemon_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { daemon.run(cancel).await }
    });

    let scheduler_task = if settings.hunter.enabled {
        let cancel = cancel.clone();
        let cycle_interval = Duration::from_secs(settings.hunter.cycle_interval_secs);
        Some(tokio::spawn(async move { scheduler.run_forever(cycle_interval, cancel).await }))
    } else {
        None
    };

    let ipc_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { ipc_server.serve(cancel).await }
    });

    tokio::select! {
        _ = shutdown_signal => {}
        result = daemon_task => {
            match result {
                Ok(Err(e)) => {
                    cancel.cancel();
                    if let pinwarden::error::FatalError::NotPinner = e {
                        error!("operator identity is not a registered pinner: {e}");
                        std::process::exit(2);
                    }
                    error!("daemon loop exited with fatal error: {e}");
                    std::process::exit(1);
                }
                Ok(Ok(())) => {}
                Err(e) => {
                    error!("daemon task panicked: {e}");
                    std::process::exit(101);
                }
            }
        }
    }

    cancel.cancel();
    let _ = ipc_task.await;
    if let Some(scheduler_task) = scheduler_task {
        let _ = scheduler_task.await;
    }

    info!("pinwarden exited cleanly");
}
