//! Localhost-only HTTP/JSON IPC server (SPEC_FULL.md §6), `warp`-based in the
//! shape of the teacher's `vault/api` (`warp::serve(...).bind_with_graceful_shutdown`).
//! No `handle_rejection` implementation survived retrieval from the teacher's
//! `common/api` module, so the one below is hand-written in warp's usual
//! idiom (see DESIGN.md).

pub mod dto;
pub mod handlers;

pub use handlers::IpcContext;

use dto::*;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub struct IpcServer {
    ctx: Arc<IpcContext>,
    bind_address: SocketAddr,
}

impl IpcServer {
    pub fn new(ctx: Arc<IpcContext>, bind_address: SocketAddr) -> Self {
        IpcServer { ctx, bind_address }
    }

    fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let ctx = self.ctx.clone();
        let with_ctx = warp::any().map(move || ctx.clone());

        let approve = warp::path!("approve_offers")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_ctx.clone())
            .and_then(|req: ApproveRequest, ctx: Arc<IpcContext>| async move {
                let results = handlers::approve_offers(&ctx, req.slot_ids).await;
                Ok::<_, Infallible>(warp::reply::json(&results))
            });

        let reject = warp::path!("reject_offers")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_ctx.clone())
            .and_then(|req: RejectRequest, ctx: Arc<IpcContext>| async move {
                let results = handlers::reject_offers(&ctx, req.slot_ids).await;
                Ok::<_, Infallible>(warp::reply::json(&results))
            });

        let set_mode = warp::path!("set_mode")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_ctx.clone())
            .and_then(|req: SetModeRequest, ctx: Arc<IpcContext>| async move {
                match handlers::set_mode(&ctx, req.mode).await {
                    Ok(()) => Ok(warp::reply::with_status(warp::reply::json(&serde_json::json!({"ok": true})), StatusCode::OK)),
                    Err(e) => Ok(warp::reply::with_status(
                        warp::reply::json(&ErrorResponseDto { error: e.to_string() }),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )),
                }
            });

        let update_policy = warp::path!("update_policy")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_ctx.clone())
            .and_then(|req: UpdatePolicyRequest, ctx: Arc<IpcContext>| async move {
                match handlers::update_policy(&ctx, req).await {
                    Ok(config) => Ok(warp::reply::with_status(warp::reply::json(&config), StatusCode::OK)),
                    Err(e) => Ok(warp::reply::with_status(
                        warp::reply::json(&ErrorResponseDto { error: e.to_string() }),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )),
                }
            });

        let verify_now = warp::path!("verify_now")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_ctx.clone())
            .and_then(|req: VerifyNowRequest, ctx: Arc<IpcContext>| async move {
                let results = handlers::verify_now(&ctx, req).await;
                Ok::<_, Infallible>(warp::reply::json(&results))
            });

        let flag_now = warp::path!("flag_now")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_ctx)
            .and_then(|req: FlagNowRequest, ctx: Arc<IpcContext>| async move {
                let result = handlers::flag_now(&ctx, req.pinner_address).await;
                Ok::<_, Infallible>(warp::reply::json(&result))
            });

        approve
            .or(reject)
            .or(set_mode)
            .or(update_policy)
            .or(verify_now)
            .or(flag_now)
            .recover(handle_rejection)
    }

    pub async fn serve(self, cancel: CancellationToken) {
        let addr = self.bind_address;
        let routes = self.routes();
        log::info!(target: "ipc", "IPC server listening on {addr}");
        let (_addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
            cancel.cancelled().await;
        });
        server.await;
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "malformed request body".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        log::error!(target: "ipc", "unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };

    Ok(warp::reply::with_status(warp::reply::json(&ErrorResponseDto { error: message }), code))
}
