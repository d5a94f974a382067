use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, HttpRequest, HttpResponse};
use log::{info, warn};
use serde_json::json;

use crate::consensus::Resolution;
use crate::error::LedgerError;
use crate::models::{
    AddVoteRequest, ChainResponse, LegacyChainResponse, MineResponse, RegisterNodesRequest,
    StatusResponse, VoteSubmission,
};
use crate::node::LedgerNode;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/chain", web::get().to(full_chain))
        .route("/get_blockchain", web::get().to(legacy_chain))
        .route("/get_blockchain", web::post().to(legacy_chain))
        .route("/mine", web::get().to(mine))
        .route("/vote/add", web::post().to(add_vote))
        .route("/vote/new", web::post().to(new_vote))
        .route("/nodes/register", web::post().to(register_nodes))
        .route("/nodes/resolve", web::get().to(resolve));
}

/// Unparseable bodies get the same JSON shape as the route's own errors.
fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!("rejected body on {}: {}", req.path(), err);
    let message = err.to_string();
    let body = if req.path() == "/vote/add" {
        json!({ "status": "error", "message": message })
    } else {
        json!({ "message": message })
    };
    InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
}

async fn full_chain(node: web::Data<LedgerNode>) -> HttpResponse {
    let chain = node.chain().await;
    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

async fn legacy_chain(node: web::Data<LedgerNode>) -> Result<HttpResponse, actix_web::Error> {
    let chain = node.chain().await;
    let blockchain = serde_json::to_string(&chain)?;
    Ok(HttpResponse::Ok().json(LegacyChainResponse { blockchain }))
}

async fn mine(node: web::Data<LedgerNode>) -> Result<HttpResponse, LedgerError> {
    match node.mine().await {
        Ok(block) => Ok(HttpResponse::Ok().json(MineResponse::forged(&block))),
        Err(LedgerError::InsufficientVotes { .. }) => {
            Ok(HttpResponse::BadRequest().json(json!({ "message": "Not enough votes to mine" })))
        }
        Err(e) => Err(e),
    }
}

async fn add_vote(node: web::Data<LedgerNode>, body: web::Json<AddVoteRequest>) -> HttpResponse {
    let Some(vote) = body.into_inner().vote else {
        warn!("vote/add without vote data");
        return HttpResponse::NotAcceptable().json(StatusResponse {
            status: "error".to_string(),
            message: Some("No vote data provided".to_string()),
        });
    };
    match node.admit(vote).await {
        Ok(index) => {
            info!("vote will be added on block {}", index);
            HttpResponse::Created().json(StatusResponse {
                status: "received".to_string(),
                message: None,
            })
        }
        Err(e) => HttpResponse::BadRequest().json(StatusResponse {
            status: "error".to_string(),
            message: Some(e.to_string()),
        }),
    }
}

async fn new_vote(
    node: web::Data<LedgerNode>,
    body: web::Json<VoteSubmission>,
) -> Result<HttpResponse, LedgerError> {
    let index = node.admit(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": format!("Vote will be added to Block {}", index)
    })))
}

async fn register_nodes(
    node: web::Data<LedgerNode>,
    body: web::Json<RegisterNodesRequest>,
) -> Result<HttpResponse, LedgerError> {
    let Some(nodes) = body.into_inner().nodes else {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "Error: Please supply a valid list of nodes"
        })));
    };
    let total_nodes = node.register_peers(&nodes).await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "New nodes have been added",
        "total_nodes": total_nodes,
    })))
}

async fn resolve(node: web::Data<LedgerNode>) -> Result<HttpResponse, LedgerError> {
    let report = node.resolve().await?;
    let body = match report.resolution {
        Resolution::Replaced => json!({
            "message": "Our chain was replaced",
            "new_chain length": report.length,
            "time": report.head_timestamp,
        }),
        Resolution::Authoritative => json!({
            "message": "Our chain is authoritative",
            "chain length": report.length,
            "time": report.head_timestamp,
        }),
    };
    Ok(HttpResponse::Ok().json(body))
}
