use actix_web::{web, HttpResponse};
use log::{debug, warn};

use crate::error::CryptoError;
use crate::models::{
    BlindSignResponse, BlindedSignatureResponse, EncryptionRequest, EncryptionResponse,
    ErrorResponse, PublicKeyResponse, SigningRequest,
};
use crate::trusted::blind::{int_from_hex, int_to_hex};
use crate::trusted::{BlindSigner, EncryptionService};

pub fn configure_encryption(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::post().to(encryption_request));
}

pub fn configure_signing(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::post().to(signing_request));
}

fn error(message: impl ToString) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: message.to_string(),
    })
}

async fn encryption_request(service: web::Data<EncryptionService>, body: web::Bytes) -> HttpResponse {
    let request: EncryptionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("invalid encryption request: {}", e);
            return error("Invalid request type");
        }
    };
    match request {
        EncryptionRequest::EncryptVote { message } => match service.encrypt_hex(&message) {
            Ok(encrypted_vote) => HttpResponse::Ok().json(EncryptionResponse { encrypted_vote }),
            Err(e) => error(e),
        },
    }
}

async fn signing_request(signer: web::Data<BlindSigner>, body: web::Bytes) -> HttpResponse {
    let request: SigningRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("invalid signing request: {}", e);
            return error("Invalid request type");
        }
    };
    match handle_signing(&signer, request) {
        Ok(response) => response,
        Err(e) => error(e),
    }
}

fn handle_signing(signer: &BlindSigner, request: SigningRequest) -> Result<HttpResponse, CryptoError> {
    let signer_id = signer.signer_id().to_string();
    let response = match request {
        SigningRequest::BlindSign { hash } => {
            let signature = signer.blind_sign(&hash)?;
            debug!("issued blind signature as signer {}", signer_id);
            HttpResponse::Ok().json(BlindSignResponse {
                signature: signature.to_str_radix(10),
                signer_id,
            })
        }
        SigningRequest::PublicKey => {
            let key = signer.public_key();
            HttpResponse::Ok().json(PublicKeyResponse {
                n: int_to_hex(&key.n),
                e: int_to_hex(&key.e),
            })
        }
        SigningRequest::SignBlinded { blinded } => {
            let blind_signature = signer.sign_blinded(&int_from_hex(&blinded)?)?;
            HttpResponse::Ok().json(BlindedSignatureResponse {
                blind_signature: int_to_hex(&blind_signature),
                signer_id,
            })
        }
    };
    Ok(response)
}
