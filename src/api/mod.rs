//! HTTP surfaces of the ledger node and the two trusted parties.

pub mod ledger;
pub mod trusted;

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use log::info;

use crate::node::LedgerNode;
use crate::trusted::{BlindSigner, EncryptionService};

pub async fn serve_ledger(node: Arc<LedgerNode>, host: &str, port: u16) -> std::io::Result<()> {
    let data = web::Data::from(node);
    info!("ledger node listening on {}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(ledger::configure)
    })
    .bind((host, port))?
    .run()
    .await
}

pub async fn serve_encryption(service: EncryptionService, host: &str, port: u16) -> std::io::Result<()> {
    let data = web::Data::new(service);
    info!("TP1 encryption service listening on {}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(trusted::configure_encryption)
    })
    .bind((host, port))?
    .run()
    .await
}

pub async fn serve_signing(signer: BlindSigner, host: &str, port: u16) -> std::io::Result<()> {
    let data = web::Data::new(signer);
    info!("TP2 blind signing service listening on {}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(trusted::configure_signing)
    })
    .bind((host, port))?
    .run()
    .await
}
