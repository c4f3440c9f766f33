#![warn(missing_docs)]

//! MeshNet demo node: two in-process MeshBases replicating one object.

use std::path::PathBuf;
use std::sync::Arc;

use meshnet_repl::{
    MemoryNameServer, MeshTypeIdentifier, NetMeshBase, NetMeshBaseIdentifier, NetMeshObjectAccessSpecification,
    PropertyValue, ReplConfig,
};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => ReplConfig::from_file(&path)?,
        None => ReplConfig::default(),
    };
    info!(?config, "MeshNet node starting...");

    let name_server = Arc::new(MemoryNameServer::new());
    let m1 = NetMeshBase::create(
        NetMeshBaseIdentifier::create("http://m1.example.com/")?,
        config.clone(),
        name_server.clone(),
        Handle::current(),
    );
    let m2 = NetMeshBase::create(
        NetMeshBaseIdentifier::create("http://m2.example.com/")?,
        config.clone(),
        name_server,
        Handle::current(),
    );

    let label = MeshTypeIdentifier::new("Demo/Label");
    let mut tx = m1.create_transaction_now().await?;
    let object = tx.create_mesh_object(None, &[])?;
    tx.set_property(&object, &label, Some(PropertyValue::String("hello".to_string())))?;
    tx.commit().await?;
    info!(object = %object, mesh_base = %m1.identifier(), "created object");

    let outcome = m2
        .access_locally(
            vec![NetMeshObjectAccessSpecification::via(m1.identifier().clone(), object.clone())],
            config.default_rpc_wait_ms,
        )
        .await?;
    if !outcome.is_complete_result_available() {
        anyhow::bail!("could not replicate {} into {}", object, m2.identifier());
    }
    info!(object = %object, mesh_base = %m2.identifier(), "replicated object");

    let got_lock = m2
        .try_to_obtain_lock(&object, config.try_to_obtain_lock_timeout_ms)
        .await?;
    info!(object = %object, mesh_base = %m2.identifier(), got_lock, "asked for lock");

    if got_lock {
        let mut tx = m2.create_transaction_now().await?;
        tx.set_property(&object, &label, Some(PropertyValue::String("changed at m2".to_string())))?;
        tx.commit().await?;
        info!(object = %object, mesh_base = %m2.identifier(), "updated object");
    }

    m2.die();
    m1.die();
    info!("MeshNet node stopped");
    Ok(())
}
