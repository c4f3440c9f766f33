//! Common test utilities for in-process MeshBase networks.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use meshnet_pingpong::PingPongConfig;
use meshnet_repl::{
    MemoryNameServer, MeshTypeIdentifier, NetMeshBase, NetMeshBaseIdentifier, NetMeshObjectIdentifier, PropertyValue,
    ReplConfig,
};
use tokio::runtime::Handle;

/// Fast endpoint timers so tokens go back and forth within milliseconds.
pub fn fast_config() -> ReplConfig {
    let mut config = ReplConfig::new(PingPongConfig::new(5, 10, 50));
    config.default_rpc_wait_ms = 2000;
    config
}

/// A set of MeshBases sharing one name server.
pub struct TestNetwork {
    pub name_server: Arc<MemoryNameServer>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            name_server: Arc::new(MemoryNameServer::new()),
        }
    }

    pub fn mesh_base(&self, name: &str) -> NetMeshBase {
        NetMeshBase::create(base_id(name), fast_config(), self.name_server.clone(), Handle::current())
    }
}

pub fn base_id(s: &str) -> NetMeshBaseIdentifier {
    NetMeshBaseIdentifier::create(s).unwrap()
}

pub fn label() -> MeshTypeIdentifier {
    MeshTypeIdentifier::new("Test/Label")
}

/// Create an object at `base` carrying `value` in the label property.
pub async fn create_labeled(base: &NetMeshBase, local: &str, value: &str) -> NetMeshObjectIdentifier {
    let id = NetMeshObjectIdentifier::create(base.identifier().clone(), Some(local)).unwrap();
    let mut tx = base.create_transaction_now().await.unwrap();
    tx.create_mesh_object(Some(id.clone()), &[]).unwrap();
    tx.set_property(&id, &label(), Some(PropertyValue::String(value.to_string())))
        .unwrap();
    tx.commit().await.unwrap();
    id
}

pub async fn set_label(base: &NetMeshBase, id: &NetMeshObjectIdentifier, value: &str) {
    let mut tx = base.create_transaction_now().await.unwrap();
    tx.set_property(id, &label(), Some(PropertyValue::String(value.to_string())))
        .unwrap();
    tx.commit().await.unwrap();
}

pub async fn label_at(base: &NetMeshBase, id: &NetMeshObjectIdentifier) -> Option<String> {
    let obj = base.find_mesh_object_by_identifier(id).await?;
    match obj.property(&label()) {
        Some(PropertyValue::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Poll `check` until it holds or two seconds have passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
