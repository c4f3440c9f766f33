//! The normal bidirectional policy.

use crate::access::NetMeshObjectAccessSpecification;
use crate::config::ReplConfig;
use crate::identifier::NetMeshObjectIdentifier;
use crate::instructions::{ProxyProcessingInstructions, WaitKind, WaitingSend};
use crate::policy::{potentially_convey, InitiatingProxyPolicy, ProxyIdentity, ProxyPolicy, ReplicaView};
use crate::xpriso::XprisoMessage;

/// Replicas may be requested from and locks handed to any partner; the home replica has the final say.
#[derive(Debug, Clone)]
pub struct DefaultProxyPolicy {
    default_rpc_wait_ms: u64,
    points_replicas_to_itself: bool,
}

impl Default for DefaultProxyPolicy {
    fn default() -> Self {
        Self::new(&ReplConfig::default())
    }
}

impl DefaultProxyPolicy {
    /// Create a policy from the replication config.
    pub fn new(config: &ReplConfig) -> Self {
        Self {
            default_rpc_wait_ms: config.default_rpc_wait_ms,
            points_replicas_to_itself: config.points_replicas_to_itself,
        }
    }

    fn waiting(&self, message: XprisoMessage, kind: WaitKind, timeout_ms: Option<u64>) -> ProxyProcessingInstructions {
        ProxyProcessingInstructions {
            start_communicating: true,
            send_and_wait: Some(WaitingSend {
                message,
                kind,
                timeout_ms: self.calculate_timeout_ms(timeout_ms),
            }),
            ..Default::default()
        }
    }
}

impl ProxyPolicy for DefaultProxyPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn default_rpc_wait_ms(&self) -> u64 {
        self.default_rpc_wait_ms
    }

    fn points_replicas_to_itself(&self) -> bool {
        self.points_replicas_to_itself
    }

    fn as_initiating(&self) -> Option<&dyn InitiatingProxyPolicy> {
        Some(self)
    }
}

impl InitiatingProxyPolicy for DefaultProxyPolicy {
    fn calculate_for_obtain_replicas(
        &self,
        specs: &[NetMeshObjectAccessSpecification],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        for spec in specs {
            outgoing.add_requested_first_time_object(spec.clone());
        }
        self.waiting(outgoing, WaitKind::Replica, timeout_ms)
    }

    fn calculate_for_try_to_obtain_locks(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        for identifier in identifiers {
            outgoing.add_requested_lock_object(identifier.clone());
        }
        self.waiting(outgoing, WaitKind::Lock, timeout_ms)
    }

    fn calculate_for_try_to_push_locks(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        let mut register = Vec::new();
        let mut surrender = Vec::new();
        for identifier in identifiers {
            let Some(obj) = view.find(identifier) else {
                continue;
            };
            if !obj.has_lock() {
                continue;
            }
            if potentially_convey(obj, &mut outgoing, proxy, self.points_replicas_to_itself) {
                register.push(identifier.clone());
            }
            outgoing.add_push_lock_object(identifier.clone());
            surrender.push(identifier.clone());
        }
        let mut ret = self.waiting(outgoing, WaitKind::Lock, timeout_ms);
        for identifier in register {
            ret.add_register_replication(identifier);
        }
        ret.surrender_locks = surrender;
        ret
    }

    fn calculate_for_try_to_obtain_home_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        for identifier in identifiers {
            outgoing.add_requested_home_replica(identifier.clone());
        }
        self.waiting(outgoing, WaitKind::Home, timeout_ms)
    }

    fn calculate_for_try_to_push_home_replicas(
        &self,
        identifiers: &[NetMeshObjectIdentifier],
        timeout_ms: Option<u64>,
        proxy: &ProxyIdentity,
        view: &dyn ReplicaView,
    ) -> ProxyProcessingInstructions {
        let mut outgoing = proxy.outgoing_message();
        let mut register = Vec::new();
        let mut surrender = Vec::new();
        for identifier in identifiers {
            let Some(obj) = view.find(identifier) else {
                continue;
            };
            if !obj.is_home_replica() {
                continue;
            }
            if potentially_convey(obj, &mut outgoing, proxy, self.points_replicas_to_itself) {
                register.push(identifier.clone());
            }
            outgoing.add_push_home_replica(identifier.clone());
            surrender.push(identifier.clone());
        }
        let mut ret = self.waiting(outgoing, WaitKind::Home, timeout_ms);
        for identifier in register {
            ret.add_register_replication(identifier);
        }
        ret.surrender_homes = surrender;
        ret
    }
}
