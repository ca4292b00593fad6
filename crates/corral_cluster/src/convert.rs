//! Conversions between core types and their wire shapes.

use corral_cluster_protocol::{WireHolder, WireSession, WireTarget};
use corral_core::lock::HolderId;
use corral_core::{LockTarget, NodeIndex, SessionInfo, TransactionId};
use corral_meta::{ObjectKey, PersistenceId, TypeId};

pub(crate) fn wire_target(target: &LockTarget) -> WireTarget {
    match target {
        LockTarget::Object(key) => WireTarget {
            type_id: key.type_id.as_u32(),
            object: Some(*key.id.as_bytes()),
        },
        LockTarget::Type(type_id) => WireTarget {
            type_id: type_id.as_u32(),
            object: None,
        },
    }
}

pub(crate) fn core_target(wire: &WireTarget) -> LockTarget {
    let type_id = TypeId::new(wire.type_id);
    match wire.object {
        Some(bytes) => LockTarget::Object(ObjectKey::new(
            type_id,
            PersistenceId::from_bytes(bytes),
        )),
        None => LockTarget::Type(type_id),
    }
}

pub(crate) fn wire_holder(holder: HolderId) -> WireHolder {
    WireHolder {
        node: holder.node.as_u32(),
        txn: holder.txn.as_u64(),
    }
}

pub(crate) fn core_holder(wire: WireHolder) -> HolderId {
    HolderId::new(NodeIndex::new(wire.node), TransactionId::new(wire.txn))
}

pub(crate) fn wire_session(session: &SessionInfo) -> WireSession {
    session.clone().into_map()
}

pub(crate) fn core_session(wire: WireSession) -> SessionInfo {
    SessionInfo::from_map(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_round_trip() {
        let object = LockTarget::Object(ObjectKey::new(TypeId::new(4), PersistenceId::generate()));
        assert_eq!(core_target(&wire_target(&object)), object);

        let whole_type = LockTarget::Type(TypeId::new(9));
        assert_eq!(core_target(&wire_target(&whole_type)), whole_type);
    }

    #[test]
    fn holder_round_trip() {
        let holder = HolderId::new(NodeIndex::new(3), TransactionId::new(41));
        assert_eq!(core_holder(wire_holder(holder)), holder);
    }

    #[test]
    fn session_round_trip() {
        let session = SessionInfo::new().with("user", "dana");
        assert_eq!(core_session(wire_session(&session)), session);
    }
}
