use proptest::prelude::*;
use slotwise_types::{AppointmentId, ClientId, PractitionerId, TypesError};
use std::collections::HashSet;
use std::str::FromStr;

// ── ClientId ─────────────────────────────────────────────────────

#[test]
fn client_id_new_is_unique() {
    assert_ne!(ClientId::new(), ClientId::new());
}

#[test]
fn client_id_display_and_parse() {
    let id = ClientId::new();
    let parsed = ClientId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn client_id_from_str_invalid() {
    let err = ClientId::from_str("c1").unwrap_err();
    assert!(matches!(err, TypesError::InvalidUuid(_)));
    assert!(err.to_string().contains("invalid UUID"));
    assert!(!err.is_validation());
}

#[test]
fn client_id_hash_and_eq() {
    let id = ClientId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn client_id_serializes_as_plain_string() {
    let uuid = uuid::Uuid::new_v4();
    let id = ClientId::from_uuid(uuid);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{uuid}\""));
    assert_eq!(id.as_uuid(), uuid);
}

// ── AppointmentId / PractitionerId ───────────────────────────────

#[test]
fn appointment_id_serialization_roundtrip() {
    let id = AppointmentId::new();
    let json = serde_json::to_string(&id).unwrap();
    let parsed: AppointmentId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn practitioner_id_default_is_unique() {
    assert_ne!(PractitionerId::default(), PractitionerId::default());
}

proptest! {
    #[test]
    fn any_uuid_survives_display_parse(bits in any::<u128>()) {
        let id = AppointmentId::from_uuid(uuid::Uuid::from_u128(bits));
        prop_assert_eq!(AppointmentId::parse(&id.to_string()).unwrap(), id);
    }
}
