#![no_main]
use libfuzzer_sys::fuzz_target;
use shield_groups::groups::ids::IdentityMapper;
use shield_groups::groups::model::{normalize, Provenance, ServerGroup};
use shield_groups::groups::ownership::{is_owner, OwnerRecord};

fuzz_target!(|data: &[u8]| {
    // Any JSON the backend might send must normalize without panicking
    let raw: ServerGroup = match serde_json::from_slice(data) {
        Ok(g) => g,
        Err(_) => return,
    };

    let mut identity = IdentityMapper::new();
    let mut owners = OwnerRecord::new();
    let first = normalize(&raw, Provenance::Server, &mut identity, &mut owners);
    let second = normalize(&raw, Provenance::Server, &mut identity, &mut owners);

    // Identity is memoized: same payload, same local id
    assert_eq!(first.local_id, second.local_id, "local id must be stable");
    assert_ne!(first.local_id.0, 0, "local id must be non-zero");
    if first.backend_id.is_persisted() {
        assert_eq!(identity.local_for(&first.backend_id), Some(first.local_id));
    }

    let _ = is_owner(&first, &owners, Some("1"));
    let _ = first.capacity_label();

    let local = normalize(&raw, Provenance::Local, &mut identity, &mut owners);
    assert!(local.is_local_only(), "local provenance never carries a backend id");
});
