#![no_main]
use libfuzzer_sys::fuzz_target;
use shield_groups::bus::SignalEnvelope;

fuzz_target!(|data: &[u8]| {
    // Garbage from another tab must be rejected, never panic
    if let Ok(envelope) = SignalEnvelope::from_cbor(data) {
        let bytes = envelope
            .to_cbor()
            .expect("Re-encoding a decoded envelope must succeed");
        let again = SignalEnvelope::from_cbor(&bytes).expect("Round trip must decode");
        assert_eq!(again, envelope, "Envelope round-trip mismatch");
    }
});
