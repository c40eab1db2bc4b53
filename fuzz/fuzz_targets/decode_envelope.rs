#![no_main]

use cachekit_sealed::ObfuscationEngine;
use cachekit_sealed::obfuscation::DEFAULT_ROTATION_PERIOD;
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

struct Harness {
    _runtime: Runtime,
    engine: ObfuscationEngine,
}

fn harness() -> &'static Harness {
    static HARNESS: OnceLock<Harness> = OnceLock::new();
    HARNESS.get_or_init(|| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let engine = {
            let _enter = runtime.enter();
            ObfuscationEngine::with_key([0x42; 32], DEFAULT_ROTATION_PERIOD).unwrap()
        };
        Harness {
            _runtime: runtime,
            engine,
        }
    })
}

fuzz_target!(|data: &[u8]| {
    // Attack scenarios:
    // 1. Wrong part counts, empty parts, stray separators
    // 2. Odd-length or non-hex IV and ciphertext
    // 3. Nonce of the wrong size, ciphertext shorter than the tag
    // 4. Valid-looking envelopes with forged tags or unknown type names
    let Ok(encoded) = std::str::from_utf8(data) else {
        return;
    };

    // Must return an error, never panic; random input cannot authenticate
    assert!(harness().engine.decode(encoded).is_err());
});
