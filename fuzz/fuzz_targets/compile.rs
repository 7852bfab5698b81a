#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(schema) = serde_json::from_slice(data) {
        let _ = jsonshape::compile(&schema, jsonshape::Options::new().with_missing_ref_allowed(true));
    }
});
