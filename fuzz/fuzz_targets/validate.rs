#![no_main]
use libfuzzer_sys::fuzz_target;

use serde_json::Value;

fuzz_target!(|schema_and_instance: (String, Vec<u8>)| {
    let schema: Value = match serde_json::from_str(&schema_and_instance.0) {
        Ok(schema) => schema,
        Err(_) => return,
    };

    // Only schemas that compile are of interest here.
    let validator = match jsonshape::compile(&schema, jsonshape::Options::new().with_greedy(true)) {
        Ok(validator) => validator,
        Err(_) => return,
    };

    if let Ok(instance) = serde_json::from_slice(&schema_and_instance.1) {
        let errors = validator.validate(&instance);
        assert_eq!(errors.is_empty(), validator.is_valid(&instance));
    }
});
