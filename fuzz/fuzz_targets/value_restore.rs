#![no_main]

use cachekit_sealed::{CacheValue, ValueType};
use libfuzzer_sys::fuzz_target;

const TYPES: [ValueType; 6] = [
    ValueType::String,
    ValueType::Number,
    ValueType::Boolean,
    ValueType::BigInt,
    ValueType::Object,
    ValueType::Array,
];

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    for value_type in TYPES {
        // Whatever restores must serialize again and keep its type
        if let Ok(value) = CacheValue::deserialize(raw, value_type) {
            assert_eq!(value.value_type(), value_type);
            if value.validate().is_ok() {
                let again = value.serialize().unwrap();
                assert_eq!(CacheValue::deserialize(&again, value_type).unwrap(), value);
            }
        }
    }
});
