use proptest::prelude::*;

use ragstudio_core::runtime::Precision;
use ragstudio_runtime::negotiate::{NegotiationPolicy, negotiate};
use ragstudio_runtime::profile::{MemoryFootprint, ModelProfile};
use ragstudio_runtime::resources::ResourceSnapshot;

const MIB: u64 = 1024 * 1024;

fn profile(native: Precision, max_len: u32) -> ModelProfile {
    ModelProfile {
        name: "local".to_string(),
        max_position_embeddings: max_len,
        native_precision: native,
        footprint: Some(MemoryFootprint {
            parameter_count: 1_000_000_000,
            num_layers: 24,
            num_kv_heads: 8,
            head_dim: 64,
        }),
    }
}

fn precision() -> impl Strategy<Value = Precision> {
    prop_oneof![
        Just(Precision::Float32),
        Just(Precision::Float16),
        Just(Precision::BFloat16),
    ]
}

proptest! {
    #[test]
    fn less_memory_never_yields_a_longer_context(
        native in precision(),
        max_len in 1024u32..200_000,
        larger_mib in 0u64..200_000,
        shrink_mib in 0u64..200_000,
        major in 6u32..10,
    ) {
        let smaller_mib = larger_mib.saturating_sub(shrink_mib);
        let profile = profile(native, max_len);
        let policy = NegotiationPolicy::default();

        let larger = negotiate(&profile, &ResourceSnapshot::single_device(larger_mib * MIB, (major, 0)), &policy);
        let smaller = negotiate(&profile, &ResourceSnapshot::single_device(smaller_mib * MIB, (major, 0)), &policy);

        match (larger, smaller) {
            (Ok(l), Ok(s)) => {
                prop_assert!(s.effective_max_len <= l.effective_max_len);
                prop_assert_eq!(s.precision, l.precision);
            }
            // Failing with more memory but succeeding with less would be a regression.
            (Err(_), Ok(_)) => prop_assert!(false, "negotiation succeeded only with less memory"),
            _ => {}
        }
    }

    #[test]
    fn effective_length_respects_both_limits(
        max_len in 1024u32..200_000,
        free_mib in 4096u64..200_000,
    ) {
        let profile = profile(Precision::BFloat16, max_len);
        let snapshot = ResourceSnapshot::single_device(free_mib * MIB, (8, 0));
        if let Ok(config) = negotiate(&profile, &snapshot, &NegotiationPolicy::default()) {
            prop_assert!(config.effective_max_len <= max_len);
            prop_assert!(config.effective_max_len <= config.max_len_by_memory.unwrap());
        }
    }
}
