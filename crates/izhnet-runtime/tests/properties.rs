//! Property tests for the registry and weight bounds

use izhnet_runtime::{
    Arena, NeuronPreset, PopulationOptions, RuntimeError, SimContext, SlotKind, SynapseOptions,
};
use proptest::prelude::*;
use slotmap::{new_key_type, Key};
use std::collections::HashMap;

new_key_type! {
    struct ItemId;
}

#[derive(Debug, Default)]
struct Item;

impl SlotKind for Item {
    const KIND: &'static str = "item";
    type Key = ItemId;
}

#[derive(Debug, Clone)]
enum RegistryOp {
    Allocate(u8),
    Release(u8),
}

fn registry_op() -> impl Strategy<Value = RegistryOp> {
    prop_oneof![
        (0u8..12).prop_map(RegistryOp::Allocate),
        (0u8..12).prop_map(RegistryOp::Release),
    ]
}

proptest! {
    /// Live ids resolve, released handles never do, and slots are never shared
    #[test]
    fn registry_tracks_live_ids(ops in prop::collection::vec(registry_op(), 1..200)) {
        let mut registry = Arena::<Item>::new();
        let mut live = HashMap::new();
        let mut retired = Vec::new();

        for op in ops {
            match op {
                RegistryOp::Allocate(n) => {
                    let id = format!("id{}", n);
                    let (handle, _) = registry.insert_with(&id, || Ok(Item)).unwrap();
                    if let Some(&existing) = live.get(&id) {
                        prop_assert_eq!(handle, existing);
                    }
                    live.insert(id, handle);
                }
                RegistryOp::Release(n) => {
                    let id = format!("id{}", n);
                    let released = registry.remove(&id);
                    prop_assert_eq!(released, live.remove(&id));
                    retired.extend(released);
                }
            }
        }

        prop_assert_eq!(registry.len(), live.len());
        let mut slots: Vec<u32> = live.values().map(|h| h.data().as_ffi() as u32).collect();
        slots.sort_unstable();
        slots.dedup();
        prop_assert_eq!(slots.len(), live.len());

        for (id, &handle) in &live {
            prop_assert_eq!(registry.handle_of(id), Some(handle));
            prop_assert_eq!(registry.id_of(handle), Some(id.as_str()));
            prop_assert!(registry.is_live(handle));
        }
        for handle in retired {
            let is_stale = matches!(
                registry.get(handle),
                Err(RuntimeError::StaleHandle { kind: "item", .. })
            );
            prop_assert!(is_stale);
        }
        prop_assert!(registry.names().count() <= 12);
    }

    /// Rewards of any sign never push weights across the presynaptic sign
    #[test]
    fn rewards_keep_weights_in_bounds(
        rewards in prop::collection::vec(-50.0f32..50.0, 1..40),
        excitatory in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let mut ctx = SimContext::new(seed);
        let preset = if excitatory { NeuronPreset::RegularSpiking } else { NeuronPreset::FastSpiking };
        let options = PopulationOptions::default().with_noise(0.0);
        let pre = ctx.allocate_population("pre", 6, preset, &options).unwrap();
        let post = ctx.allocate_population("post", 6, NeuronPreset::RegularSpiking, &options).unwrap();
        let (pre_idx, post_idx) = izhnet_runtime::connectivity::all_to_all(6, 6);
        let group = ctx
            .allocate_synapse_group("g", pre, post, pre_idx, post_idx, SynapseOptions::default())
            .unwrap();
        let (min, max) = ctx.weight_bounds(pre).unwrap();

        for reward in rewards {
            ctx.inject_current(pre, &[0, 2, 4], &[500.0, 500.0, 500.0]).unwrap();
            ctx.inject_current(post, &[1, 3, 5], &[500.0, 500.0, 500.0]).unwrap();
            ctx.integrate(pre, 1.0, false).unwrap();
            ctx.integrate(post, 1.0, false).unwrap();
            ctx.transmit(group).unwrap();
            ctx.update_traces(group).unwrap();
            ctx.apply_stdp(group, true).unwrap();
            ctx.apply_reward(group, reward).unwrap();

            let weights = ctx.group(group).unwrap().weights();
            prop_assert!(weights.iter().all(|&w| w >= min && w <= max));
        }
    }

    /// Bad injections are rejected without touching any current
    #[test]
    fn rejected_injection_mutates_nothing(
        offsets in prop::collection::vec(0usize..16, 0..10),
        amounts in prop::collection::vec(-5.0f32..5.0, 0..10),
    ) {
        let mut ctx = SimContext::new(0);
        let pop = ctx
            .allocate_population("p", 8, NeuronPreset::RegularSpiking, &PopulationOptions::default())
            .unwrap();

        let result = ctx.inject_current(pop, &offsets, &amounts);
        let valid = offsets.len() == amounts.len() && offsets.iter().all(|&o| o < 8);
        prop_assert_eq!(result.is_ok(), valid);
        if !valid {
            let current = ctx.population(pop).unwrap().current();
            prop_assert!(current.iter().all(|&i| i == 0.0));
        }
    }
}
