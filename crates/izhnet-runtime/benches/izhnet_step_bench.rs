use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use izhnet_runtime::{
    connectivity, NetworkConfig, NetworkId, NeuronPreset, PopulationOptions, SimContext,
    SynapseOptions,
};

fn build_reservoir(excitatory: usize, density: f32) -> (SimContext, NetworkId) {
    let inhibitory = (excitatory / 4).max(1);
    let mut ctx = SimContext::new(1234);
    let net = ctx
        .allocate_network("bench", NetworkConfig::default())
        .expect("bench network");
    let options = PopulationOptions::default();
    let exc = ctx
        .allocate_population("exc", excitatory, NeuronPreset::RegularSpiking, &options)
        .expect("bench population");
    let inh = ctx
        .allocate_population("inh", inhibitory, NeuronPreset::FastSpiking, &options)
        .expect("bench population");
    ctx.add_population_to_network(net, exc).expect("membership");
    ctx.add_population_to_network(net, inh).expect("membership");

    let wiring = [
        ("ee", exc, exc, excitatory, excitatory),
        ("ei", exc, inh, excitatory, inhibitory),
        ("ie", inh, exc, inhibitory, excitatory),
    ];
    for (id, pre, post, pre_size, post_size) in wiring {
        let (pre_idx, post_idx) = if pre == post {
            connectivity::recurrent(pre_size, density, ctx.rng_mut())
        } else {
            connectivity::random(pre_size, post_size, density, ctx.rng_mut())
        }
        .expect("bench connectivity");
        let group = ctx
            .allocate_synapse_group(id, pre, post, pre_idx, post_idx, SynapseOptions::default())
            .expect("bench group");
        ctx.add_synapse_group_to_network(net, group).expect("membership");
    }
    (ctx, net)
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("izhnet_step");
    // Short runs to keep benches fast in CI
    let ticks = 20;

    for &n in &[100usize, 400, 1600] {
        group.throughput(Throughput::Elements(n as u64 * ticks));
        group.bench_with_input(BenchmarkId::new("reservoir", n), &n, |b, &n| {
            b.iter_batched(
                || build_reservoir(n, 0.1),
                |(mut ctx, net)| {
                    for _ in 0..ticks {
                        ctx.step(net, 1.0).unwrap();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_integrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("izhnet_integrate");

    // Straddles the parallel threshold
    for &n in &[1024usize, 8192] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("population", n), &n, |b, &n| {
            let mut ctx = SimContext::new(7);
            let pop = ctx
                .allocate_population("p", n, NeuronPreset::RegularSpiking, &PopulationOptions::default())
                .unwrap();
            b.iter(|| ctx.integrate(pop, 1.0, true).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_step, bench_integrate);
criterion_main!(benches);
