use axonatlas_core::guidance::sample_axons;
use axonatlas_core::hierarchy::{make_balanced_hierarchy, make_hierarchy, SplitMethod};
use axonatlas_core::{
    voxel_graph_from_volume, EdgeGenerator, GuidanceConfig, GuidanceGraph, Volume,
};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn bench_pipeline(c: &mut Criterion) {
    let volume = Arc::new(Volume::synthetic([8, 8, 4], 16, 1));

    c.bench_function("gabriel_graph_256", |b| {
        b.iter(|| voxel_graph_from_volume(&volume, &EdgeGenerator::default()))
    });

    c.bench_function("pca_hierarchy_256", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(0);
            make_hierarchy(volume.clone(), None, SplitMethod::Pca, &mut rng).unwrap()
        })
    });

    c.bench_function("balanced_random_hierarchy_256", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(0);
            make_balanced_hierarchy(volume.clone(), None, SplitMethod::Random, &mut rng).unwrap()
        })
    });

    let mut rng = StdRng::seed_from_u64(0);
    let hierarchy = Arc::new(make_hierarchy(volume.clone(), None, SplitMethod::Pca, &mut rng).unwrap());
    let voxel_graph = voxel_graph_from_volume(&volume, &EdgeGenerator::Lattice);
    let config = GuidanceConfig {
        include_root: true,
        ..GuidanceConfig::default()
    };

    c.bench_function("guidance_graphs_256", |b| {
        b.iter(|| GuidanceGraph::create(hierarchy.clone(), &voxel_graph, &config).unwrap())
    });

    let guidance = GuidanceGraph::create(hierarchy.clone(), &voxel_graph, &config).unwrap();
    c.bench_function("sample_8_axons_256", |b| {
        b.iter(|| sample_axons(&guidance, &[0, 31, 63, 100, 127, 170, 200, 255]).unwrap())
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
