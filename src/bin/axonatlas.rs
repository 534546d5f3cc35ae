//! AxonAtlas CLI — decompose a volume, build guidance graphs, grow axons
//!
//! Commands:
//!   axonatlas demo    — run the pipeline on a synthetic cube
//!   axonatlas run     — run the pipeline on a saved volume
//!   axonatlas config  — print the default configuration

use axonatlas_core::guidance::{
    draw_random_axon, euclidean_distance, euclidean_path_length, sample_axons, Axon,
};
use axonatlas_core::{
    voxel_graph_from_volume, GuidanceGraph, PipelineConfig, Result, Volume,
};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use std::env;
use std::sync::Arc;

const N_AXONS: usize = 8;

fn print_usage() {
    println!(
        r#"
AxonAtlas — hierarchical decomposition and axon guidance

Usage: axonatlas <command> [options]

Commands:
  demo    [side] [seed]                                  Run the pipeline on a synthetic cube
  run     <volume.json> [config.json] [hierarchy.json]   Run the pipeline on a saved volume
  config                                                 Print the default configuration

Examples:
  axonatlas demo 6 42
  axonatlas config > pipeline.json
  axonatlas run volume.json pipeline.json hierarchy.json
"#
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    let result = match args[1].as_str() {
        "demo" => cmd_demo(&args[2..]),
        "run" => cmd_run(&args[2..]),
        "config" => cmd_config(),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("  Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_or<T: std::str::FromStr>(arg: Option<&String>, default: T, what: &str) -> T {
    match arg {
        Some(s) => s.parse().unwrap_or_else(|_| {
            eprintln!("  {} must be a number, using default", what);
            default
        }),
        None => default,
    }
}

fn cmd_demo(args: &[String]) -> Result<()> {
    let side: usize = parse_or(args.first(), 6, "side");
    let seed: u64 = parse_or(args.get(1), 42, "seed");

    println!("Step 1: Synthetic volume {}x{}x{} (seed {})", side, side, side, seed);
    println!("{}", "-".repeat(60));
    let volume = Volume::synthetic([side, side, side], 12, seed);
    println!("  {} voxels, {} genes", volume.n_voxels(), volume.n_genes());

    let mut config = PipelineConfig::default();
    config.decomposition.seed = seed;
    run_pipeline(volume, &config, None, seed)
}

fn cmd_run(args: &[String]) -> Result<()> {
    let Some(volume_path) = args.first() else {
        eprintln!("Usage: axonatlas run <volume.json> [config.json] [hierarchy.json]");
        return Ok(());
    };

    println!("Step 1: Loading volume from {}", volume_path);
    println!("{}", "-".repeat(60));
    let volume = Volume::load(volume_path)?;
    println!(
        "  {} voxels, {} genes, age {}",
        volume.n_voxels(),
        volume.n_genes(),
        volume.age
    );

    let config = match args.get(1) {
        Some(path) => {
            println!("  Configuration from {}", path);
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    let seed = config.decomposition.seed;
    run_pipeline(volume, &config, args.get(2).map(String::as_str), seed)
}

fn cmd_config() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
    Ok(())
}

fn run_pipeline(
    volume: Volume,
    config: &PipelineConfig,
    hierarchy_out: Option<&str>,
    seed: u64,
) -> Result<()> {
    config.validate()?;
    let volume = Arc::new(volume);

    println!("\nStep 2: Voxel graph ({:?})", config.edges);
    println!("{}", "-".repeat(60));
    let voxel_graph = voxel_graph_from_volume(&volume, &config.edges);
    println!("  {} directed edges", voxel_graph.n_edges());

    println!("\nStep 3: Decomposition ({:?})", config.decomposition.schedule);
    println!("{}", "-".repeat(60));
    let hierarchy = config.decomposition.decompose(volume.clone())?;
    println!(
        "  {} interior nodes, {} finest regions, max depth {}",
        hierarchy.n_progenitors(hierarchy.root()),
        hierarchy.just_not_leaves(hierarchy.root()).len(),
        hierarchy.max_depth()
    );
    if let Some(path) = hierarchy_out {
        hierarchy.save_json(path, false)?;
        println!("  Saved hierarchy to {}", path);
    }

    println!("\nStep 4: Guidance graphs");
    println!("{}", "-".repeat(60));
    let guidance = GuidanceGraph::create(Arc::new(hierarchy), &voxel_graph, &config.guidance)?;
    println!(
        "  {} states, {} up edges, {} down edges, {} sources",
        guidance.n_vertices(),
        guidance.up_graph().n_edges(),
        guidance.down_graph().n_edges(),
        guidance.sources().len()
    );

    println!("\nStep 5: Axons");
    println!("{}", "-".repeat(60));
    let mut rng = StdRng::seed_from_u64(seed);
    let n_axons = N_AXONS.min(volume.n_voxels());
    let source_voxels = sample(&mut rng, volume.n_voxels(), n_axons).into_vec();
    let axons = match sample_axons(&guidance, &source_voxels) {
        Ok(axons) => axons,
        Err(e) => {
            eprintln!("  Could not sample axons: {}", e);
            return Ok(());
        }
    };

    for axon in &axons {
        let random = draw_random_axon(
            &voxel_graph,
            volume.clone(),
            axon.source_voxel(),
            axon.reached_voxels().len(),
            &mut rng,
        );
        let (length, distance) = path_stats(axon);
        println!(
            "  voxel {:>5}: {:>4} voxels, {:>3} tips, mean path {:>8.1} ({:>8.1} straight), \
             overlap with random {:.2}",
            axon.source_voxel(),
            axon.reached_voxels().len(),
            axon.tips().len(),
            length,
            distance,
            axon.overlap(&random)
        );
    }

    if axons.len() > 1 {
        let mut total = 0.0;
        let mut pairs = 0;
        for (i, a) in axons.iter().enumerate() {
            for b in &axons[i + 1..] {
                total += a.average_minimum_distance_tips(b);
                pairs += 1;
            }
        }
        println!("  mean tip distance between axons: {:.1}", total / pairs as f64);
    }
    Ok(())
}

/// Mean integrated and straight-line length over an axon's voxel paths
fn path_stats(axon: &Axon) -> (f64, f64) {
    let volume = axon.volume();
    let paths: Vec<Vec<usize>> = axon
        .voxel_paths()
        .into_iter()
        .filter(|p| p.len() > 1)
        .collect();
    if paths.is_empty() {
        return (0.0, 0.0);
    }
    let n = paths.len() as f64;
    let length = paths.iter().map(|p| euclidean_path_length(volume, p)).sum::<f64>() / n;
    let distance = paths.iter().map(|p| euclidean_distance(volume, p)).sum::<f64>() / n;
    (length, distance)
}
