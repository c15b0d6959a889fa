//! Profiling tool to compare erosion schedules

use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use terrain_sculptor::erosion::{
    run_batch, run_batch_parallel, DropletParams, SimulationDriver, SpawnArea,
};
use terrain_sculptor::{generate_heightmap, GridFrame, HeightGrid, NoiseConfig, TerrainSeeds};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> terrain_sculptor::Result<()> {
    let resolution = 513;
    let droplets = 100_000;
    let seeds = TerrainSeeds::from_master(1337);

    println!("=== Performance Profiling ===");
    println!("Grid size: {}x{} ({} cells)", resolution, resolution, resolution * resolution);
    println!("Droplets: {}", droplets);
    println!();

    let frame = GridFrame::new(resolution, glam::Vec3::ZERO, glam::Vec3::new(100.0, 20.0, 100.0))?;

    // Profile heightmap generation
    let start = Instant::now();
    let field = generate_heightmap(resolution, &NoiseConfig::with_seed(seeds.noise))?;
    let heightmap_time = start.elapsed();
    println!("Heightmap generation: {:?}", heightmap_time);

    let params = DropletParams {
        max_lifetime: 64,
        step_length: frame.cell_pitch().x,
        ..DropletParams::default()
    };
    let area = SpawnArea::covering(&frame);
    println!("\nErosion parameters:\n  {:?}\n", params);

    let base = field.into_grid(frame)?;

    // Sequential: one droplet at a time
    let mut grid = base.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(seeds.erosion);
    let start = Instant::now();
    let sequential = run_batch(&mut grid, droplets, &area, &params, &mut rng);
    let sequential_time = start.elapsed();
    report("Sequential", &sequential, sequential_time);

    // Interleaved: 50 droplets spawned per tick
    let mut grid = base.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(seeds.erosion);
    let start = Instant::now();
    let interleaved = SimulationDriver::new(params.clone()).and_then(|mut driver| {
        driver.run_chunked(droplets, 50, &area, &mut grid, &mut rng)?;
        Ok(driver.into_stats())
    });
    let interleaved_time = start.elapsed();
    report("Interleaved", &interleaved, interleaved_time);

    // Parallel batches
    let mut parallel_time = std::time::Duration::ZERO;
    for batch_size in [256, 1024, 4096] {
        let mut grid: HeightGrid = base.clone();
        let start = Instant::now();
        let parallel =
            run_batch_parallel(&mut grid, droplets, &area, &params, seeds.erosion, batch_size);
        let elapsed = start.elapsed();
        report(&format!("Parallel (batch {})", batch_size), &parallel, elapsed);
        if batch_size == 1024 {
            parallel_time = elapsed;
        }
    }

    // Summary
    let total = heightmap_time + sequential_time + interleaved_time + parallel_time;
    let pct = |d: std::time::Duration| 100.0 * d.as_secs_f64() / total.as_secs_f64();
    println!("\n=== Summary ===");
    println!("Heightmap:        {:>8.2}% ({:?})", pct(heightmap_time), heightmap_time);
    println!("Sequential:       {:>8.2}% ({:?})", pct(sequential_time), sequential_time);
    println!("Interleaved:      {:>8.2}% ({:?})", pct(interleaved_time), interleaved_time);
    println!("Parallel (1024):  {:>8.2}% ({:?})", pct(parallel_time), parallel_time);
    println!("─────────────────────────────────");
    println!("TOTAL:            {:>8}  {:?}", "100%", total);

    Ok(())
}

fn report(
    label: &str,
    result: &terrain_sculptor::Result<terrain_sculptor::erosion::ErosionStats>,
    elapsed: std::time::Duration,
) {
    match result {
        Ok(stats) => {
            println!("{}: {:?}", label, elapsed);
            println!(
                "  Eroded: {:.3}  Deposited: {:.3}  Steps: {}",
                stats.total_eroded, stats.total_deposited, stats.steps_taken
            );
        }
        Err(e) => println!("{}: failed: {}", label, e),
    }
}
