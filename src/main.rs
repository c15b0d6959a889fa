use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use terrain_sculptor::config::SculptConfig;
use terrain_sculptor::erosion::{
    count_sinks, run_batch, run_batch_parallel, DropletParams, ErosionPreset, ErosionStats,
    GradientStrategy, SimulationDriver,
};
use terrain_sculptor::error::Result;
use terrain_sculptor::export;
use terrain_sculptor::heightmap::generate_heightmap;
use terrain_sculptor::tilemap::Tilemap;

#[derive(Parser, Debug)]
#[command(name = "terrain_sculptor")]
#[command(about = "Generate a Perlin heightfield and carve it with hydraulic erosion")]
struct Args {
    /// JSON run configuration (defaults are used for anything missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid side length in samples
    #[arg(short, long)]
    resolution: Option<usize>,

    /// Master seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Draw a fresh seed instead of using the configured one
    #[arg(long)]
    randomize_seed: bool,

    /// Pin the noise seed instead of deriving it from the master seed
    #[arg(long)]
    noise_seed: Option<u64>,

    /// Pin the erosion seed instead of deriving it from the master seed
    #[arg(long)]
    erosion_seed: Option<u64>,

    /// Number of droplets to simulate
    #[arg(short, long)]
    droplets: Option<usize>,

    /// Erosion preset (gentle, default, aggressive); replaces the config's erosion section
    #[arg(short, long)]
    preset: Option<ErosionPreset>,

    /// Run droplets on all cores
    #[arg(long, conflicts_with = "sequential")]
    parallel: bool,

    /// Run droplets on one thread
    #[arg(long)]
    sequential: bool,

    /// Sequential mode: spawn this many droplets per tick and step them together
    #[arg(long)]
    spawn_per_tick: Option<usize>,

    /// Directory for PNG previews
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Skip writing PNG previews
    #[arg(long)]
    no_images: bool,

    /// Write the resolved configuration to this path
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn resolve_config(args: &Args) -> Result<SculptConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            SculptConfig::load(path)?
        }
        None => SculptConfig::default(),
    };

    if let Some(resolution) = args.resolution {
        config.terrain.resolution = resolution;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
        config.randomize_seed = false;
    }
    if args.randomize_seed {
        config.randomize_seed = true;
    }
    if let Some(droplets) = args.droplets {
        config.batch.droplets = droplets;
    }
    if let Some(preset) = args.preset {
        info!("Erosion preset: {} ({})", preset, preset.description());
        config.erosion = DropletParams {
            brush: config.erosion.brush,
            step_length: config.erosion.step_length,
            ..DropletParams::from_preset(preset)
        };
    }
    if args.parallel {
        config.batch.parallel = true;
    }
    if args.sequential {
        config.batch.parallel = false;
    }
    if let Some(per_tick) = args.spawn_per_tick {
        config.batch.spawn_per_tick = per_tick;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = resolve_config(args)?;

    if let Some(path) = &args.write_config {
        config.save(path)?;
        println!("Wrote configuration to {}", path.display());
    }

    let mut seeds = config.resolve_seeds();
    if let Some(seed) = args.noise_seed {
        seeds = seeds.with_noise(seed);
    }
    if let Some(seed) = args.erosion_seed {
        seeds = seeds.with_erosion(seed);
    }
    let resolution = config.terrain.resolution;
    println!("Sculpting terrain with seed: {}", seeds.master);
    println!(
        "Grid: {}x{} over {:.1} x {:.1} world units",
        resolution, resolution, config.terrain.world_size.x, config.terrain.world_size.z
    );
    info!("{}", seeds);

    // Generate heightmap
    println!("Generating heightmap...");
    let start = Instant::now();
    let field = generate_heightmap(resolution, &config.noise_config(&seeds))?;
    if !field.normalized {
        println!(
            "  Noise field is flat ({:.4}); erosion will have nothing to carve",
            field.raw_min
        );
    }
    let mut grid = field.into_grid(config.terrain)?;
    println!("  Done in {:?}", start.elapsed());

    let sinks_before = count_sinks(&grid, GradientStrategy::SteepestDescent);
    let before = grid.snapshot();

    // Apply erosion
    let area = config.spawn_area();
    let batch = &config.batch;
    println!("Running {} droplets ({})...", batch.droplets, schedule_name(&config));
    let start = Instant::now();

    let stats = if batch.parallel {
        run_batch_parallel(
            &mut grid,
            batch.droplets,
            &area,
            &config.erosion,
            seeds.erosion,
            batch.batch_size,
        )?
    } else if batch.spawn_per_tick > 0 {
        let mut rng = ChaCha8Rng::seed_from_u64(seeds.erosion);
        let mut driver = SimulationDriver::new(config.erosion.clone())?;
        driver.run_chunked(batch.droplets, batch.spawn_per_tick, &area, &mut grid, &mut rng)?;
        driver.into_stats()
    } else {
        let mut rng = ChaCha8Rng::seed_from_u64(seeds.erosion);
        run_batch(&mut grid, batch.droplets, &area, &config.erosion, &mut rng)?
    };
    println!("  Done in {:?}", start.elapsed());

    let sinks_after = count_sinks(&grid, GradientStrategy::SteepestDescent);
    print_summary(&stats, sinks_before, sinks_after);

    if !args.no_images {
        write_previews(&args.output, seeds.master, before.heights(), &grid.to_tilemap())?;
    }

    Ok(())
}

fn schedule_name(config: &SculptConfig) -> String {
    if config.batch.parallel {
        format!("parallel, batches of {}", config.batch.batch_size)
    } else if config.batch.spawn_per_tick > 0 {
        format!("interleaved, {} per tick", config.batch.spawn_per_tick)
    } else {
        "sequential".to_string()
    }
}

fn print_summary(stats: &ErosionStats, sinks_before: usize, sinks_after: usize) {
    println!("Erosion results:");
    println!("  Steps taken: {}", stats.steps_taken);
    println!("  Eroded: {:.4} (max {:.5} per step)", stats.total_eroded, stats.max_erosion);
    println!(
        "  Deposited: {:.4} (max {:.5} per step)",
        stats.total_deposited, stats.max_deposition
    );
    println!("  Still suspended: {:.4}", -stats.net_change());
    println!(
        "  Terminations: {} lifetime, {} out of bounds, {} stalled",
        stats.terminations.max_lifetime,
        stats.terminations.out_of_bounds,
        stats.terminations.stalled
    );
    println!("  Sinks: {} -> {}", sinks_before, sinks_after);
}

fn write_previews(
    dir: &Path,
    seed: u64,
    before: &Tilemap<f32>,
    after: &Tilemap<f32>,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = |suffix: &str| dir.join(format!("heightmap_{}_{}.png", seed, suffix));

    println!("Exporting previews...");
    export::export_heightmap(before, path("before"))?;
    export::export_heightmap(after, path("after"))?;
    export::export_grayscale(after, path("gray"))?;
    // Exaggerate relief so gullies on a [0, 1] map show up
    export::export_shaded(after, after.width as f32 * 0.5, path("shaded"))?;
    export::export_erosion_delta(before, after, path("erosion"))?;
    println!("  Saved heightmap_{}_*.png to {}", seed, dir.display());

    Ok(())
}
