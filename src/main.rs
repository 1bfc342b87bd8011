//! NEAT CLI - Evolve networks on a built-in task from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use neat_lineage::{
    compute::{NeatRng, Population},
    schema::NeatConfig,
    store::{DirectoryStore, SnapshotStore},
};

/// Sensor readings shown to each network per generation.
const TRIALS: usize = 20;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [generations]", args[0]);
        eprintln!();
        eprintln!("Evolve networks that pick the strongest of their output-sized signals.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to population configuration file");
        eprintln!("  generations  Number of generations to evolve (default: 50)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let generations: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(50);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: NeatConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    println!("NEAT Evolution");
    println!("==============");
    println!(
        "Population: {} networks ({} inputs, {} outputs)",
        config.population_size, config.input_size, config.output_size
    );
    println!("Generations: {}", generations);
    println!();

    let save_path = config.save_path.clone();
    let task_seed = config.random_seed.unwrap_or(0);
    let result = match &save_path {
        Some(dir) => Population::open(config, Box::new(DirectoryStore::new(dir))),
        None => Population::new(config),
    };
    let mut population = result.unwrap_or_else(|e| {
        eprintln!("Error creating population: {}", e);
        std::process::exit(1);
    });

    let mut task = NeatRng::new(task_seed);
    let first = population.generation();
    let last = first + generations;
    let start = Instant::now();

    while population.generation() < last {
        let generation = population.generation();
        for _ in 0..TRIALS {
            let (sensors, expected) = strongest_signal(&mut task, population.config());
            let action = population.evaluate(&sensors).unwrap_or_else(|e| {
                eprintln!("Evaluation failed: {}", e);
                std::process::exit(1);
            });
            if action == expected {
                population.add_fitness(1.0);
            }
        }

        if let Err(e) = population.advance() {
            eprintln!("Generation failed: {}", e);
            std::process::exit(1);
        }

        if population.generation() != generation {
            println!(
                "  Generation {}: best={:.0}/{}, species={}",
                generation,
                population.previous_best_fitness(),
                TRIALS,
                population.species_count()
            );
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "Time: {:.2}s ({:.1} generations/s)",
        elapsed.as_secs_f32(),
        generations as f32 / elapsed.as_secs_f32()
    );

    if let Some(dir) = save_path {
        let store = DirectoryStore::new(&dir);
        match store.fitness_history() {
            Ok(history) => {
                println!();
                println!("Fitness history ({}):", dir.display());
                for (generation, best) in history {
                    println!("  {},{}", generation, best);
                }
            }
            Err(e) => eprintln!("Error reading history: {}", e),
        }
    }
}

/// Random sensors and the index of the strongest of the first `output_size`.
fn strongest_signal(rng: &mut NeatRng, config: &NeatConfig) -> (Vec<f64>, usize) {
    let sensors: Vec<f64> = (0..config.input_size).map(|_| rng.unit()).collect();
    let candidates = config.output_size.min(config.input_size);
    let expected = sensors[..candidates]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i);
    (sensors, expected)
}

fn print_example_config() {
    let config = NeatConfig {
        random_seed: Some(42),
        save_path: Some(PathBuf::from("./save")),
        ..Default::default()
    };

    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
}
