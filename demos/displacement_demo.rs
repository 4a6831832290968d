use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use robin_table::RobinTable;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "capacity", default_value_t = 1000)]
    capacity: usize,

    /// Fraction of slots to fill before reporting.
    #[arg(short = 'l', long = "load", default_value_t = 0.9)]
    load: f64,
}

fn hash_u64(value: u64) -> u32 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish() as u32
}

fn main() {
    let args = Args::parse();

    println!("Creating RobinTable with capacity: {}", args.capacity);

    let mut table: RobinTable<u64, u64> =
        RobinTable::with_capacity(args.capacity).expect("capacity must be at least 2");

    let target = ((table.capacity() as f64) * args.load.clamp(0.0, 1.0)) as usize;
    println!("Filling {} of {} slots...", target, table.capacity());

    let mut key = 0u64;
    while table.len() < target {
        table
            .insert(hash_u64(key), key, key, |a, b| a == b)
            .expect("table cannot be full below its target load");
        key += 1;
    }

    println!(
        "Load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );
    println!("Average displacement: {:.3}", table.average_displacement());

    println!("Displacement histogram:");
    let hist = table.displacement_histogram();
    let max = hist.iter().copied().max().unwrap_or(0).max(1);
    for (dib, count) in hist.iter().enumerate() {
        let bar = "#".repeat(count * 60 / max);
        println!("{dib:>4} | {count:>8} {bar}");
    }
}
