use std::{fs::File, io::Read, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use e20_sim::{cache::CacheHierarchy, io::StdoutSink, loader, sim::Simulator};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// Simulate an E20 machine and its data-cache hierarchy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The file containing machine code, typically with .bin suffix
    filename: PathBuf,
    /// Cache configuration: size,associativity,blocksize (for one cache)
    /// or size,associativity,blocksize,size,associativity,blocksize (for two caches)
    #[arg(long)]
    cache: Option<String>,
    /// Number of memory cells shown in the final-state dump
    #[arg(long, default_value_t = 128)]
    memquantity: usize,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }

    let src = read_input(&args.filename)?;
    let image = loader::load_machine_code(&src)?;

    let hierarchy = match &args.cache {
        Some(spec) => CacheHierarchy::from_spec(&parse_cache_values(spec)?)?,
        None => CacheHierarchy::disabled(),
    };
    let caching = !hierarchy.is_disabled();
    for level in hierarchy.levels() {
        println!("{level}");
    }

    let mut sim = Simulator::new(&image, hierarchy, StdoutSink::new());
    sim.run(args.verbose)?;
    log::info!("finished execution after {} instructions.", sim.cycle());
    output_stat(&sim);

    if !caching {
        print!("{}", sim.cpu().state_view(args.memquantity));
    }
    Ok(())
}

fn parse_cache_values(spec: &str) -> Result<Vec<u32>> {
    spec.split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("bad cache spec value `{part}`"))
        })
        .collect()
}

fn read_input(input: &PathBuf) -> Result<String> {
    let mut buf = String::new();
    let mut file = File::open(input).with_context(|| format!("can't open {}", input.display()))?;
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

#[cfg(not(feature = "stat"))]
fn output_stat<S>(_: &Simulator<S>) {}

#[cfg(feature = "stat")]
fn output_stat<S>(sim: &Simulator<S>) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
