#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point: builds (or loads) the world tree and optionally
//! prints it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use covid_atlas_cli_utils::{IndicatifProgress, init_logger};
use covid_atlas_combine::{AtlasCache, CombineError, CombineOptions, Stage, get_world};
use covid_atlas_region_models::Region;
use regex::RegexBuilder;

#[derive(Parser)]
#[command(name = "covid_atlas_combine", about = "Combine COVID data sources into one region tree")]
struct Cli {
    /// Stages to run instead of the defaults (comma-separated or repeated):
    /// covid, mortality, hospital, vaccine, variant, serology, wastewater,
    /// mobility, policy, maps
    #[arg(long, value_delimiter = ',')]
    only: Vec<Stage>,
    /// Cache directory (default: `$COVID_ATLAS_CACHE_DIR` or `~/covid_cache`)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Print the region tree
    #[arg(long)]
    print_tree: bool,
    /// Print metric samples along with the tree
    #[arg(long)]
    print_data: bool,
    /// Only print regions whose name or path fully matches this regex
    /// (case-insensitive)
    #[arg(long)]
    region: Option<String>,
    /// Delete the cached world and rebuild it
    #[arg(long)]
    rebuild: bool,
}

fn print_regions(world: &Region, pattern: Option<&str>, with_data: bool) -> Result<(), regex::Error> {
    let Some(pattern) = pattern else {
        println!("{}", world.debug_tree(with_data));
        return Ok(());
    };
    let rx = RegexBuilder::new(pattern).case_insensitive(true).build()?;
    world.visit(&mut |r: &Region| {
        if r.matches_regex(&rx) {
            println!("{}\n", r.debug_block(with_data));
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    let stages: BTreeSet<Stage> = if cli.only.is_empty() {
        Stage::defaults()
    } else {
        cli.only.iter().copied().collect()
    };
    let options = CombineOptions {
        stages,
        cache_dir: cli.cache_dir.unwrap_or_else(AtlasCache::default_dir),
        rebuild: cli.rebuild,
    };
    let names: Vec<String> = options.stages.iter().map(ToString::to_string).collect();
    log::info!("Stages: {}", names.join(", "));

    let start = Instant::now();
    let progress = IndicatifProgress::stages_bar(&multi, "Combining", options.stages.len() as u64);
    let world = match get_world(&options, Some(progress)).await {
        Ok(world) => world,
        Err(CombineError::Validation(messages)) => {
            log::error!("{} warnings found combining data:", messages.len());
            for (i, text) in messages.iter().enumerate() {
                log::error!("  #{} {text}", i + 1);
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("World ready in {:.1}s", start.elapsed().as_secs_f64());

    if cli.print_tree || cli.print_data || cli.region.is_some() {
        print_regions(&world, cli.region.as_deref(), cli.print_data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_parse_from_comma_lists_and_repeats() {
        let cli = Cli::try_parse_from(["covid_atlas_combine", "--only", "covid,serology", "--only", "maps", "--print-tree"])
            .unwrap();
        assert_eq!(cli.only, [Stage::Covid, Stage::Serology, Stage::Maps]);
        assert!(cli.print_tree);
        assert!(!cli.rebuild);
    }

    #[test]
    fn unknown_stages_are_rejected() {
        assert!(Cli::try_parse_from(["covid_atlas_combine", "--only", "blueprint"]).is_err());
    }
}
