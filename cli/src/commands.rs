use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};

use kiln_engine::config::ResolvedConfig;
use kiln_engine::{
    CombinationOutcome, CombinationService, ExploreReport, Explorer, HttpGenerator, StopReason,
    Store, StoreStats,
};

use crate::Commands;

pub(crate) async fn run(command: Commands, config: &ResolvedConfig) -> Result<()> {
    let store = open_store(config)?;

    match command {
        Commands::Combine { first, second } => {
            let service = combination_service(store, config)?;
            let outcome = service.combine(&first, &second).await?;
            println!("{}", describe_outcome(&outcome));
        }
        Commands::Explore { rounds } => {
            let service = Arc::new(combination_service(store, config)?);
            let explorer = Explorer::new(service, config.explore.clone());
            tokio::select! {
                result = explorer.run(rounds) => println!("{}", describe_report(&result?)),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Exploration interrupted");
                    println!("Interrupted");
                }
            }
        }
        Commands::Import { file } => {
            let report = store.import_save(&file)?;
            println!(
                "Imported {} new, {} already present, {} icon mismatches, {} invalid",
                report.inserted,
                report.already_present,
                report.icon_mismatches.len(),
                report.invalid.len()
            );
        }
        Commands::Export { file } => {
            let count = store.export_save(&file)?;
            println!("Exported {count} elements to {}", file.display());
        }
        Commands::Seed => {
            let inserted = store.seed_starting_elements()?;
            println!("Seeded {inserted} starting elements");
        }
        Commands::Stats => {
            print!("{}", describe_stats(&store.stats()?));
        }
    }
    Ok(())
}

fn open_store(config: &ResolvedConfig) -> Result<Arc<Store>> {
    let store = Store::open_with_busy_timeout(&config.db_path, config.busy_timeout)?;
    Ok(Arc::new(store))
}

fn combination_service(store: Arc<Store>, config: &ResolvedConfig) -> Result<CombinationService> {
    let generator = HttpGenerator::new(config.generator.clone())
        .context("Failed to set up generator")?;
    Ok(CombinationService::new(store, Arc::new(generator))
        .with_compute_timeout(config.compute_deadline))
}

fn describe_outcome(outcome: &CombinationOutcome) -> String {
    match outcome {
        CombinationOutcome::Combined {
            element,
            is_new_discovery: true,
        } => format!("{element} (new discovery)"),
        CombinationOutcome::Combined { element, .. } => element.to_string(),
        CombinationOutcome::NoCombination => "Nothing".to_string(),
    }
}

fn describe_report(report: &ExploreReport) -> String {
    let mut out = format!(
        "{} combinations: {} produced, {} nothing, {} failed",
        report.attempts, report.combined, report.barren, report.failures
    );
    if report.stop == StopReason::Exhausted {
        out.push_str("; every known pair is resolved");
    }
    for element in &report.discoveries {
        let _ = write!(out, "\n  new: {element}");
    }
    out
}

fn describe_stats(stats: &StoreStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "elements:       {}", stats.elements);
    let _ = writeln!(out, "pairs:          {}", stats.pairs);
    let _ = writeln!(out, "  produced:     {}", stats.produced_pairs);
    let _ = writeln!(out, "  nothing:      {}", stats.barren_pairs);
    if stats.dangling_results > 0 {
        let _ = writeln!(out, "dangling:       {}", stats.dangling_results);
    }
    out
}
