//! The `medrbench inspect` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use medrbench_providers::config::load_config_from;

use super::DatasetArgs;

pub async fn execute(args: DatasetArgs, format: String) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let dataset = args.assemble(&config, config.system_prompt.clone()).await?;
    let summary = dataset.summary();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Category", "Source", "Retained", "Train", "Eval"]);
    for counts in &summary.categories {
        table.add_row(vec![
            Cell::new(counts.category),
            Cell::new(counts.source_total),
            Cell::new(counts.retained),
            Cell::new(counts.train),
            Cell::new(counts.eval),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(summary.categories.iter().map(|c| c.source_total).sum::<usize>()),
        Cell::new(summary.retained()),
        Cell::new(summary.train()),
        Cell::new(summary.eval()),
    ]);

    println!(
        "Split: {}{}{}",
        summary.split,
        if summary.rare_disease_only { ", rare diseases only" } else { "" },
        if summary.eval_full { ", eval-full" } else { "" },
    );
    println!("{table}");
    if summary.skipped() > 0 {
        println!(
            "Skipped {} record(s): {} malformed, {} duplicate",
            summary.skipped(),
            summary.malformed,
            summary.duplicates
        );
    }

    Ok(())
}
