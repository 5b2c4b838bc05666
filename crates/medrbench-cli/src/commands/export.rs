//! The `medrbench export` command.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};

use medrbench_core::dataset::Partition;
use medrbench_providers::config::load_config_from;

use super::DatasetArgs;

/// Write one harness record per line.
pub async fn execute(args: DatasetArgs, partition: String, output: Option<PathBuf>) -> Result<()> {
    let partition: Partition = partition.parse().map_err(anyhow::Error::msg)?;
    let config = load_config_from(args.config.as_deref())?;
    let dataset = args.assemble(&config, config.system_prompt.clone()).await?;

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut count = 0usize;
    for item in dataset.partition(partition) {
        serde_json::to_writer(&mut writer, &item.to_harness_record())?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;

    if let Some(path) = &output {
        eprintln!("Exported {count} {partition} case(s) to {}", path.display());
    }
    Ok(())
}
