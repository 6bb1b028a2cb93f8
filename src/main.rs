//! Command line driver: merges the two configuration files, runs one workload and writes the header.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{anyhow, Context};
use clap::Parser;
use serde_json::Value;
use snax_datagen::{
    logging::{initialize_log, take_log, JsonLinesLogger, LogFilter, LogProcessor, NullLogger},
    prelude::*,
};

/// Generates the data header of a SNAX accelerator test program.
#[derive(Parser, Debug)]
#[command(name = "snax-datagen", version, about, long_about = None)]
struct Cli {
    /// Software-side workload parameters (JSON, or TOML by extension)
    #[arg(long)]
    swcfg: PathBuf,

    /// Hardware-side structural parameters; its keys win on collision
    #[arg(long)]
    hwcfg: PathBuf,

    /// Workload to generate. Defaults to the `workload` key of the configuration
    #[arg(short, long)]
    workload: Option<String>,

    /// Directory holding the golden simulator's `.bin` tensors
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seed of the random operand data
    #[arg(long)]
    seed: Option<u64>,

    /// Header to write. Prints to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Writes generation events to this file (`-` for stdout), one JSON object per line
    #[arg(long)]
    log_events: Option<PathBuf>,

    /// Comma-separated event names to keep in the event log
    #[arg(long, requires = "log_events")]
    log_filter: Option<String>,
}

fn workload_name(cli: &Cli, config: &serde_json::Map<String, Value>) -> anyhow::Result<String> {
    if let Some(name) = &cli.workload {
        return Ok(name.clone());
    }
    config
        .get("workload")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| anyhow!("no workload selected: pass --workload or set `workload` in the configuration"))
}

fn logger(cli: &Cli, scope: &str) -> anyhow::Result<Box<dyn LogProcessor>> {
    let Some(path) = &cli.log_events else {
        let (interface, processor) = NullLogger::new(scope);
        initialize_log(interface);
        return Ok(Box::new(processor));
    };
    let filter = match &cli.log_filter {
        Some(names) => LogFilter::from_names(names)?,
        None => LogFilter::AllowAll,
    };
    let sink: Box<dyn Write> = if path.as_os_str() == "-" {
        Box::new(std::io::stdout())
    } else {
        let file = File::create(path).with_context(|| format!("creating event log {path:?}"))?;
        Box::new(BufWriter::new(file))
    };
    let (interface, processor) = JsonLinesLogger::new(scope, sink, filter);
    initialize_log(interface);
    Ok(Box::new(processor))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_merged(&cli.swcfg, &cli.hwcfg)?;
    let name = workload_name(&cli, &config)?;

    let mut builder = options_builder(&config)?;
    if let Some(dir) = &cli.data_dir {
        builder = builder.data_dir(dir.clone());
    }
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    let options = finish_options(builder)?;

    let mut processor = logger(&cli, &name)?;
    let workload = Workload::from_config(&name, &config)?;
    let generated = run(&workload, &options);
    take_log();
    processor.process()?;
    let header = generated.with_context(|| format!("generating `{name}`"))?;

    match &cli.output {
        Some(path) => std::fs::write(path, header).with_context(|| format!("writing {path:?}"))?,
        None => std::io::stdout().write_all(header.as_bytes())?,
    }
    Ok(())
}
