use anyhow::Error;
use cardlens::{Args, Report, run};
use clap::Parser;
use std::io::{self, Write as _};

fn write_report(report: &Report, counters: bool) -> Result<(), Error> {
    let mut out = io::stdout().lock();
    for overlay in &report.overlays {
        writeln!(out, "{}", serde_json::to_string(overlay)?)?;
    }
    if counters {
        writeln!(out, "{}", report.counters.to_json())?;
    }
    Ok(())
}

pub fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::parse();
    let report = run(&args)?;
    log::info!(
        "{} overlays on a {} page",
        report.overlays.len(),
        report.context
    );
    write_report(&report, args.counters)
}
