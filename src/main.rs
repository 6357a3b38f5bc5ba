use anyhow::Context;
use clap::Parser;
use frameplot::{chart, probe};
use log::info;

#[derive(Parser)]
#[command(about = "Chart per-frame packet bitrate of a video file")]
pub struct Cli {
    /// Media file to analyze.
    pub filename: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let frames = probe::probe(&cli.filename)
        .with_context(|| format!("failed to probe {}", cli.filename))?;
    info!("probed {} video frames from {}", frames.len(), cli.filename);

    chart::render(&frames).context("failed to render chart")?;
    info!("wrote {}", chart::CHART_PATH);

    Ok(())
}
