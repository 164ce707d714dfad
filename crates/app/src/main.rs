#[cfg(feature = "opencv")]
mod tuner;

use vision::pipeline::telemetry;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let _ = telemetry::init_metrics_recorder();
    let config = vision::RuntimeConfig::from_env()?;
    run_tuner(config)
}

#[cfg(feature = "opencv")]
fn run_tuner(config: vision::RuntimeConfig) -> anyhow::Result<()> {
    tuner::run(config)
}

#[cfg(not(feature = "opencv"))]
fn run_tuner(_config: vision::RuntimeConfig) -> anyhow::Result<()> {
    anyhow::bail!("line-tuner needs a camera and windows; rebuild with `--features opencv`")
}
