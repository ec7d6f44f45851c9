use anyhow::{bail, Result};
use ndarray::Array2;
use std::time::Instant;

use shuwa_rhythm::config::Config;
use shuwa_rhythm::feature::FeatureMode;
use shuwa_rhythm::inference::{OrtSignRunner, SequenceModel};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let Some(mode) = FeatureMode::from_name(&config.models.mode) else {
        bail!("unknown feature mode: {}", config.models.mode);
    };

    let mut runner = OrtSignRunner::new(&config.models.classifier_path)?;
    let window = Array2::<f32>::zeros((config.models.seq_len, mode.feature_dim()));

    // ウォームアップ（初回はグラフ最適化などで遅い）
    runner.run(window.view())?;

    let start = Instant::now();
    let iterations = 100;
    for _ in 0..iterations {
        let _ = runner.run(window.view())?;
    }
    let elapsed = start.elapsed();

    let avg_ms = elapsed.as_millis() as f64 / iterations as f64;
    let rate = 1000.0 / avg_ms;

    println!(
        "Classifier [{}x{}]: {:.2}ms/window = {:.1} windows/sec",
        config.models.seq_len,
        mode.feature_dim(),
        avg_ms,
        rate
    );

    Ok(())
}
