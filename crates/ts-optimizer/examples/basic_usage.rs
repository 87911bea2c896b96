use std::time::Instant;

use ts_optimizer::{LocalBackend, StrategyKind, TunerConfig};
use ts_tuner::{params, FixedBackend, Tuner};

#[derive(Debug, Clone, Copy)]
enum Reduction {
    Sequential,
    Pairwise,
}

fn sum(data: &[f64], chunk: usize, reduction: Reduction) -> f64 {
    let partials: Vec<f64> = data.chunks(chunk).map(|c| c.iter().sum()).collect();
    match reduction {
        Reduction::Sequential => partials.iter().sum(),
        Reduction::Pairwise => {
            let mut level = partials;
            while level.len() > 1 {
                level = level.chunks(2).map(|pair| pair.iter().sum()).collect();
            }
            level.first().copied().unwrap_or(0.0)
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data: Vec<f64> = (0..1 << 18).map(|i| (i % 97) as f64).collect();
    let final_config = std::env::temp_dir().join("ts_basic_usage.json");

    let config = TunerConfig::new(StrategyKind::Grid).with_final_config_path(&final_config);
    let mut tuner = Tuner::new(LocalBackend::from_config(config)?);
    let chunk = tuner.mapped_range("chunk", |i: u32| 1usize << i, 4, 14)?;
    let reduction = tuner.choice(
        "reduction",
        params![Reduction::Sequential, Reduction::Pairwise],
    )?;

    tuner.tune(|| {
        let started = Instant::now();
        let total = sum(&data, chunk.resolve(), reduction.resolve());
        std::hint::black_box(total);
        Some(started.elapsed().as_secs_f64())
    })?;

    let backend = tuner.into_backend();
    if let Some(best) = backend.best_trial() {
        println!(
            "Best of {} trials: {:.3} ms with {:?}",
            backend.status().trials_total(),
            best.objective * 1e3,
            best.parameters
        );
    }

    // Re-run the kernel under the saved configuration
    let mut replay = Tuner::new(FixedBackend::from_json_file(&final_config)?);
    let chunk = replay.mapped_range("chunk", |i: u32| 1usize << i, 4, 14)?;
    let reduction = replay.choice(
        "reduction",
        params![Reduction::Sequential, Reduction::Pairwise],
    )?;
    println!(
        "Replaying chunk={} reduction={:?}",
        chunk.resolve(),
        reduction.resolve()
    );
    replay.tune(|| Some(sum(&data, chunk.resolve(), reduction.resolve())))?;
    Ok(())
}
