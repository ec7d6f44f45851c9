//! Offline judgement replay: runs a recorded landmark stream against a chart
//! and prints the verdicts and the final score.
//!
//! Recording format: one JSON object per line, `{"t": sec, "left": [[x,y,z];21],
//! "right": ..., "face": [[x,y,z];5]}`, absent regions null or omitted.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};

use shuwa_rhythm::chart;
use shuwa_rhythm::config::Config;
use shuwa_rhythm::feature::{FeatureMode, LandmarkFrame};
use shuwa_rhythm::inference::{InferenceGate, OrtSignRunner};
use shuwa_rhythm::judge::{JudgeResult, JudgementEngine};
use shuwa_rhythm::meta::SignMeta;
use shuwa_rhythm::pipeline::SignPipeline;
use shuwa_rhythm::score::ScoreBoard;

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    t: f32,
    #[serde(default)]
    left: Option<Vec<[f32; 3]>>,
    #[serde(default)]
    right: Option<Vec<[f32; 3]>>,
    #[serde(default)]
    face: Option<Vec<[f32; 3]>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <chart.csv> <recording.jsonl>", args[0]);
        std::process::exit(1);
    }
    let chart_path = &args[1];
    let recording_path = &args[2];

    let config = Config::load_or_default(CONFIG_PATH);

    println!("Judge Replay ({})", env!("GIT_VERSION"));
    println!("Chart: {}", chart_path);
    println!("Recording: {}", recording_path);
    println!("Classifier: {}", config.models.classifier_path);
    println!(
        "OOD gate: {}",
        if config.gate.use_ood_gate { "ON" } else { "OFF" }
    );
    println!();

    let Some(mode) = FeatureMode::from_name(&config.models.mode) else {
        bail!("unknown feature mode: {}", config.models.mode);
    };

    let meta = SignMeta::load(&config.models.meta_path)?;
    println!(
        "Meta: {} classes, centroidDim={}, threshold={}",
        meta.class_count(),
        meta.centroid_dim,
        meta.distance_threshold
    );

    let classifier = OrtSignRunner::new(&config.models.classifier_path)?;
    let mut gate = InferenceGate::new(Box::new(classifier), &config.gate);
    if config.gate.use_ood_gate {
        let Some(embedding_path) = &config.models.embedding_path else {
            bail!("gate.use_ood_gate is set but models.embedding_path is not");
        };
        let embedder = OrtSignRunner::new(embedding_path)?;
        gate = gate.with_ood(
            Box::new(embedder),
            meta.clone(),
            config.gate.override_distance_threshold,
        );
    }

    let mut pipeline = SignPipeline::new(
        config.models.seq_len,
        mode.feature_dim(),
        gate,
        &config.voting,
        &config.pipeline,
    )
    .with_meta(meta.clone());

    let notes = chart::load_notes(chart_path, &config.chart)?;
    if notes.is_empty() {
        bail!("chart has no notes: {}", chart_path);
    }
    let note_count = notes.len();
    let last_note_time = notes.last().map(|n| n.time_sec).unwrap_or(0.0);

    let mut engine = JudgementEngine::new(config.judgement.clone());
    engine.set_meta(meta);
    engine.set_notes(notes);

    let mut score = ScoreBoard::new();

    let file = File::open(recording_path)
        .with_context(|| format!("Failed to open recording: {}", recording_path))?;
    let mut last_tick = 0.0f32;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: RecordedFrame = serde_json::from_str(&line)
            .with_context(|| format!("Bad recording line {}", line_no + 1))?;

        let frame = LandmarkFrame {
            left_hand: rec.left,
            right_hand: rec.right,
            face: rec.face,
        };
        let features = (!frame.is_empty()).then(|| frame.features(mode));

        if let Some(p) = pipeline.tick(features.as_deref(), rec.t)? {
            engine.push_prediction(p);
        }
        for e in engine.update(rec.t) {
            score.on_judge(&e);
            print_judge(e.result, e.note_id, e.dt, score.combo);
        }
        last_tick = rec.t;
    }

    // 録画が尽きた後、締め切りの残っているノートをMissで精算する
    let judgement = &config.judgement;
    let flush_time = (last_note_time + judgement.chart_offset_sec + judgement.model_latency_sec)
        .max(last_tick)
        + judgement.good_window
        + 0.001;
    for e in engine.update(flush_time) {
        score.on_judge(&e);
        print_judge(e.result, e.note_id, e.dt, score.combo);
    }

    println!();
    println!("=== Result ({} notes) ===", note_count);
    println!("Perfect: {}", score.perfect_count);
    println!("Good:    {}", score.good_count);
    println!("Miss:    {}", score.miss_count);
    println!("Max combo: {}", score.max_combo);

    let gate_stats = pipeline.gate_stats();
    println!();
    println!(
        "Gate: accepted={} low_conf={} ood={} malformed={}",
        gate_stats.accepted,
        gate_stats.low_confidence,
        gate_stats.out_of_distribution,
        gate_stats.malformed_embedding
    );
    let stats = pipeline.stats();
    println!(
        "Pipeline: ticks={} emitted={} vote_wait={} cooldown={} input_lost={}",
        stats.ticks,
        stats.emitted,
        stats.suppressed_by_vote,
        stats.suppressed_by_cooldown,
        stats.input_lost
    );

    Ok(())
}

fn print_judge(result: JudgeResult, note_id: u32, dt: f32, combo: u32) {
    let tag = match result {
        JudgeResult::Perfect => "PERFECT",
        JudgeResult::Good => "GOOD   ",
        JudgeResult::Miss => "MISS   ",
    };
    println!("{} note={:<3} dt={:+.3} combo={}", tag, note_id, dt, combo);
}
