use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ChartConfig;

/// チャート1行分のノート
///
/// judged はJudgementEngineが一度だけtrueにする。リセットはされない
/// （新しいチャートはノートごと作り直す）。
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub note_id: u32,
    pub time_sec: f32,
    pub expected_idx: usize,
    pub expected_label: String,
    pub judged: bool,
}

impl Note {
    pub fn new(note_id: u32, time_sec: f32, expected_idx: usize, expected_label: &str) -> Self {
        Self {
            note_id,
            time_sec,
            expected_idx,
            expected_label: expected_label.to_string(),
            judged: false,
        }
    }
}

/// チャートCSVを読み込んで時刻昇順のノート列にする
pub fn load_notes<P: AsRef<Path>>(path: P, config: &ChartConfig) -> Result<Vec<Note>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read chart CSV: {}", path.as_ref().display()))?;
    parse_notes(&content, config)
}

pub fn parse_notes(csv_text: &str, config: &ChartConfig) -> Result<Vec<Note>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let find_column =
        |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

    // 旧フォーマットのヘッダ名 "timeSec" も受ける
    let time_col = find_column(&config.time_column)
        .or_else(|| find_column("timeSec"));
    let Some(time_col) = time_col else {
        bail!("chart time column not found: {}", config.time_column);
    };
    let Some(idx_col) = find_column(&config.idx_column) else {
        bail!("chart class index column not found: {}", config.idx_column);
    };
    let label_col = find_column(&config.label_column);

    let mut notes = Vec::new();
    let mut note_id: u32 = 0;

    for record in reader.records() {
        let record = record.context("Failed to read CSV record")?;

        // 時刻かindexが読めない行はスキップ
        let Some(time_sec) = record.get(time_col).and_then(parse_chart_float) else {
            continue;
        };
        let Some(expected_idx) = record
            .get(idx_col)
            .and_then(|s| s.trim().parse::<usize>().ok())
        else {
            continue;
        };

        let label = label_col
            .and_then(|c| record.get(c))
            .map(|s| s.trim())
            .unwrap_or("");

        notes.push(Note::new(note_id, time_sec, expected_idx, label));
        note_id += 1;
    }

    notes.sort_by(|a, b| a.time_sec.total_cmp(&b.time_sec));

    if config.normalize_start_to_zero {
        if let Some(base) = notes.first().map(|n| n.time_sec) {
            for note in &mut notes {
                note.time_sec = (note.time_sec - base).max(0.0);
            }
        }
    }

    if config.extra_time_shift_sec.abs() > 1e-6 {
        for note in &mut notes {
            note.time_sec = (note.time_sec + config.extra_time_shift_sec).max(0.0);
        }
    }

    match notes.first() {
        Some(first) => info!(
            count = notes.len(),
            first_note_time = first.time_sec,
            "chart loaded"
        ),
        None => debug!("chart has no data rows"),
    }

    Ok(notes)
}

/// スプレッドシート由来のCSVは小数点がカンマのことがある
fn parse_chart_float(s: &str) -> Option<f32> {
    s.trim().replace(',', ".").parse::<f32>().ok()
}
