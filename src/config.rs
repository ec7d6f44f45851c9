use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub judgement: JudgementConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub chart: ChartConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// 分類器モデル (.onnx)
    #[serde(default = "default_classifier_path")]
    pub classifier_path: String,
    /// 埋め込みモデル (.onnx)。未設定ならOODゲートは使えない
    #[serde(default)]
    pub embedding_path: Option<String>,
    /// sign_meta.json のパス
    #[serde(default = "default_meta_path")]
    pub meta_path: String,
    /// 特徴量モード ("word" = 141次元 / "spell" = 63次元)
    #[serde(default = "default_mode")]
    pub mode: String,
    /// シーケンス長（モデル入力のフレーム数）
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
}

fn default_classifier_path() -> String { "models/sign_classifier.onnx".to_string() }
fn default_meta_path() -> String { "models/sign_meta.json".to_string() }
fn default_mode() -> String { "word".to_string() }
fn default_seq_len() -> usize { 15 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_path: default_classifier_path(),
            embedding_path: None,
            meta_path: default_meta_path(),
            mode: default_mode(),
            seq_len: default_seq_len(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JudgementConfig {
    /// Perfect判定の時間窓（秒）
    #[serde(default = "default_perfect_window")]
    pub perfect_window: f32,
    /// Good判定の時間窓（秒）。超えるとMiss
    #[serde(default = "default_good_window")]
    pub good_window: f32,
    /// 候補として受け付ける最小confidence
    #[serde(default = "default_min_prob")]
    pub min_prob: f32,
    /// 候補として受け付ける最大セントロイド距離
    #[serde(default = "default_max_dist")]
    pub max_dist: f32,
    /// 同じsignの連続判定を防ぐクールダウン（秒）
    #[serde(default = "default_same_sign_cooldown")]
    pub same_sign_cooldown: f32,
    /// 予測バッファの保持期間（秒）
    #[serde(default = "default_keep_sec")]
    pub keep_sec: f32,
    /// チャート基準の時刻補正（曲頭の無音など）
    #[serde(default)]
    pub chart_offset_sec: f32,
    /// モデル/推論パイプラインの遅延補正
    #[serde(default)]
    pub model_latency_sec: f32,
    /// チャートのクラスindexとモデル出力indexのずれ補正
    #[serde(default)]
    pub expected_idx_offset: i32,
    /// 複合スコアのconfidence項の重み
    #[serde(default = "default_w_prob")]
    pub w_prob: f32,
    /// 複合スコアの時刻項の重み
    #[serde(default = "default_w_time")]
    pub w_time: f32,
    /// 複合スコアの距離項の重み
    #[serde(default = "default_w_dist")]
    pub w_dist: f32,
    /// OODゲート通過予測への加点（不通過は同値の減点）
    #[serde(default = "default_lock_bonus")]
    pub lock_bonus: f32,
    /// 時刻項の減衰定数（秒）
    #[serde(default = "default_time_decay")]
    pub time_decay: f32,
}

fn default_perfect_window() -> f32 { 0.2 }
fn default_good_window() -> f32 { 0.4 }
fn default_min_prob() -> f32 { 0.2 }
fn default_max_dist() -> f32 { 10.0 }
fn default_same_sign_cooldown() -> f32 { 0.1 }
fn default_keep_sec() -> f32 { 2.0 }
fn default_w_prob() -> f32 { 0.55 }
fn default_w_time() -> f32 { 0.25 }
fn default_w_dist() -> f32 { 0.20 }
fn default_lock_bonus() -> f32 { 0.15 }
fn default_time_decay() -> f32 { 0.08 }

impl Default for JudgementConfig {
    fn default() -> Self {
        Self {
            perfect_window: default_perfect_window(),
            good_window: default_good_window(),
            min_prob: default_min_prob(),
            max_dist: default_max_dist(),
            same_sign_cooldown: default_same_sign_cooldown(),
            keep_sec: default_keep_sec(),
            chart_offset_sec: 0.0,
            model_latency_sec: 0.0,
            expected_idx_offset: 0,
            w_prob: default_w_prob(),
            w_time: default_w_time(),
            w_dist: default_w_dist(),
            lock_bonus: default_lock_bonus(),
            time_decay: default_time_decay(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GateConfig {
    /// 分類confidenceの最小閾値（これ未満はdrop）
    #[serde(default = "default_gate_min_prob")]
    pub min_prob: f32,
    /// 埋め込み+セントロイド距離によるOODゲートを使うか
    #[serde(default)]
    pub use_ood_gate: bool,
    /// meta.distanceThreshold の代わりに使う距離閾値
    #[serde(default)]
    pub override_distance_threshold: Option<f32>,
}

fn default_gate_min_prob() -> f32 { 0.2 }

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_prob: default_gate_min_prob(),
            use_ood_gate: false,
            override_distance_threshold: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VotingConfig {
    /// 多数決ウィンドウのサイズ
    #[serde(default = "default_voting_window")]
    pub window: usize,
    /// 安定判定に必要な最小得票数
    #[serde(default = "default_min_votes")]
    pub min_votes: usize,
}

fn default_voting_window() -> usize { 3 }
fn default_min_votes() -> usize { 2 }

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            window: default_voting_window(),
            min_votes: default_min_votes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// 同じsignを連続して流さないためのemitクールダウン（秒）
    #[serde(default = "default_emit_cooldown")]
    pub emit_cooldown_sec: f32,
}

fn default_emit_cooldown() -> f32 { 0.25 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            emit_cooldown_sec: default_emit_cooldown(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    /// 時刻列のヘッダ名
    #[serde(default = "default_time_column")]
    pub time_column: String,
    /// クラスindex列のヘッダ名
    #[serde(default = "default_idx_column")]
    pub idx_column: String,
    /// ラベル列のヘッダ名
    #[serde(default = "default_label_column")]
    pub label_column: String,
    /// 先頭ノートを t=0 に合わせる
    #[serde(default)]
    pub normalize_start_to_zero: bool,
    /// 全ノートへの追加シフト（秒）
    #[serde(default)]
    pub extra_time_shift_sec: f32,
}

fn default_time_column() -> String { "time_sec".to_string() }
fn default_idx_column() -> String { "model_class_idx".to_string() }
fn default_label_column() -> String { "keyword".to_string() }

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            time_column: default_time_column(),
            idx_column: default_idx_column(),
            label_column: default_label_column(),
            normalize_start_to_zero: false,
            extra_time_shift_sec: 0.0,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "config load failed, using defaults"
                );
                Config::default()
            }
        }
    }
}
