//! Per-tick driver from feature frame to accepted Prediction:
//! window push → inference gate → majority vote → emit cooldown.

use anyhow::Result;
use tracing::debug;

use crate::config::{PipelineConfig, VotingConfig};
use crate::inference::{GateOutcome, GateStats, InferenceGate};
use crate::meta::SignMeta;
use crate::prediction::Prediction;
use crate::sequence::SequenceBuffer;
use crate::vote::VoteStabilizer;

/// Tick counters, diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub input_lost: u64,
    pub emitted: u64,
    pub suppressed_by_vote: u64,
    pub suppressed_by_cooldown: u64,
}

pub struct SignPipeline {
    seq: SequenceBuffer,
    gate: InferenceGate,
    votes: VoteStabilizer,
    meta: Option<SignMeta>,
    emit_cooldown_sec: f32,
    /// Last emitted (class index, time).
    last_emit: Option<(usize, f32)>,
    stats: PipelineStats,
}

impl SignPipeline {
    pub fn new(
        seq_len: usize,
        feat_dim: usize,
        gate: InferenceGate,
        voting: &VotingConfig,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            seq: SequenceBuffer::new(seq_len, feat_dim),
            gate,
            votes: VoteStabilizer::from_config(voting),
            meta: None,
            emit_cooldown_sec: config.emit_cooldown_sec,
            last_emit: None,
            stats: PipelineStats::default(),
        }
    }

    /// Class labels for emitted predictions. Optional.
    pub fn with_meta(mut self, meta: SignMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn gate_stats(&self) -> GateStats {
        self.gate.stats()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// One tick. `frame` is `None` when tracking was lost this tick; stale
    /// frames must not leak into the next gesture, so the window and the
    /// vote ring are dropped. An `Err` is a session-level inference failure.
    pub fn tick(&mut self, frame: Option<&[f32]>, now_sec: f32) -> Result<Option<Prediction>> {
        self.stats.ticks += 1;

        let Some(frame) = frame else {
            self.stats.input_lost += 1;
            self.seq.clear(true);
            self.votes.clear();
            return Ok(None);
        };

        self.seq.push(frame);
        if !self.seq.is_full() {
            return Ok(None);
        }

        let outcome = self.gate.classify(self.seq.snapshot())?;
        let decision = match outcome {
            GateOutcome::Accepted(d) => d,
            // 却下理由のカウントとログはゲート側で済んでいる
            GateOutcome::Rejected(_) => return Ok(None),
        };

        self.votes.push(decision.idx);
        let Some(vote) = self.votes.stable_vote() else {
            self.stats.suppressed_by_vote += 1;
            return Ok(None);
        };

        if let Some((last_idx, last_time)) = self.last_emit {
            if vote.idx == last_idx && (now_sec - last_time) < self.emit_cooldown_sec {
                self.stats.suppressed_by_cooldown += 1;
                return Ok(None);
            }
        }
        self.last_emit = Some((vote.idx, now_sec));

        let label = match &self.meta {
            Some(meta) => meta.label(vote.idx),
            None => format!("#{}", vote.idx),
        };

        // 多数決の勝者と現フレームのargmaxは別クラスのこともある。
        // prob/dist/lockedは受理時点のフレームのものを添える
        let prediction = Prediction {
            time_sec: now_sec,
            idx: vote.idx,
            label,
            prob: decision.prob,
            raw_score: decision.raw_score,
            dist: decision.dist,
            locked: decision.locked,
        };

        self.stats.emitted += 1;
        debug!(
            t = now_sec,
            idx = prediction.idx,
            label = %prediction.label,
            prob = prediction.prob,
            dist = prediction.dist,
            locked = prediction.locked,
            votes = vote.votes,
            window = self.votes.window(),
            "prediction emitted"
        );

        Ok(Some(prediction))
    }

    /// 新しいセッションの前に呼ぶ。前セッションの観測を持ち越さない
    pub fn clear(&mut self) {
        self.seq.clear(true);
        self.votes.clear();
        self.last_emit = None;
    }
}
