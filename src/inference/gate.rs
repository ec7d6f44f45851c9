//! Classifier/embedding gating: argmax confidence cut plus the optional
//! centroid-distance out-of-distribution check.

use anyhow::Result;
use ndarray::ArrayView2;
use tracing::debug;

use super::runner::SequenceModel;
use crate::config::GateConfig;
use crate::meta::SignMeta;

/// A classification that survived the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub idx: usize,
    /// Softmax probability of the argmax class.
    pub prob: f32,
    /// Raw argmax output (logit).
    pub raw_score: f32,
    /// Euclidean distance to the class centroid. 0 when the OOD gate is off.
    pub dist: f32,
    /// True when the OOD gate ran and passed.
    pub locked: bool,
}

/// Why a classification was dropped. `LowConfidence` means "not confident
/// about any class"; `OutOfDistribution` means "shaped like a known class but
/// statistically implausible". Downstream diagnostics want to tell those
/// apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    LowConfidence { idx: usize, prob: f32 },
    OutOfDistribution { idx: usize, dist: f32, threshold: f32 },
    MalformedEmbedding { len: usize, expected: usize },
    EmptyOutput,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateOutcome {
    Accepted(GateDecision),
    Rejected(RejectReason),
}

/// Drop counters, diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub accepted: u64,
    pub low_confidence: u64,
    pub out_of_distribution: u64,
    pub malformed_embedding: u64,
    pub empty_output: u64,
}

struct OodGate {
    embedder: Box<dyn SequenceModel>,
    meta: SignMeta,
    threshold_override: Option<f32>,
}

pub struct InferenceGate {
    classifier: Box<dyn SequenceModel>,
    ood: Option<OodGate>,
    min_prob: f32,
    stats: GateStats,
}

impl InferenceGate {
    pub fn new(classifier: Box<dyn SequenceModel>, config: &GateConfig) -> Self {
        Self {
            classifier,
            ood: None,
            min_prob: config.min_prob,
            stats: GateStats::default(),
        }
    }

    /// Enable the OOD gate: embeddings are checked against the per-class
    /// centroids in `meta`.
    pub fn with_ood(
        mut self,
        embedder: Box<dyn SequenceModel>,
        meta: SignMeta,
        threshold_override: Option<f32>,
    ) -> Self {
        self.ood = Some(OodGate {
            embedder,
            meta,
            threshold_override,
        });
        self
    }

    pub fn ood_enabled(&self) -> bool {
        self.ood.is_some()
    }

    pub fn stats(&self) -> GateStats {
        self.stats
    }

    /// Run the classifier (and the embedder, when configured) on a full
    /// window. An `Err` is a session-level inference failure; rejections are
    /// part of normal operation and come back as `GateOutcome::Rejected`.
    pub fn classify(&mut self, window: ArrayView2<f32>) -> Result<GateOutcome> {
        let logits = self.classifier.run(window)?;
        let Some((best_idx, best_logit)) = argmax(&logits) else {
            self.stats.empty_output += 1;
            return Ok(GateOutcome::Rejected(RejectReason::EmptyOutput));
        };

        let prob = softmax_max_prob(&logits, best_idx);
        if prob < self.min_prob {
            self.stats.low_confidence += 1;
            debug!(idx = best_idx, prob, min_prob = self.min_prob, "drop: low confidence");
            return Ok(GateOutcome::Rejected(RejectReason::LowConfidence {
                idx: best_idx,
                prob,
            }));
        }

        let mut dist = 0.0;
        let mut locked = false;

        if let Some(ood) = &mut self.ood {
            let threshold = ood
                .threshold_override
                .unwrap_or(ood.meta.distance_threshold);

            let embedding = ood.embedder.run(window)?;
            if embedding.len() != ood.meta.centroid_dim {
                self.stats.malformed_embedding += 1;
                debug!(
                    len = embedding.len(),
                    expected = ood.meta.centroid_dim,
                    "drop: malformed embedding"
                );
                return Ok(GateOutcome::Rejected(RejectReason::MalformedEmbedding {
                    len: embedding.len(),
                    expected: ood.meta.centroid_dim,
                }));
            }

            // モデルのクラス数がmetaより多い場合など。セントロイドが無い
            // クラスは統計的に検証できないので弾く
            let Some(centroid) = ood.meta.centroid(best_idx) else {
                self.stats.out_of_distribution += 1;
                return Ok(GateOutcome::Rejected(RejectReason::OutOfDistribution {
                    idx: best_idx,
                    dist: f32::INFINITY,
                    threshold,
                }));
            };

            dist = l2_distance(&embedding, centroid);
            if dist > threshold {
                self.stats.out_of_distribution += 1;
                debug!(idx = best_idx, dist, threshold, "drop: out of distribution");
                return Ok(GateOutcome::Rejected(RejectReason::OutOfDistribution {
                    idx: best_idx,
                    dist,
                    threshold,
                }));
            }

            locked = true;
        }

        self.stats.accepted += 1;
        Ok(GateOutcome::Accepted(GateDecision {
            idx: best_idx,
            prob,
            raw_score: best_logit,
            dist,
            locked,
        }))
    }
}

fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// argmaxクラスのsoftmax確率。モデル出力がlogitでも確率でも
/// 1 / Σ exp(x_i - x_max) で較正されたconfidenceになる
fn softmax_max_prob(values: &[f32], max_idx: usize) -> f32 {
    let m = values[max_idx];
    let sum: f64 = values.iter().map(|&x| f64::from(x - m).exp()).sum();
    (1.0 / sum) as f32
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(x - y);
            d * d
        })
        .sum();
    (sum.sqrt()) as f32
}
