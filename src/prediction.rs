use std::collections::VecDeque;

/// 安定化を通過して確定した1件の予測
///
/// 生成以降は不変。判定側はこの値を読むだけ。
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub time_sec: f32,
    pub idx: usize,
    pub label: String,
    pub prob: f32,
    /// 分類器が出したargmaxの生スコア (logit)
    pub raw_score: f32,
    pub dist: f32,
    /// OODゲートを通過したか
    pub locked: bool,
}

/// 時刻順の予測バッファ
///
/// 追加順 == 時刻順（時刻の進行に沿ってpushされる）なので、
/// pruneは先頭の切り落としで済む。
pub struct PredictionRingBuffer {
    buf: VecDeque<Prediction>,
    keep_sec: f32,
}

impl PredictionRingBuffer {
    pub fn new(keep_sec: f32) -> Self {
        Self {
            buf: VecDeque::new(),
            keep_sec,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn add(&mut self, p: Prediction) {
        self.buf.push_back(p);
    }

    /// now - keep_sec より古い予測を先頭から落とす
    pub fn prune(&mut self, now_sec: f32) {
        let min_time = now_sec - self.keep_sec;
        while self.buf.front().is_some_and(|p| p.time_sec < min_time) {
            self.buf.pop_front();
        }
    }

    /// [t_min, t_max] に入る予測を時刻順で out に集める
    pub fn query_between(&self, t_min: f32, t_max: f32, out: &mut Vec<Prediction>) {
        out.clear();
        for p in &self.buf {
            if p.time_sec >= t_min && p.time_sec <= t_max {
                out.push(p.clone());
            }
        }
    }
}
