//! Chart-matching state machine: reconciles expected notes against the
//! prediction buffer and emits Perfect/Good/Miss verdicts.

use std::collections::HashSet;
use tracing::debug;

use crate::chart::Note;
use crate::config::JudgementConfig;
use crate::meta::SignMeta;
use crate::prediction::{Prediction, PredictionRingBuffer};

/// Placeholder distance reported on a Miss (no prediction was selected).
const MISS_DIST: f32 = 999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeResult {
    Perfect,
    Good,
    Miss,
}

/// Emitted exactly once per note, when its judgement is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeEvent {
    pub note_id: u32,
    pub note_time: f32,
    pub hit_time: f32,
    pub expected_idx: usize,
    /// None on a Miss (no prediction matched).
    pub predicted_idx: Option<usize>,
    /// Selected prediction time - target time. On a Miss: now - target time.
    pub dt: f32,
    pub prob: f32,
    pub dist: f32,
    pub result: JudgeResult,
}

/// Judgement engine.
///
/// Notes are consumed strictly in ascending time order and never revisited
/// once judged. Each tick either resolves the current note (verdict emitted,
/// cursor advances) or defers it to a later tick; the Miss deadline
/// (`good_window` past the target time) is the only bound on deferral.
pub struct JudgementEngine {
    config: JudgementConfig,
    notes: Vec<Note>,
    current_index: usize,
    pred_buf: PredictionRingBuffer,
    /// Cooldown memory: last accepted (class index, prediction time).
    last_accepted: Option<(usize, f32)>,
    meta: Option<SignMeta>,
    /// Note ids whose cross-class candidates were already logged once.
    logged_map_note_ids: HashSet<u32>,
}

impl JudgementEngine {
    pub fn new(config: JudgementConfig) -> Self {
        let keep_sec = config.keep_sec;
        Self {
            config,
            notes: Vec::new(),
            current_index: 0,
            pred_buf: PredictionRingBuffer::new(keep_sec),
            last_accepted: None,
            meta: None,
            logged_map_note_ids: HashSet::new(),
        }
    }

    /// Class labels for log lines. Optional.
    pub fn set_meta(&mut self, meta: SignMeta) {
        self.meta = Some(meta);
    }

    /// Replace the chart wholesale. Resets the cursor, the cooldown memory
    /// and the prediction buffer so nothing from a previous session leaks in.
    pub fn set_notes(&mut self, mut notes: Vec<Note>) {
        notes.sort_by(|a, b| a.time_sec.total_cmp(&b.time_sec));
        self.notes = notes;
        self.current_index = 0;
        self.pred_buf = PredictionRingBuffer::new(self.config.keep_sec);
        self.last_accepted = None;
        self.logged_map_note_ids.clear();
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.notes.len()
    }

    pub fn push_prediction(&mut self, p: Prediction) {
        self.pred_buf.add(p);
    }

    /// Advance the state machine to `now_sec`, returning the verdicts that
    /// resolved this tick. Never blocks: an undecidable note is left for the
    /// next tick until its Miss deadline forces resolution.
    pub fn update(&mut self, now_sec: f32) -> Vec<JudgeEvent> {
        let mut events = Vec::new();
        if self.notes.is_empty() || self.is_finished() {
            return events;
        }

        self.pred_buf.prune(now_sec);
        let mut candidates = Vec::new();

        while self.current_index < self.notes.len() {
            let note = self.notes[self.current_index].clone();
            if note.judged {
                self.current_index += 1;
                continue;
            }

            // Target time with chart/model corrections applied.
            let t0 = note.time_sec + self.config.chart_offset_sec + self.config.model_latency_sec;

            // Too early for this (and every later) note.
            if now_sec < t0 - self.config.good_window {
                break;
            }

            // Window elapsed without a match.
            if now_sec > t0 + self.config.good_window {
                debug!(
                    note_id = note.note_id,
                    expected_idx = note.expected_idx,
                    t0,
                    now = now_sec,
                    "note missed"
                );
                events.push(self.emit(
                    &note,
                    None,
                    now_sec,
                    0.0,
                    MISS_DIST,
                    now_sec - t0,
                    JudgeResult::Miss,
                ));
                self.resolve_current();
                continue;
            }

            self.pred_buf.query_between(
                t0 - self.config.good_window,
                t0 + self.config.good_window,
                &mut candidates,
            );

            let Some(best) = self.pick_best(&note, t0, &candidates) else {
                // Not decidable yet: re-evaluate next tick.
                break;
            };

            let dt_abs = (best.time_sec - t0).abs();
            let result = if dt_abs <= self.config.perfect_window {
                JudgeResult::Perfect
            } else {
                JudgeResult::Good
            };

            events.push(self.emit(
                &note,
                Some(best.idx),
                best.time_sec,
                best.prob,
                best.dist,
                best.time_sec - t0,
                result,
            ));
            self.resolve_current();
        }

        events
    }

    fn resolve_current(&mut self) {
        self.notes[self.current_index].judged = true;
        self.current_index += 1;
    }

    /// Filter candidates (cooldown, expected class, thresholds), score the
    /// survivors and pick the maximum. Ties keep the first encountered.
    fn pick_best(&mut self, note: &Note, t0: f32, candidates: &[Prediction]) -> Option<Prediction> {
        let expected = note.expected_idx as i64 + self.config.expected_idx_offset as i64;

        let mut best: Option<&Prediction> = None;
        let mut best_score = f32::NEG_INFINITY;

        for p in candidates {
            // Anti-duplicate: one sustained gesture must not satisfy two
            // notes in immediate succession.
            if let Some((last_idx, last_time)) = self.last_accepted {
                if p.idx == last_idx && (p.time_sec - last_time) < self.config.same_sign_cooldown {
                    continue;
                }
            }

            if p.idx as i64 != expected {
                if self.logged_map_note_ids.insert(note.note_id) {
                    debug!(
                        note_id = note.note_id,
                        t0,
                        expected_idx = note.expected_idx,
                        expected_label = %self.label(note.expected_idx),
                        candidate_idx = p.idx,
                        candidate_label = %self.label(p.idx),
                        prob = p.prob,
                        dt = (p.time_sec - t0).abs(),
                        "cross-class candidate"
                    );
                }
                continue;
            }

            if p.prob < self.config.min_prob {
                continue;
            }
            if p.dist > self.config.max_dist {
                continue;
            }

            let dt = (p.time_sec - t0).abs();
            let time_score = (-dt / self.config.time_decay).exp();
            let dist_score = 1.0 / (1.0 + p.dist);
            let lock_bonus = if p.locked {
                self.config.lock_bonus
            } else {
                -self.config.lock_bonus
            };

            let score = lock_bonus
                + self.config.w_prob * p.prob
                + self.config.w_time * time_score
                + self.config.w_dist * dist_score;

            if score > best_score {
                best_score = score;
                best = Some(p);
            }
        }

        let best = best.cloned()?;
        self.last_accepted = Some((best.idx, best.time_sec));
        Some(best)
    }

    fn emit(
        &self,
        note: &Note,
        predicted_idx: Option<usize>,
        hit_time: f32,
        prob: f32,
        dist: f32,
        dt: f32,
        result: JudgeResult,
    ) -> JudgeEvent {
        debug!(
            note_id = note.note_id,
            result = ?result,
            expected_label = %self.label(note.expected_idx),
            dt,
            prob,
            "judged"
        );
        JudgeEvent {
            note_id: note.note_id,
            note_time: note.time_sec,
            hit_time,
            expected_idx: note.expected_idx,
            predicted_idx,
            dt,
            prob,
            dist,
            result,
        }
    }

    fn label(&self, idx: usize) -> String {
        match &self.meta {
            Some(meta) => meta.label(idx),
            None => format!("#{}", idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JudgementConfig {
        JudgementConfig {
            perfect_window: 0.2,
            good_window: 0.4,
            min_prob: 0.2,
            max_dist: 10.0,
            same_sign_cooldown: 0.1,
            ..JudgementConfig::default()
        }
    }

    fn note(note_id: u32, time_sec: f32, expected_idx: usize) -> Note {
        Note::new(note_id, time_sec, expected_idx, "sign")
    }

    fn pred(time_sec: f32, idx: usize) -> Prediction {
        Prediction {
            time_sec,
            idx,
            label: format!("#{}", idx),
            prob: 0.9,
            raw_score: 2.0,
            dist: 0.5,
            locked: true,
        }
    }

    #[test]
    fn test_perfect_inside_perfect_window() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);
        engine.push_prediction(pred(10.05, 2));

        let events = engine.update(10.1);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.result, JudgeResult::Perfect);
        assert_eq!(e.predicted_idx, Some(2));
        assert!((e.dt - 0.05).abs() < 1e-5);
        assert!(engine.is_finished());
    }

    #[test]
    fn test_good_outside_perfect_window() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);
        engine.push_prediction(pred(10.3, 2));

        let events = engine.update(10.35);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result, JudgeResult::Good);
        assert!((events[0].dt - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_miss_after_deadline() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);

        // ウィンドウ内は未確定のまま
        assert!(engine.update(10.2).is_empty());

        let events = engine.update(10.41);
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.result, JudgeResult::Miss);
        assert_eq!(e.predicted_idx, None);
        assert!((e.dt - 0.41).abs() < 1e-4);
    }

    #[test]
    fn test_too_early_does_nothing() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);
        engine.push_prediction(pred(9.0, 2));
        assert!(engine.update(9.0).is_empty());
        assert!(!engine.is_finished());
    }

    #[test]
    fn test_cross_class_candidate_never_selected() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);
        engine.push_prediction(pred(10.0, 3));

        // 期待クラス以外は選ばれず、締め切りでMissになる
        assert!(engine.update(10.1).is_empty());
        let events = engine.update(10.5);
        assert_eq!(events[0].result, JudgeResult::Miss);
    }

    #[test]
    fn test_low_prob_and_high_dist_filtered() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2), note(1, 20.0, 2)]);

        let mut weak = pred(10.0, 2);
        weak.prob = 0.1;
        engine.push_prediction(weak);
        assert!(engine.update(10.1).is_empty());

        let mut far = pred(20.0, 2);
        far.dist = 50.0;
        engine.push_prediction(far);
        assert!(engine.update(20.1).is_empty());
    }

    #[test]
    fn test_best_candidate_wins_composite_score() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);

        let mut early_weak = pred(9.7, 2);
        early_weak.prob = 0.4;
        early_weak.locked = false;
        let close_strong = pred(10.02, 2);
        engine.push_prediction(early_weak);
        engine.push_prediction(close_strong.clone());

        let events = engine.update(10.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result, JudgeResult::Perfect);
        assert!((events[0].hit_time - 10.02).abs() < 1e-5);
    }

    #[test]
    fn test_same_class_cooldown_blocks_second_note() {
        let mut config = config();
        config.same_sign_cooldown = 0.5;
        let mut engine = JudgementEngine::new(config);
        engine.set_notes(vec![note(0, 10.0, 2), note(1, 10.6, 2)]);

        engine.push_prediction(pred(10.0, 2));
        let events = engine.update(10.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].note_id, 0);

        // 1つ目の判定から0.5秒以内の同クラス予測は2つ目のノートに使えない
        engine.push_prediction(pred(10.3, 2));
        assert!(engine.update(10.6).is_empty());

        // クールダウンを過ぎた新しい予測なら通る
        engine.push_prediction(pred(10.7, 2));
        let events = engine.update(10.8);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].note_id, 1);
        assert_ne!(events[0].result, JudgeResult::Miss);
    }

    #[test]
    fn test_cooldown_starved_note_misses() {
        let mut config = config();
        config.same_sign_cooldown = 2.0;
        let mut engine = JudgementEngine::new(config);
        engine.set_notes(vec![note(0, 10.0, 2), note(1, 10.5, 2)]);

        engine.push_prediction(pred(10.0, 2));
        assert_eq!(engine.update(10.1).len(), 1);

        // クールダウン中の予測しか無い2つ目は締め切りでMiss
        engine.push_prediction(pred(10.5, 2));
        let events = engine.update(11.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].note_id, 1);
        assert_eq!(events[0].result, JudgeResult::Miss);
    }

    #[test]
    fn test_multiple_notes_resolved_in_one_tick() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 1.0, 0), note(1, 2.0, 1)]);

        // 両方の締め切りを過ぎたtickで2つ連続Miss
        let events = engine.update(3.0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].note_id, 0);
        assert_eq!(events[1].note_id, 1);
        assert!(events.iter().all(|e| e.result == JudgeResult::Miss));
    }

    #[test]
    fn test_set_notes_resets_state() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);
        engine.push_prediction(pred(10.0, 2));
        assert_eq!(engine.update(10.1).len(), 1);

        // 新しいチャート: カーソルも予測バッファもクールダウンも白紙
        engine.set_notes(vec![note(0, 10.2, 2)]);
        assert!(!engine.is_finished());
        assert!(engine.update(10.2).is_empty());

        engine.push_prediction(pred(10.25, 2));
        let events = engine.update(10.3);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result, JudgeResult::Perfect);
    }

    #[test]
    fn test_notes_sorted_on_set() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(1, 20.0, 0), note(0, 10.0, 1)]);
        assert_eq!(engine.notes()[0].note_id, 0);
        assert_eq!(engine.notes()[1].note_id, 1);
    }

    #[test]
    fn test_empty_notes_is_noop() {
        let mut engine = JudgementEngine::new(config());
        assert!(engine.update(123.0).is_empty());
        assert!(engine.is_finished());
    }

    #[test]
    fn test_expected_idx_offset() {
        let mut config = config();
        config.expected_idx_offset = 1;
        let mut engine = JudgementEngine::new(config);
        engine.set_notes(vec![note(0, 10.0, 2)]);

        // チャートのidx 2 はモデルのidx 3 に対応する
        engine.push_prediction(pred(10.0, 3));
        let events = engine.update(10.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result, JudgeResult::Perfect);
        assert_eq!(events[0].predicted_idx, Some(3));
    }

    #[test]
    fn test_deferred_then_judged_next_tick() {
        let mut engine = JudgementEngine::new(config());
        engine.set_notes(vec![note(0, 10.0, 2)]);

        // ウィンドウは開いているが候補が無い → 据え置き
        assert!(engine.update(9.9).is_empty());
        assert!(engine.update(10.0).is_empty());

        engine.push_prediction(pred(10.1, 2));
        let events = engine.update(10.15);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result, JudgeResult::Perfect);
    }
}
