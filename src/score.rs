use tracing::debug;

use crate::judge::{JudgeEvent, JudgeResult};

/// 判定イベントを畳み込むだけのスコアボード
///
/// タイマーも副作用も持たない。同じイベント列からは常に同じ結果になる。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBoard {
    pub perfect_count: u32,
    pub good_count: u32,
    pub miss_count: u32,
    pub combo: u32,
    pub max_combo: u32,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn on_judge(&mut self, e: &JudgeEvent) {
        match e.result {
            JudgeResult::Perfect => {
                self.perfect_count += 1;
                self.combo += 1;
            }
            JudgeResult::Good => {
                self.good_count += 1;
                self.combo += 1;
            }
            JudgeResult::Miss => {
                self.miss_count += 1;
                self.combo = 0;
            }
        }
        if self.combo > self.max_combo {
            self.max_combo = self.combo;
        }

        debug!(
            result = ?e.result,
            note_id = e.note_id,
            dt = e.dt,
            combo = self.combo,
            perfect = self.perfect_count,
            good = self.good_count,
            miss = self.miss_count,
            "score updated"
        );
    }

    pub fn judged_total(&self) -> u32 {
        self.perfect_count + self.good_count + self.miss_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(result: JudgeResult) -> JudgeEvent {
        JudgeEvent {
            note_id: 0,
            note_time: 0.0,
            hit_time: 0.0,
            expected_idx: 0,
            predicted_idx: None,
            dt: 0.0,
            prob: 0.0,
            dist: 0.0,
            result,
        }
    }

    #[test]
    fn test_counts_sum_to_total() {
        let mut score = ScoreBoard::new();
        let sequence = [
            JudgeResult::Perfect,
            JudgeResult::Good,
            JudgeResult::Miss,
            JudgeResult::Perfect,
            JudgeResult::Perfect,
        ];
        for r in sequence {
            score.on_judge(&event(r));
        }
        assert_eq!(score.judged_total(), 5);
        assert_eq!(score.perfect_count, 3);
        assert_eq!(score.good_count, 1);
        assert_eq!(score.miss_count, 1);
    }

    #[test]
    fn test_combo_resets_on_miss_only() {
        let mut score = ScoreBoard::new();
        score.on_judge(&event(JudgeResult::Perfect));
        score.on_judge(&event(JudgeResult::Good));
        assert_eq!(score.combo, 2);

        score.on_judge(&event(JudgeResult::Miss));
        assert_eq!(score.combo, 0);

        score.on_judge(&event(JudgeResult::Good));
        assert_eq!(score.combo, 1);
    }

    #[test]
    fn test_max_combo_is_running_maximum() {
        let mut score = ScoreBoard::new();
        for _ in 0..3 {
            score.on_judge(&event(JudgeResult::Perfect));
        }
        score.on_judge(&event(JudgeResult::Miss));
        score.on_judge(&event(JudgeResult::Good));
        assert_eq!(score.combo, 1);
        assert_eq!(score.max_combo, 3);
    }

    #[test]
    fn test_reset() {
        let mut score = ScoreBoard::new();
        score.on_judge(&event(JudgeResult::Perfect));
        score.reset();
        assert_eq!(score, ScoreBoard::default());
    }
}
