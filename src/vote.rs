use crate::config::VotingConfig;

/// 多数決リングが返す安定予測
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableVote {
    pub idx: usize,
    pub votes: usize,
}

/// 単発フレームの分類ブレを吸収する多数決リング
///
/// リングが埋まるまでは判定しない。ウィンドウは意図的に小さい
/// (リアルタイムのフィードバックループなのでレイテンシを増やせない)。
pub struct VoteStabilizer {
    ring: Vec<Option<usize>>,
    pos: usize,
    count: usize,
    min_votes: usize,
}

impl VoteStabilizer {
    pub fn new(window: usize, min_votes: usize) -> Self {
        let window = window.max(1);
        Self {
            ring: vec![None; window],
            pos: 0,
            count: 0,
            min_votes: min_votes.max(1),
        }
    }

    pub fn from_config(config: &VotingConfig) -> Self {
        Self::new(config.window, config.min_votes)
    }

    pub fn window(&self) -> usize {
        self.ring.len()
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.ring.len()
    }

    pub fn push(&mut self, idx: usize) {
        self.ring[self.pos] = Some(idx);
        self.pos = (self.pos + 1) % self.ring.len();
        if self.count < self.ring.len() {
            self.count += 1;
        }
    }

    /// リングが満杯で、最多クラスの得票が min_votes 以上のときだけ Some。
    /// 同数のときはスキャン順で先に出たクラスが勝つ（決定的）。
    pub fn stable_vote(&self) -> Option<StableVote> {
        if !self.is_full() {
            return None;
        }

        let mut best_idx = None;
        let mut best_count = 0;

        // ウィンドウが小さいのでO(n^2)の素朴な数え方で十分
        for slot in &self.ring {
            let Some(a) = *slot else { continue };
            let c = self
                .ring
                .iter()
                .filter(|s| **s == Some(a))
                .count();
            if c > best_count {
                best_count = c;
                best_idx = Some(a);
            }
        }

        let idx = best_idx?;
        if best_count < self.min_votes {
            return None;
        }
        Some(StableVote {
            idx,
            votes: best_count,
        })
    }

    pub fn clear(&mut self) {
        self.ring.fill(None);
        self.pos = 0;
        self.count = 0;
    }
}
