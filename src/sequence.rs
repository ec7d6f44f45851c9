use ndarray::{Array2, ArrayView2};
use tracing::debug;

/// 分類器に入力する直近Nフレームのスライディングウィンドウ
///
/// 格納は [seq_len, feat_dim]。pushで全行を1つ繰り上げて末尾に書く。
/// seq_len≈15・毎tick高々1回なのでシフトコストは問題にならない。
pub struct SequenceBuffer {
    buf: Array2<f32>,
    seq_len: usize,
    feat_dim: usize,
    count: usize,
}

impl SequenceBuffer {
    pub fn new(seq_len: usize, feat_dim: usize) -> Self {
        let seq_len = seq_len.max(1);
        Self {
            buf: Array2::zeros((seq_len, feat_dim)),
            seq_len,
            feat_dim,
            count: 0,
        }
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    pub fn feat_dim(&self) -> usize {
        self.feat_dim
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.seq_len
    }

    /// フレームを末尾に追加。長さが合わなければ何もしない
    pub fn push(&mut self, frame: &[f32]) {
        if frame.len() != self.feat_dim {
            debug!(
                got = frame.len(),
                expected = self.feat_dim,
                "frame length mismatch, dropped"
            );
            return;
        }

        for t in 0..self.seq_len - 1 {
            for d in 0..self.feat_dim {
                self.buf[[t, d]] = self.buf[[t + 1, d]];
            }
        }

        let last = self.seq_len - 1;
        for d in 0..self.feat_dim {
            self.buf[[last, d]] = frame[d];
        }

        if self.count < self.seq_len {
            self.count += 1;
        }
    }

    /// バッファ全体のビュー。満杯前は未記入行がゼロのまま含まれる
    pub fn snapshot(&self) -> ArrayView2<f32> {
        self.buf.view()
    }

    pub fn clear(&mut self, zero_fill: bool) {
        self.count = 0;
        if zero_fill {
            self.buf.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f32, dim: usize) -> Vec<f32> {
        vec![value; dim]
    }

    #[test]
    fn test_count_saturates_at_seq_len() {
        let mut buf = SequenceBuffer::new(4, 2);
        for i in 0..10 {
            buf.push(&frame(i as f32, 2));
            assert!(buf.count() <= 4);
        }
        assert!(buf.is_full());
        assert_eq!(buf.count(), 4);
    }

    #[test]
    fn test_snapshot_keeps_last_frames_in_order() {
        let mut buf = SequenceBuffer::new(3, 2);
        for i in 0..5 {
            buf.push(&frame(i as f32, 2));
        }
        let snap = buf.snapshot();
        // 直近3フレーム(2,3,4)が古い順に並ぶ
        assert_eq!(snap[[0, 0]], 2.0);
        assert_eq!(snap[[1, 0]], 3.0);
        assert_eq!(snap[[2, 0]], 4.0);
    }

    #[test]
    fn test_snapshot_before_full_has_zero_rows() {
        let mut buf = SequenceBuffer::new(3, 2);
        buf.push(&frame(7.0, 2));
        assert!(!buf.is_full());
        let snap = buf.snapshot();
        assert_eq!(snap[[0, 0]], 0.0);
        assert_eq!(snap[[1, 0]], 0.0);
        assert_eq!(snap[[2, 0]], 7.0);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let mut buf = SequenceBuffer::new(3, 2);
        buf.push(&frame(1.0, 5));
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.snapshot()[[2, 0]], 0.0);
    }

    #[test]
    fn test_clear_zero_fill() {
        let mut buf = SequenceBuffer::new(2, 2);
        buf.push(&frame(1.0, 2));
        buf.push(&frame(2.0, 2));
        buf.clear(true);
        assert_eq!(buf.count(), 0);
        assert!(!buf.is_full());
        assert_eq!(buf.snapshot()[[1, 0]], 0.0);
    }

    #[test]
    fn test_clear_without_zero_fill_only_resets_count() {
        let mut buf = SequenceBuffer::new(2, 2);
        buf.push(&frame(3.0, 2));
        buf.push(&frame(4.0, 2));
        buf.clear(false);
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.snapshot()[[1, 0]], 4.0);
    }
}
