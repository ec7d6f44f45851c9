//! Landmark → 特徴量ベクトルの正規化。
//!
//! word モード: 左手21 + 右手21 + 顔5 の47点を鼻anchor・眼間距離スケールで
//! 正規化して141次元。spell モード: 右手21点を手首anchor・中指MCPスケールで
//! 正規化して63次元。学習側の前処理と同じ式でなければならない。

/// 片手のランドマーク点数 (MediaPipe Hands)
pub const HAND_POINT_COUNT: usize = 21;
/// 顔のアンカー点数 (鼻, 左目, 右目, 口左, 口右)
pub const FACE_POINT_COUNT: usize = 5;

/// spell モードの特徴量次元 (21点 × xyz)
pub const SPELL_FEATURE_DIM: usize = HAND_POINT_COUNT * 3;
/// word モードの特徴量次元 (47点 × xyz)
pub const WORD_FEATURE_DIM: usize = (HAND_POINT_COUNT * 2 + FACE_POINT_COUNT) * 3;

const WRIST: usize = 0;
const MIDDLE_MCP: usize = 9;
const NOSE: usize = 0;
const LEFT_EYE: usize = 1;
const RIGHT_EYE: usize = 2;

/// スケールがこれ未満ならclampする（ゼロ除算回避）
const SCALE_EPSILON: f32 = 1e-6;

/// 特徴量モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMode {
    /// 単語モデル用: 両手 + 顔アンカー (141次元)
    Word,
    /// 指文字モデル用: 右手のみ (63次元)
    Spell,
}

impl FeatureMode {
    pub fn feature_dim(&self) -> usize {
        match self {
            FeatureMode::Word => WORD_FEATURE_DIM,
            FeatureMode::Spell => SPELL_FEATURE_DIM,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "word" => Some(FeatureMode::Word),
            "spell" => Some(FeatureMode::Spell),
            _ => None,
        }
    }
}

/// 1tick分のランドマーク。トラッキングできなかった部位は None
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkFrame {
    pub left_hand: Option<Vec<[f32; 3]>>,
    pub right_hand: Option<Vec<[f32; 3]>>,
    /// 顔5点: 鼻, 左目, 右目, 口左, 口右
    pub face: Option<Vec<[f32; 3]>>,
}

impl LandmarkFrame {
    /// どの部位も無ければ true（tick側でトラッキング喪失として扱う）
    pub fn is_empty(&self) -> bool {
        self.left_hand.is_none() && self.right_hand.is_none() && self.face.is_none()
    }

    pub fn features(&self, mode: FeatureMode) -> Vec<f32> {
        match mode {
            FeatureMode::Word => normalize_word_features(
                self.left_hand.as_deref(),
                self.right_hand.as_deref(),
                self.face.as_deref(),
            ),
            FeatureMode::Spell => match self.right_hand.as_deref() {
                Some(hand) => normalize_right_hand(hand),
                None => vec![0.0; SPELL_FEATURE_DIM],
            },
        }
    }
}

/// tickごとにランドマークを供給する外部コラボレータ
pub trait LandmarkSource {
    fn has_any_hand(&self) -> bool;
    fn has_face(&self) -> bool;
    /// 現在tickのランドマーク。何も取れていなければ None
    fn frame(&mut self) -> Option<LandmarkFrame>;
}

/// 右手21点を手首原点・中指MCPノルムで正規化して63次元に平坦化。
/// 点が足りなければ全ゼロを返す。
pub fn normalize_right_hand(landmarks: &[[f32; 3]]) -> Vec<f32> {
    if landmarks.len() < HAND_POINT_COUNT {
        return vec![0.0; SPELL_FEATURE_DIM];
    }

    let wrist = landmarks[WRIST];
    let mut data = [[0.0f32; 3]; HAND_POINT_COUNT];
    for i in 0..HAND_POINT_COUNT {
        data[i] = sub(landmarks[i], wrist);
    }

    let scale = magnitude(data[MIDDLE_MCP]).max(SCALE_EPSILON);

    let mut result = Vec::with_capacity(SPELL_FEATURE_DIM);
    for p in &data {
        result.push(p[0] / scale);
        result.push(p[1] / scale);
        result.push(p[2] / scale);
    }
    result
}

/// 左手・右手・顔5点を鼻原点・眼間距離スケールで正規化して141次元に平坦化。
///
/// 顔が無いtickは全ゼロ（学習データ生成と同じ扱い）。手が無い側の区間は
/// ゼロのまま連結する。区間の位置は常に固定。
pub fn normalize_word_features(
    left_hand: Option<&[[f32; 3]]>,
    right_hand: Option<&[[f32; 3]]>,
    face: Option<&[[f32; 3]]>,
) -> Vec<f32> {
    let Some(face) = face.filter(|f| f.len() >= FACE_POINT_COUNT) else {
        return vec![0.0; WORD_FEATURE_DIM];
    };

    let nose = face[NOSE];
    let face_width = magnitude(sub(face[LEFT_EYE], face[RIGHT_EYE])).max(SCALE_EPSILON);
    let norm = |p: [f32; 3]| -> [f32; 3] {
        let d = sub(p, nose);
        [d[0] / face_width, d[1] / face_width, d[2] / face_width]
    };

    let mut result = Vec::with_capacity(WORD_FEATURE_DIM);

    for hand in [left_hand, right_hand] {
        match hand.filter(|h| h.len() >= HAND_POINT_COUNT) {
            Some(hand) => {
                for p in hand.iter().take(HAND_POINT_COUNT) {
                    result.extend_from_slice(&norm(*p));
                }
            }
            None => result.extend(std::iter::repeat(0.0).take(SPELL_FEATURE_DIM)),
        }
    }

    for p in face.iter().take(FACE_POINT_COUNT) {
        result.extend_from_slice(&norm(*p));
    }

    result
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn magnitude(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}
