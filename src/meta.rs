use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 学習パイプラインが出力する sign_meta.json
///
/// classNames の並びはモデル出力のクラスindexと一致する。
/// centroidsFlat は [classCount * centroidDim] の行優先フラット配列。
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignMeta {
    pub class_names: Vec<String>,
    #[serde(default)]
    pub distance_threshold: f32,
    #[serde(default)]
    pub centroid_dim: usize,
    #[serde(default)]
    pub centroids_flat: Vec<f32>,
}

impl SignMeta {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read meta file: {}", path.as_ref().display()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let meta: SignMeta = serde_json::from_str(json).context("Failed to parse sign meta JSON")?;
        meta.validate()?;
        Ok(meta)
    }

    /// セントロイド行列の形が classCount × centroidDim と一致しなければエラー
    fn validate(&self) -> Result<()> {
        if self.class_names.is_empty() {
            bail!("sign meta has no class names");
        }
        if self.centroid_dim > 0
            && self.centroids_flat.len() != self.class_names.len() * self.centroid_dim
        {
            bail!(
                "centroid matrix shape mismatch: {} values for {} classes x {} dims",
                self.centroids_flat.len(),
                self.class_names.len(),
                self.centroid_dim
            );
        }
        Ok(())
    }

    pub fn class_count(&self) -> usize {
        self.class_names.len()
    }

    /// クラスindexのラベル。範囲外は "#idx" 形式で返す
    pub fn label(&self, idx: usize) -> String {
        self.class_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("#{}", idx))
    }

    /// クラスindexのセントロイド。範囲外は None
    pub fn centroid(&self, idx: usize) -> Option<&[f32]> {
        if self.centroid_dim == 0 || idx >= self.class_count() {
            return None;
        }
        let offset = idx * self.centroid_dim;
        self.centroids_flat.get(offset..offset + self.centroid_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "classNames": ["dream", "love", "hope"],
            "distanceThreshold": 5.5,
            "centroidDim": 2,
            "centroidsFlat": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        }"#
    }

    #[test]
    fn test_parse_and_accessors() {
        let meta = SignMeta::from_json(sample_json()).unwrap();
        assert_eq!(meta.class_count(), 3);
        assert_eq!(meta.label(1), "love");
        assert_eq!(meta.distance_threshold, 5.5);
        assert_eq!(meta.centroid(2), Some(&[5.0, 6.0][..]));
    }

    #[test]
    fn test_label_out_of_range_falls_back() {
        let meta = SignMeta::from_json(sample_json()).unwrap();
        assert_eq!(meta.label(7), "#7");
    }

    #[test]
    fn test_centroid_out_of_range() {
        let meta = SignMeta::from_json(sample_json()).unwrap();
        assert!(meta.centroid(3).is_none());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let json = r#"{
            "classNames": ["a", "b"],
            "distanceThreshold": 1.0,
            "centroidDim": 3,
            "centroidsFlat": [1.0, 2.0, 3.0]
        }"#;
        assert!(SignMeta::from_json(json).is_err());
    }

    #[test]
    fn test_no_centroids_is_valid() {
        // 埋め込みモデルを使わない構成ではセントロイドが無い
        let json = r#"{ "classNames": ["a", "b"] }"#;
        let meta = SignMeta::from_json(json).unwrap();
        assert_eq!(meta.centroid_dim, 0);
        assert!(meta.centroid(0).is_none());
    }

    #[test]
    fn test_empty_class_names_rejected() {
        let json = r#"{ "classNames": [] }"#;
        assert!(SignMeta::from_json(json).is_err());
    }
}
