//! Parsing of the two per-round score reports.
//!
//! The reference-based report is line-oriented text such as:
//!
//! ```text
//! match: 92.5
//! text: 80.1
//! color: 77.0
//! position: 88.3
//! ```
//!
//! Labels are recognized by substring, checked in the order `match`, `text`,
//! `color`, `position`; the first label found on a line wins and the value is
//! whatever follows the first `": "`. Labels absent from the file score 0.
//!
//! The reference-free report is JSON with four keys, each holding a nested
//! `score` in [0, 5]. Those scores are multiplied by 20 so both reports share
//! the 0-100 scale.

use std::ops::AddAssign;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{REF_BASED_REPORT, REF_FREE_REPORT};
use crate::error::ReportError;

/// Upper bound of every normalized metric.
pub const MAX_METRIC: f64 = 100.0;

/// Upper bound of a raw reference-free score.
pub const MAX_REF_FREE_RAW: f64 = 5.0;

/// Factor that maps raw reference-free scores onto the 0-100 scale.
pub const REF_FREE_SCALE: f64 = 20.0;

/// Metrics from the reference-based scorer, 0-100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefBasedScores {
    #[serde(rename = "match")]
    pub match_score: f64,
    pub text: f64,
    pub color: f64,
    pub position: f64,
}

impl RefBasedScores {
    fn values(&self) -> [f64; 4] {
        [self.match_score, self.text, self.color, self.position]
    }

    /// Divides every metric by `n`.
    pub fn averaged(&self, n: f64) -> Self {
        Self {
            match_score: self.match_score / n,
            text: self.text / n,
            color: self.color / n,
            position: self.position / n,
        }
    }
}

impl AddAssign for RefBasedScores {
    fn add_assign(&mut self, other: Self) {
        self.match_score += other.match_score;
        self.text += other.text;
        self.color += other.color;
        self.position += other.position;
    }
}

/// Metrics from the reference-free scorer, already scaled to 0-100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefFreeScores {
    pub text: f64,
    pub image: f64,
    pub layout: f64,
    pub color: f64,
}

impl RefFreeScores {
    fn values(&self) -> [f64; 4] {
        [self.text, self.image, self.layout, self.color]
    }

    /// Divides every metric by `n`.
    pub fn averaged(&self, n: f64) -> Self {
        Self {
            text: self.text / n,
            image: self.image / n,
            layout: self.layout / n,
            color: self.color / n,
        }
    }
}

impl AddAssign for RefFreeScores {
    fn add_assign(&mut self, other: Self) {
        self.text += other.text;
        self.image += other.image;
        self.layout += other.layout;
        self.color += other.color;
    }
}

/// The eight metrics of one complete round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub ref_based: RefBasedScores,
    pub ref_free: RefFreeScores,
}

impl RoundReport {
    /// All eight metrics, reference-based first.
    pub fn metrics(&self) -> [f64; 8] {
        let [a, b, c, d] = self.ref_based.values();
        let [e, f, g, h] = self.ref_free.values();
        [a, b, c, d, e, f, g, h]
    }

    /// Unweighted mean of the eight metrics.
    pub fn composite(&self) -> f64 {
        self.metrics().iter().sum::<f64>() / 8.0
    }
}

/// Unweighted mean of the eight metrics held by the two score groups.
pub fn composite_of(ref_based: &RefBasedScores, ref_free: &RefFreeScores) -> f64 {
    RoundReport {
        ref_based: *ref_based,
        ref_free: *ref_free,
    }
    .composite()
}

/// Loads the round report stored in `round_dir`.
///
/// Both report files must exist; if either is absent the round is
/// incomplete and [`ReportError::Missing`] is returned without reading the
/// other one.
pub fn load_round(round_dir: &Path) -> Result<RoundReport, ReportError> {
    let ref_based_path = round_dir.join(REF_BASED_REPORT);
    let ref_free_path = round_dir.join(REF_FREE_REPORT);

    for path in [&ref_based_path, &ref_free_path] {
        if !path.is_file() {
            return Err(ReportError::Missing(path.clone()));
        }
    }

    let ref_based = parse_ref_based(&std::fs::read_to_string(&ref_based_path)?, &ref_based_path)?;
    let ref_free = parse_ref_free(&std::fs::read_to_string(&ref_free_path)?, &ref_free_path)?;

    Ok(RoundReport {
        ref_based,
        ref_free,
    })
}

/// Parses the text report of the reference-based scorer.
///
/// `path` is only used in error messages.
pub fn parse_ref_based(content: &str, path: &Path) -> Result<RefBasedScores, ReportError> {
    let mut scores = RefBasedScores::default();

    for line in content.lines() {
        let (label, slot) = if line.contains("match") {
            ("match", &mut scores.match_score)
        } else if line.contains("text") {
            ("text", &mut scores.text)
        } else if line.contains("color") {
            ("color", &mut scores.color)
        } else if line.contains("position") {
            ("position", &mut scores.position)
        } else {
            continue;
        };

        *slot = parse_labeled_value(line, label, path)?;
    }

    Ok(scores)
}

fn parse_labeled_value(line: &str, label: &str, path: &Path) -> Result<f64, ReportError> {
    let invalid = || ReportError::InvalidValue {
        path: path.to_path_buf(),
        label: label.to_string(),
        value: line.to_string(),
    };

    let raw = line.split(": ").nth(1).ok_or_else(invalid)?;
    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    check_range(value, 0.0, MAX_METRIC, label, path)?;
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct RawScore {
    score: f64,
}

#[derive(Debug, Deserialize)]
struct RawRefFree {
    text: RawScore,
    image: RawScore,
    layout: RawScore,
    color: RawScore,
}

/// Parses the JSON report of the reference-free scorer and scales it to 0-100.
pub fn parse_ref_free(content: &str, path: &Path) -> Result<RefFreeScores, ReportError> {
    let raw: RawRefFree = serde_json::from_str(content)?;

    let scaled = |label: &str, s: &RawScore| -> Result<f64, ReportError> {
        check_range(s.score, 0.0, MAX_REF_FREE_RAW, label, path)?;
        Ok(s.score * REF_FREE_SCALE)
    };

    Ok(RefFreeScores {
        text: scaled("text", &raw.text)?,
        image: scaled("image", &raw.image)?,
        layout: scaled("layout", &raw.layout)?,
        color: scaled("color", &raw.color)?,
    })
}

fn check_range(value: f64, min: f64, max: f64, label: &str, path: &Path) -> Result<(), ReportError> {
    // NaN fails both comparisons and is rejected here too.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ReportError::OutOfRange {
            path: path.to_path_buf(),
            label: label.to_string(),
            value,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const REF_BASED: &str = "match: 90.0\ntext: 80.0\ncolor: 70.0\nposition: 60.0\n";
    const REF_FREE: &str = r#"{
        "text": {"score": 4.0, "reason": "clear"},
        "image": {"score": 3.5},
        "layout": {"score": 5},
        "color": {"score": 2.0}
    }"#;

    fn p() -> &'static Path {
        Path::new("report")
    }

    #[test]
    fn test_parse_ref_based() {
        let scores = parse_ref_based(REF_BASED, p()).unwrap();
        assert_eq!(scores.match_score, 90.0);
        assert_eq!(scores.text, 80.0);
        assert_eq!(scores.color, 70.0);
        assert_eq!(scores.position, 60.0);
    }

    #[test]
    fn test_ref_based_first_matching_label_wins() {
        // "text_color" contains both labels; "text" is checked first.
        let scores = parse_ref_based("text_color: 55.5\nother line\n", p()).unwrap();
        assert_eq!(scores.text, 55.5);
        assert_eq!(scores.color, 0.0);

        // A line mentioning "match" is always a match line.
        let scores = parse_ref_based("position match: 12\n", p()).unwrap();
        assert_eq!(scores.match_score, 12.0);
        assert_eq!(scores.position, 0.0);
    }

    #[test]
    fn test_ref_based_value_is_second_segment() {
        let scores = parse_ref_based("match: 40: ignored\n", p()).unwrap();
        assert_eq!(scores.match_score, 40.0);
    }

    #[test]
    fn test_ref_based_rejects_malformed_values() {
        let err = parse_ref_based("match 90\n", p()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidValue { .. }));

        let err = parse_ref_based("color: high\n", p()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidValue { ref label, .. } if label == "color"));

        let err = parse_ref_based("position: 140\n", p()).unwrap_err();
        assert!(matches!(err, ReportError::OutOfRange { .. }));

        let err = parse_ref_based("text: NaN\n", p()).unwrap_err();
        assert!(matches!(err, ReportError::OutOfRange { .. }));
    }

    #[test]
    fn test_parse_ref_free_scales_by_twenty() {
        let scores = parse_ref_free(REF_FREE, p()).unwrap();
        assert_eq!(scores.text, 80.0);
        assert_eq!(scores.image, 70.0);
        assert_eq!(scores.layout, 100.0);
        assert_eq!(scores.color, 40.0);
    }

    #[test]
    fn test_ref_free_rejects_missing_key_and_range() {
        let missing = r#"{"text": {"score": 1}, "image": {"score": 1}, "layout": {"score": 1}}"#;
        assert!(matches!(parse_ref_free(missing, p()), Err(ReportError::Json(_))));

        let high = r#"{"text": {"score": 6}, "image": {"score": 1}, "layout": {"score": 1}, "color": {"score": 1}}"#;
        assert!(matches!(parse_ref_free(high, p()), Err(ReportError::OutOfRange { .. })));
    }

    #[test]
    fn test_composite_is_mean_of_eight() {
        let report = RoundReport {
            ref_based: parse_ref_based(REF_BASED, p()).unwrap(),
            ref_free: parse_ref_free(REF_FREE, p()).unwrap(),
        };
        let metrics = report.metrics();
        let mean = metrics.iter().sum::<f64>() / 8.0;

        assert!((report.composite() - mean).abs() < 1e-12);
        assert!((report.composite() - 73.75).abs() < 1e-12);
        assert!(report.composite() >= 0.0 && report.composite() <= MAX_METRIC);
    }

    #[test]
    fn test_load_round_requires_both_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(REF_BASED_REPORT), REF_BASED).unwrap();

        let err = load_round(dir.path()).unwrap_err();
        assert!(err.is_missing());

        fs::write(dir.path().join(REF_FREE_REPORT), REF_FREE).unwrap();
        let report = load_round(dir.path()).unwrap();
        assert_eq!(report.ref_based.match_score, 90.0);
        assert_eq!(report.ref_free.layout, 100.0);
    }

    #[test]
    fn test_scores_accumulate_and_average() {
        let mut sum = RefBasedScores::default();
        sum += RefBasedScores {
            match_score: 10.0,
            text: 20.0,
            color: 30.0,
            position: 40.0,
        };
        sum += RefBasedScores {
            match_score: 30.0,
            text: 20.0,
            color: 10.0,
            position: 0.0,
        };
        let avg = sum.averaged(2.0);
        assert_eq!(avg.match_score, 20.0);
        assert_eq!(avg.position, 20.0);
    }
}
