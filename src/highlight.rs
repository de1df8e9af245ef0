use crate::scorer::FrameScore;

/// A scored frame together with a label identifying where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredFrame {
    pub label: String,
    pub result: FrameScore,
}

/// Keeps frames scoring at least `min_score`, best first. Ties keep input order.
pub fn select_highlights(frames: Vec<ScoredFrame>, min_score: i64) -> Vec<ScoredFrame> {
    let mut kept: Vec<ScoredFrame> = frames
        .into_iter()
        .filter(|frame| frame.result.score >= min_score)
        .collect();
    kept.sort_by(|a, b| b.result.score.cmp(&a.result.score));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(label: &str, score: i64) -> ScoredFrame {
        ScoredFrame {
            label: label.to_owned(),
            result: FrameScore {
                score,
                description: String::new(),
                raw: String::new(),
            },
        }
    }

    fn labels(frames: &[ScoredFrame]) -> Vec<&str> {
        frames.iter().map(|f| f.label.as_str()).collect()
    }

    #[test]
    fn filters_and_sorts_descending() {
        let frames = vec![frame("a", 6), frame("b", 9), frame("c", 7), frame("d", 8)];
        let ranked = select_highlights(frames, 7);
        assert_eq!(labels(&ranked), vec!["b", "d", "c"]);
    }

    #[test]
    fn ties_keep_original_order() {
        let frames = vec![frame("first", 8), frame("second", 8), frame("third", 10)];
        let ranked = select_highlights(frames, 0);
        assert_eq!(labels(&ranked), vec!["third", "first", "second"]);
    }

    #[test]
    fn empty_when_nothing_qualifies() {
        assert!(select_highlights(vec![frame("a", 2)], 7).is_empty());
    }
}
