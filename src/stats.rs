use crate::annotation::LabelSequence;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Cannot compute percentages over an empty label sequence")]
    DivisionGuard,
}

/// Frame count, fraction of the session and duration of one behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorStat {
    pub behavior_id: String,
    pub total_frames: u64,
    /// Fraction of all frames, in [0, 1].
    pub total_perc: f64,
    /// Seconds.
    pub total_time: f64,
}

/// One row per distinct label, sorted by label.
pub fn compute_stats(sequence: &LabelSequence, fps: u32) -> Result<Vec<BehaviorStat>, StatsError> {
    if fps == 0 {
        return Err(StatsError::MissingParameter("fps"));
    }
    if sequence.is_empty() {
        return Err(StatsError::DivisionGuard);
    }

    let total = sequence.len() as f64;
    let fps = fps as f64;
    Ok(sequence
        .counts()
        .into_iter()
        .map(|(label, frames)| BehaviorStat {
            behavior_id: label.to_string(),
            total_frames: frames,
            total_perc: frames as f64 / total,
            total_time: frames as f64 / fps,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::LabelInterval;

    fn sequence(rows: &[(&str, usize, usize)], frames: usize) -> LabelSequence {
        let intervals: Vec<LabelInterval> = rows
            .iter()
            .map(|&(label, start, end)| LabelInterval {
                label: label.to_string(),
                start,
                end,
            })
            .collect();
        LabelSequence::from_intervals(&intervals, frames, "none")
    }

    #[test]
    fn test_overlap_scenario() {
        let seq = sequence(&[("rest", 0, 100), ("walk", 100, 150), ("rest", 120, 200)], 200);
        let stats = compute_stats(&seq, 30).unwrap();
        assert_eq!(stats.len(), 2);

        assert_eq!(stats[0].behavior_id, "rest");
        assert_eq!(stats[0].total_frames, 180);
        assert_eq!(stats[0].total_perc, 0.9);
        assert_eq!(stats[0].total_time, 6.0);

        assert_eq!(stats[1].behavior_id, "walk");
        assert_eq!(stats[1].total_frames, 20);
        assert_eq!(stats[1].total_perc, 0.1);
        assert_eq!(stats[1].total_time, 20.0 / 30.0);
    }

    #[test]
    fn test_totals_cover_sequence() {
        let seq = sequence(&[("a", 0, 7), ("b", 7, 20), ("c", 30, 33)], 41);
        let stats = compute_stats(&seq, 25).unwrap();
        let frames: u64 = stats.iter().map(|s| s.total_frames).sum();
        let perc: f64 = stats.iter().map(|s| s.total_perc).sum();
        assert_eq!(frames, seq.len() as u64);
        assert!((perc - 1.0).abs() < 1e-9, "{perc}");
        for s in &stats {
            assert_eq!(s.total_time, s.total_frames as f64 / 25.0);
        }
    }

    #[test]
    fn test_sorted_by_label() {
        let seq = sequence(&[("zeta", 0, 1), ("alpha", 1, 2), ("mid", 2, 3)], 3);
        let ids: Vec<_> = compute_stats(&seq, 30)
            .unwrap()
            .into_iter()
            .map(|s| s.behavior_id)
            .collect();
        assert_eq!(ids, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_zero_fps_checked_first() {
        let empty = LabelSequence::new(Vec::new());
        assert_eq!(compute_stats(&empty, 0), Err(StatsError::MissingParameter("fps")));
        let seq = sequence(&[("a", 0, 5)], 5);
        assert_eq!(compute_stats(&seq, 0), Err(StatsError::MissingParameter("fps")));
    }

    #[test]
    fn test_empty_sequence_guarded() {
        let empty = LabelSequence::new(Vec::new());
        assert_eq!(compute_stats(&empty, 30), Err(StatsError::DivisionGuard));
    }
}
