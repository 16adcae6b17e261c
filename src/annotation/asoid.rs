use super::{AnnotationAdapter, LabelInterval, ParsedAnnotation};
use crate::normalize::{
    self, check_frame, csv_error, parse_f64, seconds_to_frame, NormalizeError, Result, STREAM,
};
use std::io::Read;

/// A-SOiD one-hot export: an optional `time` column in seconds followed by one 0/1
/// column per behavior.
pub struct AsoidAdapter;

/// One row reduced to its starting frame and active behavior column.
struct Row {
    line: u64,
    frame: usize,
    behavior: Option<usize>,
}

impl AnnotationAdapter for AsoidAdapter {
    fn parse(&self, reader: &mut dyn Read, fps: u32) -> Result<ParsedAnnotation> {
        let mut rdr = normalize::csv_reader(reader, true);
        let headers = rdr.headers().map_err(csv_error)?.clone();

        let has_time = headers.get(0).is_some_and(|h| h.eq_ignore_ascii_case("time"));
        let first_behavior = usize::from(has_time);
        let behaviors: Vec<String> = headers.iter().skip(first_behavior).map(str::to_string).collect();
        if behaviors.is_empty() {
            return Err(NormalizeError::malformed(STREAM, "no behavior columns"));
        }
        if let Some(blank) = behaviors.iter().position(String::is_empty) {
            return Err(NormalizeError::malformed(
                STREAM,
                format!("behavior column {} has no name", blank + first_behavior + 1),
            ));
        }

        let mut rows: Vec<Row> = Vec::new();
        for (index, record) in rdr.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != headers.len() {
                return Err(NormalizeError::malformed(
                    STREAM,
                    format!("line {line}: expected {} columns, found {}", headers.len(), record.len()),
                ));
            }

            let frame = if has_time {
                let t = parse_f64(record.get(0).unwrap_or_default(), line, "time")?;
                if !t.is_finite() || t < 0.0 {
                    return Err(NormalizeError::malformed(STREAM, format!("line {line}: invalid time")));
                }
                seconds_to_frame(t, fps, line, "time")?
            } else {
                check_frame(index, line, "row")?
            };
            if rows.last().is_some_and(|prev| frame < prev.frame) {
                return Err(NormalizeError::malformed(
                    STREAM,
                    format!("line {line}: time goes backwards"),
                ));
            }

            // Right-most active column wins when a row marks several behaviors.
            let mut behavior = None;
            for (i, name) in behaviors.iter().enumerate() {
                let cell = record.get(i + first_behavior).unwrap_or_default();
                if is_active(cell, line, name)? {
                    behavior = Some(i);
                }
            }

            rows.push(Row { line, frame, behavior });
        }

        let last_end = match rows.last() {
            Some(last) => check_frame(last.frame + last_row_step(&rows), last.line, "time")?,
            None => 0,
        };

        let mut intervals = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let end = rows.get(i + 1).map_or(last_end, |next| next.frame);
            if let Some(b) = row.behavior {
                if end > row.frame {
                    intervals.push(LabelInterval {
                        label: behaviors[b].clone(),
                        start: row.frame,
                        end,
                    });
                }
            }
        }

        Ok(ParsedAnnotation { intervals, frame_count: last_end })
    }
}

/// Frames covered by the final row: the spacing of the previous pair, at least one.
fn last_row_step(rows: &[Row]) -> usize {
    match rows {
        [.., a, b] => (b.frame - a.frame).max(1),
        _ => 1,
    }
}

fn is_active(cell: &str, line: u64, column: &str) -> Result<bool> {
    if cell.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Ok(false);
    }
    let v = parse_f64(cell, line, column)?;
    Ok(v > 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{normalize_reader, AnnotationOrigin};

    #[test]
    fn test_rows_without_time_are_frames() {
        let input = "\
attack,investigation,other
0,1,0
0,1,0
1,0,0
0,0,1
";
        let mut reader = input.as_bytes();
        let ann = normalize_reader(&mut reader, AnnotationOrigin::Asoid, 30, "none").unwrap();
        assert_eq!(
            ann.sequence.labels(),
            ["investigation", "investigation", "attack", "other"]
        );
    }

    #[test]
    fn test_time_column_expands_bins() {
        // 10 Hz bins at 30 fps: every row covers 3 frames
        let input = "\
time,attack,investigation
0.0,0,1
0.1,0,1
0.2,1,0
0.3,0,0
";
        let mut reader = input.as_bytes();
        let ann = normalize_reader(&mut reader, AnnotationOrigin::Asoid, 30, "none").unwrap();
        assert_eq!(ann.sequence.len(), 12);
        let counts = ann.sequence.counts();
        assert_eq!(counts.get("investigation"), Some(&6));
        assert_eq!(counts.get("attack"), Some(&3));
        assert_eq!(counts.get("none"), Some(&3));
    }

    #[test]
    fn test_multiple_active_takes_rightmost() {
        let parsed = AsoidAdapter.parse(&mut "a,b\n1,1\n".as_bytes(), 30).unwrap();
        assert_eq!(parsed.intervals[0].label, "b");
    }

    #[test]
    fn test_boolean_cells() {
        let parsed = AsoidAdapter.parse(&mut "a,b\nTrue,False\n".as_bytes(), 30).unwrap();
        assert_eq!(parsed.intervals[0].label, "a");
        assert_eq!(parsed.frame_count, 1);
    }

    #[test]
    fn test_time_backwards_rejected() {
        let err = AsoidAdapter
            .parse(&mut "time,a\n1.0,1\n0.5,1\n".as_bytes(), 30)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = AsoidAdapter.parse(&mut "a,b\n1\n".as_bytes(), 30).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }

    #[test]
    fn test_huge_time_rejected() {
        let err = AsoidAdapter
            .parse(&mut "time,a\n0.0,1\n1e30,1\n".as_bytes(), 30)
            .unwrap_err();
        match err {
            NormalizeError::MalformedFile { message, .. } => {
                assert!(message.contains("frame limit"), "{message}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_last_row_step_past_limit_rejected() {
        // Second row lands exactly on the limit; its step would run past it
        let input = format!("time,a\n0.0,1\n{},1\n", crate::normalize::MAX_FRAMES as f64 / 30.0);
        let err = AsoidAdapter.parse(&mut input.as_bytes(), 30).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }

    #[test]
    fn test_time_only_header_rejected() {
        let err = AsoidAdapter.parse(&mut "time\n0.0\n".as_bytes(), 30).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }
}
