use super::{find_column, AnnotationAdapter, LabelInterval, ParsedAnnotation};
use crate::normalize::{
    self, check_frame, csv_error, duration_to_frames, parse_f64, seconds_to_frame, NormalizeError,
    Result, STREAM,
};
use std::io::Read;

const BEHAVIOR: &[&str] = &["Behavior"];
const START: &[&str] = &["Start (s)", "Start"];
const STOP: &[&str] = &["Stop (s)", "Stop"];
const BEHAVIOR_TYPE: &[&str] = &["Behavior type"];
const LENGTH: &[&str] = &["Total length", "Media duration (s)", "Media duration"];

/// BORIS aggregated-events export: one row per state or point event with start and stop
/// times in seconds.
pub struct BorisAdapter;

impl AnnotationAdapter for BorisAdapter {
    fn parse(&self, reader: &mut dyn Read, fps: u32) -> Result<ParsedAnnotation> {
        let mut rdr = normalize::csv_reader(reader, true);
        let headers = rdr.headers().map_err(csv_error)?.clone();

        let require = |names: &[&str]| {
            find_column(&headers, names).ok_or_else(|| {
                NormalizeError::malformed(STREAM, format!("missing column {:?}", names[0]))
            })
        };
        let behavior_col = require(BEHAVIOR)?;
        let start_col = require(START)?;
        let stop_col = require(STOP)?;
        let type_col = find_column(&headers, BEHAVIOR_TYPE);
        let length_col = find_column(&headers, LENGTH);

        let mut intervals = Vec::new();
        let mut total_frames: Option<usize> = None;

        for record in rdr.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.iter().all(str::is_empty) {
                continue;
            }

            let label = record.get(behavior_col).unwrap_or_default();
            if label.is_empty() {
                return Err(NormalizeError::malformed(STREAM, format!("line {line}: empty behavior")));
            }

            let start = parse_f64(record.get(start_col).unwrap_or_default(), line, START[0])?;
            if !start.is_finite() || start < 0.0 {
                return Err(NormalizeError::malformed(
                    STREAM,
                    format!("line {line}: invalid start time"),
                ));
            }
            let start_frame = seconds_to_frame(start, fps, line, START[0])?;
            let min_end = check_frame(start_frame + 1, line, START[0])?;

            let is_point = type_col
                .and_then(|c| record.get(c))
                .is_some_and(|t| t.eq_ignore_ascii_case("POINT"));

            let end_frame = if is_point {
                min_end
            } else {
                let stop = parse_f64(record.get(stop_col).unwrap_or_default(), line, STOP[0])?;
                if !stop.is_finite() || stop < start {
                    return Err(NormalizeError::malformed(
                        STREAM,
                        format!("line {line}: stop time before start time"),
                    ));
                }
                seconds_to_frame(stop, fps, line, STOP[0])?.max(min_end)
            };

            if total_frames.is_none() {
                if let Some(len) = length_col.and_then(|c| record.get(c)) {
                    let len = parse_f64(len, line, LENGTH[0])?;
                    if len > 0.0 {
                        total_frames = Some(duration_to_frames(len, fps, line, LENGTH[0])?);
                    }
                }
            }

            intervals.push(LabelInterval {
                label: label.to_string(),
                start: start_frame,
                end: end_frame,
            });
        }

        let frame_count = match total_frames {
            Some(frames) => frames,
            None => intervals.iter().map(|iv| iv.end).max().unwrap_or(0),
        };

        Ok(ParsedAnnotation { intervals, frame_count })
    }
}
