use super::{Coord, PartColumns, PoseAdapter, PoseFrame, PoseSequence};
use crate::normalize::{self, check_frame, csv_error, parse_f64, NormalizeError, Result, STREAM};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

/// SLEAP analysis export, either the HDF5 file (`tracks`, `point_scores`, `node_names`)
/// or the CSV flavour (`track, frame_idx, instance.score, <part>.x, <part>.y, <part>.score`).
pub struct SleapAdapter;

impl PoseAdapter for SleapAdapter {
    fn load(&self, path: &Path) -> Result<PoseSequence> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "h5" | "hdf5" => load_h5(path),
            _ => {
                let mut file = normalize::open(path)?;
                self.parse_csv(&mut file)
            }
        }
    }
}

impl SleapAdapter {
    pub fn parse_csv(&self, reader: &mut dyn Read) -> Result<PoseSequence> {
        let mut rdr = normalize::csv_reader(reader, true);
        let headers = rdr.headers().map_err(csv_error)?.clone();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let track_col = column("track");
        let frame_col = column("frame_idx")
            .ok_or_else(|| NormalizeError::malformed(STREAM, "missing column \"frame_idx\""))?;

        let mut names: Vec<String> = Vec::new();
        let mut columns: Vec<PartColumns> = Vec::new();
        for (col, header) in headers.iter().enumerate() {
            if header == "instance.score" {
                continue;
            }
            let Some((part, suffix)) = header.rsplit_once('.') else {
                continue;
            };
            let coord = match suffix {
                "x" => Coord::X,
                "y" => Coord::Y,
                "score" => Coord::Confidence,
                _ => continue,
            };
            let idx = match names.iter().position(|n| n == part) {
                Some(i) => i,
                None => {
                    names.push(part.to_string());
                    columns.push(PartColumns::default());
                    names.len() - 1
                }
            };
            columns[idx].set(coord, col, part)?;
        }
        if names.is_empty() {
            return Err(NormalizeError::malformed(STREAM, "no body-part columns in header"));
        }
        let layout = names
            .iter()
            .zip(&columns)
            .map(|(name, c)| c.complete(name))
            .collect::<Result<Vec<_>>>()?;

        let mut tracks: BTreeSet<String> = BTreeSet::new();
        let mut by_frame: BTreeMap<usize, Vec<Vec<PoseFrame>>> = BTreeMap::new();

        for record in rdr.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != headers.len() {
                return Err(NormalizeError::malformed(
                    STREAM,
                    format!("line {line}: expected {} columns, found {}", headers.len(), record.len()),
                ));
            }
            if let Some(track) = track_col.map(|c| &record[c]).filter(|t| !t.is_empty()) {
                tracks.insert(track.to_string());
            }
            let frame: usize = record[frame_col].parse().map_err(|_| {
                NormalizeError::malformed(
                    STREAM,
                    format!("line {line}: invalid frame_idx {:?}", &record[frame_col]),
                )
            })?;
            // The frame count is one past the largest index
            check_frame(frame.saturating_add(1), line, "frame_idx")?;
            let points = layout
                .iter()
                .zip(&names)
                .map(|(&(x, y, c), name)| {
                    Ok(PoseFrame::new(
                        parse_f64(&record[x], line, &format!("{name}.x"))?,
                        parse_f64(&record[y], line, &format!("{name}.y"))?,
                        parse_f64(&record[c], line, &format!("{name}.score"))?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            by_frame.entry(frame).or_default().push(points);
        }

        let per_frame_max = by_frame.values().map(Vec::len).max().unwrap_or(0);
        let instances = tracks.len().max(per_frame_max);
        if instances > 1 {
            return Err(NormalizeError::MultiInstanceUnsupported {
                path: STREAM.to_string(),
                instances,
            });
        }

        let frame_count = by_frame.keys().next_back().map(|f| f + 1).unwrap_or(0);
        let mut frames = vec![vec![PoseFrame::MISSING; names.len()]; frame_count];
        for (frame, mut rows) in by_frame {
            if let Some(points) = rows.pop() {
                frames[frame] = points;
            }
        }

        PoseSequence::from_frames(names, &frames)
    }
}

#[cfg(feature = "hdf5")]
fn load_h5(path: &Path) -> Result<PoseSequence> {
    use hdf5::types::{FixedAscii, VarLenUnicode};

    let display = path.display().to_string();
    let h5 = |e: hdf5::Error| NormalizeError::malformed(&display, e.to_string());

    let file = hdf5::File::open(path).map_err(h5)?;

    let tracks_ds = file.dataset("tracks").map_err(h5)?;
    let shape = tracks_ds.shape();
    let [n_tracks, n_coords, n_nodes, n_frames] = shape[..] else {
        return Err(NormalizeError::malformed(
            &display,
            format!("tracks dataset has shape {shape:?}, expected 4 dimensions"),
        ));
    };
    if n_tracks == 0 || n_coords != 2 {
        return Err(NormalizeError::malformed(
            &display,
            format!("tracks dataset has shape {shape:?}"),
        ));
    }
    if n_tracks > 1 {
        return Err(NormalizeError::MultiInstanceUnsupported {
            path: display.clone(),
            instances: n_tracks,
        });
    }
    let coords: Vec<f64> = tracks_ds.read_raw::<f64>().map_err(h5)?;

    let scores_ds = file.dataset("point_scores").map_err(h5)?;
    if scores_ds.shape() != [n_tracks, n_nodes, n_frames] {
        return Err(NormalizeError::malformed(
            &display,
            format!("point_scores has shape {:?}", scores_ds.shape()),
        ));
    }
    let scores: Vec<f64> = scores_ds.read_raw::<f64>().map_err(h5)?;

    let names_ds = file.dataset("node_names").map_err(h5)?;
    let names: Vec<String> = match names_ds.read_raw::<FixedAscii<256>>() {
        Ok(raw) => raw.iter().map(|s| s.as_str().to_string()).collect(),
        Err(_) => names_ds
            .read_raw::<VarLenUnicode>()
            .map_err(h5)?
            .iter()
            .map(|s| s.as_str().to_string())
            .collect(),
    };
    if names.len() != n_nodes {
        return Err(NormalizeError::malformed(
            &display,
            format!("{} node names for {n_nodes} nodes", names.len()),
        ));
    }

    // tracks[0][c][n][f] and point_scores[0][n][f]
    let mut data = Vec::with_capacity(n_frames * n_nodes * super::VALUES_PER_POINT);
    for f in 0..n_frames {
        for n in 0..n_nodes {
            data.push(coords[n * n_frames + f]);
            data.push(coords[(n_nodes + n) * n_frames + f]);
            data.push(scores[n * n_frames + f]);
        }
    }
    PoseSequence::from_flat(names, n_frames, data)
}

#[cfg(not(feature = "hdf5"))]
fn load_h5(path: &Path) -> Result<PoseSequence> {
    Err(NormalizeError::malformed(
        &path.display().to_string(),
        "reading SLEAP .h5 files requires building with the `hdf5` feature; export the analysis as CSV instead",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "track,frame_idx,instance.score,nose.x,nose.y,nose.score,tail.x,tail.y,tail.score";

    #[test]
    fn test_csv_single_track() {
        let input = format!(
            "{HEADER}\n\
track_0,0,0.95,10.0,20.0,0.9,30.0,40.0,0.8\n\
track_0,1,0.95,11.0,21.0,0.9,31.0,41.0,0.8\n"
        );
        let pose = SleapAdapter.parse_csv(&mut input.as_bytes()).unwrap();
        assert_eq!(pose.shape(), (2, 2, 3));
        assert_eq!(pose.body_parts(), ["nose", "tail"]);
        assert_eq!(pose.get(1, 1), Some(PoseFrame::new(31.0, 41.0, 0.8)));
    }

    #[test]
    fn test_csv_missing_frames_are_nan() {
        let input = format!(
            "{HEADER}\n\
,0,0.9,1,2,0.5,3,4,0.5\n\
,3,0.9,1,2,0.5,3,4,0.5\n"
        );
        let pose = SleapAdapter.parse_csv(&mut input.as_bytes()).unwrap();
        assert_eq!(pose.frame_count(), 4);
        assert!(pose.get(1, 0).unwrap().x.is_nan());
        assert!(pose.get(2, 1).unwrap().confidence.is_nan());
        assert_eq!(pose.get(3, 0).unwrap().x, 1.0);
    }

    #[test]
    fn test_csv_two_tracks_rejected() {
        let input = format!(
            "{HEADER}\n\
track_0,0,0.9,1,2,0.5,3,4,0.5\n\
track_1,0,0.9,1,2,0.5,3,4,0.5\n"
        );
        let err = SleapAdapter.parse_csv(&mut input.as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MultiInstanceUnsupported { instances: 2, .. }));
    }

    #[test]
    fn test_csv_untracked_duplicates_rejected() {
        let input = format!(
            "{HEADER}\n\
,0,0.9,1,2,0.5,3,4,0.5\n\
,0,0.7,5,6,0.5,7,8,0.5\n"
        );
        let err = SleapAdapter.parse_csv(&mut input.as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MultiInstanceUnsupported { .. }));
    }

    #[test]
    fn test_csv_bad_frame_index() {
        let input = format!("{HEADER}\ntrack_0,x,0.9,1,2,0.5,3,4,0.5\n");
        let err = SleapAdapter.parse_csv(&mut input.as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }

    #[test]
    fn test_csv_frame_index_past_limit() {
        let input = format!("{HEADER}\ntrack_0,18446744073709551615,0.9,1,2,0.5,3,4,0.5\n");
        let err = SleapAdapter.parse_csv(&mut input.as_bytes()).unwrap_err();
        match err {
            NormalizeError::MalformedFile { message, .. } => {
                assert!(message.contains("frame limit"), "{message}")
            }
            other => panic!("unexpected error: {other}"),
        }

        let input = format!("{HEADER}\ntrack_0,{},0.9,1,2,0.5,3,4,0.5\n", normalize::MAX_FRAMES);
        assert!(SleapAdapter.parse_csv(&mut input.as_bytes()).is_err());
    }

    #[test]
    fn test_csv_missing_frame_idx_column() {
        let err = SleapAdapter
            .parse_csv(&mut "track,nose.x,nose.y,nose.score\n".as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("frame_idx"));
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_h5_without_feature_is_malformed() {
        let err = SleapAdapter.load(Path::new("/data/T1-01012023-120000_pose.h5")).unwrap_err();
        match err {
            NormalizeError::MalformedFile { path, message } => {
                assert!(path.ends_with(".h5"));
                assert!(message.contains("hdf5"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
