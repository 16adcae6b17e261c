use super::{Coord, PartColumns, PoseAdapter, PoseFrame, PoseSequence};
use crate::normalize::{self, csv_error, parse_f64, NormalizeError, Result, STREAM};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

/// DeepLabCut CSV export: stacked header rows (`scorer`, optional `individuals`,
/// `bodyparts`, `coords`) then one row per frame led by the frame index.
pub struct DlcAdapter;

impl PoseAdapter for DlcAdapter {
    fn load(&self, path: &Path) -> Result<PoseSequence> {
        let mut file = normalize::open(path)?;
        self.parse(&mut file)
    }
}

impl DlcAdapter {
    pub fn parse(&self, reader: &mut dyn Read) -> Result<PoseSequence> {
        let mut rdr = normalize::csv_reader(reader, false);
        let mut records = rdr.records();

        let mut individuals: Option<csv::StringRecord> = None;
        let mut bodyparts: Option<csv::StringRecord> = None;
        let coords = loop {
            let record = match records.next() {
                Some(r) => r.map_err(csv_error)?,
                None => return Err(NormalizeError::malformed(STREAM, "missing coords header row")),
            };
            match record.get(0).map(str::to_lowercase).as_deref() {
                Some("scorer") => {}
                Some("individuals") => individuals = Some(record),
                Some("bodyparts") => bodyparts = Some(record),
                Some("coords") => break record,
                _ => {
                    return Err(NormalizeError::malformed(
                        STREAM,
                        "data row found before the coords header row",
                    ))
                }
            }
        };
        let bodyparts =
            bodyparts.ok_or_else(|| NormalizeError::malformed(STREAM, "missing bodyparts header row"))?;
        let width = coords.len();
        if bodyparts.len() != width {
            return Err(NormalizeError::malformed(STREAM, "header rows have different widths"));
        }

        if let Some(ind) = &individuals {
            let distinct: BTreeSet<&str> = ind.iter().skip(1).filter(|s| !s.is_empty()).collect();
            if distinct.len() > 1 {
                return Err(NormalizeError::MultiInstanceUnsupported {
                    path: STREAM.to_string(),
                    instances: distinct.len(),
                });
            }
        }

        let mut names: Vec<String> = Vec::new();
        let mut columns: Vec<PartColumns> = Vec::new();
        for col in 1..width {
            let part = bodyparts.get(col).unwrap_or_default();
            if part.is_empty() {
                return Err(NormalizeError::malformed(STREAM, format!("column {} has no body part", col + 1)));
            }
            let coord = match coords.get(col).unwrap_or_default().to_lowercase().as_str() {
                "x" => Coord::X,
                "y" => Coord::Y,
                "likelihood" => Coord::Confidence,
                other => {
                    return Err(NormalizeError::malformed(
                        STREAM,
                        format!("column {} has unknown coordinate {other:?}", col + 1),
                    ))
                }
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
            return Err(NormalizeError::malformed(STREAM, "no body parts in header"));
        }
        let layout = names
            .iter()
            .zip(&columns)
            .map(|(name, c)| c.complete(name))
            .collect::<Result<Vec<_>>>()?;

        let mut frames = Vec::new();
        for record in records {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            if record.len() != width {
                return Err(NormalizeError::malformed(
                    STREAM,
                    format!("line {line}: expected {width} columns, found {}", record.len()),
                ));
            }
            let frame = layout
                .iter()
                .zip(&names)
                .map(|(&(x, y, c), name)| {
                    Ok(PoseFrame::new(
                        parse_f64(&record[x], line, &format!("{name}.x"))?,
                        parse_f64(&record[y], line, &format!("{name}.y"))?,
                        parse_f64(&record[c], line, &format!("{name}.likelihood"))?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            frames.push(frame);
        }

        PoseSequence::from_frames(names, &frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dlc_csv(parts: &[&str], frames: usize) -> String {
        let mut out = String::from("scorer");
        for _ in parts {
            out.push_str(",DLC_resnet50,DLC_resnet50,DLC_resnet50");
        }
        out.push_str("\nbodyparts");
        for p in parts {
            out.push_str(&format!(",{p},{p},{p}"));
        }
        out.push_str("\ncoords");
        for _ in parts {
            out.push_str(",x,y,likelihood");
        }
        out.push('\n');
        for f in 0..frames {
            out.push_str(&f.to_string());
            for (i, _) in parts.iter().enumerate() {
                out.push_str(&format!(",{}.5,{}.25,0.9", f, i));
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn test_two_parts_fifty_frames() {
        let input = dlc_csv(&["part1", "part2"], 50);
        let pose = DlcAdapter.parse(&mut input.as_bytes()).unwrap();
        assert_eq!(pose.shape(), (50, 2, 3));
        assert_eq!(pose.body_parts(), ["part1", "part2"]);
        assert_eq!(pose.get(10, 1), Some(PoseFrame::new(10.5, 1.25, 0.9)));
    }

    #[test]
    fn test_single_individual_accepted() {
        let input = "\
scorer,s,s,s
individuals,mouse1,mouse1,mouse1
bodyparts,nose,nose,nose
coords,x,y,likelihood
0,1,2,0.5
";
        let pose = DlcAdapter.parse(&mut input.as_bytes()).unwrap();
        assert_eq!(pose.shape(), (1, 1, 3));
    }

    #[test]
    fn test_multi_animal_rejected() {
        let input = "\
scorer,s,s,s,s,s,s
individuals,mouse1,mouse1,mouse1,mouse2,mouse2,mouse2
bodyparts,nose,nose,nose,nose,nose,nose
coords,x,y,likelihood,x,y,likelihood
0,1,2,0.5,3,4,0.5
";
        let err = DlcAdapter.parse(&mut input.as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MultiInstanceUnsupported { instances: 2, .. }));
    }

    #[test]
    fn test_empty_cells_are_nan() {
        let input = "\
scorer,s,s,s
bodyparts,nose,nose,nose
coords,x,y,likelihood
0,,,0.0
";
        let pose = DlcAdapter.parse(&mut input.as_bytes()).unwrap();
        let p = pose.get(0, 0).unwrap();
        assert!(p.x.is_nan() && p.y.is_nan());
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_quoted_part_name_with_separator_rejected() {
        let input = "\
scorer,s,s,s
bodyparts,\"left, ear\",\"left, ear\",\"left, ear\"
coords,x,y,likelihood
0,1.0,2.0,0.9
";
        let err = DlcAdapter.parse(&mut input.as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }

    #[test]
    fn test_missing_likelihood_rejected() {
        let input = "\
scorer,s,s
bodyparts,nose,nose
coords,x,y
0,1,2
";
        let err = DlcAdapter.parse(&mut input.as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }

    #[test]
    fn test_short_row_rejected() {
        let mut input = dlc_csv(&["nose"], 1);
        input.push_str("1,2.0\n");
        let err = DlcAdapter.parse(&mut input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("expected 4 columns"), "{err}");
    }

    #[test]
    fn test_headerless_file_rejected() {
        let err = DlcAdapter.parse(&mut "0,1,2,3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedFile { .. }));
    }
}
