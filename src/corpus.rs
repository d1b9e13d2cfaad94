//! Extended-XYZ corpus store.
//!
//! A corpus file is a sequence of frames: an atom-count line, a comment line
//! of whitespace-separated metadata tokens, then one line per atom
//! (`species x y z [fx fy fz]`). Known comment keys are lifted into typed
//! [`Frame`] fields; everything else is preserved verbatim so that reading
//! and rewriting a corpus reproduces equivalent frames.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::constants::{corpus, layout};
use crate::errors::PipelineError;
use crate::frame::Frame;

/// Read every frame of a corpus file.
pub fn read_frames(path: impl AsRef<Path>) -> Result<Vec<Frame>, PipelineError> {
    let file = fs::File::open(path.as_ref())?;
    read_frames_from(BufReader::new(file))
}

/// Read every frame of a corpus file, or return an empty list when the file
/// does not exist. Used by merge inputs that are legitimately absent.
pub fn load_optional(path: impl AsRef<Path>) -> Result<Vec<Frame>, PipelineError> {
    if path.as_ref().exists() {
        read_frames(path)
    } else {
        Ok(Vec::new())
    }
}

/// Read frames from any buffered reader.
pub fn read_frames_from<R: BufRead>(reader: R) -> Result<Vec<Frame>, PipelineError> {
    let mut frames = Vec::new();
    let mut lines = reader.lines().enumerate();

    while let Some((idx, line)) = lines.next() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            // Tolerate blank separators between frames and at EOF.
            continue;
        }
        let line_no = idx + 1;
        let n_atoms: usize = trimmed
            .parse()
            .map_err(|_| PipelineError::corpus(line_no, format!("invalid atom count '{trimmed}'")))?;

        let (comment_no, comment) = match lines.next() {
            Some((idx, line)) => (idx + 1, line?),
            None => return Err(PipelineError::corpus(line_no, "frame truncated before comment line")),
        };
        let mut frame = Frame::new();
        parse_comment(&comment, &mut frame, comment_no)?;

        let mut forces = Vec::new();
        for _ in 0..n_atoms {
            let (idx, line) = lines.next().ok_or_else(|| {
                PipelineError::corpus(comment_no, format!("frame truncated: expected {n_atoms} atom lines"))
            })?;
            let line = line?;
            parse_atom_line(&line, idx + 1, &mut frame, &mut forces)?;
        }
        if !forces.is_empty() {
            if forces.len() != n_atoms {
                return Err(PipelineError::corpus(
                    comment_no,
                    "forces present on some atom lines but not all",
                ));
            }
            frame.forces = Some(forces);
        }
        frames.push(frame);
    }

    Ok(frames)
}

/// Write frames to `path`, replacing any existing file atomically
/// (temporary file plus rename). Parent directories are created.
pub fn write_frames(path: impl AsRef<Path>, frames: &[Frame]) -> Result<(), PipelineError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}{}", layout::TMP_SUFFIX),
        None => layout::TMP_SUFFIX.trim_start_matches('.').to_string(),
    });
    {
        let mut writer = BufWriter::new(fs::File::create(&tmp)?);
        for frame in frames {
            write_frame(&mut writer, frame)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), PipelineError> {
    writeln!(writer, "{}", frame.atom_count())?;
    writeln!(writer, "{}", format_comment(frame))?;
    for (i, species) in frame.species.iter().enumerate() {
        let [x, y, z] = frame.positions[i];
        match frame.forces.as_ref().map(|f| f[i]) {
            Some([fx, fy, fz]) => writeln!(
                writer,
                "{species} {x:.8} {y:.8} {z:.8} {fx:.8} {fy:.8} {fz:.8}"
            )?,
            None => writeln!(writer, "{species} {x:.8} {y:.8} {z:.8}")?,
        }
    }
    Ok(())
}

fn format_comment(frame: &Frame) -> String {
    let mut tokens = Vec::new();
    if let Some(charge) = frame.charge {
        tokens.push(format!("{}={charge}", corpus::KEY_CHARGE));
    }
    if let Some(energy) = frame.energy {
        tokens.push(format!("{}={energy}", corpus::KEY_ENERGY));
    }
    if let Some(id) = &frame.conf_id {
        tokens.push(format!("{}={id}", corpus::KEY_CONF_ID));
    }
    if let Some(sigma) = frame.energy_uncertainty {
        tokens.push(format!("{}={sigma}", corpus::KEY_SIGMA_E));
    }
    if let Some(sigma) = frame.force_uncertainty {
        tokens.push(format!("{}={sigma}", corpus::KEY_SIGMA_F));
    }
    for (key, value) in &frame.extra {
        if value.is_empty() {
            tokens.push(key.clone());
        } else {
            tokens.push(format!("{key}={value}"));
        }
    }
    tokens.join(" ")
}

fn parse_comment(comment: &str, frame: &mut Frame, line_no: usize) -> Result<(), PipelineError> {
    for token in comment.split_whitespace() {
        let pair = token.split_once('=').or_else(|| token.split_once(':'));
        match pair {
            Some((key, value)) => match key.to_ascii_lowercase().as_str() {
                "charge" | "q" => frame.charge = Some(parse_charge(value, line_no)?),
                "energy" => frame.energy = Some(parse_float("energy", value, line_no)?),
                "confid" => frame.conf_id = Some(value.to_string()),
                "sigma_e_pa" => {
                    frame.energy_uncertainty = Some(parse_float("sigma_e_pa", value, line_no)?)
                }
                "sigma_f_mean" => {
                    frame.force_uncertainty = Some(parse_float("sigma_f_mean", value, line_no)?)
                }
                _ => {
                    frame.extra.insert(key.to_string(), value.to_string());
                }
            },
            None => {
                if let Some(charge) = bare_charge_token(token) {
                    frame.charge = Some(charge);
                } else {
                    frame.extra.insert(token.to_string(), String::new());
                }
            }
        }
    }
    Ok(())
}

/// Matches the shorthand charge tag `q<±int>` (e.g. `q-2`, `q+1`).
fn bare_charge_token(token: &str) -> Option<i32> {
    let rest = token.strip_prefix('q').or_else(|| token.strip_prefix('Q'))?;
    if rest.is_empty() {
        return None;
    }
    rest.parse().ok()
}

fn parse_charge(value: &str, line_no: usize) -> Result<i32, PipelineError> {
    value.parse().map_err(|_| {
        PipelineError::corpus(line_no, format!("invalid net charge '{value}'"))
    })
}

fn parse_float(key: &str, value: &str, line_no: usize) -> Result<f64, PipelineError> {
    value.parse().map_err(|_| {
        PipelineError::corpus(line_no, format!("invalid {key} value '{value}'"))
    })
}

fn parse_atom_line(
    line: &str,
    line_no: usize,
    frame: &mut Frame,
    forces: &mut Vec<[f64; 3]>,
) -> Result<(), PipelineError> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() != 4 && cols.len() != 7 {
        return Err(PipelineError::corpus(
            line_no,
            format!("expected 4 or 7 atom columns, found {}", cols.len()),
        ));
    }
    let mut values = [0.0f64; 6];
    for (slot, col) in values.iter_mut().zip(&cols[1..]) {
        *slot = col.parse().map_err(|_| {
            PipelineError::corpus(line_no, format!("invalid coordinate '{col}'"))
        })?;
    }
    frame.push_atom(cols[0], [values[0], values[1], values[2]]);
    if cols.len() == 7 {
        forces.push([values[3], values[4], values[5]]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn parse(text: &str) -> Vec<Frame> {
        read_frames_from(Cursor::new(text.to_string())).unwrap()
    }

    #[test]
    fn reads_comment_metadata_into_typed_fields() {
        let frames = parse(
            "2\ncharge=-1 energy=-3.5 confid=c12 sigma_e_pa=0.02 origin=pairing\nCu 0.0 0.0 0.0\nCu 1.0 0.0 0.0\n",
        );
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.charge, Some(-1));
        assert_eq!(frame.energy, Some(-3.5));
        assert_eq!(frame.conf_id.as_deref(), Some("c12"));
        assert_eq!(frame.energy_uncertainty, Some(0.02));
        assert_eq!(frame.extra.get("origin").map(String::as_str), Some("pairing"));
    }

    #[test]
    fn accepts_shorthand_charge_tags() {
        let frames = parse("1\nq-2\nAg 0.0 0.0 0.0\n1\nq:+1\nAg 0.0 0.0 0.0\n");
        assert_eq!(frames[0].charge, Some(-2));
        assert_eq!(frames[1].charge, Some(1));
    }

    #[test]
    fn malformed_charge_is_a_parse_error() {
        let err = read_frames_from(Cursor::new("1\ncharge=abc\nCu 0.0 0.0 0.0\n")).unwrap_err();
        assert!(matches!(err, PipelineError::Corpus { line: 2, .. }));
    }

    #[test]
    fn truncated_frame_is_a_parse_error() {
        let err = read_frames_from(Cursor::new("3\ncharge=0\nCu 0.0 0.0 0.0\n")).unwrap_err();
        assert!(matches!(err, PipelineError::Corpus { .. }));
    }

    #[test]
    fn reads_forces_when_all_atom_lines_carry_them() {
        let frames = parse(
            "2\ncharge=0\nCu 0.0 0.0 0.0 0.1 0.2 0.3\nCu 1.0 0.0 0.0 -0.1 -0.2 -0.3\n",
        );
        let forces = frames[0].forces.as_ref().unwrap();
        assert_eq!(forces.len(), 2);
        assert_eq!(forces[1], [-0.1, -0.2, -0.3]);
    }

    #[test]
    fn round_trips_an_unmodified_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corpus.xyz");
        let original = parse(
            "2\ncharge=-1 energy=-7.25 confid=a1 seed_tag run=first\nCu 0.12345678 -1.5 2.0\nAg 0.0 0.5 -0.25\n",
        );
        write_frames(&path, &original).unwrap();
        let reread = read_frames(&path).unwrap();
        assert_eq!(original, reread);

        // A second write/read cycle must be a fixed point.
        write_frames(&path, &reread).unwrap();
        assert_eq!(read_frames(&path).unwrap(), reread);
    }

    #[test]
    fn load_optional_returns_empty_for_missing_files() {
        let dir = tempdir().unwrap();
        let frames = load_optional(dir.path().join("absent.xyz")).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iter003").join("corpus.xyz");
        let mut frame = Frame::new();
        frame.charge = Some(0);
        frame.push_atom("Cu", [0.0, 0.0, 0.0]);
        write_frames(&path, &[frame]).unwrap();
        assert!(path.is_file());
        assert!(!path.with_extension("xyz.tmp").exists());
    }
}
