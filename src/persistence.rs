//! Persistence codec
//!
//! One line per view: `name cap_x cap_y cap_width cap_height view_x view_y`.
//! The name may contain internal whitespace, so parsing anchors on the six
//! trailing integers instead of the head of the line. Saves go through a
//! temp file plus rename, so a crash mid-write cannot corrupt the previous
//! snapshot.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::app::App;
use crate::constants::identity::PROGRAM_NAME;
use crate::model::CaptureRect;

const HEADER: &str = "# sniptotop state";

/// One persisted view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub cap: CaptureRect,
    pub pos: (i16, i16),
}

impl Record {
    pub fn format(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            self.name, self.cap.x, self.cap.y, self.cap.width, self.cap.height, self.pos.0,
            self.pos.1
        )
    }
}

/// Reverse tokenizer splitting six trailing integers off a line.
///
/// Scans from the tail, alternating between gap and token runs, and leaves
/// everything before the sixth token as the name. `None` for malformed
/// lines (too few fields, non-numeric fields, empty name, zero-size
/// capture).
pub fn parse_record(line: &str) -> Option<Record> {
    #[derive(PartialEq)]
    enum Scan {
        Gap,
        Token,
    }

    let line = line.trim_end();
    let bytes = line.as_bytes();
    let mut fields = [0i32; 6];
    let mut slot = 6;
    let mut state = Scan::Gap;
    let mut end = line.len();
    let mut pos = line.len();
    while slot > 0 {
        let at_ws = pos > 0 && bytes[pos - 1].is_ascii_whitespace();
        match state {
            Scan::Gap => {
                if pos == 0 {
                    return None;
                }
                if !at_ws {
                    end = pos;
                    state = Scan::Token;
                } else {
                    pos -= 1;
                }
            }
            Scan::Token => {
                if pos == 0 || at_ws {
                    slot -= 1;
                    fields[slot] = line[pos..end].parse().ok()?;
                    state = Scan::Gap;
                } else {
                    pos -= 1;
                }
            }
        }
    }
    let name = line[..pos].trim_end();
    if name.is_empty() {
        return None;
    }

    let cap = CaptureRect {
        x: i16::try_from(fields[0]).ok()?,
        y: i16::try_from(fields[1]).ok()?,
        width: u16::try_from(fields[2]).ok()?,
        height: u16::try_from(fields[3]).ok()?,
    };
    if cap.width < 1 || cap.height < 1 {
        return None;
    }
    Some(Record {
        name: name.to_string(),
        cap,
        pos: (
            i16::try_from(fields[4]).ok()?,
            i16::try_from(fields[5]).ok()?,
        ),
    })
}

/// The on-disk snapshot location. Persistence is a no-op when the config
/// directory cannot be determined.
pub struct StateFile {
    path: Option<PathBuf>,
}

impl StateFile {
    pub fn new() -> Self {
        let path = dirs::config_dir().map(|dir| dir.join(PROGRAM_NAME).join("snips"));
        if path.is_none() {
            warn!("no config directory; snips will not persist");
        }
        Self { path }
    }

    #[cfg(test)]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Write all records atomically (temp file, then rename)
    pub fn save(&self, records: &[Record]) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create {}", parent.display()))?;
        }
        let mut contents = String::from(HEADER);
        contents.push('\n');
        for record in records {
            contents.push_str(&record.format());
            contents.push('\n');
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents).context(format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).context(format!("Failed to rename into {}", path.display()))?;
        debug!("saved {} snip records", records.len());
        Ok(())
    }

    /// Read the snapshot; comment lines are ignored, malformed lines are
    /// logged and skipped.
    pub fn load(&self) -> Result<Vec<Record>> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(Vec::new()),
        };
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).context(format!("Failed to read {}", path.display()));
            }
        };
        let mut records = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_record(line) {
                Some(record) => records.push(record),
                None => warn!("skipping malformed snip record: {line:?}"),
            }
        }
        Ok(records)
    }
}

/// Snapshot every view, connected and disconnected alike; disconnected
/// views are still visible placeholders worth restoring.
pub fn collect_records(app: &App) -> Vec<Record> {
    let mut records = Vec::new();
    for target in app.targets.values() {
        for view in &target.views {
            records.push(Record {
                name: target.name.clone(),
                cap: view.cap,
                pos: view.pos,
            });
        }
    }
    records
}

/// Save after every mutation of the live graph. A failed save is logged
/// and does not disturb the entity graph.
pub fn checkpoint(app: &App) {
    let records = collect_records(app);
    if let Err(err) = app.store.save(&records) {
        warn!("failed to save snip state: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_record() {
        let record = parse_record("Term 10 20 100 80 500 500").unwrap();
        assert_eq!(record.name, "Term");
        assert_eq!(
            record.cap,
            CaptureRect {
                x: 10,
                y: 20,
                width: 100,
                height: 80
            }
        );
        assert_eq!(record.pos, (500, 500));
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let record = parse_record("My App 10 20 100 80 500 500").unwrap();
        assert_eq!(record.name, "My App");
        assert_eq!(record.cap.x, 10);
        assert_eq!(record.pos, (500, 500));
    }

    #[test]
    fn test_parse_name_with_trailing_digits() {
        // only the six trailing integers are fields
        let record = parse_record("xterm 42 1 2 3 4 5 6").unwrap();
        assert_eq!(record.name, "xterm 42");
        assert_eq!(record.cap, CaptureRect { x: 1, y: 2, width: 3, height: 4 });
        assert_eq!(record.pos, (5, 6));
    }

    #[test]
    fn test_parse_negative_capture_origin() {
        let record = parse_record("Term -5 -7 100 80 0 0").unwrap();
        assert_eq!((record.cap.x, record.cap.y), (-5, -7));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_record("").is_none());
        assert!(parse_record("Term 1 2 3 4 5").is_none());
        assert!(parse_record("1 2 3 4 5 6").is_none());
        assert!(parse_record("Term a 2 3 4 5 6").is_none());
        assert!(parse_record("Term 1 2 0 4 5 6").is_none());
        assert!(parse_record("Term 1 2 3 99999 5 6").is_none());
    }

    #[test]
    fn test_format_parse_round_trip() {
        let record = Record {
            name: "My App".to_string(),
            cap: CaptureRect {
                x: -3,
                y: 7,
                width: 1,
                height: 200,
            },
            pos: (-10, 40),
        };
        assert_eq!(parse_record(&record.format()).as_ref(), Some(&record));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("sniptotop-test-{}", std::process::id()));
        let store = StateFile::with_path(dir.join("snips"));
        let records = vec![
            Record {
                name: "Term".to_string(),
                cap: CaptureRect {
                    x: 10,
                    y: 20,
                    width: 100,
                    height: 80,
                },
                pos: (500, 500),
            },
            Record {
                name: "My App".to_string(),
                cap: CaptureRect {
                    x: 0,
                    y: 0,
                    width: 1,
                    height: 1,
                },
                pos: (0, 0),
            },
        ];
        store.save(&records).unwrap();
        assert_eq!(store.load().unwrap(), records);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = StateFile::with_path(std::env::temp_dir().join("sniptotop-does-not-exist"));
        assert!(store.load().unwrap().is_empty());
    }
}
