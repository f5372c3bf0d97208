//! Directory listing layout
//!
//! Produces `ls -l` style lines for LIST:
//! `<mode> 1 ftp ftp <size:12> <date> <name>`. The date shows the time of day
//! for recent files and the year for anything older than six months.

use chrono::{DateTime, Duration, Local};
use std::fs::Metadata;
use std::io;
use std::path::Path;
use tokio::fs;

/// Age after which the year replaces the time of day.
const RECENT_WINDOW_DAYS: i64 = 30 * 6;
const DATE_FORMAT_TIME: &str = "%b %e %H:%M";
const DATE_FORMAT_YEAR: &str = "%b %e  %Y";

/// One line of a LIST reply.
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub mode: String,
    pub size: u64,
    pub modified: DateTime<Local>,
}

impl ListEntry {
    /// Builds an entry from metadata that was read without following links.
    pub fn from_metadata(name: String, metadata: &Metadata) -> Self {
        let modified = metadata
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());

        Self {
            name,
            mode: mode_string(metadata),
            size: metadata.len(),
            modified,
        }
    }

    /// Renders the entry relative to `now`, without the line terminator.
    pub fn format(&self, now: DateTime<Local>) -> String {
        let format = if now - self.modified > Duration::days(RECENT_WINDOW_DAYS) {
            DATE_FORMAT_YEAR
        } else {
            DATE_FORMAT_TIME
        };

        format!(
            "{} 1 ftp ftp {:>12} {} {}",
            self.mode,
            self.size,
            self.modified.format(format),
            self.name
        )
    }
}

/// Permission string such as `drwxr-xr-x`.
#[cfg(unix)]
pub fn mode_string(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let kind = file_kind(metadata);
    let mode = metadata.permissions().mode();
    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
pub fn mode_string(metadata: &Metadata) -> String {
    let kind = file_kind(metadata);
    let perms = if metadata.permissions().readonly() {
        "r--r--r--"
    } else {
        "rw-rw-rw-"
    };
    format!("{kind}{perms}")
}

fn file_kind(metadata: &Metadata) -> char {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        'l'
    } else if file_type.is_dir() {
        'd'
    } else {
        '-'
    }
}

/// Collects the entries to list for `path`: the sorted directory contents, or
/// the path itself when it is not a directory.
pub async fn collect_entries(path: &Path) -> io::Result<Vec<ListEntry>> {
    let metadata = fs::metadata(path).await?;

    if !metadata.is_dir() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![ListEntry::from_metadata(name, &metadata)]);
    }

    let mut entries = Vec::new();
    let mut dir = fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        // DirEntry::metadata does not traverse symlinks
        let metadata = entry.metadata().await?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push(ListEntry::from_metadata(name, &metadata));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Joins formatted entries into the CRLF-terminated listing payload.
pub fn render(entries: &[ListEntry], now: DateTime<Local>) -> Vec<u8> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.format(now));
        out.push_str("\r\n");
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(size: u64, modified: DateTime<Local>) -> ListEntry {
        ListEntry {
            name: "report.txt".into(),
            mode: "-rw-r--r--".into(),
            size,
            modified,
        }
    }

    #[test]
    fn recent_file_shows_time_of_day() {
        let now = Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let modified = Local.with_ymd_and_hms(2024, 6, 3, 9, 5, 0).unwrap();
        let line = entry(1234, modified).format(now);
        assert_eq!(
            line,
            "-rw-r--r-- 1 ftp ftp         1234 Jun  3 09:05 report.txt"
        );
    }

    #[test]
    fn old_file_shows_year() {
        let now = Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let modified = Local.with_ymd_and_hms(2023, 11, 20, 8, 0, 0).unwrap();
        let line = entry(1234, modified).format(now);
        assert_eq!(
            line,
            "-rw-r--r-- 1 ftp ftp         1234 Nov 20  2023 report.txt"
        );
    }

    #[test]
    fn size_is_right_justified_to_twelve_columns() {
        let now = Local::now();
        let line = entry(7, now).format(now);
        assert!(line.contains(" ftp            7 "));
        let line = entry(123_456_789_012, now).format(now);
        assert!(line.contains(" ftp 123456789012 "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn collects_sorted_entries_with_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), vec![0u8; 50]).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::set_permissions(dir.path().join("b.txt"), std::fs::Permissions::from_mode(0o640))
            .unwrap();

        let entries = collect_entries(dir.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b.txt"]);
        assert!(entries[0].mode.starts_with('d'));
        assert_eq!(entries[1].mode, "-rw-r-----");
        assert_eq!(entries[1].size, 50);

        let single = collect_entries(&dir.path().join("b.txt")).await.unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].name, "b.txt");
    }

    #[test]
    fn render_terminates_lines_with_crlf() {
        let now = Local::now();
        let payload = render(&[entry(1, now), entry(2, now)], now);
        let text = String::from_utf8(payload).unwrap();
        assert_eq!(text.matches("\r\n").count(), 2);
        assert!(text.ends_with("report.txt\r\n"));
    }
}
