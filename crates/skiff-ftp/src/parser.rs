//! Directory-listing parsers.
//!
//! MLSD (RFC 3659) is preferred when the server advertises it; otherwise
//! LIST output is parsed, covering the two formats seen in the wild:
//! Unix `ls -l` style and MS-DOS/IIS style.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use skiff_core::types::DirectoryEntry;

/// Parse a complete listing body into entries. `.` and `..` are dropped.
pub fn parse_listing(data: &str) -> Vec<DirectoryEntry> {
    let now = Utc::now();
    data.lines()
        .filter_map(|line| parse_line(line, &now))
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

fn parse_line(line: &str, now: &DateTime<Utc>) -> Option<DirectoryEntry> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with("total ") {
        return None;
    }
    parse_mlsd(line)
        .or_else(|| parse_unix(line, now))
        .or_else(|| parse_msdos(line))
}

// ─── MLSD ────────────────────────────────────────────────────────────
// `type=file;size=1234;modify=20240115103000; report.pdf`

fn parse_mlsd(line: &str) -> Option<DirectoryEntry> {
    let (facts, name) = line.split_once("; ")?;
    if !facts.contains('=') {
        return None;
    }

    let mut entry_type = None;
    let mut size = 0u64;
    let mut modified = None;
    for fact in facts.split(';') {
        let (key, value) = fact.split_once('=')?;
        match key.to_ascii_lowercase().as_str() {
            "type" => entry_type = Some(value.to_ascii_lowercase()),
            "size" => size = value.parse().unwrap_or(0),
            "modify" => modified = parse_mdtm_timestamp(value),
            _ => {}
        }
    }

    let entry_type = entry_type?;
    if entry_type == "cdir" || entry_type == "pdir" {
        return None;
    }
    let is_dir = entry_type == "dir";
    Some(DirectoryEntry {
        name: name.to_string(),
        is_dir,
        size: if is_dir { 0 } else { size },
        modified,
    })
}

/// `YYYYMMDDHHMMSS` (optionally with fractional seconds) → epoch seconds.
pub fn parse_mdtm_timestamp(value: &str) -> Option<u64> {
    let value = value.split('.').next()?;
    let dt = NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&dt).timestamp().max(0) as u64)
}

// ─── Unix `ls -l` ────────────────────────────────────────────────────
// `-rw-r--r--  1 user group  1234 Jan 15 10:30 report.pdf`
// `drwxr-xr-x  2 user group  4096 Mar  3  2023 archive`

fn parse_unix(line: &str, now: &DateTime<Utc>) -> Option<DirectoryEntry> {
    let re = Regex::new(
        r"^([\-dlbcps])[rwxsStT\-]{9}[\.\+]?\s+\d+\s+\S+\s+\S+\s+(\d+)\s+(\w{3})\s+(\d{1,2})\s+(\d{4}|\d{1,2}:\d{2})\s+(.+)$",
    )
    .unwrap();
    let caps = re.captures(line)?;

    let kind = &caps[1];
    if kind == "l" {
        // Symlinks list as `name -> target`; keep the link name.
        let name = caps[6].split(" -> ").next().unwrap_or(&caps[6]).to_string();
        return Some(DirectoryEntry {
            name,
            is_dir: false,
            size: caps[2].parse().unwrap_or(0),
            modified: unix_mtime(&caps[3], &caps[4], &caps[5], now),
        });
    }

    let is_dir = kind == "d";
    Some(DirectoryEntry {
        name: caps[6].to_string(),
        is_dir,
        size: if is_dir { 0 } else { caps[2].parse().unwrap_or(0) },
        modified: unix_mtime(&caps[3], &caps[4], &caps[5], now),
    })
}

fn unix_mtime(month: &str, day: &str, year_or_time: &str, now: &DateTime<Utc>) -> Option<u64> {
    let month = match month.to_ascii_lowercase().as_str() {
        "jan" => 1, "feb" => 2, "mar" => 3, "apr" => 4, "may" => 5, "jun" => 6,
        "jul" => 7, "aug" => 8, "sep" => 9, "oct" => 10, "nov" => 11, "dec" => 12,
        _ => return None,
    };
    let day: u32 = day.parse().ok()?;

    let (year, hour, minute) = if let Some((h, m)) = year_or_time.split_once(':') {
        // Recent entry: no year in the listing. Assume the current year
        // unless that would place the entry in the future.
        let hour: u32 = h.parse().ok()?;
        let minute: u32 = m.parse().ok()?;
        let mut year = now.year();
        let candidate = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
        if Utc.from_utc_datetime(&candidate) > *now {
            year -= 1;
        }
        (year, hour, minute)
    } else {
        (year_or_time.parse().ok()?, 0, 0)
    };

    let dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&dt).timestamp().max(0) as u64)
}

// ─── MS-DOS / IIS ────────────────────────────────────────────────────
// `01-15-24  10:30AM       <DIR>          archive`
// `01-15-24  10:30AM              1234 report.pdf`

fn parse_msdos(line: &str) -> Option<DirectoryEntry> {
    let re = Regex::new(
        r"^(\d{2})-(\d{2})-(\d{2,4})\s+(\d{1,2}):(\d{2})(AM|PM)\s+(<DIR>|\d+)\s+(.+)$",
    )
    .unwrap();
    let caps = re.captures(line)?;

    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let mut year: i32 = caps[3].parse().ok()?;
    if year < 100 {
        year += if year < 70 { 2000 } else { 1900 };
    }
    let mut hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    match (&caps[6], hour) {
        (pm, 12) if pm == "AM" => hour = 0,
        (pm, h) if pm == "PM" && h < 12 => hour += 12,
        _ => {}
    }

    let modified = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp().max(0) as u64);

    let is_dir = &caps[7] == "<DIR>";
    Some(DirectoryEntry {
        name: caps[8].to_string(),
        is_dir,
        size: if is_dir { 0 } else { caps[7].parse().unwrap_or(0) },
        modified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_listing() {
        let data = "total 8\n\
                    drwxr-xr-x  2 ftp ftp  4096 Mar  3  2023 archive\n\
                    -rw-r--r--  1 ftp ftp 12345 Jan 15 10:30 report.pdf\n\
                    lrwxrwxrwx  1 ftp ftp     7 Jan 15 10:30 link -> target\n";
        let entries = parse_listing(data);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_dir);
        assert_eq!(entries[0].size, 0);
        assert_eq!(entries[1].name, "report.pdf");
        assert_eq!(entries[1].size, 12345);
        assert_eq!(entries[2].name, "link");
    }

    #[test]
    fn unix_listing_with_year() {
        let entries = parse_listing("-rw-r--r--  1 u g 10 Mar  3  2023 old.txt");
        assert_eq!(entries.len(), 1);
        let expected = Utc
            .from_utc_datetime(
                &NaiveDate::from_ymd_opt(2023, 3, 3).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            )
            .timestamp() as u64;
        assert_eq!(entries[0].modified, Some(expected));
    }

    #[test]
    fn unix_name_with_spaces() {
        let entries = parse_listing("-rw-r--r--  1 u g 10 Jan 15 10:30 my file.txt");
        assert_eq!(entries[0].name, "my file.txt");
    }

    #[test]
    fn msdos_listing() {
        let data = "01-15-24  10:30AM       <DIR>          archive\n\
                    01-15-24  01:05PM              1234 report.pdf\n";
        let entries = parse_listing(data);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].size, 1234);
    }

    #[test]
    fn mlsd_listing() {
        let data = "type=cdir;modify=20240115103000; .\n\
                    type=dir;modify=20240115103000; archive\n\
                    type=file;size=1234;modify=20240115103000; report.pdf\n";
        let entries = parse_listing(data);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].size, 1234);
        assert_eq!(entries[1].modified, parse_mdtm_timestamp("20240115103000"));
    }

    #[test]
    fn mdtm_timestamp() {
        let ts = parse_mdtm_timestamp("20240115103000").unwrap();
        let expected = Utc
            .from_utc_datetime(
                &NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 30, 0).unwrap(),
            )
            .timestamp() as u64;
        assert_eq!(ts, expected);
        assert!(parse_mdtm_timestamp("garbage").is_none());
    }

    #[test]
    fn dot_entries_dropped() {
        let data = "drwxr-xr-x  2 u g 4096 Jan 15 10:30 .\n\
                    drwxr-xr-x  2 u g 4096 Jan 15 10:30 ..\n\
                    drwxr-xr-x  2 u g 4096 Jan 15 10:30 real\n";
        let entries = parse_listing(data);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "real");
    }
}
