//! Recording-year estimation for cached facts.

use chrono::{DateTime, Datelike, Utc};

use super::YearSource;

const EARLIEST_YEAR: i32 = 1970;

/// Guess a year from a file name such as `VID_20190704_181502.mp4` or
/// `holiday 2016.mov`. Takes the leading four digits of each digit run and
/// returns the first plausible one.
pub fn year_from_file_name(name: &str, latest: i32) -> Option<i32> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start >= 4 {
            if let Ok(year) = name[start..start + 4].parse::<i32>() {
                if (EARLIEST_YEAR..=latest).contains(&year) {
                    return Some(year);
                }
            }
        }
    }
    None
}

/// Year estimate for a new cache entry: `(estimated, source, heuristic)`.
pub fn estimate(
    created_at: Option<DateTime<Utc>>,
    file_name: &str,
    now: DateTime<Utc>,
) -> (Option<i32>, Option<YearSource>, Option<i32>) {
    let heuristic = year_from_file_name(file_name, now.year());
    match created_at {
        Some(date) => (Some(date.year()), Some(YearSource::Metadata), heuristic),
        None => match heuristic {
            Some(year) => (Some(year), Some(YearSource::Heuristic), heuristic),
            None => (None, None, None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_year_from_file_name() {
        assert_eq!(year_from_file_name("VID_20190704_181502.mp4", 2026), Some(2019));
        assert_eq!(year_from_file_name("holiday 2016.mov", 2026), Some(2016));
        assert_eq!(year_from_file_name("IMG_1234.mov", 2026), None);
        assert_eq!(year_from_file_name("clip_9999_2021.mp4", 2026), Some(2021));
        assert_eq!(year_from_file_name("future_2031.mp4", 2026), None);
        assert_eq!(year_from_file_name("no digits.mp4", 2026), None);
    }

    #[test]
    fn test_metadata_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let created = Utc.with_ymd_and_hms(2018, 3, 4, 5, 6, 7).unwrap();

        let (year, source, heuristic) = estimate(Some(created), "trip_2016.mp4", now);
        assert_eq!(year, Some(2018));
        assert_eq!(source, Some(YearSource::Metadata));
        assert_eq!(heuristic, Some(2016));

        let (year, source, _) = estimate(None, "trip_2016.mp4", now);
        assert_eq!(year, Some(2016));
        assert_eq!(source, Some(YearSource::Heuristic));

        assert_eq!(estimate(None, "trip.mp4", now), (None, None, None));
    }
}
