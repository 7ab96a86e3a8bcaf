//! Unit tests for range segmentation and calendar periods

use activity_fetcher::window::{PeriodGranularity, MAX_WINDOW_DAYS};
use activity_fetcher::{FetchWindow, Period, Segmenter};
use chrono::{Days, NaiveDate};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn assert_exact_cover(start: NaiveDate, end: NaiveDate) {
    let windows: Vec<FetchWindow> = Segmenter::new(start, end).unwrap().collect();

    assert_eq!(windows.first().unwrap().start(), start);
    assert_eq!(windows.last().unwrap().end(), end);
    for window in &windows {
        assert!(window.start() <= window.end());
        assert!(window.len_days() <= MAX_WINDOW_DAYS);
    }
    for pair in windows.windows(2) {
        assert_eq!(pair[0].end() + Days::new(1), pair[1].start());
    }
}

#[test]
fn test_cover_property_over_many_ranges() {
    let origin = date(2023, 12, 20);
    for offset in 0..20u64 {
        for length in 0..40u64 {
            let start = origin + Days::new(offset);
            assert_exact_cover(start, start + Days::new(length));
        }
    }
}

#[test]
fn test_leap_year_range() {
    let windows: Vec<_> = Segmenter::new(date(2024, 2, 22), date(2024, 3, 1))
        .unwrap()
        .collect();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].end(), date(2024, 2, 28));
    assert_eq!(windows[1].start(), date(2024, 2, 29));
    assert_eq!(windows[1].len_days(), 2);
}

#[test]
fn test_full_year_window_count() {
    let segmenter = Segmenter::new(date(2024, 1, 1), date(2024, 12, 31)).unwrap();
    // 366 days: 52 full weeks and a 2-day tail
    assert_eq!(segmenter.len(), 53);
    assert_eq!(segmenter.last().unwrap().len_days(), 2);
}

#[test]
fn test_range_crossing_year_boundary() {
    assert_exact_cover(date(2023, 12, 28), date(2024, 1, 5));
}

#[test]
fn test_segmenter_len_tracks_iteration() {
    let mut segmenter = Segmenter::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
    assert_eq!(segmenter.len(), 5);
    segmenter.next();
    assert_eq!(segmenter.len(), 4);
}

#[test]
fn test_periods() {
    let month: Period = "2024-02".parse().unwrap();
    assert_eq!(month.granularity(), PeriodGranularity::Monthly);
    assert_eq!((month.start(), month.end()), (date(2024, 2, 1), date(2024, 2, 29)));
    assert_eq!(month.windows().count(), 5);

    let quarter: Period = "2023-Q4".parse().unwrap();
    assert_eq!(quarter.granularity(), PeriodGranularity::Quarterly);
    assert_eq!((quarter.start(), quarter.end()), (date(2023, 10, 1), date(2023, 12, 31)));
    assert_eq!(quarter.to_string(), "2023-Q4");

    assert!("2024-13".parse::<Period>().is_err());
    assert!("2024-Q0".parse::<Period>().is_err());
    assert!("last-month".parse::<Period>().is_err());
}
