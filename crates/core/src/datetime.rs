//! 日历辅助函数，作业依赖判定的时间窗口都以日期为粒度

use chrono::{Datelike, Duration, NaiveDate};

/// 所在周的周一
pub fn monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// 所在月的第一天
pub fn month_start_day(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// 所在年的第一天
pub fn new_year_day(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

pub fn yesterday(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

/// 指定月份的天数
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_anchors() {
        // 2024-05-16 是周四
        let thursday = date(2024, 5, 16);
        assert_eq!(monday(thursday), date(2024, 5, 13));
        assert_eq!(monday(date(2024, 5, 13)), date(2024, 5, 13));
        assert_eq!(month_start_day(thursday), date(2024, 5, 1));
        assert_eq!(new_year_day(thursday), date(2024, 1, 1));
        assert_eq!(yesterday(date(2024, 3, 1)), date(2024, 2, 29));
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2023, 12), 31);
        assert_eq!(days_in_month(2023, 4), 30);
    }
}
