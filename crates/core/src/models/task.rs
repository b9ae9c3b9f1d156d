use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::datetime::days_in_month;

/// 任务定义
///
/// 表示系统中可调度执行的任务单元，由外部任务管理维护，调度核心只读。
///
/// # 字段说明
///
/// - `id`: 任务的唯一标识符
/// - `name`: 任务的人类可读名称
/// - `is_valid`: 任务是否有效，失效任务不会生成作业
/// - `period`: 调度周期
/// - `format`: 调度时间格式，定义执行的时/分以及每个周期的生效日期
/// - `retries`: 最大重试次数，第一次执行不算重试
/// - `parents`: 上游任务 ID 列表，依赖关系构成 DAG，环由调用方保证不存在
/// - `dependency`: 弱依赖与偏移配置，目前只保存不参与判定
///
/// # 使用示例
///
/// ```rust
/// use orchestra_core::models::{ScheduleFormat, SchedulePeriod, Task};
///
/// let task = Task::new("daily_report", SchedulePeriod::Day, ScheduleFormat::daily(2, 30))
///     .with_parents(vec![1, 2])
///     .with_retries(3);
/// assert!(task.has_parents());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub is_valid: bool,
    pub period: SchedulePeriod,
    pub format: ScheduleFormat,
    pub retries: i32,
    pub parents: Vec<i64>,
    pub dependency: ScheduleDependencyInfo,
    pub is_remove: bool,
    pub create_time: NaiveDateTime,
    pub update_time: NaiveDateTime,
}

impl Task {
    /// 创建新任务
    pub fn new<S: Into<String>>(name: S, period: SchedulePeriod, format: ScheduleFormat) -> Self {
        let now = NaiveDateTime::default();
        Self {
            id: 0, // 将由存储层生成
            name: name.into(),
            is_valid: true,
            period,
            format,
            retries: 0,
            parents: Vec::new(),
            dependency: ScheduleDependencyInfo::default(),
            is_remove: false,
            create_time: now,
            update_time: now,
        }
    }

    pub fn with_parents(mut self, parents: Vec<i64>) -> Self {
        self.parents = parents;
        self
    }

    pub fn with_retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.is_valid = false;
        self
    }

    pub fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }
}

/// 调度周期
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SchedulePeriod {
    #[serde(rename = "ONCE")]
    Once,
    #[serde(rename = "HOUR")]
    Hour,
    #[serde(rename = "DAY")]
    Day,
    #[serde(rename = "WEEK")]
    Week,
    #[serde(rename = "MONTH")]
    Month,
    #[serde(rename = "YEAR")]
    Year,
}

impl SchedulePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulePeriod::Once => "ONCE",
            SchedulePeriod::Hour => "HOUR",
            SchedulePeriod::Day => "DAY",
            SchedulePeriod::Week => "WEEK",
            SchedulePeriod::Month => "MONTH",
            SchedulePeriod::Year => "YEAR",
        }
    }
}

impl fmt::Display for SchedulePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONCE" => Ok(SchedulePeriod::Once),
            "HOUR" => Ok(SchedulePeriod::Hour),
            "DAY" => Ok(SchedulePeriod::Day),
            "WEEK" => Ok(SchedulePeriod::Week),
            "MONTH" => Ok(SchedulePeriod::Month),
            "YEAR" => Ok(SchedulePeriod::Year),
            _ => Err(format!("Invalid schedule period: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for SchedulePeriod {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SchedulePeriod {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<SchedulePeriod>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SchedulePeriod {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 调度时间格式
///
/// 不同周期需要的字段不同：
///
/// | 周期 | 必填字段 |
/// |---|---|
/// | ONCE | year, month, day, hour |
/// | HOUR | 无（hour 必须为空），每小时的 minute 执行 |
/// | DAY | hour |
/// | WEEK | weekday (1=周一 ... 7=周日), hour |
/// | MONTH | day, hour |
/// | YEAR | month, day, hour |
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleFormat {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub weekday: Option<u32>,
    pub hour: Option<u32>,
    pub minute: u32,
}

impl ScheduleFormat {
    pub fn hourly(minute: u32) -> Self {
        Self {
            minute,
            ..Self::default()
        }
    }

    pub fn daily(hour: u32, minute: u32) -> Self {
        Self {
            hour: Some(hour),
            minute,
            ..Self::default()
        }
    }

    pub fn weekly(weekday: u32, hour: u32, minute: u32) -> Self {
        Self {
            weekday: Some(weekday),
            ..Self::daily(hour, minute)
        }
    }

    pub fn monthly(day: u32, hour: u32, minute: u32) -> Self {
        Self {
            day: Some(day),
            ..Self::daily(hour, minute)
        }
    }

    pub fn yearly(month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self {
            month: Some(month),
            day: Some(day),
            ..Self::daily(hour, minute)
        }
    }

    pub fn once(date: NaiveDate, hour: u32, minute: u32) -> Self {
        Self {
            year: Some(date.year()),
            month: Some(date.month()),
            day: Some(date.day()),
            ..Self::daily(hour, minute)
        }
    }

    /// 检查格式对于周期[period]是否合法
    pub fn is_valid(&self, period: SchedulePeriod) -> bool {
        if self.minute > 59 {
            return false;
        }
        if matches!(self.hour, Some(hour) if hour > 23) {
            return false;
        }
        match period {
            SchedulePeriod::Hour => self.hour.is_none(),
            SchedulePeriod::Day => self.hour.is_some(),
            SchedulePeriod::Week => {
                self.hour.is_some() && matches!(self.weekday, Some(w) if (1..=7).contains(&w))
            }
            SchedulePeriod::Month => {
                self.hour.is_some() && matches!(self.day, Some(d) if (1..=31).contains(&d))
            }
            SchedulePeriod::Year => match (self.hour, self.month, self.day) {
                // 闰年校验，允许 2 月 29 日
                (Some(_), Some(month), Some(day)) if (1..=12).contains(&month) => {
                    day >= 1 && day <= days_in_month(2000, month)
                }
                _ => false,
            },
            SchedulePeriod::Once => match (self.hour, self.year, self.month, self.day) {
                (Some(_), Some(year), Some(month), Some(day)) => {
                    NaiveDate::from_ymd_opt(year, month, day).is_some()
                }
                _ => false,
            },
        }
    }

    /// 检查周期为[period]的任务在[today]是否需要调度
    ///
    /// 月末不存在的日期（如 31 日）在当月最后一天调度，非闰年的 2 月 29 日在 2 月 28 日调度
    pub fn should_schedule(&self, period: SchedulePeriod, today: NaiveDate) -> bool {
        match period {
            SchedulePeriod::Hour | SchedulePeriod::Day => true,
            SchedulePeriod::Week => self.weekday == Some(today.weekday().number_from_monday()),
            SchedulePeriod::Month => match self.day {
                Some(day) => Self::clamped_day(day, today) == today.day(),
                None => false,
            },
            SchedulePeriod::Year => match (self.month, self.day) {
                (Some(month), Some(day)) => {
                    month == today.month() && Self::clamped_day(day, today) == today.day()
                }
                _ => false,
            },
            SchedulePeriod::Once => match (self.year, self.month, self.day) {
                (Some(year), Some(month), Some(day)) => {
                    NaiveDate::from_ymd_opt(year, month, day) == Some(today)
                }
                _ => false,
            },
        }
    }

    fn clamped_day(day: u32, today: NaiveDate) -> u32 {
        day.min(days_in_month(today.year(), today.month()))
    }
}

/// 依赖的附加配置
///
/// `wait_timeout` 为弱依赖最大等待时间（分钟），`offset_day` 为偏移天数，-1 表示未设置。
/// 依赖判定暂不支持这两项。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleDependencyInfo {
    pub wait_timeout: i32,
    pub offset_day: i32,
}

impl Default for ScheduleDependencyInfo {
    fn default() -> Self {
        Self {
            wait_timeout: -1,
            offset_day: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_format_validity_per_period() {
        assert!(ScheduleFormat::hourly(15).is_valid(SchedulePeriod::Hour));
        assert!(!ScheduleFormat::daily(1, 15).is_valid(SchedulePeriod::Hour));
        assert!(ScheduleFormat::daily(1, 15).is_valid(SchedulePeriod::Day));
        assert!(!ScheduleFormat::hourly(15).is_valid(SchedulePeriod::Day));
        assert!(!ScheduleFormat::daily(24, 0).is_valid(SchedulePeriod::Day));
        assert!(!ScheduleFormat::daily(3, 60).is_valid(SchedulePeriod::Day));

        assert!(ScheduleFormat::weekly(7, 3, 0).is_valid(SchedulePeriod::Week));
        assert!(!ScheduleFormat::weekly(0, 3, 0).is_valid(SchedulePeriod::Week));
        assert!(!ScheduleFormat::daily(3, 0).is_valid(SchedulePeriod::Week));

        assert!(ScheduleFormat::monthly(31, 3, 0).is_valid(SchedulePeriod::Month));
        assert!(!ScheduleFormat::monthly(32, 3, 0).is_valid(SchedulePeriod::Month));

        assert!(ScheduleFormat::yearly(2, 29, 3, 0).is_valid(SchedulePeriod::Year));
        assert!(!ScheduleFormat::yearly(2, 30, 3, 0).is_valid(SchedulePeriod::Year));
        assert!(!ScheduleFormat::yearly(13, 1, 3, 0).is_valid(SchedulePeriod::Year));

        assert!(ScheduleFormat::once(date(2024, 5, 16), 3, 0).is_valid(SchedulePeriod::Once));
        assert!(!ScheduleFormat::daily(3, 0).is_valid(SchedulePeriod::Once));
    }

    #[test]
    fn test_should_schedule() {
        let thursday = date(2024, 5, 16);
        assert!(ScheduleFormat::hourly(0).should_schedule(SchedulePeriod::Hour, thursday));
        assert!(ScheduleFormat::daily(0, 0).should_schedule(SchedulePeriod::Day, thursday));
        assert!(ScheduleFormat::weekly(4, 0, 0).should_schedule(SchedulePeriod::Week, thursday));
        assert!(!ScheduleFormat::weekly(1, 0, 0).should_schedule(SchedulePeriod::Week, thursday));
        assert!(ScheduleFormat::monthly(16, 0, 0).should_schedule(SchedulePeriod::Month, thursday));
        assert!(!ScheduleFormat::monthly(15, 0, 0).should_schedule(SchedulePeriod::Month, thursday));
        assert!(ScheduleFormat::yearly(5, 16, 0, 0).should_schedule(SchedulePeriod::Year, thursday));
        assert!(!ScheduleFormat::yearly(6, 16, 0, 0).should_schedule(SchedulePeriod::Year, thursday));
        assert!(ScheduleFormat::once(thursday, 0, 0).should_schedule(SchedulePeriod::Once, thursday));
        assert!(!ScheduleFormat::once(thursday, 0, 0)
            .should_schedule(SchedulePeriod::Once, date(2024, 5, 17)));
    }

    #[test]
    fn test_should_schedule_clamps_to_month_end() {
        let format = ScheduleFormat::monthly(31, 0, 0);
        assert!(format.should_schedule(SchedulePeriod::Month, date(2024, 4, 30)));
        assert!(!format.should_schedule(SchedulePeriod::Month, date(2024, 4, 29)));
        assert!(format.should_schedule(SchedulePeriod::Month, date(2024, 5, 31)));
        assert!(!format.should_schedule(SchedulePeriod::Month, date(2024, 5, 30)));

        let leap_day = ScheduleFormat::yearly(2, 29, 0, 0);
        assert!(leap_day.should_schedule(SchedulePeriod::Year, date(2023, 2, 28)));
        assert!(leap_day.should_schedule(SchedulePeriod::Year, date(2024, 2, 29)));
        assert!(!leap_day.should_schedule(SchedulePeriod::Year, date(2024, 2, 28)));
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("WEEK".parse::<SchedulePeriod>().unwrap(), SchedulePeriod::Week);
        assert!("DAILY".parse::<SchedulePeriod>().is_err());
    }
}
