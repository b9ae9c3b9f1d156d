use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDateTime};

/// 时间源，测试中可替换为 [`MockClock`] 以确定性地推进时间
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> chrono::NaiveDate {
        self.now().date()
    }
}

/// 系统本地时间
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 可手动设置和推进的时钟
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<NaiveDateTime>>,
}

impl MockClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, time: NaiveDateTime) {
        *self.lock() = time;
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.lock();
        *current += duration;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        // 时钟内部只有赋值操作，被毒化时沿用其中的值即可
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for MockClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_mock_clock_advances() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 16)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap();
        let clock = MockClock::new(start);
        let shared = clock.clone();

        shared.advance(Duration::minutes(2));
        assert_eq!(clock.now(), start + Duration::minutes(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());

        clock.set(start);
        assert_eq!(shared.now(), start);
    }
}
