use crate::value_objects::frequency::{TradingFrequency, INTRADAY_TICKS_PER_DAY};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

pub const MARKET_OPEN_HOUR: u32 = 9;
pub const MARKET_OPEN_MINUTE: u32 = 30;

/// Maps tick indices to simulated instants. Tick 0 is the initial state;
/// ticks `1..=planned_ticks` are the simulated intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationClock {
    origin: NaiveDateTime,
    frequency: TradingFrequency,
}

impl SimulationClock {
    /// Weekend start dates move to the following Monday; intraday runs start at the open.
    pub fn new(start_date: NaiveDate, frequency: TradingFrequency) -> Self {
        let mut date = start_date;
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        let time = match frequency {
            TradingFrequency::Daily => NaiveTime::MIN,
            TradingFrequency::Intraday => {
                NaiveTime::from_hms_opt(MARKET_OPEN_HOUR, MARKET_OPEN_MINUTE, 0)
                    .unwrap_or(NaiveTime::MIN)
            }
        };
        Self {
            origin: date.and_time(time),
            frequency,
        }
    }

    pub fn origin(&self) -> NaiveDateTime {
        self.origin
    }

    pub fn frequency(&self) -> TradingFrequency {
        self.frequency
    }

    pub fn tick_time(&self, index: u32) -> NaiveDateTime {
        if index == 0 {
            return self.origin;
        }
        match self.frequency {
            TradingFrequency::Daily => self.origin + Duration::days(i64::from(index)),
            TradingFrequency::Intraday => {
                let (day, slot) = intraday_position(index);
                self.origin + Duration::days(i64::from(day)) + Duration::hours(i64::from(slot + 1))
            }
        }
    }

    pub fn label(&self, index: u32) -> String {
        match (self.frequency, index) {
            (TradingFrequency::Daily, 0) => "Day 0 (Initial)".to_string(),
            (TradingFrequency::Intraday, 0) => "Day 0, Initial".to_string(),
            (TradingFrequency::Daily, n) => format!("Day {n}"),
            (TradingFrequency::Intraday, n) => {
                let (day, _) = intraday_position(n);
                format!("Day {}, {}", day + 1, self.tick_time(n).format("%H:%M"))
            }
        }
    }
}

/// Zero-based (session day, hourly slot) of intraday tick `index >= 1`.
fn intraday_position(index: u32) -> (u32, u32) {
    let k = index - 1;
    (k / INTRADAY_TICKS_PER_DAY, k % INTRADAY_TICKS_PER_DAY)
}
