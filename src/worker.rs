use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, Timelike};
use log::{info, warn};
use crate::calendar;
use crate::calendar::DayKind;
use crate::config::Config;
use crate::errors::WorkerError;
use crate::manager_nordpool::NordPool;
use crate::manager_sensibo::ThermostatLink;
use crate::prices::PriceAnalyzer;
use crate::scheduler::{Phase, Scheduler};

/// Runs day cycles until something breaks badly enough to need a restart.
///
/// Each cycle plans one local day from calendar and prices, walks the
/// scheduler through it and rolls over at midnight. A mid day start is
/// fine, elapsed phases fall through without catching up.
///
/// # Arguments
///
/// * 'config' - the loaded configuration
/// * 'nordpool' - day ahead price client
/// * 'analyzer' - price analyzer, fed fresh curves as days roll
/// * 'scheduler' - the control loop state machine
pub fn run<L: ThermostatLink>(config: &Config, nordpool: &NordPool,
                              analyzer: &mut PriceAnalyzer,
                              scheduler: &mut Scheduler<L>) -> Result<(), WorkerError> {
    let mut midnight = local_midnight(Local::now());

    loop {
        run_day(config, nordpool, analyzer, scheduler, midnight)?;
        midnight = next_midnight(midnight);
    }
}

/// Local midnight of the day containing 'now'
fn local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.with_time(NaiveTime::MIN).earliest().unwrap_or(now)
}

/// Local midnight of the following day, safe across DST transitions
fn next_midnight(midnight: DateTime<Local>) -> DateTime<Local> {
    let date = midnight.date_naive() + Days::new(1);
    date.and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or(midnight + chrono::Duration::days(1))
}

/// Plans and runs one local day
fn run_day<L: ThermostatLink>(config: &Config, nordpool: &NordPool,
                              analyzer: &mut PriceAnalyzer, scheduler: &mut Scheduler<L>,
                              midnight: DateTime<Local>) -> Result<(), WorkerError> {
    let date = midnight.date_naive();

    let overrides = calendar::load_overrides(&config.calendar.override_file)?;
    let kind = calendar::day_kind(date, &config.calendar.at_home_weekdays, &overrides);
    let window = calendar::comfort_window(kind, &config.hours);
    info!("planning {} as {:?} day, comfort {:?} until {}",
          date, kind, window.first, window.last_hour);

    ensure_today(analyzer, nordpool, date)?;

    scheduler.start_day(midnight);
    let leak = scheduler.leak_fraction();
    analyzer.prepare_day(&window, window.first.start,
                         (config.hours.earliest_afternoon_preheat,
                          config.hours.latest_afternoon_preheat), leak);
    log_classification(analyzer);

    // Fresh day, fresh baseline: resync every actuator field
    let idle = scheduler.presets().idle;
    scheduler.controller().force();
    scheduler.controller().apply(&idle, Local::now(), None)?;
    info!("{} from midnight", Phase::Idle);

    scheduler.wait_for_hour(0, 0);

    let morning_boost = analyzer.classification().cheapest_morning_hour
        .unwrap_or(window.first.start.saturating_sub(2));
    info!("{} planned for hour {}", Phase::Boost, morning_boost);
    scheduler.run_boost_rampup(analyzer, 0, morning_boost, window.first.start)?;

    info!("{} from hour {}", Phase::Comfort, window.first.start);
    scheduler.manage_comfort_hours(analyzer, &[window.first.start], &window, false)?;

    // Breakfast hour gets the dining area preset
    let breakfast = window.first.start + 1;
    scheduler.wait_for_hour(breakfast, 0);
    let dinner = scheduler.presets().dinner;
    scheduler.controller().apply(&dinner, Local::now(), Some(breakfast))?;

    match kind {
        DayKind::Workday => run_workday(config, analyzer, scheduler, &window)?,
        DayKind::AtHome => {
            let hours: Vec<u32> = (breakfast + 1..=window.last_hour).collect();
            scheduler.manage_comfort_hours(analyzer, &hours, &window, true)?;
        }
    }

    let idle = scheduler.presets().idle;
    scheduler.controller().apply(&idle, Local::now(), None)?;
    info!("{} for the night", Phase::Idle);

    fetch_tomorrow(analyzer, nordpool, date + Days::new(1),
                   config.price.tomorrow_publish_hour);

    let next_comfort = 24 + window.first.start;
    if analyzer.evening_boost_favorable() {
        info!("{} ahead of an expensive opening tomorrow", Phase::EveningBoost);
        scheduler.monitor_idle_period(analyzer, 22, 23, next_comfort)?;
        let covered = scheduler.boost_capacity(window.first.start + 1);
        scheduler.manage_pre_boost(23, 0, covered)?;
    }
    scheduler.monitor_idle_period(analyzer, 23, 24, next_comfort)?;

    Ok(())
}

/// The workday shape: morning comfort ends mid hour, the afternoon gets
/// its own boost into the second comfort window and dinner gets the
/// dining area preset
fn run_workday<L: ThermostatLink>(config: &Config, analyzer: &PriceAnalyzer,
                                  scheduler: &mut Scheduler<L>,
                                  window: &calendar::ComfortWindow) -> Result<(), WorkerError> {
    scheduler.wait_for_hour(config.hours.workday_morning_end,
                            config.hours.workday_morning_end_minute);
    let idle = scheduler.presets().idle;
    scheduler.controller().apply(&idle, Local::now(), None)?;
    info!("{} until the afternoon", Phase::Idle);

    let afternoon_boost = analyzer.classification().cheapest_afternoon_hour
        .unwrap_or(config.hours.earliest_afternoon_preheat);
    info!("afternoon {} planned for hour {}", Phase::Boost, afternoon_boost);
    scheduler.run_boost_rampup(analyzer, config.hours.workday_morning_end,
                               afternoon_boost, config.hours.workday_afternoon_start)?;

    scheduler.manage_comfort_hours(analyzer, &[config.hours.workday_afternoon_start],
                                   window, false)?;

    scheduler.wait_for_hour(config.hours.dinner_hour, 0);
    let dinner = scheduler.presets().dinner;
    scheduler.controller().apply(&dinner, Local::now(), Some(config.hours.dinner_hour))?;

    let hours: Vec<u32> = (config.hours.dinner_hour + 1..=window.last_hour).collect();
    scheduler.manage_comfort_hours(analyzer, &hours, window, true)
}

/// Makes sure the analyzer holds a curve for 'date': a previously fetched
/// tomorrow curve is promoted, otherwise the feed is asked with one retry.
/// As a last resort a stale curve from a previous day is reused rather
/// than blocking the day on the price feed.
fn ensure_today(analyzer: &mut PriceAnalyzer, nordpool: &NordPool,
                date: NaiveDate) -> Result<(), WorkerError> {
    if analyzer.roll_to(date) {
        return Ok(());
    }

    for attempt in 0..2 {
        match nordpool.get_prices(date) {
            Ok(curve) => {
                analyzer.set_today(curve);
                return Ok(());
            }
            Err(e) if attempt == 0 => warn!("price fetch failed, retrying once: {}", e),
            Err(e) => {
                if analyzer.today().is_some() {
                    warn!("price fetch failed again, planning on a stale curve: {}", e);
                    return Ok(());
                }
                return Err(WorkerError::Price(e));
            }
        }
    }

    Ok(())
}

/// Fetches tomorrow's curve if the market should have published it,
/// leaving the analyzer without one on failure
fn fetch_tomorrow(analyzer: &mut PriceAnalyzer, nordpool: &NordPool,
                  date: NaiveDate, publish_hour: u32) {
    if Local::now().hour() < publish_hour {
        warn!("skipping fetch for {}, not published before hour {}", date, publish_hour);
        return;
    }

    match nordpool.get_prices(date) {
        Ok(curve) => analyzer.set_tomorrow(curve),
        Err(e) => warn!("tomorrow's prices unavailable: {}", e),
    }
}

fn log_classification(analyzer: &PriceAnalyzer) {
    let c = analyzer.classification();
    info!("classification: morning boost {:?}, afternoon boost {:?}, \
           {} reasonable, {} preheat favorable, reduced comfort {:?}",
          c.cheapest_morning_hour, c.cheapest_afternoon_hour,
          c.reasonably_priced.len(), c.preheat_favorable.len(), c.reduced_comfort);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_midnight_lands_on_midnight() {
        let midnight = Local.with_ymd_and_hms(2026, 3, 28, 0, 0, 0).unwrap();
        let next = next_midnight(midnight);

        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 29).unwrap());
        assert_eq!(next.time(), NaiveTime::MIN);

        // DST spring transition day still rolls to a real midnight
        let after = next_midnight(next);
        assert_eq!(after.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 30).unwrap());
        assert_eq!(after.time(), NaiveTime::MIN);
    }

    #[test]
    fn local_midnight_truncates() {
        let now = Local.with_ymd_and_hms(2026, 1, 20, 14, 25, 40).unwrap();
        let midnight = local_midnight(now);
        assert_eq!(midnight.date_naive(), now.date_naive());
        assert_eq!(midnight.time(), NaiveTime::MIN);
    }
}
