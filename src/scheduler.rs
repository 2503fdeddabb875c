use std::fmt;
use std::fmt::Formatter;
use std::thread;
use chrono::{DateTime, Duration, Local, NaiveTime};
use log::info;
use crate::calendar::ComfortWindow;
use crate::config::{SafetyParameters, TempParameters};
use crate::controller::{Controller, FanLevel, HorizontalSwing, Mode, Swing, ThermostatCommand};
use crate::errors::{ConfigError, WorkerError};
use crate::heater::ThermalPerformanceModel;
use crate::manager_sensibo::ThermostatLink;
use crate::prices::PriceAnalyzer;
use crate::temperature::TemperatureProvider;

/// Decision sample minutes within an hour
const SAMPLE_MINUTES: [u32; 6] = [9, 19, 29, 39, 49, 59];
/// Seconds past the minute each wake point aims at, letting feeds settle
/// their hour boundary first
const WAKE_SECOND: i64 = 35;

const EXTRA_OFFSET: i64 = 1;
const NORMAL_OFFSET: i64 = 0;
const REDUCED_OFFSET: i64 = -1;

/// The control loop phases, in daily order
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Idle,
    Preboost,
    Boost,
    Rampdown,
    Comfort,
    Rampout,
    EveningBoost,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            Phase::Idle => "idle",
            Phase::Preboost => "preboost",
            Phase::Boost => "boost",
            Phase::Rampdown => "rampdown",
            Phase::Comfort => "comfort",
            Phase::Rampout => "rampout",
            Phase::EveningBoost => "evening boost",
        };
        write!(f, "{}", text)
    }
}

/// The fixed command presets the scheduler picks between, built once
/// from configuration
pub struct Presets {
    pub idle: ThermostatCommand,
    pub comfort: ThermostatCommand,
    pub high: ThermostatCommand,
    pub dinner: ThermostatCommand,
}

impl Presets {
    /// Builds the presets from the configured target temperatures
    ///
    /// # Arguments
    ///
    /// * 'temps' - configured temperature parameters
    pub fn from_config(temps: &TempParameters) -> Result<Presets, ConfigError> {
        Ok(Presets {
            idle: ThermostatCommand::new(temps.idle_target, Mode::Heat, FanLevel::MediumHigh,
                                         Swing::FixedTop, HorizontalSwing::FixedCenterLeft)?,
            comfort: ThermostatCommand::new(temps.comfort_target, Mode::Heat, FanLevel::MediumHigh,
                                            Swing::FixedTop, HorizontalSwing::FixedCenterLeft)?,
            high: ThermostatCommand::new(temps.high_target, Mode::Heat, FanLevel::High,
                                         Swing::FixedTop, HorizontalSwing::FixedLeft)?,
            dinner: ThermostatCommand::new(temps.dinner_target, Mode::Heat, FanLevel::MediumHigh,
                                           Swing::FixedMiddle, HorizontalSwing::FixedCenterRight)?,
        })
    }
}

/// Sample minutes of the given hour that have not yet passed. A restart
/// in the middle of an hour resumes at the next sample instead of
/// replaying the elapsed ones.
///
/// # Arguments
///
/// * 'now' - current local time
/// * 'midnight' - the running day's local midnight
/// * 'hour' - the hour being sampled
pub fn remaining_slots(now: DateTime<Local>, midnight: DateTime<Local>, hour: u32) -> Vec<u32> {
    SAMPLE_MINUTES.iter()
        .copied()
        .filter(|&m| slot_time(midnight, hour, m) > now)
        .collect()
}

/// Absolute wake timestamp for an hour and minute of the running day
fn slot_time(midnight: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    midnight + Duration::hours(hour as i64) + Duration::minutes(minute as i64)
        + Duration::seconds(WAKE_SECOND)
}

/// Sleeps until the given absolute point in time, returning directly if
/// it already passed
fn wait_until(target: DateTime<Local>) {
    if let Ok(remaining) = (target - Local::now()).to_std() {
        thread::sleep(remaining);
    }
}

/// The control loop state machine for one managed air handler.
///
/// Owns the actuator, the temperature provider and the thermal model.
/// The day ahead price analyzer is borrowed per phase since the daily
/// cycle around it refreshes curves between phases. All transitions are
/// wall clock driven, the phase methods sleep to absolute timestamps
/// computed from the running day's local midnight.
pub struct Scheduler<L: ThermostatLink> {
    temps: TempParameters,
    safety: SafetyParameters,
    presets: Presets,
    provider: TemperatureProvider,
    model: ThermalPerformanceModel,
    controller: Controller<L>,
    midnight: DateTime<Local>,
    distribution_active: bool,
    days_since_safety: u32,
    safety_boost_today: bool,
}

impl<L: ThermostatLink> Scheduler<L> {
    pub fn new(temps: TempParameters, safety: SafetyParameters, presets: Presets,
               provider: TemperatureProvider, model: ThermalPerformanceModel,
               controller: Controller<L>) -> Scheduler<L> {
        Scheduler {
            temps,
            safety,
            presets,
            provider,
            model,
            controller,
            midnight: Local::now().with_time(NaiveTime::MIN).earliest().unwrap_or_else(Local::now),
            distribution_active: false,
            days_since_safety: 0,
            safety_boost_today: false,
        }
    }

    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    pub fn controller(&mut self) -> &mut Controller<L> {
        &mut self.controller
    }

    /// Opens a new day cycle anchored at the given local midnight and
    /// advances the safety floor counter
    ///
    /// # Arguments
    ///
    /// * 'midnight' - local midnight of the day to run
    pub fn start_day(&mut self, midnight: DateTime<Local>) {
        self.midnight = midnight;
        self.distribution_active = false;
        self.days_since_safety += 1;
        self.safety_boost_today = self.days_since_safety > self.safety.interval_days;
        if self.safety_boost_today {
            info!("safety floor boost due, {} days since last", self.days_since_safety);
        }
    }

    /// Sleeps until hour:minute of the running day, returning directly
    /// if that point already passed
    pub fn wait_for_hour(&self, hour: u32, minute: u32) {
        wait_until(slot_time(self.midnight, hour, minute));
    }

    fn indoor(&mut self, now: DateTime<Local>) -> f64 {
        let comfort = self.temps.comfort;
        self.provider.indoor(now).unwrap_or(comfort)
    }

    fn outdoor(&mut self, now: DateTime<Local>) -> f64 {
        let limit = self.temps.heatpump_limit;
        self.provider.outdoor(now).unwrap_or(limit)
    }

    /// Highest indoor temperature accepted before switching to heat
    /// distribution, anchored at the last requested target
    fn allowed_over_temperature(&self) -> f64 {
        let requested = self.controller.last_requested_target()
            .unwrap_or(self.temps.idle_target) as f64;
        let limit = requested.max(self.temps.comfort) + self.temps.max_over;

        limit.min(self.presets.high.target_temperature() as f64)
    }

    /// Command for an hour where the floor sensor runs too hot.
    ///
    /// The first decision after crossing the limit re-applies comfort
    /// (raised when it is cold out) so the appliance has a sane state to
    /// restore to, every following decision runs fan only distribution
    /// with the fan stepped up the colder it gets.
    fn over_temperature_command(&mut self, now: DateTime<Local>) -> ThermostatCommand {
        let outdoor = self.outdoor(now);

        if !self.distribution_active {
            self.distribution_active = true;
            return if outdoor < self.temps.cold_outdoor {
                self.presets.comfort.with_offset(self.temps.comfort_plus_delta)
            } else {
                self.presets.comfort
            };
        }

        let fan = if outdoor < self.temps.heatpump_limit {
            FanLevel::High
        } else if outdoor < self.temps.cold_outdoor {
            FanLevel::MediumHigh
        } else {
            FanLevel::Medium
        };

        self.presets.idle
            .with_mode(Mode::Fan)
            .with_fan(fan)
            .with_horizontal_swing(HorizontalSwing::FixedLeft)
    }

    /// Comfort command for cold outdoor temperatures: the high heat
    /// preset, pushed further in extreme cold and eased off in the band
    /// where resistive backup heating would kick in for no price reason
    fn cold_comfort_command(&self, outdoor: f64, favorable: bool) -> ThermostatCommand {
        let offset = if outdoor < self.temps.extreme_cold {
            EXTRA_OFFSET
        } else if outdoor > self.temps.heatpump_limit && !favorable {
            REDUCED_OFFSET
        } else {
            NORMAL_OFFSET
        };

        self.presets.high.with_offset(offset)
    }

    /// Comfort command when the floor sensor sits below the comfort
    /// floor, sized by how far below and whether the hour is one worth
    /// buying extra heat in
    fn comfort_boost_command(&self, analyzer: &PriceAnalyzer, hour: u32,
                             distance: f64) -> ThermostatCommand {
        let favorable = analyzer.is_hour_preheat_favorable(hour);

        if distance > self.temps.hysteresis {
            if favorable {
                self.presets.high
            } else {
                self.presets.comfort.with_offset(self.temps.comfort_plus_delta)
            }
        } else if favorable {
            self.presets.comfort.with_offset(self.temps.comfort_plus_delta)
        } else {
            self.presets.comfort.with_offset(EXTRA_OFFSET)
        }
    }

    /// Command for the last comfort hour, gliding back down instead of
    /// holding full comfort into the idle night
    fn rampout_command(&self, indoor: f64) -> ThermostatCommand {
        if indoor > self.temps.comfort {
            self.presets.comfort.with_offset(REDUCED_OFFSET)
        } else {
            self.presets.comfort
        }
    }

    /// One comfort phase decision, the ladder every sample minute of a
    /// comfort hour walks through
    ///
    /// # Arguments
    ///
    /// * 'analyzer' - the day's prepared price analyzer
    /// * 'hour' - the comfort hour being sampled
    /// * 'minute' - the sample minute, the last one allows price trims
    /// * 'is_last' - true during the day's final comfort hour
    /// * 'window' - the day's comfort window
    /// * 'now' - current local time
    pub fn comfort_command(&mut self, analyzer: &PriceAnalyzer, hour: u32, minute: u32,
                           is_last: bool, window: &ComfortWindow,
                           now: DateTime<Local>) -> ThermostatCommand {
        let indoor = self.indoor(now);
        let outdoor = self.outdoor(now);
        let favorable = analyzer.is_hour_reasonably_priced(hour)
            || (minute == 59 && analyzer.is_hour_preheat_favorable(hour));

        if indoor < self.allowed_over_temperature() {
            self.distribution_active = false;
        }

        if self.safety_boost_today && hour == window.first.start {
            return self.presets.high.with_target(self.safety.temperature);
        }

        if outdoor >= self.temps.comfort {
            self.presets.idle
        } else if is_last {
            self.rampout_command(indoor)
        } else if indoor >= self.allowed_over_temperature() {
            self.over_temperature_command(now)
        } else if outdoor > self.temps.heatpump_limit && analyzer.is_hour_with_reduced_comfort(hour) {
            self.presets.comfort.with_offset(REDUCED_OFFSET)
        } else if outdoor < self.temps.cold_outdoor {
            self.cold_comfort_command(outdoor, favorable)
        } else if minute == 59 && analyzer.is_next_hour_cheaper(hour) {
            self.presets.comfort.with_offset(REDUCED_OFFSET)
        } else if indoor < self.temps.comfort {
            self.comfort_boost_command(analyzer, hour, self.temps.comfort - indoor)
        } else if favorable {
            self.presets.comfort.with_offset(self.temps.comfort_plus_delta)
        } else {
            self.presets.comfort
        }
    }

    /// Rampdown command gliding towards comfort: aim below the comfort
    /// target by what the heater can still recover in the remaining hours
    ///
    /// # Arguments
    ///
    /// * 'hours_remaining' - hours until the comfort window opens
    /// * 'offset' - extra degrees of undershoot allowed
    /// * 'now' - current local time
    pub fn rampup_command(&mut self, hours_remaining: u32, offset: f64,
                          now: DateTime<Local>) -> ThermostatCommand {
        let outdoor = self.outdoor(now);
        let recoverable = self.model.boost_degrees(outdoor, hours_remaining) + offset;
        let target = (self.presets.comfort.target_temperature() as f64 - recoverable).ceil() as i64;

        if target <= self.presets.idle.target_temperature() {
            return self.presets.idle;
        }

        let base = if outdoor > self.temps.cold_outdoor {
            self.presets.comfort
        } else {
            self.presets.high
        };

        base.with_target(target)
    }

    /// Boost command for one pre boost hour: high heat lowered by the
    /// capacity already covered by the remaining boost hours, floored at
    /// the idle target
    fn pre_boost_command(&self, offset: i64, covered_capacity: f64) -> ThermostatCommand {
        let target = (self.presets.high.target_temperature() as f64
            + offset as f64 - covered_capacity).ceil() as i64;

        if target <= self.presets.idle.target_temperature() {
            self.presets.idle
        } else {
            self.presets.high.with_target(target)
        }
    }

    /// First hour the pre boost must start for the allowed number of
    /// degrees to be reachable by 'boost_hour', never before 'idle_start'
    ///
    /// # Arguments
    ///
    /// * 'allowed_degrees' - degrees of boost the building should take on
    /// * 'degrees_per_hour' - boost capacity of one heating hour
    /// * 'boost_hour' - the planned cheapest boost hour
    /// * 'idle_start' - first hour of the surrounding idle period
    pub fn preboost_start(allowed_degrees: f64, degrees_per_hour: f64,
                          boost_hour: u32, idle_start: u32) -> u32 {
        let mut capacity = 0.0;
        let mut start = boost_hour;

        while capacity < allowed_degrees {
            capacity += degrees_per_hour;
            if start <= idle_start {
                return idle_start;
            }
            start -= 1;
        }

        start
    }

    /// Degrees of boost the building can take on over the given number of
    /// hours at the current outdoor temperature
    pub fn boost_capacity(&mut self, hours: u32) -> f64 {
        let now = Local::now();
        let outdoor = self.outdoor(now);
        self.model.boost_degrees(outdoor, hours)
    }

    /// Current leakage fraction of heat bought one hour early, feeding the
    /// price analyzer's early consumption penalty
    pub fn leak_fraction(&mut self) -> f64 {
        let now = Local::now();
        let indoor = self.indoor(now);
        let outdoor = self.outdoor(now);
        let delta = self.temps.comfort_plus_delta as f64;

        self.model.heat_loss_fraction(indoor, outdoor, delta)
    }

    /// COP at the current outdoor temperature and at the forecast for the
    /// given hour of the running day, used to weigh heating now against
    /// heating then
    fn cop_now_and_at(&mut self, now: DateTime<Local>, hour: u32) -> (f64, f64) {
        let outdoor = self.outdoor(now);
        let at = self.midnight + Duration::hours(hour as i64);
        let forecast = self.provider.forecast(now, at).unwrap_or(outdoor);

        (self.model.cop(outdoor), self.model.cop(forecast))
    }

    /// Runs the idle/preboost/boost/rampdown phases leading into a comfort
    /// window.
    ///
    /// Each hour from 'idle_start' through 'boost_hour' either keeps
    /// monitoring idle or boosts, depending on how many hours of heating
    /// the wanted boost needs and whether long term preheating is priced
    /// favorably. After the boost the remaining hours glide down to the
    /// comfort target.
    ///
    /// # Arguments
    ///
    /// * 'analyzer' - the day's prepared price analyzer
    /// * 'idle_start' - first idle hour
    /// * 'boost_hour' - effectively cheapest hour to boost in
    /// * 'comfort_start' - the hour comfort must be reached by
    pub fn run_boost_rampup(&mut self, analyzer: &PriceAnalyzer, idle_start: u32,
                            boost_hour: u32, comfort_start: u32) -> Result<(), WorkerError> {
        let mut was_extra_boosting = false;
        self.wait_for_hour(idle_start, 0);

        for hour in idle_start..=boost_hour {
            let now = Local::now();
            let (cop_now, cop_comfort) = self.cop_now_and_at(now, comfort_start);
            let (_, cop_later) = self.cop_now_and_at(now, comfort_start + 1);

            let comfort_favorable = analyzer.is_longterm_preheat_favorable(
                hour, comfort_start, cop_now, cop_comfort);
            let future_favorable = analyzer.is_longterm_preheat_favorable(
                hour, comfort_start + 1, cop_now, cop_later)
                || analyzer.is_longterm_preheat_favorable(
                    hour, comfort_start + 2, cop_now, cop_later);

            let mut allowed_degrees = self.temps.comfort - self.indoor(now);
            if comfort_favorable || future_favorable {
                allowed_degrees += self.temps.comfort_plus_delta as f64;
            }

            let outdoor = self.outdoor(now);
            let per_hour = self.model.boost_degrees(outdoor, 1);
            let start = Self::preboost_start(allowed_degrees, per_hour, boost_hour, idle_start);

            if hour < start {
                self.monitor_idle_period(analyzer, hour, hour + 1, comfort_start)?;
                continue;
            }

            let offset = if comfort_favorable && future_favorable {
                was_extra_boosting = true;
                EXTRA_OFFSET
            } else if analyzer.is_hour_preheat_favorable(hour)
                || comfort_favorable
                || future_favorable
                || outdoor < self.temps.cold_outdoor
                || was_extra_boosting {
                was_extra_boosting = false;
                NORMAL_OFFSET
            } else {
                was_extra_boosting = false;
                REDUCED_OFFSET
            };

            info!("{} hour {}, offset {}", Phase::Preboost, hour, offset);
            let covered = self.model.boost_degrees(outdoor, comfort_start - hour);
            self.manage_pre_boost(hour, offset, covered)?;
        }

        self.wait_for_hour(boost_hour, 0);
        info!("{} towards comfort hour {}", Phase::Rampdown, comfort_start);
        self.monitor_idle_period(analyzer, boost_hour + 1, comfort_start, comfort_start)?;

        Ok(())
    }

    /// Monitors an idle period, keeping the over temperature guard active
    /// and gliding towards the upcoming comfort hour
    ///
    /// # Arguments
    ///
    /// * 'analyzer' - the day's prepared price analyzer
    /// * 'idle_start' - first hour of the period
    /// * 'idle_end' - exclusive end hour of the period
    /// * 'comfort_start' - the comfort hour the period leads into, may lie
    ///   in the next day (24 and above)
    pub fn monitor_idle_period(&mut self, analyzer: &PriceAnalyzer, idle_start: u32,
                               idle_end: u32, comfort_start: u32) -> Result<(), WorkerError> {
        if idle_start >= idle_end {
            self.wait_for_hour(idle_start, 0);
            return Ok(());
        }

        for hour in idle_start..idle_end {
            for minute in remaining_slots(Local::now(), self.midnight, hour) {
                let now = Local::now();
                let indoor = self.indoor(now);

                let command = if indoor >= self.allowed_over_temperature() {
                    self.over_temperature_command(now)
                } else {
                    self.distribution_active = false;
                    let ends_in_comfort = idle_end == comfort_start;
                    let (cop_now, cop_then) = self.cop_now_and_at(now, comfort_start);

                    if ends_in_comfort && analyzer.is_longterm_preheat_favorable(
                        hour, comfort_start, cop_now, cop_then) {
                        self.presets.high
                    } else {
                        let offset = if ends_in_comfort { 0.0 } else { self.temps.hysteresis };
                        self.rampup_command(comfort_start - hour, offset, now)
                    }
                };

                self.controller.apply(&command, now, Some(hour % 24))?;
                self.wait_for_hour(hour, minute);
            }
        }

        Ok(())
    }

    /// Runs one pre boost hour at its sample minutes
    ///
    /// # Arguments
    ///
    /// * 'hour' - the hour to boost in
    /// * 'offset' - boost target offset from the favorability weighing
    /// * 'covered_capacity' - degrees the remaining boost hours cover
    pub fn manage_pre_boost(&mut self, hour: u32, offset: i64,
                            covered_capacity: f64) -> Result<(), WorkerError> {
        self.wait_for_hour(hour, 0);

        for minute in remaining_slots(Local::now(), self.midnight, hour) {
            let now = Local::now();

            let command = if self.indoor(now) >= self.allowed_over_temperature() {
                self.presets.comfort
            } else {
                self.pre_boost_command(offset, covered_capacity)
            };

            self.controller.apply(&command, now, Some(hour % 24))?;
            self.wait_for_hour(hour, minute);
        }

        Ok(())
    }

    /// Runs a stretch of comfort hours at their sample minutes
    ///
    /// # Arguments
    ///
    /// * 'analyzer' - the day's prepared price analyzer
    /// * 'hours' - the comfort hours to hold
    /// * 'window' - the day's comfort window
    /// * 'rampout_last' - glide out during the final hour of 'hours'
    pub fn manage_comfort_hours(&mut self, analyzer: &PriceAnalyzer, hours: &[u32],
                                window: &ComfortWindow, rampout_last: bool) -> Result<(), WorkerError> {
        for &hour in hours {
            self.wait_for_hour(hour, 0);
            let is_last = rampout_last && hour == *hours.last().unwrap_or(&hour);
            if is_last {
                info!("{} during hour {}", Phase::Rampout, hour);
            }

            for minute in remaining_slots(Local::now(), self.midnight, hour) {
                let now = Local::now();
                let command = self.comfort_command(analyzer, hour, minute, is_last, window, now);
                self.controller.apply(&command, now, Some(hour))?;
                self.wait_for_hour(hour, minute);
            }

            if self.safety_boost_today && hour == window.first.start {
                self.safety_boost_today = false;
                self.days_since_safety = 0;
                info!("safety floor boost completed");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Duration as StdDuration;
    use chrono::TimeZone;
    use serde_json::Value;
    use crate::config::PriceParameters;
    use crate::errors::{ActuatorError, WeatherError};
    use crate::heater::CalibrationPoint;
    use crate::manager_smhi::{ForecastFeed, ForecastPoint};
    use crate::manager_temperature::OutdoorFeed;
    use crate::prices::{DayPriceCurve, PricePoint};

    struct StubLink;

    impl ThermostatLink for StubLink {
        fn set_property(&self, _name: &str, _value: &Value) -> Result<(), ActuatorError> {
            Ok(())
        }

        fn read_temperature(&self) -> Result<f64, ActuatorError> {
            Ok(20.0)
        }
    }

    struct FixedThermostat {
        indoor: Rc<Cell<f64>>,
    }

    impl ThermostatLink for FixedThermostat {
        fn set_property(&self, _name: &str, _value: &Value) -> Result<(), ActuatorError> {
            Ok(())
        }

        fn read_temperature(&self) -> Result<f64, ActuatorError> {
            Ok(self.indoor.get())
        }
    }

    struct FixedOutdoor {
        outdoor: Rc<Cell<f64>>,
    }

    impl OutdoorFeed for FixedOutdoor {
        fn read(&self) -> Result<f64, WeatherError> {
            Ok(self.outdoor.get())
        }
    }

    struct NoForecast;

    impl ForecastFeed for NoForecast {
        fn fetch(&self) -> Result<Vec<ForecastPoint>, WeatherError> {
            Ok(Vec::new())
        }
    }

    struct Rig {
        indoor: Rc<Cell<f64>>,
        outdoor: Rc<Cell<f64>>,
        scheduler: Scheduler<StubLink>,
    }

    fn temps() -> TempParameters {
        TempParameters {
            comfort: 20.0,
            idle_target: 17,
            comfort_target: 20,
            high_target: 22,
            dinner_target: 21,
            max_over: 0.5,
            hysteresis: 0.75,
            comfort_plus_delta: 2,
            cold_outdoor: -0.5,
            heatpump_limit: -4.5,
            extreme_cold: -8.0,
        }
    }

    fn rig() -> Rig {
        let indoor = Rc::new(Cell::new(20.0));
        let outdoor = Rc::new(Cell::new(5.0));

        let provider = TemperatureProvider::new(
            Box::new(FixedThermostat { indoor: indoor.clone() }),
            vec![Box::new(FixedOutdoor { outdoor: outdoor.clone() })],
            Box::new(NoForecast),
            0, 0.0);

        let table = vec![
            CalibrationPoint { outdoor: -15.0, watts: 4300.0, cop: 1.8 },
            CalibrationPoint { outdoor: -7.0, watts: 5200.0, cop: 2.1 },
            CalibrationPoint { outdoor: 2.0, watts: 5600.0, cop: 2.8 },
            CalibrationPoint { outdoor: 7.0, watts: 6600.0, cop: 3.6 },
        ];
        let model = ThermalPerformanceModel::new(table, 193.0, 3000.0, 20.0);

        let temps = temps();
        let presets = Presets::from_config(&temps).unwrap();
        let safety = SafetyParameters { interval_days: 14, temperature: 27 };
        let controller = Controller::new(StubLink, StdDuration::from_millis(0));

        let mut scheduler = Scheduler::new(temps, safety, presets, provider, model, controller);
        scheduler.midnight = Local.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap();

        Rig { indoor, outdoor, scheduler }
    }

    fn analyzer_with(values: &[f64; 24]) -> PriceAnalyzer {
        let params = PriceParameters {
            transfer_and_tax: 634.0,
            reasonable_ceiling: 750.0,
            reasonable_margin: 600.0,
            cheap_floor: 300.0,
            reduce_comfort_ceiling: 5500.0,
            tomorrow_publish_hour: 13,
        };
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let points = values.iter().enumerate().map(|(h, &value)| PricePoint {
            start: date.and_hms_opt(h as u32, 0, 0).unwrap()
                .and_local_timezone(Local).unwrap(),
            value,
        }).collect();

        let mut analyzer = PriceAnalyzer::new(params);
        analyzer.set_today(DayPriceCurve::new(date, points));
        analyzer.prepare_day(&window(), 6, (11, 14), 0.05);
        analyzer
    }

    fn window() -> ComfortWindow {
        ComfortWindow { first: 6..8, second: Some(16..22), last_hour: 22 }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 20, 17, 9, 35).unwrap()
    }

    #[test]
    fn mild_weather_idles() {
        let mut r = rig();
        r.outdoor.set(21.0);
        let analyzer = analyzer_with(&[500.0; 24]);

        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd, r.scheduler.presets.idle);
    }

    #[test]
    fn reasonable_hour_holds_comfort_plus() {
        let mut r = rig();
        let analyzer = analyzer_with(&[500.0; 24]);

        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 22);
    }

    #[test]
    fn expensive_hour_holds_plain_comfort() {
        let mut r = rig();
        let mut values = [500.0; 24];
        values[17] = 3000.0;
        values[18] = 3000.0;
        let analyzer = analyzer_with(&values);

        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd, r.scheduler.presets.comfort);
    }

    #[test]
    fn reduced_comfort_hour_trims_one_degree() {
        let mut r = rig();
        let mut values = [500.0; 24];
        values[17] = 6000.0;
        let analyzer = analyzer_with(&values);

        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 19);
    }

    #[test]
    fn cold_weather_escalates_high_heat() {
        let mut r = rig();
        let analyzer = analyzer_with(&[500.0; 24]);

        r.outdoor.set(-2.0);
        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 22);

        r.outdoor.set(-10.0);
        let cmd = r.scheduler.comfort_command(&analyzer, 17, 19, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 23);
    }

    #[test]
    fn last_sample_trims_when_next_hour_cheaper() {
        let mut r = rig();
        let mut values = [500.0; 24];
        values[17] = 700.0;
        values[18] = 400.0;
        let analyzer = analyzer_with(&values);

        let cmd = r.scheduler.comfort_command(&analyzer, 17, 59, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 19);

        let cmd = r.scheduler.comfort_command(&analyzer, 17, 29, false, &window(), now());
        assert!(cmd.target_temperature() >= 20);
    }

    #[test]
    fn below_comfort_boosts_with_hysteresis() {
        let analyzer = analyzer_with(&[2000.0; 24]);

        // Just under comfort, inside the hysteresis band
        let mut r = rig();
        r.indoor.set(19.5);
        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 21);

        // Far below, full boost
        let mut r2 = rig();
        r2.indoor.set(18.0);
        let cmd = r2.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 22);
    }

    #[test]
    fn rampout_on_last_comfort_hour() {
        let mut r = rig();
        let analyzer = analyzer_with(&[500.0; 24]);

        r.indoor.set(21.0);
        let cmd = r.scheduler.comfort_command(&analyzer, 22, 9, true, &window(), now());
        assert_eq!(cmd.target_temperature(), 19);

        let mut r2 = rig();
        r2.indoor.set(19.8);
        let cmd = r2.scheduler.comfort_command(&analyzer, 22, 9, true, &window(), now());
        assert_eq!(cmd.target_temperature(), 20);
    }

    #[test]
    fn over_temperature_two_step_distribution() {
        let mut r = rig();
        r.indoor.set(25.0);
        let analyzer = analyzer_with(&[500.0; 24]);

        // First decision restores comfort and arms distribution
        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert_eq!(cmd, r.scheduler.presets.comfort);

        // Next decision distributes with fan only
        let cmd = r.scheduler.comfort_command(&analyzer, 17, 19, false, &window(), now());
        assert_ne!(cmd, r.scheduler.presets.comfort);

        // Cooling back down disarms distribution
        r.indoor.set(20.0);
        r.scheduler.provider = TemperatureProvider::new(
            Box::new(FixedThermostat { indoor: r.indoor.clone() }),
            vec![Box::new(FixedOutdoor { outdoor: r.outdoor.clone() })],
            Box::new(NoForecast), 0, 0.0);
        r.scheduler.comfort_command(&analyzer, 17, 29, false, &window(), now());
        assert!(!r.scheduler.distribution_active);
    }

    #[test]
    fn safety_floor_forces_first_comfort_hour() {
        let mut r = rig();
        let analyzer = analyzer_with(&[500.0; 24]);

        r.scheduler.days_since_safety = 14;
        r.scheduler.start_day(r.scheduler.midnight);
        assert!(r.scheduler.safety_boost_today);

        let cmd = r.scheduler.comfort_command(&analyzer, 6, 9, false, &window(), now());
        assert_eq!(cmd.target_temperature(), 27);

        // Other hours are unaffected
        let cmd = r.scheduler.comfort_command(&analyzer, 17, 9, false, &window(), now());
        assert!(cmd.target_temperature() <= 22);
    }

    #[test]
    fn rampup_aims_below_comfort_by_recoverable_degrees() {
        let mut r = rig();
        r.outdoor.set(0.0);

        // One hour out: little recovery time, stay near comfort
        let close = r.scheduler.rampup_command(1, 0.0, now());
        // Many hours out: plenty of recovery time, park at idle
        let far = r.scheduler.rampup_command(8, 0.0, now());

        assert!(close.target_temperature() > far.target_temperature());
        assert_eq!(far, r.scheduler.presets.idle);
    }

    #[test]
    fn preboost_start_accumulates_hours() {
        // 1.2 degrees per hour, 3 degrees wanted: three hours before the boost hour
        assert_eq!(Scheduler::<StubLink>::preboost_start(3.0, 1.2, 5, 0), 2);
        // Zero wanted: start at the boost hour itself
        assert_eq!(Scheduler::<StubLink>::preboost_start(0.0, 1.2, 5, 0), 5);
        // Never earlier than the idle start
        assert_eq!(Scheduler::<StubLink>::preboost_start(50.0, 1.2, 5, 3), 3);
    }

    #[test]
    fn pre_boost_target_floors_at_idle() {
        let r = rig();
        let strong = r.scheduler.pre_boost_command(0, 0.5);
        assert_eq!(strong.target_temperature(), 22);

        let covered = r.scheduler.pre_boost_command(0, 10.0);
        assert_eq!(covered, r.scheduler.presets.idle);
    }

    #[test]
    fn elapsed_sample_slots_are_skipped() {
        let midnight = Local.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap();

        let mid_hour = Local.with_ymd_and_hms(2026, 1, 20, 14, 25, 0).unwrap();
        assert_eq!(remaining_slots(mid_hour, midnight, 14), vec![29, 39, 49, 59]);
        assert!(remaining_slots(mid_hour, midnight, 12).is_empty());
        assert_eq!(remaining_slots(mid_hour, midnight, 16).len(), 6);
    }

    #[test]
    fn allowed_over_temperature_tracks_last_target_and_caps_at_high() {
        let mut r = rig();

        // Nothing applied yet: anchored at the comfort floor
        assert_eq!(r.scheduler.allowed_over_temperature(), 20.5);

        let high = r.scheduler.presets.high;
        r.scheduler.controller.apply(&high, now(), None).unwrap();
        assert_eq!(r.scheduler.allowed_over_temperature(), 22.0);
    }
}
