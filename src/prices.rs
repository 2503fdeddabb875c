use chrono::{DateTime, Local, NaiveDate};
use log::warn;
use crate::calendar::ComfortWindow;
use crate::config::PriceParameters;

/// One delivery hour of the day ahead price curve, price in SEK/MWh
#[derive(Clone, Copy, Debug)]
pub struct PricePoint {
    pub start: DateTime<Local>,
    pub value: f64,
}

/// Day ahead prices for one local day, immutable once fetched.
///
/// Normally 24 points, DST transition days legitimately hold 23 or 25.
/// Lookups by hour index clamp to the last point instead of indexing
/// out of range.
#[derive(Clone, Debug)]
pub struct DayPriceCurve {
    date: NaiveDate,
    points: Vec<PricePoint>,
}

impl DayPriceCurve {
    pub fn new(date: NaiveDate, points: Vec<PricePoint>) -> DayPriceCurve {
        DayPriceCurve { date, points }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn n_hours(&self) -> u32 {
        self.points.len() as u32
    }

    /// Price for the given hour index, clamped to the last delivery hour
    pub fn value(&self, hour: u32) -> f64 {
        let idx = (hour as usize).min(self.points.len() - 1);
        self.points[idx].value
    }

    fn lowest(&self) -> f64 {
        self.points.iter().fold(f64::MAX, |acc, p| acc.min(p.value))
    }
}

/// Derived per day classification of the price curve
#[derive(Clone, Debug, Default)]
pub struct PriceClassification {
    pub cheapest_morning_hour: Option<u32>,
    pub cheapest_afternoon_hour: Option<u32>,
    pub reasonably_priced: Vec<u32>,
    pub preheat_favorable: Vec<u32>,
    pub reduced_comfort: Vec<u32>,
}

/// Classifies a day's price curve into the hour sets the scheduler acts on.
///
/// Holds today's (required) and tomorrow's (optional) curves plus the
/// classification computed once per local day.
pub struct PriceAnalyzer {
    params: PriceParameters,
    today: Option<DayPriceCurve>,
    tomorrow: Option<DayPriceCurve>,
    leak_fraction: f64,
    classification: PriceClassification,
}

impl PriceAnalyzer {
    pub fn new(params: PriceParameters) -> PriceAnalyzer {
        PriceAnalyzer {
            params,
            today: None,
            tomorrow: None,
            leak_fraction: 0.0,
            classification: PriceClassification::default(),
        }
    }

    pub fn today(&self) -> Option<&DayPriceCurve> {
        self.today.as_ref()
    }

    pub fn tomorrow(&self) -> Option<&DayPriceCurve> {
        self.tomorrow.as_ref()
    }

    pub fn classification(&self) -> &PriceClassification {
        &self.classification
    }

    /// Installs today's curve, keeping any previously fetched tomorrow
    /// curve if it matches the new date (normal midnight rollover)
    pub fn set_today(&mut self, curve: DayPriceCurve) {
        if self.tomorrow.as_ref().is_some_and(|t| t.date() != curve.date()) {
            self.tomorrow = None;
        }
        self.today = Some(curve);
    }

    /// Promotes a previously fetched tomorrow curve to today, returns
    /// false if no curve for the date is held
    pub fn roll_to(&mut self, date: NaiveDate) -> bool {
        if self.tomorrow.as_ref().is_some_and(|t| t.date() == date) {
            self.today = self.tomorrow.take();
            true
        } else if self.today.as_ref().is_some_and(|t| t.date() == date) {
            true
        } else {
            false
        }
    }

    pub fn set_tomorrow(&mut self, curve: DayPriceCurve) {
        self.tomorrow = Some(curve);
    }

    /// Full cost of one MWh consumed at spot price 'price'
    pub fn cost(&self, price: f64) -> f64 {
        price + self.params.transfer_and_tax
    }

    /// Full cost of one MWh consumed 'hours_early' hours before it is
    /// needed, inflated by the heat leakage accumulated while waiting.
    /// Monotonically non-decreasing in 'hours_early'.
    pub fn cost_early(&self, price: f64, hours_early: u32) -> f64 {
        self.cost(price) * (1.0 + self.leak_fraction * hours_early as f64)
    }

    /// Computes the day's classification in one linear pass over the curve.
    /// Must run before any comfort phase decision consumes the sets.
    ///
    /// # Arguments
    ///
    /// * 'window' - the day's comfort window
    /// * 'morning_end' - exclusive end of the morning boost search window
    /// * 'afternoon' - inclusive (start, end) of the afternoon boost search window
    /// * 'leak_fraction' - extra leakage per hour of early heating, from the thermal model
    pub fn prepare_day(&mut self, window: &ComfortWindow, morning_end: u32,
                       afternoon: (u32, u32), leak_fraction: f64) {
        self.leak_fraction = leak_fraction;

        let Some(today) = self.today.as_ref() else {
            warn!("no price curve available, keeping previous classification");
            return;
        };

        let n = today.n_hours();
        let lowest = today.lowest();

        let mut reasonably_priced: Vec<u32> = Vec::new();
        let mut preheat_favorable: Vec<u32> = Vec::new();

        for hour in 0..n {
            let price = today.value(hour);

            // Reasonably priced: within the absolute ceiling or the relative
            // margin over the day's minimum, and either not increasing into
            // the next hour (the last hour has no next hour and counts as
            // non-increasing) or not directly after an already qualified
            // hour, or outright cheap. The disjunction keeps single hours
            // around spikes from flickering in and out.
            let in_band = price <= lowest + self.params.reasonable_margin
                || price <= self.params.reasonable_ceiling;
            if in_band {
                let non_increasing = hour + 1 >= n || price <= today.value(hour + 1);
                let after_gap = hour == 0 || !reasonably_priced.contains(&(hour - 1));
                if non_increasing || after_gap || price <= self.params.cheap_floor {
                    reasonably_priced.push(hour);
                }
            }

            // Preheat favorable: running the heater during the previous hour
            // beats waiting for this one even after leakage
            if hour > 0 && self.cost(price) > self.cost_early(today.value(hour - 1), 1) {
                preheat_favorable.push(hour - 1);
            }
        }

        let cheapest_morning_hour = self.cheapest_hour(0..morning_end);
        let cheapest_afternoon_hour = self.cheapest_hour(afternoon.0..afternoon.1 + 1);
        let reduced_comfort = self.reduced_comfort_hours(window);

        self.classification = PriceClassification {
            cheapest_morning_hour,
            cheapest_afternoon_hour,
            reasonably_priced,
            preheat_favorable,
            reduced_comfort,
        };
    }

    /// Returns the effectively cheapest hour in the window, where hanging on
    /// to an early candidate gets more expensive the longer the heat it
    /// bought must be stored. Ties keep the earliest hour.
    ///
    /// # Arguments
    ///
    /// * 'window' - the hour range to search
    pub fn cheapest_hour(&self, window: std::ops::Range<u32>) -> Option<u32> {
        let today = self.today.as_ref()?;
        let mut best: Option<(u32, f64)> = None;

        for hour in window {
            if hour >= today.n_hours() {
                break;
            }
            let price = today.value(hour);
            match best {
                None => best = Some((hour, price)),
                Some((best_hour, best_price)) => {
                    if self.cost(price) < self.cost_early(best_price, hour - best_hour) {
                        best = Some((hour, price));
                    }
                }
            }
        }

        best.map(|b| b.0)
    }

    /// Comfort window hours above the reduce ceiling, most expensive first,
    /// at most three per day and never two adjacent
    fn reduced_comfort_hours(&self, window: &ComfortWindow) -> Vec<u32> {
        const MAX_REDUCED_PER_DAY: usize = 3;

        let Some(today) = self.today.as_ref() else {
            return Vec::new();
        };

        let mut candidates: Vec<(u32, f64)> = window.comfort_hours()
            .filter(|&h| h < today.n_hours())
            .map(|h| (h, today.value(h)))
            .filter(|&(_, p)| p > self.params.reduce_comfort_ceiling)
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut selected: Vec<u32> = Vec::new();
        for (hour, _) in candidates {
            if selected.iter().any(|&s| s.abs_diff(hour) == 1) {
                continue;
            }
            selected.push(hour);
            if selected.len() >= MAX_REDUCED_PER_DAY {
                break;
            }
        }

        selected
    }

    pub fn is_hour_reasonably_priced(&self, hour: u32) -> bool {
        self.classification.reasonably_priced.contains(&hour)
    }

    pub fn is_hour_preheat_favorable(&self, hour: u32) -> bool {
        self.classification.preheat_favorable.contains(&hour)
    }

    pub fn is_hour_with_reduced_comfort(&self, hour: u32) -> bool {
        self.classification.reduced_comfort.contains(&hour)
    }

    /// True if the hour after 'hour' is cheaper, with the day's last hour
    /// always answering true (tomorrow's opening hours tend to be cheap)
    pub fn is_next_hour_cheaper(&self, hour: u32) -> bool {
        let Some(today) = self.today.as_ref() else {
            return false;
        };
        if hour + 1 >= today.n_hours() {
            return true;
        }
        today.value(hour) > today.value(hour + 1)
    }

    /// Compares COP adjusted, early consumption penalized cost now against
    /// COP adjusted cost at the target hour. Target hours of 24 and above
    /// refer to tomorrow and answer false when tomorrow's curve is absent.
    ///
    /// # Arguments
    ///
    /// * 'now_hour' - the hour heating would start
    /// * 'target_hour' - the hour the heat is needed by
    /// * 'cop_now' - heater COP at the current outdoor temperature
    /// * 'cop_target' - heater COP at the forecast temperature for the target hour
    pub fn is_longterm_preheat_favorable(&self, now_hour: u32, target_hour: u32,
                                         cop_now: f64, cop_target: f64) -> bool {
        if target_hour <= now_hour {
            warn!("unexpected longterm preheat test {} -> {}", now_hour, target_hour);
            return false;
        }
        let Some(today) = self.today.as_ref() else {
            return false;
        };

        let target_price = if target_hour < 24 {
            today.value(target_hour)
        } else {
            match self.tomorrow.as_ref() {
                Some(tomorrow) => tomorrow.value(target_hour - 24),
                None => return false,
            }
        };

        let now_cost = self.cost_early(today.value(now_hour), target_hour - now_hour) / cop_now;
        let target_cost = self.cost(target_price) / cop_target;

        target_cost > now_cost
    }

    /// True if tomorrow's cheapest opening price exceeds tonight's residual
    /// price after the early consumption penalty, i.e. an extra boost before
    /// midnight pays off
    pub fn evening_boost_favorable(&self) -> bool {
        let (Some(today), Some(tomorrow)) = (self.today.as_ref(), self.tomorrow.as_ref()) else {
            return false;
        };

        let opening = (0..3).map(|h| tomorrow.value(h)).fold(f64::MAX, f64::min);
        let tonight = today.value(23);

        self.cost(opening) > self.cost_early(tonight, 1)
    }
}
