use serde::Deserialize;

/// One row in the heater calibration table. Watts is the heating power
/// the appliance delivers at full compressor at the given outdoor
/// temperature, cop the corresponding coefficient of performance.
#[derive(Deserialize, Clone, Copy, Debug)]
pub struct CalibrationPoint {
    pub outdoor: f64,
    pub watts: f64,
    pub cop: f64,
}

/// Performance model for the heat pump, built once at startup from the
/// configured calibration table.
///
/// Both curves are piecewise linear between the calibration points and
/// flat outside them, no extrapolation.
pub struct ThermalPerformanceModel {
    table: Vec<CalibrationPoint>,
    loss_watts_per_degree: f64,
    storage_wh_per_degree: f64,
    comfort_temperature: f64,
}

impl ThermalPerformanceModel {
    /// Returns a model over the given calibration table.
    ///
    /// The table is expected to be validated (ascending, at least two points)
    /// by the configuration loader before it gets here.
    ///
    /// # Arguments
    ///
    /// * 'table' - ascending calibration points
    /// * 'loss_watts_per_degree' - building heat dissipation per degree indoor/outdoor delta
    /// * 'storage_wh_per_degree' - watt hours stored in the building thermal mass per degree
    /// * 'comfort_temperature' - the comfort floor temperature the loss estimate is anchored at
    pub fn new(table: Vec<CalibrationPoint>, loss_watts_per_degree: f64,
               storage_wh_per_degree: f64, comfort_temperature: f64) -> ThermalPerformanceModel {
        ThermalPerformanceModel { table, loss_watts_per_degree, storage_wh_per_degree, comfort_temperature }
    }

    /// Heating power in watts at the given outdoor temperature
    pub fn capacity(&self, outdoor: f64) -> f64 {
        self.interpolate(outdoor, |p| p.watts)
    }

    /// Coefficient of performance at the given outdoor temperature
    pub fn cop(&self, outdoor: f64) -> f64 {
        self.interpolate(outdoor, |p| p.cop)
    }

    /// How many degrees of thermal mass can be charged into the building
    /// over the given number of hours, i.e. heating power minus dissipation
    /// converted to degrees via the storage constant.
    ///
    /// When the outdoor temperature is at or above the comfort temperature
    /// there is no net dissipation to fight and the answer is capped at a
    /// value large enough to never limit a boost.
    ///
    /// # Arguments
    ///
    /// * 'outdoor' - current outdoor temperature
    /// * 'hours' - number of hours available for boosting
    pub fn boost_degrees(&self, outdoor: f64, hours: u32) -> f64 {
        let delta = self.comfort_temperature - outdoor;
        if delta <= 0.0 {
            return 100.0;
        }

        let surplus_watts = self.capacity(outdoor) - self.loss_watts_per_degree * delta;
        let degrees = hours as f64 * surplus_watts / self.storage_wh_per_degree;

        degrees.max(0.0)
    }

    /// Fraction of extra heat leakage caused by keeping the building
    /// 'delta' degrees warmer than the comfort floor. Used as the per hour
    /// penalty on early consumed energy.
    ///
    /// When the indoor/outdoor delta is smaller than 'delta' the whole
    /// over-heating idea is pointless and a prohibitive fraction is
    /// returned to disable it.
    ///
    /// # Arguments
    ///
    /// * 'indoor' - current indoor temperature
    /// * 'outdoor' - current outdoor temperature
    /// * 'delta' - the number of degrees of over-heating considered
    pub fn heat_loss_fraction(&self, indoor: f64, outdoor: f64, delta: f64) -> f64 {
        let delta_degrees = indoor - outdoor;
        if delta_degrees > delta {
            delta / delta_degrees
        } else {
            99.0
        }
    }

    /// Piecewise linear lookup over the calibration table, flat outside it
    ///
    /// # Arguments
    ///
    /// * 'outdoor' - the outdoor temperature to look up
    /// * 'f' - accessor selecting which column to interpolate
    fn interpolate(&self, outdoor: f64, f: impl Fn(&CalibrationPoint) -> f64) -> f64 {
        let first = self.table.first().unwrap();
        let last = self.table.last().unwrap();

        if outdoor <= first.outdoor {
            return f(first);
        }
        if outdoor >= last.outdoor {
            return f(last);
        }

        for w in self.table.windows(2) {
            let (lower, upper) = (&w[0], &w[1]);
            if outdoor <= upper.outdoor {
                let slope = (f(upper) - f(lower)) / (upper.outdoor - lower.outdoor);
                return f(lower) + (outdoor - lower.outdoor) * slope;
            }
        }

        f(last)
    }
}
