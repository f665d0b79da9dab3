//! Probe calibration: capture sessions, curve fitting, and voltage conversion.
//!
//! One `CalibrationEngine` exists per probe. Points are captured against the
//! latest live voltage, fitted with either a physical one-point model or an
//! ordinary least-squares line, and the resulting `CalibrationResult` is the
//! immutable snapshot used for runtime conversion:
//!
//!   value = slope * voltage + offset

use crate::error::CalibrationError;
use hydro_config::{PersistedCalibration, SensorKind};

/// Ideal Nernst slope at 25 °C, in volts per pH unit.
pub const NERNST_SLOPE_25C: f64 = -0.05916;
/// 0 °C in kelvin.
pub const KELVIN_OFFSET: f64 = 273.15;
/// 25 °C in kelvin; reference for the Nernst slope.
const NERNST_REFERENCE_K: f64 = 298.15;
/// Linear conductivity temperature coefficient for TDS probes (per °C).
pub const TDS_TEMP_COEFFICIENT: f64 = 0.02;
/// Temperature the TDS coefficient is referenced to (°C).
pub const TDS_REFERENCE_C: f64 = 25.0;
/// Cubic, square and linear terms of the factory TDS curve (ppm per volt^n).
pub const TDS_CURVE_A: f64 = 133.42;
pub const TDS_CURVE_B: f64 = -255.86;
pub const TDS_CURVE_C: f64 = 857.39;
/// Scale from the curve's conductivity-equivalent to ppm.
pub const TDS_CURVE_SCALE: f64 = 0.5;

/// Dissolved-oxygen saturation in fresh water at sea level: (°C, mg/L).
const DO_SATURATION_TABLE: [(f64, f64); 9] = [
    (0.0, 14.6),
    (5.0, 12.8),
    (10.0, 11.3),
    (15.0, 10.1),
    (20.0, 9.1),
    (25.0, 8.2),
    (30.0, 7.5),
    (35.0, 6.9),
    (40.0, 6.4),
];

/// Temperature-compensated Nernst slope in volts per pH unit.
#[inline]
pub fn nernst_slope(temperature_c: f64) -> f64 {
    NERNST_SLOPE_25C * (KELVIN_OFFSET + temperature_c) / NERNST_REFERENCE_K
}

/// DO saturation (mg/L) at `temperature_c`, interpolated piecewise-linearly
/// between table knots and clamped to the table bounds.
pub fn do_saturation_mg_l(temperature_c: f64) -> f64 {
    let (t_min, s_min) = DO_SATURATION_TABLE[0];
    let (t_max, s_max) = DO_SATURATION_TABLE[DO_SATURATION_TABLE.len() - 1];
    if temperature_c <= t_min {
        return s_min;
    }
    if temperature_c >= t_max {
        return s_max;
    }
    for pair in DO_SATURATION_TABLE.windows(2) {
        let (t0, s0) = pair[0];
        let (t1, s1) = pair[1];
        if temperature_c == t0 {
            return s0;
        }
        if temperature_c == t1 {
            return s1;
        }
        if temperature_c > t0 && temperature_c < t1 {
            let frac = (temperature_c - t0) / (t1 - t0);
            return s0 + (s1 - s0) * frac;
        }
    }
    // Only reachable for NaN input.
    f64::NAN
}

/// Refer a TDS probe voltage back to 25 °C using a 2 %/°C coefficient.
/// Returns the voltage unchanged when the compensation factor is not positive.
#[inline]
pub fn compensate_tds_voltage(voltage: f64, temperature_c: f64) -> f64 {
    let comp = 1.0 + TDS_TEMP_COEFFICIENT * (temperature_c - TDS_REFERENCE_C);
    if comp > 0.0 { voltage / comp } else { voltage }
}

/// Factory TDS curve for an uncalibrated probe: temperature-compensate the
/// voltage, then apply the cubic in ppm.
pub fn default_tds_ppm(voltage: f64, temperature_c: f64) -> f64 {
    let v = compensate_tds_voltage(voltage, temperature_c);
    let poly = TDS_CURVE_A.mul_add(v, TDS_CURVE_B).mul_add(v, TDS_CURVE_C) * v;
    poly * TDS_CURVE_SCALE
}

/// Number of points a session must capture before it can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointMode {
    One = 1,
    Two = 2,
    Three = 3,
}

impl PointMode {
    #[inline]
    pub fn count(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for PointMode {
    type Error = CalibrationError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(PointMode::One),
            2 => Ok(PointMode::Two),
            3 => Ok(PointMode::Three),
            other => Err(CalibrationError::InvalidMode(other)),
        }
    }
}

/// A known reference value paired with the voltage read while the probe sat in it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub point_index: u32,
    pub reference_value: f64,
    pub voltage: f64,
}

impl From<&hydro_config::CalibrationPointRow> for CalibrationPoint {
    fn from(r: &hydro_config::CalibrationPointRow) -> Self {
        Self {
            point_index: r.point_index,
            reference_value: r.reference_value,
            voltage: r.voltage,
        }
    }
}

/// Fitted conversion coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub sensor: SensorKind,
    pub slope: f64,
    pub offset: f64,
    /// Temperature the fit was computed at.
    pub reference_temperature_c: f64,
    pub points_used: usize,
}

impl CalibrationResult {
    /// Convert a probe voltage into physical units.
    #[inline]
    pub fn convert(&self, voltage: f64) -> f64 {
        self.slope * voltage + self.offset
    }

    /// Convert with temperature compensation where the probe has a model for
    /// it (TDS); identical to `convert` for other probes.
    pub fn convert_compensated(&self, voltage: f64, temperature_c: f64) -> f64 {
        match self.sensor {
            SensorKind::Tds => self.convert(compensate_tds_voltage(voltage, temperature_c)),
            SensorKind::Ph | SensorKind::DissolvedOxygen => self.convert(voltage),
        }
    }

    pub fn from_persisted(sensor: SensorKind, p: &PersistedCalibration) -> Self {
        Self {
            sensor,
            slope: p.slope,
            offset: p.offset,
            reference_temperature_c: p.reference_temperature_c,
            points_used: 0,
        }
    }

    pub fn to_persisted(&self) -> PersistedCalibration {
        PersistedCalibration {
            slope: self.slope,
            offset: self.offset,
            reference_temperature_c: self.reference_temperature_c,
        }
    }
}

/// Fit a calibration for `sensor` from `points`.
///
/// Exactly one point selects the probe's physical model; two or more points
/// are fitted by ordinary least squares of reference value against voltage.
pub fn compute(
    sensor: SensorKind,
    points: &[CalibrationPoint],
    reference_temperature_c: f64,
) -> Result<CalibrationResult, CalibrationError> {
    if !reference_temperature_c.is_finite() {
        return Err(CalibrationError::NonFiniteInput);
    }
    let (slope, offset) = match points {
        [] => return Err(CalibrationError::InsufficientPoints),
        [single] => one_point(sensor, single, reference_temperature_c)?,
        many => least_squares(many)?,
    };
    if !slope.is_finite() || !offset.is_finite() {
        return Err(CalibrationError::NonFiniteResult);
    }
    Ok(CalibrationResult {
        sensor,
        slope,
        offset,
        reference_temperature_c,
        points_used: points.len(),
    })
}

fn one_point(
    sensor: SensorKind,
    p: &CalibrationPoint,
    temperature_c: f64,
) -> Result<(f64, f64), CalibrationError> {
    if p.voltage == 0.0 {
        return Err(CalibrationError::DivisionByZero);
    }
    Ok(match sensor {
        SensorKind::Ph => {
            let slope = nernst_slope(temperature_c);
            (slope, p.reference_value - slope * p.voltage)
        }
        // The saturation table is the single source of truth; the captured
        // reference value is only the operator's "100 %" marker.
        SensorKind::DissolvedOxygen => (do_saturation_mg_l(temperature_c) / p.voltage, 0.0),
        SensorKind::Tds => (p.reference_value / p.voltage, 0.0),
    })
}

fn least_squares(points: &[CalibrationPoint]) -> Result<(f64, f64), CalibrationError> {
    let first_v = points[0].voltage;
    if points.iter().all(|p| p.voltage == first_v) {
        return Err(CalibrationError::DegenerateRegression);
    }
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.voltage).sum();
    let sum_y: f64 = points.iter().map(|p| p.reference_value).sum();
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;
    // Centered sums: sxx = (nΣXX − (ΣX)²)/n and sxy = (nΣXY − ΣXΣY)/n.
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for p in points {
        let dx = p.voltage - mean_x;
        sxx += dx * dx;
        sxy += dx * (p.reference_value - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        return Err(CalibrationError::DegenerateRegression);
    }
    let slope = sxy / sxx;
    let offset = (sum_y - slope * sum_x) / n;
    Ok((slope, offset))
}

/// In-progress calibration for one probe.
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    sensor: SensorKind,
    mode: PointMode,
    // Kept sorted by point_index, at most one entry per index.
    points: Vec<CalibrationPoint>,
    live_voltage: Option<f64>,
}

impl CalibrationSession {
    pub fn new(sensor: SensorKind, mode: PointMode) -> Self {
        Self {
            sensor,
            mode,
            points: Vec::with_capacity(mode.count()),
            live_voltage: None,
        }
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    pub fn mode(&self) -> PointMode {
        self.mode
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn live_voltage(&self) -> Option<f64> {
        self.live_voltage
    }

    /// Record the latest live probe voltage. Non-finite readings are ignored.
    pub fn observe_voltage(&mut self, voltage: f64) {
        if voltage.is_finite() {
            self.live_voltage = Some(voltage);
        } else {
            tracing::warn!(sensor = self.sensor.as_str(), voltage, "ignoring non-finite live voltage");
        }
    }

    /// Capture `reference_value` against the most recent live voltage.
    pub fn capture(
        &mut self,
        point_index: u32,
        reference_value: f64,
    ) -> Result<&Self, CalibrationError> {
        let live = self.live_voltage;
        self.capture_with(point_index, reference_value, live)
    }

    /// Capture against a caller-tracked live voltage (`None` = never observed).
    pub fn capture_with(
        &mut self,
        point_index: u32,
        reference_value: f64,
        voltage: Option<f64>,
    ) -> Result<&Self, CalibrationError> {
        let voltage = voltage.ok_or(CalibrationError::NoLiveReading)?;
        if point_index == 0 || point_index as usize > self.mode.count() {
            return Err(CalibrationError::InvalidPointIndex(point_index));
        }
        if !reference_value.is_finite() || !voltage.is_finite() {
            return Err(CalibrationError::NonFiniteInput);
        }
        let point = CalibrationPoint {
            point_index,
            reference_value,
            voltage,
        };
        match self
            .points
            .binary_search_by_key(&point_index, |p| p.point_index)
        {
            Ok(pos) => self.points[pos] = point,
            Err(pos) => self.points.insert(pos, point),
        }
        tracing::debug!(
            sensor = self.sensor.as_str(),
            point_index,
            reference_value,
            voltage,
            captured = self.points.len(),
            "calibration point captured"
        );
        Ok(self)
    }

    /// True once the captured-point count reaches the required mode.
    pub fn is_ready(&self) -> bool {
        self.points.len() >= self.mode.count()
    }

    pub fn compute(
        &self,
        reference_temperature_c: f64,
    ) -> Result<CalibrationResult, CalibrationError> {
        compute(self.sensor, &self.points, reference_temperature_c)
    }

    /// Drop all captured points; the live voltage is kept.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Owns one probe's calibration session and its active result.
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    session: CalibrationSession,
    active: Option<CalibrationResult>,
}

impl CalibrationEngine {
    pub fn new(sensor: SensorKind, mode: PointMode) -> Self {
        Self {
            session: CalibrationSession::new(sensor, mode),
            active: None,
        }
    }

    /// Start with a previously persisted result in force.
    pub fn with_active(mut self, result: CalibrationResult) -> Self {
        self.active = Some(result);
        self
    }

    pub fn sensor(&self) -> SensorKind {
        self.session.sensor()
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn active(&self) -> Option<&CalibrationResult> {
        self.active.as_ref()
    }

    pub fn observe_voltage(&mut self, voltage: f64) {
        self.session.observe_voltage(voltage);
    }

    pub fn capture(
        &mut self,
        point_index: u32,
        reference_value: f64,
    ) -> Result<&CalibrationSession, CalibrationError> {
        self.session.capture(point_index, reference_value)
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Fit the current session without changing the active result.
    pub fn compute(
        &self,
        reference_temperature_c: f64,
    ) -> Result<CalibrationResult, CalibrationError> {
        self.session.compute(reference_temperature_c)
    }

    /// Fit the session and, on success, make it the active result and clear
    /// the session. On failure the previous active result is untouched.
    pub fn apply(
        &mut self,
        reference_temperature_c: f64,
    ) -> Result<CalibrationResult, CalibrationError> {
        let result = self.session.compute(reference_temperature_c)?;
        tracing::info!(
            sensor = self.sensor().as_str(),
            slope = result.slope,
            offset = result.offset,
            reference_temperature_c,
            points = result.points_used,
            "calibration applied"
        );
        self.active = Some(result);
        self.session.clear();
        Ok(result)
    }

    /// Change the required-point mode. Destroys any captured points.
    pub fn reset_session(&mut self, mode: PointMode) {
        tracing::debug!(
            sensor = self.sensor().as_str(),
            from = self.session.mode().count(),
            to = mode.count(),
            "calibration session reset"
        );
        self.session.mode = mode;
        self.session.clear();
    }

    pub fn clear(&mut self) {
        self.session.clear();
    }

    /// Convert with the active result, if any.
    pub fn convert(&self, voltage: f64) -> Option<f64> {
        self.active.map(|r| r.convert(voltage))
    }
}
