use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Resource budgets (percent of maximum) for one power mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerProfile {
    /// Profile name, e.g. `balanced`.
    pub name: String,
    /// CPU frequency cap.
    pub cpu_budget: u8,
    /// GPU cap.
    pub gpu_budget: u8,
    /// Neural accelerator cap.
    pub accelerator_budget: u8,
}

impl PowerProfile {
    fn new(name: &str, cpu: u8, gpu: u8, accelerator: u8) -> Self {
        Self {
            name: name.to_string(),
            cpu_budget: cpu,
            gpu_budget: gpu,
            accelerator_budget: accelerator,
        }
    }

    /// Everything at full clock.
    pub fn maximum_performance() -> Self {
        Self::new("maximum_performance", 100, 100, 100)
    }

    /// Default for a healthy battery.
    pub fn balanced() -> Self {
        Self::new("balanced", 70, 60, 80)
    }

    /// Reduced clocks.
    pub fn power_saver() -> Self {
        Self::new("power_saver", 40, 30, 50)
    }

    /// Critical battery.
    pub fn ultra_saver() -> Self {
        Self::new("ultra_saver", 20, 15, 30)
    }

    /// The four fixed profiles, highest budget first.
    pub fn all() -> Vec<PowerProfile> {
        vec![
            Self::maximum_performance(),
            Self::balanced(),
            Self::power_saver(),
            Self::ultra_saver(),
        ]
    }

    /// Look a fixed profile up by name.
    pub fn by_name(name: &str) -> Option<PowerProfile> {
        Self::all().into_iter().find(|p| p.name == name)
    }
}

impl Default for PowerProfile {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Expected resource usage over the next hour (percent).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadForecast {
    /// Expected CPU load.
    pub cpu: f64,
    /// Expected accelerator load.
    pub accelerator: f64,
    /// How much the forecast should be trusted, 0..=1.
    pub confidence: f64,
}

impl Default for LoadForecast {
    fn default() -> Self {
        Self {
            cpu: 30.0,
            accelerator: 20.0,
            confidence: 0.5,
        }
    }
}

/// Pick a profile for the given battery level (percent) and forecast.
pub fn select_profile(battery_level: u8, predicted_load: &LoadForecast) -> PowerProfile {
    if battery_level > 60 {
        PowerProfile::balanced()
    } else if battery_level > 30 {
        if predicted_load.cpu > 60.0 {
            PowerProfile::balanced()
        } else {
            PowerProfile::power_saver()
        }
    } else if battery_level > 15 {
        PowerProfile::power_saver()
    } else {
        PowerProfile::ultra_saver()
    }
}

/// One observation of device load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    /// When the sample was taken.
    pub at: DateTime<Utc>,
    /// CPU load, percent.
    pub cpu: f64,
    /// Accelerator load, percent.
    pub accelerator: f64,
}

/// Forecasts load from samples taken at the same hour on the same weekday.
#[derive(Debug, Clone, Default)]
pub struct UsagePredictor {
    history: Vec<UsageSample>,
}

impl UsagePredictor {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observation.
    pub fn record(&mut self, sample: UsageSample) {
        self.history.push(sample);
    }

    /// Number of recorded samples.
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Forecast for the hour starting at `now`.
    pub fn predict(&self, now: DateTime<Utc>) -> LoadForecast {
        let similar: Vec<&UsageSample> = self
            .history
            .iter()
            .filter(|s| s.at.hour() == now.hour() && s.at.weekday() == now.weekday())
            .collect();

        if similar.is_empty() {
            return LoadForecast::default();
        }

        let n = similar.len() as f64;
        LoadForecast {
            cpu: similar.iter().map(|s| s.cpu).sum::<f64>() / n,
            accelerator: similar.iter().map(|s| s.accelerator).sum::<f64>() / n,
            confidence: 0.85,
        }
    }
}
