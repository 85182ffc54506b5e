use std::collections::HashMap;
use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::host::Climate;
use crate::model::RegionId;

pub const TICKS_PER_DAY: u64 = 60_000;
pub const TICKS_PER_YEAR: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateProfile {
    pub mean_temperature: f32,
    /// Half the spread between midsummer and midwinter.
    pub seasonal_amplitude: f32,
    /// Half the spread between midday and midnight.
    pub diurnal_amplitude: f32,
    pub rainfall: f32,
}

impl Default for ClimateProfile {
    fn default() -> Self {
        Self {
            mean_temperature: 15.0,
            seasonal_amplitude: 15.0,
            diurnal_amplitude: 7.0,
            rainfall: 1400.0,
        }
    }
}

/// Cosine season over a year plus a cosine day cycle. The year starts in
/// midwinter and each day starts at midnight.
#[derive(Debug, Clone, Default)]
pub struct SeasonalClimate {
    fallback: ClimateProfile,
    regions: HashMap<RegionId, ClimateProfile>,
}

impl SeasonalClimate {
    pub fn new(fallback: ClimateProfile) -> Self {
        Self {
            fallback,
            regions: HashMap::new(),
        }
    }

    pub fn with_region(mut self, region: RegionId, profile: ClimateProfile) -> Self {
        self.regions.insert(region, profile);
        self
    }

    pub fn profile(&self, region: RegionId) -> &ClimateProfile {
        self.regions.get(&region).unwrap_or(&self.fallback)
    }
}

fn cycle_phase(tick: u64, period: u64) -> f64 {
    (tick % period) as f64 / period as f64
}

impl Climate for SeasonalClimate {
    fn seasonal_temperature(&self, tick: u64, region: RegionId) -> f32 {
        let profile = self.profile(region);
        let swing = (TAU * cycle_phase(tick, TICKS_PER_YEAR)).cos();
        (f64::from(profile.mean_temperature) - f64::from(profile.seasonal_amplitude) * swing) as f32
    }

    fn sun_cycle_offset(&self, tick: u64, region: RegionId) -> f32 {
        let profile = self.profile(region);
        let swing = (TAU * cycle_phase(tick, TICKS_PER_DAY)).cos();
        (-f64::from(profile.diurnal_amplitude) * swing) as f32
    }

    fn rainfall(&self, region: RegionId) -> f32 {
        self.profile(region).rainfall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midwinter_midnight_is_coldest() {
        let climate = SeasonalClimate::default();
        let region = RegionId(1);
        let coldest = climate.outdoor_temperature(0, region);
        assert!((coldest - (15.0 - 15.0 - 7.0)).abs() < 1e-4);
        let midsummer = climate.seasonal_temperature(TICKS_PER_YEAR / 2, region);
        assert!((midsummer - 30.0).abs() < 1e-3);
        let noon = climate.sun_cycle_offset(TICKS_PER_DAY / 2, region);
        assert!((noon - 7.0).abs() < 1e-3);
    }

    #[test]
    fn regions_use_their_own_profile() {
        let arctic = ClimateProfile {
            mean_temperature: -20.0,
            seasonal_amplitude: 10.0,
            diurnal_amplitude: 2.0,
            rainfall: 200.0,
        };
        let climate = SeasonalClimate::default().with_region(RegionId(9), arctic);
        assert_eq!(climate.rainfall(RegionId(9)), 200.0);
        assert_eq!(climate.rainfall(RegionId(1)), 1400.0);
        assert!(climate.seasonal_temperature(0, RegionId(9)) < -29.0);
    }
}
