use tracing::trace;

use crate::defs::ThingDef;
use crate::host::Climate;
use crate::model::{RegionId, Thing};

pub const ROT_STEP_TICKS: u64 = 2_500;
pub const WEATHERING_INTERVAL_TICKS: f64 = 250.0;
pub const WEATHERING_DAMAGE_PER_INTERVAL: f64 = 0.015;
pub const SATURATED_RAINFALL: f64 = 4_000.0;
const DRY_RAIN_MULTIPLIER: f64 = 0.5;
const WET_RAIN_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayContext {
    pub region: RegionId,
    pub start_tick: u64,
    pub elapsed_ticks: u64,
    pub rainfall: f32,
    /// Whether the thing's cell is under any roof.
    pub roofed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecayOutcome {
    pub destroyed: bool,
    pub rot_progress: Option<f32>,
    pub weathering_damage: i32,
}

/// Spoilage rate per tick at a temperature: nothing below freezing, full
/// speed from 10°C, linear in between.
pub fn rot_rate_at(temperature: f32) -> f32 {
    if temperature < 0.0 {
        0.0
    } else if temperature >= 10.0 {
        1.0
    } else {
        temperature / 10.0
    }
}

/// 0.5 when dry, 2.0 at or above 4000mm of rain, linear in between.
pub fn rain_multiplier(rainfall: f32) -> f64 {
    let normalized = (f64::from(rainfall) / SATURATED_RAINFALL).clamp(0.0, 1.0);
    DRY_RAIN_MULTIPLIER + (WET_RAIN_MULTIPLIER - DRY_RAIN_MULTIPLIER) * normalized
}

/// Integer outdoor damage over `elapsed_ticks`. Rounds half away from zero,
/// so an expected 0.5 becomes 1.
pub fn weathering_damage(elapsed_ticks: u64, rainfall: f32) -> i32 {
    let intervals = elapsed_ticks as f64 / WEATHERING_INTERVAL_TICKS;
    let expected = intervals * WEATHERING_DAMAGE_PER_INTERVAL * rain_multiplier(rainfall);
    expected.round().min(f64::from(i32::MAX)) as i32
}

/// Advances rot and outdoor weathering for one thing over an interval the
/// region spent unloaded. Pure apart from the thing it is handed.
pub struct OfflineDecaySimulator<'c, C: Climate + ?Sized> {
    climate: &'c C,
}

impl<'c, C: Climate + ?Sized> OfflineDecaySimulator<'c, C> {
    pub fn new(climate: &'c C) -> Self {
        Self { climate }
    }

    pub fn apply(&self, thing: &mut Thing, def: &ThingDef, context: &DecayContext) -> DecayOutcome {
        let mut outcome = DecayOutcome {
            rot_progress: thing.rot_progress,
            ..DecayOutcome::default()
        };
        if thing.destroyed {
            outcome.destroyed = true;
            return outcome;
        }

        if let Some(threshold) = def.ticks_to_rot_start {
            match self.integrate_rot(thing.rot_progress.unwrap_or(0.0), threshold, context) {
                Some(rot) => {
                    thing.rot_progress = Some(rot);
                    outcome.rot_progress = Some(rot);
                }
                None => {
                    thing.destroyed = true;
                    outcome.destroyed = true;
                    trace!(thing = %thing.def_name, "offline_decay_rotted_away");
                    return outcome;
                }
            }
        }

        if !context.roofed {
            let damage = weathering_damage(context.elapsed_ticks, context.rainfall);
            if damage > 0 {
                thing.hit_points = thing.hit_points.saturating_sub(damage);
                outcome.weathering_damage = damage;
                if thing.hit_points <= 0 {
                    thing.destroyed = true;
                    outcome.destroyed = true;
                }
            }
        }
        outcome
    }

    /// Steps through the interval resampling temperature every
    /// `ROT_STEP_TICKS`. `None` once rot reaches `threshold`.
    fn integrate_rot(&self, start: f32, threshold: f32, context: &DecayContext) -> Option<f32> {
        let mut rot = start;
        let end_tick = context.start_tick.saturating_add(context.elapsed_ticks);
        let mut tick = context.start_tick;
        while tick < end_tick {
            let step = (end_tick - tick).min(ROT_STEP_TICKS);
            let temperature = self.climate.outdoor_temperature(tick, context.region);
            rot += rot_rate_at(temperature) * step as f32;
            if rot >= threshold {
                return None;
            }
            tick += step;
        }
        Some(rot)
    }
}
