//! Grass configuration (user-facing tuning surface).
//!
//! Everything here is fixed when the field is created. Values are validated
//! once by [`GrassConfig::validate`]; nothing on the per-frame path re-checks them.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Full grass field configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrassConfig {
    /// Blade dimensions.
    pub blade: BladeConfig,
    /// Spring, mass and collision response.
    pub physics: PhysicsConfig,
    /// Gravity model.
    pub gravity: GravityConfig,
    /// Visibility test tuning.
    pub cull: CullConfig,
    /// Optional GPU-to-host diagnostics.
    pub diagnostics: DiagnosticsConfig,
}

/// Blade rest shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BladeConfig {
    /// Blade height in meters (encoded in V1.w).
    pub height: f32,
    /// Blade width at the base in meters (encoded in V2.w).
    pub width: f32,
    /// Rest tip offset along the facing axis, as a fraction of height.
    /// Keeps a resting blade from being perfectly straight.
    pub rest_lean: f32,
    /// Blades per square meter, used by grid scattering.
    pub density: f32,
}

impl Default for BladeConfig {
    fn default() -> Self {
        Self {
            height: 0.5,
            width: 0.1,
            rest_lean: 0.01,
            density: 1.0,
        }
    }
}

/// Spring and collision response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Blade mass. Must be > 0.
    pub mass: f32,
    /// Spring stiffness pulling the tip back to its rest position.
    pub stiffness: f32,
    /// Gain applied to collider penetration each step.
    pub collision_strength: f32,
    /// Fraction of the accumulated collision force shed per second.
    pub collision_decrease_amount: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            stiffness: 20.0,
            collision_strength: 40.0,
            collision_decrease_amount: 4.0,
        }
    }
}

/// Gravity blended between a directional model and a point attractor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    /// World-space direction for directional gravity (normalized on use).
    pub direction: [f32; 3],
    /// Acceleration magnitude (m/s^2).
    pub magnitude: f32,
    /// World-space attractor for point gravity.
    pub point: [f32; 3],
    /// 0 = point gravity toward `point`, 1 = directional gravity.
    pub blend: f32,
    /// Share of gravity applied along the blade's facing axis.
    pub front_factor: f32,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            direction: [0.0, -1.0, 0.0],
            magnitude: 9.81,
            point: [0.0, -1000.0, 0.0],
            blend: 1.0,
            front_factor: 0.25,
        }
    }
}

/// Visibility test tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullConfig {
    /// Blades farther than this along the camera forward axis are culled. 0 = off.
    pub max_distance: f32,
    /// Frustum planes are pushed outward by this many meters.
    pub frustum_margin: f32,
    /// The near plane is pulled back toward the camera by this many meters,
    /// so blades bending in from just behind it are not popped out.
    pub near_offset: f32,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            max_distance: 0.0,
            frustum_margin: 0.0,
            near_offset: 0.0,
        }
    }
}

/// Off-critical-path diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Copy the visibility counter back to the host asynchronously.
    pub readback_visible_count: bool,
    /// Log the latest readback every N frames (0 = never log).
    pub log_interval_frames: u32,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            readback_visible_count: false,
            log_interval_frames: 120,
        }
    }
}

fn positive(name: &str, value: f32) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(Error::Config(format!("{name} must be finite and > 0, got {value}")));
    }
    Ok(())
}

fn non_negative(name: &str, value: f32) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(Error::Config(format!("{name} must be finite and >= 0, got {value}")));
    }
    Ok(())
}

impl GrassConfig {
    /// Reject values that would make the simulation ill-defined.
    pub fn validate(&self) -> Result<()> {
        positive("blade.height", self.blade.height)?;
        positive("blade.width", self.blade.width)?;
        non_negative("blade.rest_lean", self.blade.rest_lean)?;
        non_negative("blade.density", self.blade.density)?;

        // Zero mass means infinite acceleration
        positive("physics.mass", self.physics.mass)?;
        non_negative("physics.stiffness", self.physics.stiffness)?;
        non_negative("physics.collision_strength", self.physics.collision_strength)?;
        non_negative("physics.collision_decrease_amount", self.physics.collision_decrease_amount)?;

        let g = &self.gravity;
        non_negative("gravity.magnitude", g.magnitude)?;
        non_negative("gravity.front_factor", g.front_factor)?;
        if !(0.0..=1.0).contains(&g.blend) {
            return Err(Error::Config(format!("gravity.blend must be in [0, 1], got {}", g.blend)));
        }
        if g.direction.iter().chain(g.point.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Config("gravity vectors must be finite".into()));
        }
        let dir_len_sq: f32 = g.direction.iter().map(|v| v * v).sum();
        if g.blend > 0.0 && g.magnitude > 0.0 && dir_len_sq <= f32::EPSILON {
            return Err(Error::Config("gravity.direction must be non-zero when blend > 0".into()));
        }

        non_negative("cull.max_distance", self.cull.max_distance)?;
        non_negative("cull.frustum_margin", self.cull.frustum_margin)?;
        non_negative("cull.near_offset", self.cull.near_offset)?;
        Ok(())
    }

    /// Normalized directional gravity (zero if unset)
    pub fn gravity_direction(&self) -> glam::Vec3 {
        glam::Vec3::from_array(self.gravity.direction).normalize_or_zero()
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from file (sync). The loaded config is validated.
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
