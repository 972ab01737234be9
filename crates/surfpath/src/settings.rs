//! Trace configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Which principal family (or both) a trace follows from its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// The `D1` family.
    #[default]
    First,
    /// The `D2` family.
    Second,
    /// Both families.
    Both,
}

/// Integration parameters for one trace request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Step length in model units.
    pub step_size: f64,
    /// Model-space tolerance for stalls, breakpoints and inversion.
    pub tolerance: f64,
    /// Point budget shared by every segment of the trace.
    pub max_points: usize,
    /// Direction family to seed.
    pub branch: Branch,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            tolerance: 1e-6,
            max_points: 1000,
            branch: Branch::First,
        }
    }
}

impl TraceSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(TraceError::InvalidSettings(
                "step_size must be positive".into(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(TraceError::InvalidSettings(
                "tolerance must be positive".into(),
            ));
        }
        if self.max_points == 0 {
            return Err(TraceError::InvalidSettings(
                "max_points must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Isotropic shell material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Young's modulus.
    pub young: f64,
    /// Poisson ratio.
    pub poisson: f64,
    /// Shell thickness.
    pub thickness: f64,
}

impl Material {
    /// Create a validated material.
    pub fn new(young: f64, poisson: f64, thickness: f64) -> Result<Self> {
        let m = Self {
            young,
            poisson,
            thickness,
        };
        m.validate()?;
        Ok(m)
    }

    /// Check `young > 0`, `thickness > 0` and `-1 < poisson < 0.5`.
    pub fn validate(&self) -> Result<()> {
        if !(self.young.is_finite() && self.young > 0.0) {
            return Err(TraceError::InvalidMaterial(
                "young's modulus must be positive".into(),
            ));
        }
        if !(self.thickness.is_finite() && self.thickness > 0.0) {
            return Err(TraceError::InvalidMaterial(
                "thickness must be positive".into(),
            ));
        }
        if !(self.poisson > -1.0 && self.poisson < 0.5) {
            return Err(TraceError::InvalidMaterial(
                "poisson ratio must be in (-1, 0.5)".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let s = TraceSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.branch, Branch::First);
    }

    #[test]
    fn test_invalid_settings() {
        let s = TraceSettings {
            step_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(TraceError::InvalidSettings(_))));

        let s = TraceSettings {
            tolerance: f64::NAN,
            ..Default::default()
        };
        assert!(s.validate().is_err());

        let s = TraceSettings {
            max_points: 0,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_settings_serde_defaults() {
        let s: TraceSettings = serde_json::from_str(r#"{"step_size": 0.5, "branch": "both"}"#).unwrap();
        assert_eq!(s.step_size, 0.5);
        assert_eq!(s.branch, Branch::Both);
        assert_eq!(s.max_points, 1000);

        let json = serde_json::to_string(&s).unwrap();
        let back: TraceSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_points, s.max_points);
    }

    #[test]
    fn test_material_validation() {
        assert!(Material::new(210e9, 0.3, 0.01).is_ok());
        assert!(matches!(
            Material::new(0.0, 0.3, 0.01),
            Err(TraceError::InvalidMaterial(_))
        ));
        assert!(Material::new(1.0, 0.5, 0.01).is_err());
        assert!(Material::new(1.0, 0.3, -1.0).is_err());
    }
}
