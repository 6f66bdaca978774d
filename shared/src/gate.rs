//! Gate state and servo geometry

use crate::defaults;
use serde::Deserialize;
use thiserror::Error;

/// Actuation state of one gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Closed,
    OpenPendingClose,
}

/// What `open()` does when a close is already scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetriggerPolicy {
    /// Cancel the pending close and start a fresh dwell window
    #[default]
    Replace,
    /// Schedule another independent close alongside the pending one
    Overlap,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("max_degree must be greater than zero")]
    ZeroTravel,

    #[error("min pulse {min}us must be below max pulse {max}us")]
    PulseRange { min: u32, max: u32 },

    #[error("angle {angle} exceeds servo travel of {max_degree} degrees")]
    AngleOutOfRange { angle: u32, max_degree: u32 },
}

/// Linear angle to pulse-width mapping of a hobby servo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoGeometry {
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    pub max_degree: u32,
}

impl Default for ServoGeometry {
    fn default() -> Self {
        Self {
            min_pulse_us: defaults::MIN_PULSE_US,
            max_pulse_us: defaults::MAX_PULSE_US,
            max_degree: defaults::MAX_DEGREE,
        }
    }
}

impl ServoGeometry {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.max_degree == 0 {
            return Err(GeometryError::ZeroTravel);
        }
        if self.min_pulse_us >= self.max_pulse_us {
            return Err(GeometryError::PulseRange {
                min: self.min_pulse_us,
                max: self.max_pulse_us,
            });
        }
        Ok(())
    }

    pub fn check_angle(&self, angle: u32) -> Result<(), GeometryError> {
        if angle > self.max_degree {
            return Err(GeometryError::AngleOutOfRange {
                angle,
                max_degree: self.max_degree,
            });
        }
        Ok(())
    }

    /// `min + (max - min) * angle / max_degree`, in integer microseconds
    pub fn pulse_width_us(&self, angle: u32) -> Result<u32, GeometryError> {
        self.validate()?;
        self.check_angle(angle)?;
        let span = u64::from(self.max_pulse_us - self.min_pulse_us);
        let offset = span * u64::from(angle) / u64::from(self.max_degree);
        Ok(self.min_pulse_us + offset as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_endpoints() {
        let geometry = ServoGeometry::default();
        assert_eq!(geometry.pulse_width_us(0), Ok(600));
        assert_eq!(geometry.pulse_width_us(180), Ok(2400));
    }

    #[test]
    fn test_pulse_gate_angles() {
        let geometry = ServoGeometry::default();
        assert_eq!(geometry.pulse_width_us(defaults::OPEN_ANGLE), Ok(1500));
        assert_eq!(geometry.pulse_width_us(defaults::CLOSED_ANGLE), Ok(2400));
    }

    #[test]
    fn test_pulse_truncates() {
        let geometry = ServoGeometry {
            min_pulse_us: 1000,
            max_pulse_us: 2000,
            max_degree: 270,
        };
        // 1000 * 100 / 270 = 370.37
        assert_eq!(geometry.pulse_width_us(100), Ok(1370));
    }

    #[test]
    fn test_angle_out_of_range() {
        let geometry = ServoGeometry::default();
        assert_eq!(
            geometry.pulse_width_us(181),
            Err(GeometryError::AngleOutOfRange {
                angle: 181,
                max_degree: 180
            })
        );
    }

    #[test]
    fn test_invalid_geometry() {
        let zero = ServoGeometry {
            max_degree: 0,
            ..Default::default()
        };
        assert_eq!(zero.validate(), Err(GeometryError::ZeroTravel));

        let inverted = ServoGeometry {
            min_pulse_us: 2400,
            max_pulse_us: 600,
            max_degree: 180,
        };
        assert!(matches!(
            inverted.pulse_width_us(10),
            Err(GeometryError::PulseRange { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(GateState::default(), GateState::Closed);
        assert_eq!(RetriggerPolicy::default(), RetriggerPolicy::Replace);
    }
}
