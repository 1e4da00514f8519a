use glam::Vec3;

/// Scene light. Only the two kinds the capture pipeline adds are modelled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient {
        color: Vec3,
        intensity: f32,
    },
    Directional {
        color: Vec3,
        intensity: f32,
        /// Points toward the light source
        direction: Vec3,
    },
}

impl Light {
    pub fn ambient(color: [f32; 3], intensity: f32) -> Self {
        Light::Ambient {
            color: Vec3::from(color),
            intensity,
        }
    }

    pub fn directional(color: [f32; 3], intensity: f32, from: [f32; 3]) -> Self {
        Light::Directional {
            color: Vec3::from(color),
            intensity,
            direction: Vec3::from(from).normalize_or_zero(),
        }
    }

    /// Contribution to a surface with outward `normal`
    pub fn contribution(&self, normal: Vec3) -> Vec3 {
        match *self {
            Light::Ambient { color, intensity } => color * intensity,
            Light::Directional {
                color,
                intensity,
                direction,
            } => color * intensity * normal.dot(direction).max(0.0),
        }
    }
}

/// Summed lighting for a face, clamped to 1.0 per channel.
pub fn shade(lights: &[Light], normal: Vec3) -> Vec3 {
    lights
        .iter()
        .fold(Vec3::ZERO, |acc, l| acc + l.contribution(normal))
        .min(Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directional_light_ignores_faces_turned_away() {
        let sun = Light::directional([1.0; 3], 0.5, [0.0, 1.0, 0.0]);
        assert_eq!(sun.contribution(Vec3::NEG_Y), Vec3::ZERO);
        assert!((sun.contribution(Vec3::Y).x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn shade_sums_and_clamps() {
        let lights = [
            Light::ambient([0.8; 3], 0.6),
            Light::directional([1.0; 3], 0.5, [0.0, 1.0, 0.0]),
        ];
        let top = shade(&lights, Vec3::Y);
        assert!((top.x - 0.98).abs() < 1e-5);
        let bottom = shade(&lights, Vec3::NEG_Y);
        assert!((bottom.x - 0.48).abs() < 1e-5);
        let bright = [Light::ambient([1.0; 3], 2.0)];
        assert_eq!(shade(&bright, Vec3::X), Vec3::ONE);
    }
}
