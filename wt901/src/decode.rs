//! Fixed-point register decoding to physical units
//!
//! Every channel is a signed 16-bit count scaled against the channel's
//! full-scale range: `value = raw / 32768 * range`.

use nalgebra::UnitQuaternion;

use crate::registers::RegisterBlock;

/// Standard gravity in m/s², used to convert g to m/s²
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Counts corresponding to the full-scale range
const FULL_SCALE_COUNTS: f64 = 32768.0;

/// Full-scale ranges of each channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullScale {
    /// Accelerometer range in g
    pub accel_g: f64,
    /// Gyroscope range in deg/s
    pub gyro_dps: f64,
    /// Magnetometer range in device units
    pub mag: f64,
    /// Angle range in degrees
    pub angle_deg: f64,
}

impl FullScale {
    /// Factory ranges of the WT901: ±16 g, ±2000 deg/s, ±180°
    pub const WT901: FullScale = FullScale {
        accel_g: 16.0,
        gyro_dps: 2000.0,
        mag: 1.0,
        angle_deg: 180.0,
    };

    /// Convert a register block to physical units.
    pub fn decode(&self, registers: &RegisterBlock) -> SensorReading {
        let accel_scale = self.accel_g * STANDARD_GRAVITY;
        let angle_scale = self.angle_deg.to_radians();

        let linear_acceleration = scale(registers.accel(), accel_scale);
        let angular_velocity = scale(registers.gyro(), self.gyro_dps);
        let magnetic_field = scale(registers.mag(), self.mag);
        let [roll, pitch, yaw] = scale(registers.angle(), angle_scale);

        let mut orientation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        orientation.renormalize();

        SensorReading {
            linear_acceleration,
            angular_velocity,
            magnetic_field,
            roll_pitch_yaw: [roll, pitch, yaw],
            orientation,
        }
    }
}

impl Default for FullScale {
    fn default() -> Self {
        Self::WT901
    }
}

fn scale(raw: [i16; 3], range: f64) -> [f64; 3] {
    raw.map(|v| v as f64 / FULL_SCALE_COUNTS * range)
}

/// One decoded telemetry sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Linear acceleration X/Y/Z in m/s²
    pub linear_acceleration: [f64; 3],
    /// Angular rate X/Y/Z in deg/s
    pub angular_velocity: [f64; 3],
    /// Magnetic field X/Y/Z in device units
    pub magnetic_field: [f64; 3],
    /// Roll, pitch, yaw in radians
    pub roll_pitch_yaw: [f64; 3],
    /// Orientation built from roll about X, pitch about Y, yaw about Z
    pub orientation: UnitQuaternion<f64>,
}

impl SensorReading {
    /// Orientation as `[x, y, z, w]`
    pub fn orientation_xyzw(&self) -> [f64; 4] {
        let q = self.orientation.quaternion();
        [q.i, q.j, q.k, q.w]
    }
}

/// Decode a register block using the WT901 factory ranges.
pub fn decode(registers: &RegisterBlock) -> SensorReading {
    FullScale::WT901.decode(registers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn block_with(index: usize, value: i16) -> RegisterBlock {
        let mut raw = [0i16; 12];
        raw[index] = value;
        RegisterBlock::from_raw(raw)
    }

    #[test]
    fn test_zero_block() {
        let reading = decode(&RegisterBlock::default());
        assert_eq!(reading.linear_acceleration, [0.0; 3]);
        assert_eq!(reading.angular_velocity, [0.0; 3]);
        assert_eq!(reading.magnetic_field, [0.0; 3]);
        assert_eq!(reading.roll_pitch_yaw, [0.0; 3]);

        let [x, y, z, w] = reading.orientation_xyzw();
        assert_relative_eq!(x, 0.0);
        assert_relative_eq!(y, 0.0);
        assert_relative_eq!(z, 0.0);
        assert_relative_eq!(w, 1.0);
    }

    #[test]
    fn test_half_scale_acceleration() {
        let reading = decode(&block_with(0, 16384));
        assert_relative_eq!(reading.linear_acceleration[0], 8.0 * 9.80665, epsilon = 1e-9);
        assert_relative_eq!(reading.linear_acceleration[0], 78.4532, epsilon = 1e-4);
    }

    #[test]
    fn test_negative_full_scale_acceleration() {
        let reading = decode(&block_with(2, i16::MIN));
        assert_relative_eq!(reading.linear_acceleration[2], -16.0 * STANDARD_GRAVITY);
    }

    #[test]
    fn test_gyro_scale() {
        let reading = decode(&block_with(4, 16384));
        assert_relative_eq!(reading.angular_velocity[1], 1000.0);
        assert_eq!(reading.angular_velocity[0], 0.0);
    }

    #[test]
    fn test_mag_scale() {
        let reading = decode(&block_with(8, -8192));
        assert_relative_eq!(reading.magnetic_field[2], -0.25);
    }

    #[test]
    fn test_angles_are_radians() {
        // 16384 counts = 90°
        let reading = decode(&block_with(9, 16384));
        assert_relative_eq!(reading.roll_pitch_yaw[0], FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_yaw_quaternion() {
        let reading = decode(&block_with(11, 16384));
        let [x, y, z, w] = reading.orientation_xyzw();
        let half = (FRAC_PI_2 / 2.0).sin();
        assert_relative_eq!(x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(z, half, epsilon = 1e-12);
        assert_relative_eq!(w, (FRAC_PI_2 / 2.0).cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_roll_quaternion() {
        let reading = decode(&block_with(9, 16384));
        let [x, _, _, w] = reading.orientation_xyzw();
        assert_relative_eq!(x, (PI / 4.0).sin(), epsilon = 1e-12);
        assert_relative_eq!(w, (PI / 4.0).cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_composed_orientation_matches_fixed_axis_order() {
        let raw = [0, 0, 0, 0, 0, 0, 0, 0, 0, 3000, -5000, 12000];
        let reading = decode(&RegisterBlock::from_raw(raw));
        let [roll, pitch, yaw] = reading.roll_pitch_yaw;

        let rx = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::x_axis(), roll);
        let ry = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), pitch);
        let rz = UnitQuaternion::from_axis_angle(&nalgebra::Vector3::z_axis(), yaw);
        let expected = rz * ry * rx;

        assert_relative_eq!(reading.orientation.angle_to(&expected), 0.0, epsilon = 1e-9);

        let (r, p, y) = reading.orientation.euler_angles();
        assert_relative_eq!(r, roll, epsilon = 1e-9);
        assert_relative_eq!(p, pitch, epsilon = 1e-9);
        assert_relative_eq!(y, yaw, epsilon = 1e-9);
    }

    #[test]
    fn test_orientation_is_unit_norm() {
        for (roll, pitch, yaw) in [(32767, -32768, 12345), (-1, 1, -1), (20000, 8000, -30000)] {
            let raw = [0, 0, 0, 0, 0, 0, 0, 0, 0, roll, pitch, yaw];
            let reading = decode(&RegisterBlock::from_raw(raw));
            let [x, y, z, w] = reading.orientation_xyzw();
            assert_relative_eq!((x * x + y * y + z * z + w * w).sqrt(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_custom_full_scale() {
        let scale = FullScale {
            accel_g: 2.0,
            ..FullScale::WT901
        };
        let reading = scale.decode(&block_with(1, 16384));
        assert_relative_eq!(reading.linear_acceleration[1], STANDARD_GRAVITY);
    }
}
