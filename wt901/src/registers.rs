//! Register values as they appear on the wire
//!
//! The device transmits every register big-endian. `BeU16`/`BeI16` keep the
//! raw bytes so frame structs stay `Pod` with an alignment of 1.

use bytemuck::{Pod, Zeroable};

/// Number of registers in the telemetry block
pub const REGISTER_COUNT: usize = 12;

/// Big-endian unsigned 16-bit wire value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct BeU16([u8; 2]);

impl BeU16 {
    pub fn new(value: u16) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn get(&self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

/// Big-endian signed 16-bit wire value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct BeI16([u8; 2]);

impl BeI16 {
    pub fn new(value: i16) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn get(&self) -> i16 {
        i16::from_be_bytes(self.0)
    }
}

/// Telemetry register block starting at register 0x34
///
/// Total size: 24 bytes (12 registers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct RegisterBlock {
    /// Acceleration X/Y/Z (registers 0x34-0x36)
    pub accel: [BeI16; 3],

    /// Angular rate X/Y/Z (registers 0x37-0x39)
    pub gyro: [BeI16; 3],

    /// Magnetic field X/Y/Z (registers 0x3A-0x3C)
    pub mag: [BeI16; 3],

    /// Roll, pitch, yaw (registers 0x3D-0x3F)
    pub angle: [BeI16; 3],
}

impl RegisterBlock {
    /// Size of the block in bytes
    pub const SIZE: usize = REGISTER_COUNT * 2;

    /// Build a block from register values in wire order:
    /// accel xyz, gyro xyz, mag xyz, roll, pitch, yaw.
    pub fn from_raw(raw: [i16; REGISTER_COUNT]) -> Self {
        let be = |i: usize| BeI16::new(raw[i]);
        Self {
            accel: [be(0), be(1), be(2)],
            gyro: [be(3), be(4), be(5)],
            mag: [be(6), be(7), be(8)],
            angle: [be(9), be(10), be(11)],
        }
    }

    /// Register values in wire order
    pub fn to_raw(&self) -> [i16; REGISTER_COUNT] {
        let mut raw = [0i16; REGISTER_COUNT];
        let registers = self
            .accel
            .iter()
            .chain(&self.gyro)
            .chain(&self.mag)
            .chain(&self.angle);
        for (slot, register) in raw.iter_mut().zip(registers) {
            *slot = register.get();
        }
        raw
    }

    pub fn accel(&self) -> [i16; 3] {
        self.accel.map(|r| r.get())
    }

    pub fn gyro(&self) -> [i16; 3] {
        self.gyro.map(|r| r.get())
    }

    pub fn mag(&self) -> [i16; 3] {
        self.mag.map(|r| r.get())
    }

    /// Roll, pitch and yaw registers
    pub fn angle(&self) -> [i16; 3] {
        self.angle.map(|r| r.get())
    }
}
