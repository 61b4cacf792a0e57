//! Maxim MAX17048 single-cell fuel gauge.

use embedded_hal::i2c::I2c;
use envnode_core::battery::{BatteryGauge, GaugeReading};
use log::{debug, warn};

pub const ADDRESS: u8 = 0x36;

const REG_VCELL: u8 = 0x02;
const REG_SOC: u8 = 0x04;
const REG_VERSION: u8 = 0x08;

/// VCELL LSB in volts.
const VCELL_LSB_V: f32 = 78.125e-6;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum GaugeError<E> {
    I2c(E),
    /// VERSION did not read as a MAX1704x part.
    UnexpectedVersion(u16),
}

pub struct Max17048<I2C> {
    i2c: I2C,
    verified: bool,
}

impl<I2C: I2c> Max17048<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            verified: false,
        }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    fn register(&mut self, reg: u8) -> Result<u16, GaugeError<I2C::Error>> {
        let mut raw = [0u8; 2];
        self.i2c
            .write_read(ADDRESS, &[reg], &mut raw)
            .map_err(GaugeError::I2c)?;
        Ok(u16::from_be_bytes(raw))
    }

    fn verify(&mut self) -> Result<(), GaugeError<I2C::Error>> {
        if self.verified {
            return Ok(());
        }
        let version = self.register(REG_VERSION)?;
        if version & 0xFFF0 != 0x0010 {
            return Err(GaugeError::UnexpectedVersion(version));
        }
        self.verified = true;
        debug!("max17048: version 0x{:04X}", version);
        Ok(())
    }

    pub fn voltage(&mut self) -> Result<f32, GaugeError<I2C::Error>> {
        self.verify()?;
        Ok(self.register(REG_VCELL)? as f32 * VCELL_LSB_V)
    }

    /// Model state of charge, clamped to 100 %; the gauge briefly reports
    /// a little above full while charging.
    pub fn state_of_charge(&mut self) -> Result<f32, GaugeError<I2C::Error>> {
        self.verify()?;
        let soc = self.register(REG_SOC)? as f32 / 256.0;
        Ok(soc.min(100.0))
    }
}

impl<I2C: I2c> BatteryGauge for Max17048<I2C> {
    fn read(&mut self) -> GaugeReading {
        let voltage = match self.voltage() {
            Ok(voltage) => voltage,
            Err(err) => {
                warn!("max17048: no reading: {:?}", err);
                self.verified = false;
                return GaugeReading::absent();
            }
        };
        match self.state_of_charge() {
            Ok(percent) => GaugeReading {
                voltage,
                percent: Some(percent),
            },
            Err(err) => {
                warn!("max17048: soc unavailable: {:?}", err);
                GaugeReading::voltage_only(voltage)
            }
        }
    }
}
