//! BME280 inside climate sensor on top of the `bme280` crate.

use bme280::i2c::BME280;
use embedded_hal::{delay::DelayNs, i2c::I2c};
use envnode_core::sensor::{SensorReading, SensorSource};
use log::{debug, info, warn};

pub const PRIMARY_ADDRESS: u8 = 0x76;
pub const SECONDARY_ADDRESS: u8 = 0x77;

pub type Bme280Error<E> = bme280::Error<E>;

/// Converts the driver's units (°C, %RH, Pa) into a [`SensorReading`].
pub fn reading_from(temperature_c: f32, humidity_pct: f32, pressure_pa: f32) -> SensorReading {
    SensorReading {
        temperature_c,
        humidity_pct,
        pressure_hpa: pressure_pa / 100.0,
    }
}

/// Forced-mode BME280 at a fixed board address.
///
/// The driver is initialized lazily and again after any failed read, so a
/// sensor that comes back mid-run is picked up without a reboot.
pub struct Bme280<I2C, D> {
    sensor: BME280<I2C>,
    delay: D,
    address: u8,
    ready: bool,
}

impl<I2C, D> Bme280<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, address: u8, delay: D) -> Self {
        Self {
            sensor: BME280::new(i2c, address),
            delay,
            address,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Runs one forced conversion.
    pub fn measure(&mut self) -> Result<SensorReading, Bme280Error<I2C::Error>> {
        if !self.ready {
            self.sensor.init(&mut self.delay)?;
            self.ready = true;
            info!("bme280: ready at 0x{:02X}", self.address);
        }
        let measurements = self.sensor.measure(&mut self.delay)?;
        let reading = reading_from(
            measurements.temperature,
            measurements.humidity,
            measurements.pressure,
        );
        debug!(
            "bme280: t={}C rh={}% p={}hPa",
            reading.temperature_c, reading.humidity_pct, reading.pressure_hpa
        );
        Ok(reading)
    }
}

impl<I2C, D> SensorSource for Bme280<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn read(&mut self) -> SensorReading {
        match self.measure() {
            Ok(reading) => reading,
            Err(err) => {
                warn!("bme280: read failed: {:?}", err);
                self.ready = false;
                SensorReading::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBus, NoDelay};

    /// Chip id, calibration words from the Bosch reference example plus a
    /// plausible humidity set, and one raw sample.
    fn seeded_bus(address: u8) -> FakeBus {
        let mut bus = FakeBus::new(address);
        bus.regs[0xD0] = 0x60;

        let words: [i32; 12] = [
            27504, 26435, -1000, 36477, -10685, 3024, 2855, 140, -7, 15500, -14600, 6000,
        ];
        for (index, word) in words.iter().enumerate() {
            let bytes = (*word as u16).to_le_bytes();
            let at = 0x88 + index * 2;
            bus.regs[at] = bytes[0];
            bus.regs[at + 1] = bytes[1];
        }
        bus.regs[0xA1] = 75;
        // H2 = 362, H3 = 0, H4 = 324, H5 = 50, H6 = 30
        bus.regs[0xE1..0xE8].copy_from_slice(&[0x6A, 0x01, 0x00, 20, 0x24, 3, 30]);

        // adc_P = 415148, adc_T = 519888, adc_H = 0x6000
        bus.regs[0xF7..0xFF].copy_from_slice(&[0x65, 0x59, 0xC0, 0x7E, 0xED, 0x00, 0x60, 0x00]);
        bus
    }

    #[test]
    fn driver_units_map_to_hectopascal() {
        let reading = reading_from(21.5, 40.25, 101_325.0);
        assert_eq!(reading.temperature_c, 21.5);
        assert_eq!(reading.humidity_pct, 40.25);
        assert!((reading.pressure_hpa - 1013.25).abs() < 1e-3);

        assert!(reading_from(f32::NAN, 50.0, f32::NAN).pressure_hpa.is_nan());
    }

    #[test]
    fn forced_measurement_reads_reference_sample() {
        let mut sensor = Bme280::new(seeded_bus(PRIMARY_ADDRESS), PRIMARY_ADDRESS, NoDelay);
        let reading = sensor.read();

        assert!(sensor.is_ready());
        assert!((reading.temperature_c - 25.08).abs() < 0.05);
        assert!((reading.pressure_hpa - 1006.53).abs() < 0.5);
        assert!(reading.humidity_pct > 0.0 && reading.humidity_pct <= 100.0);
    }

    #[test]
    fn wrong_address_reads_unavailable() {
        let mut sensor = Bme280::new(seeded_bus(SECONDARY_ADDRESS), PRIMARY_ADDRESS, NoDelay);
        let reading = sensor.read();

        assert!(reading.temperature_c.is_nan());
        assert!(reading.humidity_pct.is_nan());
        assert!(reading.pressure_hpa.is_nan());
        assert!(!sensor.is_ready());
    }

    #[test]
    fn bus_glitch_is_retried_on_the_next_read() {
        let mut bus = seeded_bus(SECONDARY_ADDRESS);
        bus.fail_next = 1;
        let mut sensor = Bme280::new(bus, SECONDARY_ADDRESS, NoDelay);

        assert!(!sensor.read().is_complete());
        assert!(!sensor.is_ready());

        assert!(sensor.read().is_complete());
        assert!(sensor.is_ready());
    }
}
