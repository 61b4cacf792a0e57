#![cfg_attr(not(test), no_std)]

//! Sensors on the shared board bus: the BME280 inside climate sensor (through
//! the `bme280` crate) and the MAX17048 fuel gauge.

pub mod bme280_sensor;
pub mod max17048;

pub use bme280_sensor::{Bme280, Bme280Error};
pub use max17048::{GaugeError, Max17048};

#[cfg(test)]
pub(crate) mod fake {
    use embedded_hal::{
        delay::DelayNs,
        i2c::{ErrorKind, ErrorType, I2c, Operation},
    };

    /// Register-file I2C target: the first written byte selects the register,
    /// further writes and reads auto-increment from it. The pointer survives
    /// between transactions like on the real parts.
    pub struct FakeBus {
        pub address: u8,
        pub regs: [u8; 256],
        pub writes: Vec<(u8, u8)>,
        pub fail: bool,
        /// Number of upcoming transactions to NAK before answering again.
        pub fail_next: u32,
        pointer: usize,
    }

    impl FakeBus {
        pub fn new(address: u8) -> Self {
            Self {
                address,
                regs: [0; 256],
                writes: Vec::new(),
                fail: false,
                fail_next: 0,
                pointer: 0,
            }
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), ErrorKind> {
            let glitch = self.fail_next > 0;
            self.fail_next = self.fail_next.saturating_sub(1);
            if self.fail || glitch || address != self.address {
                return Err(ErrorKind::NoAcknowledge(
                    embedded_hal::i2c::NoAcknowledgeSource::Address,
                ));
            }
            let mut pointer = self.pointer;
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => {
                        if let Some((&reg, rest)) = bytes.split_first() {
                            pointer = reg as usize;
                            for &value in rest {
                                self.writes.push((pointer as u8, value));
                                self.regs[pointer] = value;
                                pointer = (pointer + 1) % 256;
                            }
                        }
                    }
                    Operation::Read(buf) => {
                        for byte in buf.iter_mut() {
                            *byte = self.regs[pointer];
                            pointer = (pointer + 1) % 256;
                        }
                    }
                }
            }
            self.pointer = pointer;
            Ok(())
        }
    }

    pub struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }
}
