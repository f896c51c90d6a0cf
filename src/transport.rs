//! Bus access for the measurement engine.
//!
//! The engine only needs three primitives from the platform: a register
//! read, a register write and a blocking millisecond delay. [`I2cTransport`]
//! provides them on top of any `embedded-hal` 1.0 I2C bus and delay; other
//! buses or test doubles implement [`Transport`] directly.

use core::fmt::Debug;

use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, Operation},
};

/// Register-level access to the sensor.
pub trait Transport {
    /// Bus-level error passed through to the caller unchanged.
    type Error: Debug;

    /// Fills `buffer` with consecutive registers starting at `register`.
    fn read(&mut self, device_address: u8, register: u8, buffer: &mut [u8])
        -> Result<(), Self::Error>;

    /// Sends `register` followed by `payload` in a single bus write.
    fn write(&mut self, device_address: u8, register: u8, payload: &[u8])
        -> Result<(), Self::Error>;

    /// Blocks for at least `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// [`Transport`] over an `embedded-hal` I2C bus and delay provider.
pub struct I2cTransport<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C, D> I2cTransport<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }

    /// Gives back the bus and the delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C, D> Transport for I2cTransport<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    type Error = I2C::Error;

    fn read(
        &mut self,
        device_address: u8,
        register: u8,
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.i2c.write_read(device_address, &[register], buffer)?;
        trace!(
            "i2c read {:#x}[{:#x}] len {}: {:?}",
            device_address,
            register,
            buffer.len(),
            buffer
        );
        Ok(())
    }

    fn write(
        &mut self,
        device_address: u8,
        register: u8,
        payload: &[u8],
    ) -> Result<(), Self::Error> {
        trace!(
            "i2c write {:#x}[{:#x}] len {}: {:?}",
            device_address,
            register,
            payload.len(),
            payload
        );
        // Adjacent writes in one transaction go out without a repeated start.
        self.i2c.transaction(
            device_address,
            &mut [Operation::Write(&[register]), Operation::Write(payload)],
        )
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
