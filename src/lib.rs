#![no_std]

//! # BME680 Environmental Sensor Driver
//!
//! A `no_std` driver for the Bosch BME680 that runs single-shot, forced-mode
//! measurements of temperature, humidity, pressure and gas resistance.
//!
//! The driver is split in two layers:
//! - [`Bme680`], the measurement controller. It owns the channel
//!   configuration, derives which channels are enabled from it, runs the
//!   configure / trigger / wait / fetch cycle and exposes the last sample.
//! - An [`Engine`](engine::Engine) doing the register protocol and the
//!   compensation maths. [`BoschEngine`](engine::BoschEngine) talks to the
//!   sensor through a [`Transport`](transport::Transport), normally an
//!   `embedded-hal` I2C bus.
//!
//! ## Channels
//! A channel is enabled by its setting and nothing else: an oversampling of
//! [`Oversampling::Skipped`] disables temperature, humidity or pressure, an
//! IIR filter of size 0 disables filtering, and a heater temperature or
//! duration of 0 disables gas.
//!
//! ## Units
//! - **Temperature**: °C; raw value in 0.01 °C -> 2350 = 23.50 °C
//! - **Humidity**: %RH; raw value in 0.001 %RH -> 45123 = 45.123 %
//! - **Pressure**: Pascal (Pa) -> 101325 = 1013.25 hPa
//! - **Gas Resistance**: Ohms (Ω)
//!
//! Disabled channels read as `NaN`, except gas which reads as `0.0`. Gas
//! also reads as `0.0` while the heater has not been stable.
//!
//! ## Example
//! ```no_run
//! # fn run<I2C, D>(i2c: I2C, delay: D)
//! # where I2C: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs {
//! use bme680_driver::{Bme680, DEFAULT_I2C_ADDRESS};
//!
//! let mut bme680 = Bme680::new_i2c(i2c, DEFAULT_I2C_ADDRESS, delay);
//! if bme680.initialize().is_ok() && bme680.perform_reading().is_ok() {
//!     let _celsius = bme680.temperature();
//!     let _ohms = bme680.gas_resistance();
//! }
//! # }
//! ```

#[cfg(test)]
#[macro_use]
extern crate std;

// Must come first so the logging macros are visible to the other modules.
#[macro_use]
mod fmt;

mod calc;
pub mod engine;
mod registers;
pub mod settings;
pub mod transport;

use embedded_hal::{delay::DelayNs, i2c::I2c};

pub use calc::CalibData;
use engine::{BoschEngine, Engine, RawSample};
use error::Bme680Error;
pub use settings::*;
use transport::I2cTransport;

/// I2C address with SDO tied to ground.
pub const DEFAULT_I2C_ADDRESS: u8 = 0x76;
/// I2C address with SDO tied to VDDIO.
pub const SECONDARY_I2C_ADDRESS: u8 = 0x77;

/// Error types for the BME680 driver.
pub mod error {
    use core::fmt::Debug;

    /// Errors that can occur during communication or configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
    pub enum Bme680Error<E>
    where
        E: Debug,
    {
        /// Bus error from the transport.
        #[error("bus error: {0:?}")]
        Comm(E),
        /// Oversampling code above 16x.
        #[error("invalid oversampling level")]
        InvalidOversampling,
        /// Filter code above 127 samples.
        #[error("invalid IIR filter size")]
        InvalidFilterSize,
        /// The chip id register did not identify a BME680.
        #[error("unexpected chip id {0:#04x}")]
        DeviceNotFound(u8),
        /// Calibration has not been loaded yet.
        #[error("sensor not initialized")]
        NotInitialized,
        /// Heater settings were pushed outside forced mode.
        #[error("heater settings need forced mode")]
        PowerModeUndefined,
        /// A register burst was empty or longer than the engine supports.
        #[error("invalid register burst length")]
        InvalidLength,
        /// The sensor did not flag a finished measurement.
        #[error("no new data")]
        NoNewData,
        /// The sensor did not enter sleep mode.
        #[error("timed out waiting for sleep mode")]
        Timeout,
    }

    /// Result type alias for BME680 operations.
    pub type Result<T, E> = core::result::Result<T, Bme680Error<E>>;
}

/// Progress of the last acquisition started by [`Bme680::perform_reading`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionState {
    /// No acquisition started since construction or `initialize`.
    #[default]
    Idle,
    SettingsPushed,
    ModeSet,
    /// The last acquisition completed and its sample is current.
    DataReady,
    /// The last acquisition stopped at an engine error; the previous sample
    /// is still held.
    Failed,
}

/// The last sample in physical units, `None` where a channel gives no value.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// °C
    pub temperature: Option<f32>,
    /// %RH
    pub humidity: Option<f32>,
    /// Pa
    pub pressure: Option<f32>,
    /// Ω, present only with a stable heater.
    pub gas_resistance: Option<f32>,
}

/// The measurement controller for one BME680.
pub struct Bme680<E> {
    engine: E,
    config: SensorConfiguration,
    channels: ChannelEnableSet,
    sample: RawSample,
    state: AcquisitionState,
}

impl<I2C, D> Bme680<BoschEngine<I2cTransport<I2C, D>>>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Creates a driver for the sensor at `address` on an I2C bus.
    ///
    /// The delay provider is used for the measurement wait and for short
    /// polls during mode changes.
    pub fn new_i2c(i2c: I2C, address: u8, delay: D) -> Self {
        Self::new(BoschEngine::new(I2cTransport::new(i2c, delay), address))
    }
}

impl<E> Bme680<E>
where
    E: Engine,
{
    /// Creates a driver on top of `engine` with every channel disabled.
    ///
    /// Call [`initialize`](Self::initialize) before reading.
    pub fn new(engine: E) -> Self {
        let config = SensorConfiguration::disabled();
        Self {
            engine,
            channels: ChannelEnableSet::from(&config),
            config,
            sample: RawSample::default(),
            state: AcquisitionState::Idle,
        }
    }

    /// Applies the baseline configuration and initializes the engine.
    ///
    /// Baseline: humidity 2x, pressure 4x, temperature 8x, IIR filter of 3
    /// samples, heater at 320 °C for 150 ms. The configuration stays applied
    /// even if the engine fails; readings must not be trusted until a call
    /// succeeds.
    pub fn initialize(&mut self) -> Result<(), Bme680Error<E::Error>> {
        self.set_humidity_oversampling(Oversampling::X2)?;
        self.set_pressure_oversampling(Oversampling::X4)?;
        self.set_temperature_oversampling(Oversampling::X8)?;
        self.set_iir_filter_size(IIRFilter::IIR3)?;
        self.set_gas_heater(320, 150);
        self.state = AcquisitionState::Idle;

        if let Err(e) = self.engine.init() {
            warn!("engine initialization failed");
            return Err(e);
        }
        info!("bme680 initialized");
        Ok(())
    }

    /// Sets the temperature oversampling, [`Oversampling::Skipped`] disables
    /// the channel.
    ///
    /// Accepts an [`Oversampling`] or its register code (`0..=5`). Anything
    /// above 16x is rejected and nothing changes.
    pub fn set_temperature_oversampling<L>(&mut self, level: L) -> Result<(), Bme680Error<E::Error>>
    where
        L: TryInto<Oversampling>,
    {
        let level = level
            .try_into()
            .map_err(|_| Bme680Error::InvalidOversampling)?;
        self.config.temperature_osrs = level;
        self.channels.temperature = level.enables_channel();
        Ok(())
    }

    /// Sets the humidity oversampling. See
    /// [`set_temperature_oversampling`](Self::set_temperature_oversampling).
    pub fn set_humidity_oversampling<L>(&mut self, level: L) -> Result<(), Bme680Error<E::Error>>
    where
        L: TryInto<Oversampling>,
    {
        let level = level
            .try_into()
            .map_err(|_| Bme680Error::InvalidOversampling)?;
        self.config.humidity_osrs = level;
        self.channels.humidity = level.enables_channel();
        Ok(())
    }

    /// Sets the pressure oversampling. See
    /// [`set_temperature_oversampling`](Self::set_temperature_oversampling).
    pub fn set_pressure_oversampling<L>(&mut self, level: L) -> Result<(), Bme680Error<E::Error>>
    where
        L: TryInto<Oversampling>,
    {
        let level = level
            .try_into()
            .map_err(|_| Bme680Error::InvalidOversampling)?;
        self.config.pressure_osrs = level;
        self.channels.pressure = level.enables_channel();
        Ok(())
    }

    /// Sets the IIR filter size from an [`IIRFilter`] or its register code
    /// (`0..=7`). Size 0 disables filtering.
    pub fn set_iir_filter_size<L>(&mut self, size: L) -> Result<(), Bme680Error<E::Error>>
    where
        L: TryInto<IIRFilter>,
    {
        let size = size.try_into().map_err(|_| Bme680Error::InvalidFilterSize)?;
        self.config.iir_filter = size;
        self.channels.filter = size.enables_channel();
        Ok(())
    }

    /// Sets the heater target. Gas is measured only when both values are
    /// nonzero; the target temperature is capped at 400 °C by the engine.
    pub fn set_gas_heater(&mut self, temperature_c: u16, duration_ms: u16) {
        let heater = GasHeater {
            temperature_c,
            duration_ms,
        };
        self.config.gas_heater = heater;
        self.channels.gas = heater.enables_channel();
    }

    /// Updates the ambient temperature estimate used to compute the heater
    /// resistance. Feeding back the last measured temperature keeps the plate
    /// close to its target.
    pub fn set_ambient_temperature(&mut self, celsius: i8) {
        self.config.ambient_temp_c = celsius;
    }

    /// Runs one forced-mode acquisition.
    ///
    /// Pushes the settings of the enabled channels, triggers the measurement,
    /// waits for the duration the engine reports and fetches the sample. On
    /// error the previous sample is kept and [`state`](Self::state) reads
    /// [`AcquisitionState::Failed`]. Nothing is retried.
    pub fn perform_reading(&mut self) -> Result<(), Bme680Error<E::Error>> {
        self.state = AcquisitionState::Idle;
        self.config.power_mode = PowerMode::Forced;
        let select = self.channels.settings_select();

        self.engine
            .push_settings(select, &self.config)
            .map_err(|e| self.fail("settings push", e))?;
        self.state = AcquisitionState::SettingsPushed;

        self.engine
            .set_power_mode(&self.config)
            .map_err(|e| self.fail("mode change", e))?;
        self.state = AcquisitionState::ModeSet;

        let duration_ms = self.engine.measurement_duration(&self.config);
        debug!("measuring for {} ms", duration_ms);
        self.engine.delay_ms(duration_ms);

        self.sample = self
            .engine
            .fetch_sample()
            .map_err(|e| self.fail("sample fetch", e))?;
        self.state = AcquisitionState::DataReady;
        Ok(())
    }

    fn fail(&mut self, step: &str, e: Bme680Error<E::Error>) -> Bme680Error<E::Error> {
        warn!("{} failed", step);
        self.state = AcquisitionState::Failed;
        e
    }

    /// Whether the heater reached its target during the last sample.
    pub fn is_gas_heating_setup_stable(&self) -> bool {
        self.sample.is_heater_stable()
    }

    /// Temperature in °C, `NaN` if the channel is disabled.
    pub fn temperature(&self) -> f32 {
        if self.channels.temperature {
            self.sample.temperature as f32 / 100.0
        } else {
            f32::NAN
        }
    }

    /// Relative humidity in %, `NaN` if the channel is disabled.
    pub fn humidity(&self) -> f32 {
        if self.channels.humidity {
            self.sample.humidity as f32 / 1000.0
        } else {
            f32::NAN
        }
    }

    /// Pressure in Pa, `NaN` if the channel is disabled.
    pub fn pressure(&self) -> f32 {
        if self.channels.pressure {
            self.sample.pressure as f32
        } else {
            f32::NAN
        }
    }

    /// Gas resistance in Ω.
    ///
    /// `0.0` if gas is disabled or the heater was not stable.
    pub fn gas_resistance(&self) -> f32 {
        if self.channels.gas && self.is_gas_heating_setup_stable() {
            self.sample.gas_resistance as f32
        } else {
            0.0
        }
    }

    /// All four values of the last sample, gated like the scalar accessors.
    pub fn measurement(&self) -> Measurement {
        Measurement {
            temperature: self.channels.temperature.then(|| self.temperature()),
            humidity: self.channels.humidity.then(|| self.humidity()),
            pressure: self.channels.pressure.then(|| self.pressure()),
            gas_resistance: (self.channels.gas && self.is_gas_heating_setup_stable())
                .then(|| self.gas_resistance()),
        }
    }

    /// Temperature in 0.01 °C, whether or not the channel is enabled.
    pub fn raw_temperature(&self) -> i16 {
        self.sample.temperature
    }

    /// Pressure in Pa, whether or not the channel is enabled.
    pub fn raw_pressure(&self) -> u32 {
        self.sample.pressure
    }

    /// Humidity in 0.001 %RH, whether or not the channel is enabled.
    pub fn raw_humidity(&self) -> u32 {
        self.sample.humidity
    }

    /// Gas resistance in Ω, ignoring the enable flag and heater stability.
    pub fn raw_gas_resistance(&self) -> u32 {
        self.sample.gas_resistance
    }

    /// Raw ADC words and status of the last completed reading.
    pub fn raw_sample(&self) -> &RawSample {
        &self.sample
    }

    /// Channels enabled by the current configuration.
    pub fn channels(&self) -> ChannelEnableSet {
        self.channels
    }

    /// Current sensor configuration.
    pub fn configuration(&self) -> &SensorConfiguration {
        &self.config
    }

    /// Where the last acquisition cycle stopped.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Borrows the measurement engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutably borrows the measurement engine.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Destroys the driver and gives back the engine.
    pub fn release(self) -> E {
        self.engine
    }
}
