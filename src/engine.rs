//! The compensation engine behind the measurement controller.
//!
//! [`Engine`] is the narrow seam the controller drives: initialise, push
//! settings, trigger a mode, ask how long to wait, fetch a sample.
//! [`BoschEngine`] implements it against the real register map, reproducing
//! the protocol of the Bosch sensor API on top of a [`Transport`].

use core::fmt::Debug;

use bitflags::bitflags;

use crate::calc::{self, CalibData};
use crate::error::Bme680Error;
use crate::registers::*;
use crate::settings::{PowerMode, SensorConfiguration, SettingsSelect};
use crate::transport::Transport;

bitflags! {
    /// Status bits reported with a sample.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SampleStatus: u8 {
        /// The sample was produced by the measurement just triggered.
        const NEW_DATA = NEW_DATA_MSK;
        /// The gas conversion finished.
        const GAS_VALID = GASM_VALID_MSK;
        /// The heater reached its target before the gas conversion.
        const HEAT_STABLE = HEAT_STAB_MSK;
    }
}

impl Default for SampleStatus {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SampleStatus {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "SampleStatus({=u8:#x})", self.bits())
    }
}

/// Compensated result of one acquisition, in sensor-native integer units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    /// Temperature in 0.01 °C.
    pub temperature: i16,
    /// Pressure in Pa.
    pub pressure: u32,
    /// Relative humidity in 0.001 %.
    pub humidity: u32,
    /// Gas resistance in Ohms.
    pub gas_resistance: u32,
    pub status: SampleStatus,
    /// Heater profile the gas conversion ran with.
    pub gas_index: u8,
    pub meas_index: u8,
}

impl RawSample {
    pub fn is_heater_stable(&self) -> bool {
        self.status.contains(SampleStatus::HEAT_STABLE)
    }
}

/// Operations the measurement controller needs from a compensation engine.
///
/// Every fallible call reports OK or a failure; the controller never looks
/// past that distinction.
pub trait Engine {
    /// Bus error type carried inside [`Bme680Error::Comm`].
    type Error: Debug;

    /// Resets the device, checks its identity and loads its calibration.
    fn init(&mut self) -> Result<(), Bme680Error<Self::Error>>;

    /// Writes the register groups in `select` from `config`.
    fn push_settings(
        &mut self,
        select: SettingsSelect,
        config: &SensorConfiguration,
    ) -> Result<(), Bme680Error<Self::Error>>;

    /// Switches the device into `config`'s power mode.
    fn set_power_mode(&mut self, config: &SensorConfiguration)
        -> Result<(), Bme680Error<Self::Error>>;

    /// Milliseconds one forced measurement with `config` takes.
    fn measurement_duration(&self, config: &SensorConfiguration) -> u32;

    /// Reads and compensates the latest sample.
    fn fetch_sample(&mut self) -> Result<RawSample, Bme680Error<Self::Error>>;

    /// Blocks for `ms` milliseconds using the engine's delay provider.
    fn delay_ms(&mut self, ms: u32);
}

/// Register-level engine for a BME680 reached through a [`Transport`].
pub struct BoschEngine<T> {
    transport: T,
    address: u8,
    calib: Option<CalibData>,
}

impl<T> BoschEngine<T>
where
    T: Transport,
{
    /// Creates an engine talking to the sensor at the 7-bit `address`.
    pub fn new(transport: T, address: u8) -> Self {
        Self {
            transport,
            address,
            calib: None,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Calibration loaded by the last successful [`Engine::init`].
    pub fn calibration(&self) -> Option<&CalibData> {
        self.calib.as_ref()
    }

    /// Gives back the transport.
    pub fn release(self) -> T {
        self.transport
    }

    fn read_registers(
        &mut self,
        register: u8,
        buffer: &mut [u8],
    ) -> Result<(), Bme680Error<T::Error>> {
        self.transport
            .read(self.address, register, buffer)
            .map_err(Bme680Error::Comm)
    }

    fn read_register(&mut self, register: u8) -> Result<u8, Bme680Error<T::Error>> {
        let mut buffer = [0u8; 1];
        self.read_registers(register, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Writes register/value pairs in one burst: the first register address,
    /// then `value, register, value, ...` as the payload.
    fn write_registers(&mut self, pairs: &[(u8, u8)]) -> Result<(), Bme680Error<T::Error>> {
        let Some((&(register, value), rest)) = pairs.split_first() else {
            return Err(Bme680Error::InvalidLength);
        };
        if pairs.len() > MAX_BURST_PAIRS {
            return Err(Bme680Error::InvalidLength);
        }

        let mut payload = [0u8; 2 * MAX_BURST_PAIRS - 1];
        payload[0] = value;
        for (i, &(register, value)) in rest.iter().enumerate() {
            payload[1 + 2 * i] = register;
            payload[2 + 2 * i] = value;
        }

        self.transport
            .write(self.address, register, &payload[..2 * pairs.len() - 1])
            .map_err(Bme680Error::Comm)
    }

    /// Puts the sensor to sleep and returns `ctrl_meas` as last read.
    ///
    /// Settings written while a conversion is running are ignored by the
    /// sensor, so every mode change and settings push goes through here.
    fn enter_sleep(&mut self) -> Result<u8, Bme680Error<T::Error>> {
        for _ in 0..MAX_MODE_POLLS {
            let ctrl_meas = self.read_register(ADDR_CTRL_MEAS)?;
            if ctrl_meas & MODE_MSK == PowerMode::Sleep as u8 {
                return Ok(ctrl_meas);
            }

            self.write_registers(&[(ADDR_CTRL_MEAS, ctrl_meas & !MODE_MSK)])?;
            self.transport.delay_ms(POLL_PERIOD_MS);
        }

        warn!("sensor did not enter sleep mode");
        Err(Bme680Error::Timeout)
    }
}

impl<T> Engine for BoschEngine<T>
where
    T: Transport,
{
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Bme680Error<T::Error>> {
        self.calib = None;

        self.write_registers(&[(ADDR_SOFT_RESET, SOFT_RESET_CMD)])?;
        self.transport.delay_ms(RESET_PERIOD_MS);

        let chip_id = self.read_register(ADDR_CHIP_ID)?;
        if chip_id != CHIP_ID {
            warn!("unexpected chip id {:#x}", chip_id);
            return Err(Bme680Error::DeviceNotFound(chip_id));
        }

        let mut coeff = [0u8; calib_mem::TOTAL_SIZE];
        let (first, second) = coeff.split_at_mut(calib_mem::SIZES[0]);
        self.read_registers(calib_mem::ADDR[0], first)?;
        self.read_registers(calib_mem::ADDR[1], second)?;

        let res_heat_range = self.read_register(ADDR_RES_HEAT_RANGE)?;
        let res_heat_val = self.read_register(ADDR_RES_HEAT_VAL)?;
        let range_sw_err = self.read_register(ADDR_RANGE_SW_ERR)?;

        let calib =
            CalibData::from_registers(&coeff, res_heat_val, res_heat_range, range_sw_err);
        debug!("calibration loaded from {:#x}", self.address);
        self.calib = Some(calib);
        Ok(())
    }

    fn push_settings(
        &mut self,
        select: SettingsSelect,
        config: &SensorConfiguration,
    ) -> Result<(), Bme680Error<T::Error>> {
        let calib = self.calib.ok_or(Bme680Error::NotInitialized)?;

        if select.contains(SettingsSelect::GAS_MEAS) {
            // The heater profile only applies to forced conversions.
            if config.power_mode != PowerMode::Forced {
                return Err(Bme680Error::PowerModeUndefined);
            }
            let res_heat =
                calib.heater_resistance(config.ambient_temp_c, config.gas_heater.temperature_c);
            let gas_wait = calc::heater_duration(config.gas_heater.duration_ms);
            self.write_registers(&[(ADDR_RES_HEAT_0, res_heat), (ADDR_GAS_WAIT_0, gas_wait)])?;
        }

        self.enter_sleep()?;

        let mut pairs = [(0u8, 0u8); MAX_BURST_PAIRS];
        let mut count = 0;

        if select.contains(SettingsSelect::FILTER) {
            let reg = self.read_register(ADDR_CONFIG)?;
            let reg = set_bits(reg, FILTER_MSK, FILTER_POS, config.iir_filter as u8);
            pairs[count] = (ADDR_CONFIG, reg);
            count += 1;
        }

        if select.intersects(SettingsSelect::OST | SettingsSelect::OSP) {
            let mut reg = self.read_register(ADDR_CTRL_MEAS)?;
            if select.contains(SettingsSelect::OST) {
                reg = set_bits(reg, OST_MSK, OST_POS, config.temperature_osrs as u8);
            }
            if select.contains(SettingsSelect::OSP) {
                reg = set_bits(reg, OSP_MSK, OSP_POS, config.pressure_osrs as u8);
            }
            pairs[count] = (ADDR_CTRL_MEAS, reg);
            count += 1;
        }

        if select.contains(SettingsSelect::OSH) {
            let reg = self.read_register(ADDR_CTRL_HUM)?;
            pairs[count] = (ADDR_CTRL_HUM, set_bits(reg, OSH_MSK, 0, config.humidity_osrs as u8));
            count += 1;
        }

        if select.intersects(SettingsSelect::RUN_GAS | SettingsSelect::NBCONV) {
            let reg = self.read_register(ADDR_CTRL_GAS_1)?;
            // run_gas on, heater profile 0.
            let reg = set_bits(reg, RUN_GAS_MSK, RUN_GAS_POS, 1);
            pairs[count] = (ADDR_CTRL_GAS_1, set_bits(reg, NBCONV_MSK, 0, 0));
            count += 1;
        }

        if count > 0 {
            self.write_registers(&pairs[..count])?;
        }
        trace!("settings pushed, select {:#x}", select.bits());
        Ok(())
    }

    fn set_power_mode(
        &mut self,
        config: &SensorConfiguration,
    ) -> Result<(), Bme680Error<T::Error>> {
        let ctrl_meas = self.enter_sleep()?;

        if config.power_mode != PowerMode::Sleep {
            let reg = set_bits(ctrl_meas, MODE_MSK, 0, config.power_mode as u8);
            self.write_registers(&[(ADDR_CTRL_MEAS, reg)])?;
        }
        Ok(())
    }

    fn measurement_duration(&self, config: &SensorConfiguration) -> u32 {
        calc::measurement_duration(config)
    }

    fn fetch_sample(&mut self) -> Result<RawSample, Bme680Error<T::Error>> {
        let calib = self.calib.ok_or(Bme680Error::NotInitialized)?;
        let mut field = [0u8; field_mem::SIZE];

        for _ in 0..MAX_FIELD_READS {
            self.read_registers(field_mem::ADDR, &mut field)?;
            if field[0] & NEW_DATA_MSK != 0 {
                return Ok(compensate_field(&calib, &field));
            }
            self.transport.delay_ms(POLL_PERIOD_MS);
        }

        warn!("no new data after {} reads", MAX_FIELD_READS);
        Err(Bme680Error::NoNewData)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.transport.delay_ms(ms);
    }
}

/// Splits field 0 into its ADC values and compensates them.
fn compensate_field(calib: &CalibData, field: &[u8; field_mem::SIZE]) -> RawSample {
    let adc_press =
        ((field[2] as u32) << 12) | ((field[3] as u32) << 4) | ((field[4] as u32) >> 4);
    let adc_temp =
        ((field[5] as u32) << 12) | ((field[6] as u32) << 4) | ((field[7] as u32) >> 4);
    let adc_hum = ((field[8] as u16) << 8) | field[9] as u16;
    let adc_gas = ((field[13] as u16) << 2) | ((field[14] as u16) >> 6);
    let gas_range = field[14] & GAS_RANGE_MSK;

    let status = (field[0] & NEW_DATA_MSK) | (field[14] & (GASM_VALID_MSK | HEAT_STAB_MSK));
    let (temperature, t_fine) = calib.temperature(adc_temp);

    RawSample {
        temperature,
        pressure: calib.pressure(t_fine, adc_press),
        humidity: calib.humidity(t_fine, adc_hum),
        gas_resistance: calib.gas_resistance(adc_gas, gas_range),
        status: SampleStatus::from_bits_truncate(status),
        gas_index: field[0] & GAS_INDEX_MSK,
        meas_index: field[1],
    }
}
