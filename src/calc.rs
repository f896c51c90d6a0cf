//! Integer compensation of raw ADC readings, following the Bosch sensor API.

use crate::registers::{RANGE_SW_ERR_MSK, RES_HEAT_RANGE_MSK};
use crate::settings::{ChannelSetting, SensorConfiguration};

/// Constants and lookup tables supplied by Bosch for the gas resistance.
mod gas_constants {
    /// Base compensation per gas range.
    pub static ARRAY1_INT: [u32; 16] = [
        2147483647, 2147483647, 2147483647, 2147483647, 2147483647, 2126008810, 2147483647,
        2130303777, 2147483647, 2147483647, 2143188679, 2136746228, 2147483647, 2126008810,
        2147483647, 2147483647,
    ];
    /// Range scaling of the ADC value into Ohms.
    pub static ARRAY2_INT: [u32; 16] = [
        4096000000, 2048000000, 1024000000, 512000000, 255744255, 127110228, 64000000, 32258064,
        16016016, 8000000, 4000000, 2000000, 1000000, 500000, 250000, 125000,
    ];
}

/// The heater is never driven above this plate temperature.
const MAX_HEATER_TEMP_C: u16 = 400;

/// Factory-fused calibration coefficients read from the sensor.
/// Unique to every chip and required by all compensation formulas.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibData {
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_g1: i8,
    pub par_g2: i16,
    pub par_g3: i8,
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub res_heat_range: u8,
    pub res_heat_val: i8,
    pub range_sw_err: i8,
}

#[inline]
fn concat(msb: u8, lsb: u8) -> u16 {
    ((msb as u16) << 8) | lsb as u16
}

impl CalibData {
    /// Maps the two coefficient blocks (`0x89..`, then `0xE1..`) and the three
    /// heater registers (`0x00`, `0x02`, `0x04`) onto the coefficients.
    ///
    /// See BME680 datasheet, section 3.11.1.
    pub(crate) fn from_registers(
        coeff: &[u8; 41],
        res_heat_val: u8,
        res_heat_range: u8,
        range_sw_err: u8,
    ) -> Self {
        Self {
            par_t1: concat(coeff[34], coeff[33]),
            par_t2: concat(coeff[2], coeff[1]) as i16,
            par_t3: coeff[3] as i8,
            par_p1: concat(coeff[6], coeff[5]),
            par_p2: concat(coeff[8], coeff[7]) as i16,
            par_p3: coeff[9] as i8,
            par_p4: concat(coeff[12], coeff[11]) as i16,
            par_p5: concat(coeff[14], coeff[13]) as i16,
            par_p6: coeff[16] as i8,
            par_p7: coeff[15] as i8,
            par_p8: concat(coeff[20], coeff[19]) as i16,
            par_p9: concat(coeff[22], coeff[21]) as i16,
            par_p10: coeff[23],
            par_h1: ((coeff[27] as u16) << 4) | (coeff[26] & 0x0F) as u16,
            par_h2: ((coeff[25] as u16) << 4) | (coeff[26] >> 4) as u16,
            par_h3: coeff[28] as i8,
            par_h4: coeff[29] as i8,
            par_h5: coeff[30] as i8,
            par_h6: coeff[31],
            par_h7: coeff[32] as i8,
            par_g1: coeff[37] as i8,
            par_g2: concat(coeff[36], coeff[35]) as i16,
            par_g3: coeff[38] as i8,
            res_heat_range: (res_heat_range & RES_HEAT_RANGE_MSK) >> 4,
            res_heat_val: res_heat_val as i8,
            range_sw_err: ((range_sw_err as i8) & (RANGE_SW_ERR_MSK as i8)) / 16,
        }
    }

    /// Compensates the temperature ADC value.
    ///
    /// Returns the temperature in 0.01 °C and `t_fine`, which the pressure and
    /// humidity formulas need as their temperature reference.
    pub(crate) fn temperature(&self, temp_adc: u32) -> (i16, i32) {
        let var1 = ((temp_adc as i32) >> 3) - ((self.par_t1 as i32) << 1);
        let var2 = (var1 * self.par_t2 as i32) >> 11;
        let var3 = ((((var1 >> 1) * (var1 >> 1)) >> 12) * ((self.par_t3 as i32) << 4)) >> 14;
        let t_fine = var2 + var3;

        ((((t_fine * 5) + 128) >> 8) as i16, t_fine)
    }

    /// Compensates the pressure ADC value into Pascal.
    pub(crate) fn pressure(&self, t_fine: i32, press_adc: u32) -> u32 {
        let mut var1 = (t_fine >> 1) - 64_000;
        let mut var2 = ((((var1 >> 2) * (var1 >> 2)) >> 11) * self.par_p6 as i32) >> 2;
        var2 += (var1 * self.par_p5 as i32) << 1;
        var2 = (var2 >> 2) + ((self.par_p4 as i32) << 16);
        var1 = (((((var1 >> 2) * (var1 >> 2)) >> 13) * ((self.par_p3 as i32) << 5)) >> 3)
            + ((self.par_p2 as i32 * var1) >> 1);
        var1 >>= 18;
        var1 = ((32768 + var1) * self.par_p1 as i32) >> 15;

        if var1 == 0 {
            return 0;
        }

        // The scaled value overflows i32 for ordinary readings, so the
        // division runs unsigned.
        let divisor = var1 as u32;
        let scaled = 1_048_576u32
            .wrapping_sub(press_adc)
            .wrapping_sub((var2 >> 12) as u32)
            .wrapping_mul(3125);
        let press_comp = if scaled >= (1 << 30) {
            ((scaled / divisor) << 1) as i64
        } else {
            ((scaled << 1) / divisor) as i64
        };

        // The cubic term overflows i32 above roughly 1060 hPa.
        let var1 = (self.par_p9 as i64 * (((press_comp >> 3) * (press_comp >> 3)) >> 13)) >> 12;
        let var2 = ((press_comp >> 2) * self.par_p8 as i64) >> 13;
        let var3 = ((press_comp >> 8) * (press_comp >> 8) * (press_comp >> 8) * self.par_p10 as i64)
            >> 17;

        let press_comp = press_comp + ((var1 + var2 + var3 + ((self.par_p7 as i64) << 7)) >> 4);
        press_comp.clamp(0, u32::MAX as i64) as u32
    }

    /// Compensates the humidity ADC value into 0.001 %RH, clamped to 0..=100 %.
    pub(crate) fn humidity(&self, t_fine: i32, hum_adc: u16) -> u32 {
        let temp_scaled = ((t_fine * 5) + 128) >> 8;
        let var1 = hum_adc as i32
            - (self.par_h1 as i32 * 16)
            - (((temp_scaled * self.par_h3 as i32) / 100) >> 1);
        let var2 = (self.par_h2 as i32
            * (((temp_scaled * self.par_h4 as i32) / 100)
                + (((temp_scaled * ((temp_scaled * self.par_h5 as i32) / 100)) >> 6) / 100)
                + (1 << 14)))
            >> 10;
        let var4 = (((self.par_h6 as i32) << 7) + ((temp_scaled * self.par_h7 as i32) / 100)) >> 4;

        // Near full-scale ADC values these products leave the i32 range.
        let var3 = var1 as i64 * var2 as i64;
        let var5 = ((var3 >> 14) * (var3 >> 14)) >> 10;
        let var6 = (var4 as i64 * var5) >> 1;

        let humidity = (((var3 + var6) >> 10) * 1000) >> 12;
        humidity.clamp(0, 100_000) as u32
    }

    /// Converts the gas ADC value and its range into Ohms.
    pub(crate) fn gas_resistance(&self, gas_adc: u16, gas_range: u8) -> u32 {
        let range = (gas_range & 0x0F) as usize;
        // 64-bit intermediates; extreme resistances overflow 32 bits.
        let var1 = ((1340 + (5 * self.range_sw_err as i64))
            * gas_constants::ARRAY1_INT[range] as i64)
            >> 16;
        let var2 = ((gas_adc as i64) << 15) - (1 << 24) + var1;
        let var3 = (gas_constants::ARRAY2_INT[range] as i64 * var1) >> 9;

        (var3 + (var2 >> 1))
            .checked_div(var2)
            .map_or(0, |resistance| resistance as u32)
    }

    /// Register value of the heater resistance for a plate target.
    ///
    /// Depends on the ambient temperature and the chip calibration. The
    /// target is limited to 400 °C to protect the sensor membrane.
    pub(crate) fn heater_resistance(&self, ambient_temp_c: i8, target_temp_c: u16) -> u8 {
        let target = target_temp_c.min(MAX_HEATER_TEMP_C) as i32;

        let var1 = ((ambient_temp_c as i32 * self.par_g3 as i32) / 1000) * 256;
        let var2 = (self.par_g1 as i32 + 784)
            * (((((self.par_g2 as i32 + 154_009) * target * 5) / 100) + 3_276_800) / 10);
        let var3 = var1 + (var2 / 2);
        let var4 = var3 / (self.res_heat_range as i32 + 4);
        let var5 = (131 * self.res_heat_val as i32) + 65536;

        let res_heat_x100 = ((var4 / var5) - 250) * 34;
        ((res_heat_x100 + 50) / 100) as u8
    }
}

/// Encodes a heating duration for the `gas_wait` register.
///
/// The hardware stores a 6-bit mantissa and a 2-bit multiplier (x1, x4, x16,
/// x64 ms). Durations of 4032 ms and above saturate at `0xFF`.
pub(crate) fn heater_duration(duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }

    let mut duration = duration_ms;
    let mut factor = 0u8;
    while duration > 0x3F {
        duration /= 4;
        factor += 1;
    }
    duration as u8 + factor * 64
}

/// Total duration of one forced measurement in ms: the TPH conversion time
/// implied by the oversampling levels, plus the heater duration when gas is
/// measured.
pub(crate) fn measurement_duration(config: &SensorConfiguration) -> u32 {
    let meas_cycles = config.temperature_osrs.cycles()
        + config.pressure_osrs.cycles()
        + config.humidity_osrs.cycles();

    // Conversion cycles, TPH switching, gas measurement and wake-up, in us.
    let tph_dur_us = meas_cycles * 1963 + 477 * 4 + 477 * 5 + 500;
    let mut duration_ms = tph_dur_us / 1000 + 1;

    if config.gas_heater.enables_channel() {
        duration_ms += config.gas_heater.duration_ms as u32;
    }
    duration_ms
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::settings::{GasHeater, Oversampling};

    /// Coefficient blocks of a test chip, in register order.
    pub(crate) const COEFF: [u8; 41] = [
        0x00, 0x4E, 0x66, 0x03, 0x00, 0x80, 0x8D, 0xA7, 0xD7, 0x58, 0x00, 0xC2, 0x1B, 0xBE, 0xFF,
        0x23, 0x1E, 0x00, 0x00, 0xE7, 0xF6, 0xAC, 0xF5, 0x1E, 0x00, 0x3F, 0x20, 0x2E, 0x00, 0x2D,
        0x14, 0x78, 0x9C, 0xA3, 0x65, 0xFE, 0xCF, 0x2D, 0x12, 0x00, 0x00,
    ];
    pub(crate) const RES_HEAT_VAL: u8 = 0x28;
    pub(crate) const RES_HEAT_RANGE: u8 = 0x10;
    pub(crate) const RANGE_SW_ERR: u8 = 0xF0;

    pub(crate) fn calib() -> CalibData {
        CalibData::from_registers(&COEFF, RES_HEAT_VAL, RES_HEAT_RANGE, RANGE_SW_ERR)
    }

    #[test]
    fn parse_coefficients() {
        let calib = calib();
        assert_eq!(calib.par_t1, 26019);
        assert_eq!(calib.par_t2, 26190);
        assert_eq!(calib.par_t3, 3);
        assert_eq!(calib.par_p1, 36224);
        assert_eq!(calib.par_p2, -10329);
        assert_eq!(calib.par_p3, 88);
        assert_eq!(calib.par_p4, 7106);
        assert_eq!(calib.par_p5, -66);
        assert_eq!(calib.par_p6, 30);
        assert_eq!(calib.par_p7, 35);
        assert_eq!(calib.par_p8, -2329);
        assert_eq!(calib.par_p9, -2644);
        assert_eq!(calib.par_p10, 30);
        assert_eq!(calib.par_h1, 736);
        assert_eq!(calib.par_h2, 1010);
        assert_eq!(calib.par_h3, 0);
        assert_eq!(calib.par_h4, 45);
        assert_eq!(calib.par_h5, 20);
        assert_eq!(calib.par_h6, 120);
        assert_eq!(calib.par_h7, -100);
        assert_eq!(calib.par_g1, 45);
        assert_eq!(calib.par_g2, -12290);
        assert_eq!(calib.par_g3, 18);
        assert_eq!(calib.res_heat_range, 1);
        assert_eq!(calib.res_heat_val, 40);
        assert_eq!(calib.range_sw_err, -1);
    }

    #[test]
    fn compensate_tph() {
        let calib = calib();
        let (temperature, t_fine) = calib.temperature(509_152);
        assert_eq!(temperature, 2899);
        assert_eq!(t_fine, 148_442);
        assert_eq!(calib.pressure(t_fine, 369_392), 98_091);
        assert_eq!(calib.humidity(t_fine, 23_100), 61_358);
    }

    #[test]
    fn humidity_is_clamped() {
        let calib = calib();
        let (_, t_fine) = calib.temperature(509_152);
        assert_eq!(calib.humidity(t_fine, 0), 0);
        assert_eq!(calib.humidity(t_fine, 40_000), 100_000);
    }

    #[test]
    fn pressure_at_top_of_range() {
        let calib = calib();
        let (_, t_fine) = calib.temperature(509_152);
        assert_eq!(calib.pressure(t_fine, 323_392), 106_127);
        assert_eq!(calib.pressure(t_fine, 310_000), 108_470);
        assert_eq!(calib.pressure(t_fine, 300_000), 110_224);
    }

    #[test]
    fn humidity_full_scale_adc() {
        let calib = calib();
        let (_, t_fine) = calib.temperature(509_152);
        assert_eq!(calib.humidity(t_fine, u16::MAX), 100_000);
    }

    #[test]
    fn compensate_gas() {
        assert_eq!(calib().gas_resistance(452, 5), 260_069);
    }

    #[test]
    fn heater_resistance_limits_target() {
        let calib = calib();
        assert_eq!(calib.heater_resistance(25, 320), 136);
        assert_eq!(calib.heater_resistance(25, 400), 158);
        assert_eq!(calib.heater_resistance(25, 500), 158);
    }

    #[test]
    fn heater_duration_encoding() {
        assert_eq!(heater_duration(0), 0x00);
        assert_eq!(heater_duration(63), 0x3F);
        assert_eq!(heater_duration(64), 0x50);
        assert_eq!(heater_duration(150), 0x65);
        assert_eq!(heater_duration(252), 0x7F);
        assert_eq!(heater_duration(1000), 0xBE);
        assert_eq!(heater_duration(4031), 0xFE);
        assert_eq!(heater_duration(4032), 0xFF);
        assert_eq!(heater_duration(u16::MAX), 0xFF);
    }

    #[test]
    fn duration_of_baseline() {
        // 14 cycles of TPH conversion, then 150 ms of heating.
        assert_eq!(measurement_duration(&SensorConfiguration::default()), 33 + 150);
    }

    #[test]
    fn duration_grows_with_oversampling() {
        let mut config = SensorConfiguration::disabled();
        assert_eq!(measurement_duration(&config), 5);

        config.temperature_osrs = Oversampling::X16;
        config.pressure_osrs = Oversampling::X16;
        config.humidity_osrs = Oversampling::X16;
        assert_eq!(measurement_duration(&config), 100);
    }

    #[test]
    fn duration_ignores_half_configured_heater() {
        let mut config = SensorConfiguration::default();
        config.gas_heater = GasHeater {
            temperature_c: 0,
            duration_ms: 150,
        };
        assert_eq!(measurement_duration(&config), 33);
    }
}
