//! Register map of the BME680 and the bit masks used on it.

/// Value of the chip id register for a BME680.
pub(crate) const CHIP_ID: u8 = 0x61;

pub(crate) const ADDR_CHIP_ID: u8 = 0xD0;
pub(crate) const ADDR_SOFT_RESET: u8 = 0xE0;
pub(crate) const SOFT_RESET_CMD: u8 = 0xB6;

/// Calibration coefficient blocks. The BME680 stores them in two
/// non-contiguous regions.
pub(crate) mod calib_mem {
    pub const ADDR: [u8; 2] = [0x89, 0xE1];
    pub const SIZES: [usize; 2] = [25, 16];
    pub const TOTAL_SIZE: usize = 25 + 16;
}

pub(crate) const ADDR_RES_HEAT_VAL: u8 = 0x00;
pub(crate) const ADDR_RES_HEAT_RANGE: u8 = 0x02;
pub(crate) const ADDR_RANGE_SW_ERR: u8 = 0x04;
pub(crate) const RES_HEAT_RANGE_MSK: u8 = 0x30;
pub(crate) const RANGE_SW_ERR_MSK: u8 = 0xF0;

/// Field 0: status, measurement index, then pressure, temperature, humidity
/// and gas ADC values.
pub(crate) mod field_mem {
    pub const ADDR: u8 = 0x1D;
    pub const SIZE: usize = 15;
}

pub(crate) const NEW_DATA_MSK: u8 = 0x80;
pub(crate) const GAS_INDEX_MSK: u8 = 0x0F;
pub(crate) const GAS_RANGE_MSK: u8 = 0x0F;
pub(crate) const GASM_VALID_MSK: u8 = 0x20;
pub(crate) const HEAT_STAB_MSK: u8 = 0x10;

/// Heater profile 0 registers; the driver only uses the first slot.
pub(crate) const ADDR_RES_HEAT_0: u8 = 0x5A;
pub(crate) const ADDR_GAS_WAIT_0: u8 = 0x64;

/// `ctrl_gas_1`: run_gas (bit 4) and nb_conv (bits 3:0).
pub(crate) const ADDR_CTRL_GAS_1: u8 = 0x71;
pub(crate) const RUN_GAS_MSK: u8 = 0x10;
pub(crate) const RUN_GAS_POS: u8 = 4;
pub(crate) const NBCONV_MSK: u8 = 0x0F;

/// `ctrl_hum`: osrs_h (bits 2:0).
pub(crate) const ADDR_CTRL_HUM: u8 = 0x72;
pub(crate) const OSH_MSK: u8 = 0x07;

/// `ctrl_meas`: osrs_t (bits 7:5), osrs_p (bits 4:2), mode (bits 1:0).
pub(crate) const ADDR_CTRL_MEAS: u8 = 0x74;
pub(crate) const OST_MSK: u8 = 0xE0;
pub(crate) const OST_POS: u8 = 5;
pub(crate) const OSP_MSK: u8 = 0x1C;
pub(crate) const OSP_POS: u8 = 2;
pub(crate) const MODE_MSK: u8 = 0x03;

/// `config`: filter (bits 4:2).
pub(crate) const ADDR_CONFIG: u8 = 0x75;
pub(crate) const FILTER_MSK: u8 = 0x1C;
pub(crate) const FILTER_POS: u8 = 2;

pub(crate) const RESET_PERIOD_MS: u32 = 10;
pub(crate) const POLL_PERIOD_MS: u32 = 10;

/// Attempts at reading field 0 before giving up on new data.
pub(crate) const MAX_FIELD_READS: usize = 10;
/// Attempts at putting the sensor to sleep before a mode change.
pub(crate) const MAX_MODE_POLLS: usize = 10;
/// Largest register/value burst written in one bus transaction.
pub(crate) const MAX_BURST_PAIRS: usize = 4;

/// Replaces the bits selected by `mask` in `register` with `value << pos`.
#[inline]
pub(crate) fn set_bits(register: u8, mask: u8, pos: u8, value: u8) -> u8 {
    (register & !mask) | ((value << pos) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bits_keeps_neighbouring_fields() {
        // ctrl_meas with mode = forced, osrs_p = 1x, osrs_t = 1x
        let reg = 0b001_001_01;
        assert_eq!(set_bits(reg, OST_MSK, OST_POS, 4), 0b100_001_01);
        assert_eq!(set_bits(reg, OSP_MSK, OSP_POS, 5), 0b001_101_01);
        assert_eq!(set_bits(reg, MODE_MSK, 0, 0), 0b001_001_00);
    }

    #[test]
    fn set_bits_truncates_to_mask() {
        assert_eq!(set_bits(0x00, FILTER_MSK, FILTER_POS, 0xFF), FILTER_MSK);
    }
}
