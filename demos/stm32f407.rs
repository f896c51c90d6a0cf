//! Demo: periodic environmental monitoring with the BME680 on an STM32F407.
//!
//! Shows:
//! 1. **Initialization**: I2C setup and the baseline driver configuration.
//! 2. **Configuration**: adjusting oversampling, filter and heater settings.
//! 3. **Readings**: forced-mode cycles and the gated accessors.
//! 4. **Heater compensation**: feeding the measured temperature back as the
//!    ambient estimate so the plate stays at its target.

#![no_main]
#![no_std]
#![deny(unsafe_code)]

use bme680_driver::{Bme680, Oversampling, DEFAULT_I2C_ADDRESS};
use defmt_rtt as _;
use panic_probe as _;
use stm32f4xx_hal::{self as hal, prelude::*};

#[cortex_m_rt::entry]
fn main() -> ! {
    // --- 1. Hardware Setup ---
    let dp = hal::pac::Peripherals::take().unwrap();
    let clock_cfg = hal::rcc::Config::default().sysclk(168.MHz());
    let mut rcc = dp.RCC.freeze(clock_cfg);

    // I2C1 on PB6 (SCL) / PB7 (SDA)
    let gpiob = dp.GPIOB.split(&mut rcc);
    let scl = gpiob.pb6.into_open_drain_output();
    let sda = gpiob.pb7.into_open_drain_output();

    let i2c = hal::i2c::I2c1::new(
        dp.I2C1,
        (scl, sda),
        hal::i2c::Mode::Standard {
            frequency: 100.kHz().into(),
        },
        &mut rcc,
    );

    // TIM6 is handed to the driver for its measurement wait, TIM7 paces the loop.
    let driver_delay = dp.TIM6.delay_us(&mut rcc);
    let mut loop_delay = dp.TIM7.delay_ms(&mut rcc);

    // --- 2. Driver Initialization ---
    let mut bme680 = Bme680::new_i2c(i2c, DEFAULT_I2C_ADDRESS, driver_delay);

    // Soft reset, chip id check, calibration read, baseline configuration.
    if let Err(e) = bme680.initialize() {
        defmt::panic!("BME680 initialization failed: {}", defmt::Debug2Format(&e));
    }

    // --- 3. Sensor Configuration ---
    // Faster cycles: 1x oversampling everywhere, no IIR filter, 300 °C for 300 ms.
    bme680.set_temperature_oversampling(Oversampling::X1).unwrap();
    bme680.set_humidity_oversampling(Oversampling::X1).unwrap();
    bme680.set_pressure_oversampling(Oversampling::X1).unwrap();
    bme680.set_iir_filter_size(0u8).unwrap();
    bme680.set_gas_heater(300, 300);
    bme680.set_ambient_temperature(23);

    // --- 4. Measurement Loop ---
    loop {
        match bme680.perform_reading() {
            Ok(()) => {
                defmt::println!("Temperature:    {} °C", bme680.temperature());
                defmt::println!("Humidity:       {} %", bme680.humidity());
                defmt::println!("Pressure:       {} hPa", bme680.pressure() / 100.0);
                if bme680.is_gas_heating_setup_stable() {
                    defmt::println!("Gas Resistance: {} Ohm", bme680.gas_resistance());
                } else {
                    defmt::println!("Gas Resistance: heater not stable");
                }
                defmt::println!("");

                // The heater resistance depends on the ambient temperature; use
                // the one just measured for the next cycle.
                let ambient = bme680.raw_temperature() / 100;
                bme680.set_ambient_temperature(ambient.clamp(-40, 85) as i8);
            }
            // Retrying is up to us; the next iteration simply tries again.
            Err(e) => defmt::println!("Reading failed: {}", defmt::Debug2Format(&e)),
        }

        loop_delay.delay_ms(5000);
    }
}
