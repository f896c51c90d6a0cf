//! Full forced-mode cycles through the I2C engine against a scripted bus.

use bme680_driver::{
    engine::SampleStatus, error::Bme680Error, AcquisitionState, Bme680, DEFAULT_I2C_ADDRESS,
};
use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::{
    delay::NoopDelay,
    i2c::{Mock as I2cMock, Transaction as I2cTransaction},
};

const ADDR: u8 = DEFAULT_I2C_ADDRESS;

const COEFF: [u8; 41] = [
    0x00, 0x4E, 0x66, 0x03, 0x00, 0x80, 0x8D, 0xA7, 0xD7, 0x58, 0x00, 0xC2, 0x1B, 0xBE, 0xFF, 0x23,
    0x1E, 0x00, 0x00, 0xE7, 0xF6, 0xAC, 0xF5, 0x1E, 0x00, 0x3F, 0x20, 0x2E, 0x00, 0x2D, 0x14, 0x78,
    0x9C, 0xA3, 0x65, 0xFE, 0xCF, 0x2D, 0x12, 0x00, 0x00,
];

const FIELD: [u8; 15] = [
    0x80, 0x00, 0x5A, 0x2F, 0x00, 0x7C, 0x4E, 0x00, 0x5A, 0x3C, 0x00, 0x00, 0x00, 0x71, 0x35,
];

fn read(register: u8, data: &[u8]) -> I2cTransaction {
    I2cTransaction::write_read(ADDR, vec![register], data.to_vec())
}

fn burst(register: u8, payload: &[u8]) -> Vec<I2cTransaction> {
    vec![
        I2cTransaction::transaction_start(ADDR),
        I2cTransaction::write(ADDR, vec![register]),
        I2cTransaction::write(ADDR, payload.to_vec()),
        I2cTransaction::transaction_end(ADDR),
    ]
}

fn initialization() -> Vec<I2cTransaction> {
    let mut expectations = burst(0xE0, &[0xB6]);
    expectations.extend([
        read(0xD0, &[0x61]),
        read(0x89, &COEFF[..25]),
        read(0xE1, &COEFF[25..]),
        read(0x02, &[0x10]),
        read(0x00, &[0x28]),
        read(0x04, &[0xF0]),
    ]);
    expectations
}

/// Settings push and trigger for the baseline configuration.
fn baseline_trigger() -> Vec<I2cTransaction> {
    let mut expectations = burst(0x5A, &[136, 0x64, 0x65]);
    expectations.extend([
        read(0x74, &[0x00]),
        read(0x75, &[0x00]),
        read(0x74, &[0x00]),
        read(0x72, &[0x00]),
        read(0x71, &[0x00]),
    ]);
    expectations.extend(burst(0x75, &[0x08, 0x74, 0x8C, 0x72, 0x02, 0x71, 0x10]));
    expectations.push(read(0x74, &[0x8C]));
    expectations.extend(burst(0x74, &[0x8D]));
    expectations
}

#[test]
fn baseline_reading() {
    let mut expectations = initialization();
    expectations.extend(baseline_trigger());
    expectations.push(read(0x1D, &FIELD));

    let i2c = I2cMock::new(&expectations);
    let mut bme680 = Bme680::new_i2c(i2c, ADDR, NoopDelay::new());

    bme680.initialize().unwrap();
    bme680.perform_reading().unwrap();

    assert_eq!(bme680.state(), AcquisitionState::DataReady);
    assert_eq!(bme680.temperature(), 28.99);
    assert_eq!(bme680.humidity(), 61.358);
    assert_eq!(bme680.pressure(), 98_091.0);
    assert!(bme680.is_gas_heating_setup_stable());
    assert_eq!(bme680.gas_resistance(), 260_069.0);
    assert_eq!(bme680.raw_sample().status, SampleStatus::all());

    let (mut i2c, _) = bme680.release().release().release();
    i2c.done();
}

#[test]
fn reading_with_gas_and_temperature_off() {
    let mut expectations = initialization();
    // Pressure and humidity only: no heater writes, ctrl_meas keeps osrs_t.
    expectations.extend([
        read(0x74, &[0x00]),
        read(0x75, &[0x00]),
        read(0x74, &[0x00]),
        read(0x72, &[0x00]),
    ]);
    expectations.extend(burst(0x75, &[0x08, 0x74, 0x0C, 0x72, 0x02]));
    expectations.push(read(0x74, &[0x0C]));
    expectations.extend(burst(0x74, &[0x0D]));
    expectations.push(read(0x1D, &FIELD));

    let i2c = I2cMock::new(&expectations);
    let mut bme680 = Bme680::new_i2c(i2c, ADDR, NoopDelay::new());

    bme680.initialize().unwrap();
    bme680.set_temperature_oversampling(0u8).unwrap();
    bme680.set_gas_heater(0, 150);
    bme680.perform_reading().unwrap();

    assert!(bme680.temperature().is_nan());
    assert_eq!(bme680.raw_temperature(), 2899);
    assert_eq!(bme680.pressure(), 98_091.0);
    assert_eq!(bme680.gas_resistance(), 0.0);

    let (mut i2c, _) = bme680.release().release().release();
    i2c.done();
}

#[test]
fn foreign_chip_fails_initialization() {
    let mut expectations = burst(0xE0, &[0xB6]);
    expectations.push(read(0xD0, &[0x55]));

    let i2c = I2cMock::new(&expectations);
    let mut bme680 = Bme680::new_i2c(i2c, ADDR, NoopDelay::new());

    assert_eq!(bme680.initialize(), Err(Bme680Error::DeviceNotFound(0x55)));

    let (mut i2c, _) = bme680.release().release().release();
    i2c.done();
}

#[test]
fn bus_error_keeps_last_sample() {
    let mut expectations = initialization();
    expectations.extend(baseline_trigger());
    expectations.push(read(0x1D, &FIELD));
    expectations.extend(baseline_trigger());
    expectations.push(read(0x1D, &[0; 15]).with_error(ErrorKind::Other));

    let i2c = I2cMock::new(&expectations);
    let mut bme680 = Bme680::new_i2c(i2c, ADDR, NoopDelay::new());

    bme680.initialize().unwrap();
    bme680.perform_reading().unwrap();
    let before = bme680.measurement();

    assert_eq!(
        bme680.perform_reading(),
        Err(Bme680Error::Comm(ErrorKind::Other))
    );
    assert_eq!(bme680.state(), AcquisitionState::Failed);
    assert_eq!(bme680.measurement(), before);

    let (mut i2c, _) = bme680.release().release().release();
    i2c.done();
}
