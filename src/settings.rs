use bitflags::bitflags;

/// Oversampling settings for temperature, pressure and humidity.
///
/// Higher oversampling rates reduce noise by averaging inside the sensor,
/// but lengthen every measurement cycle and raise its power draw.
///
/// The discriminants are the register codes. `Skipped` (code 0, "none")
/// is a legal level: it turns the channel off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Oversampling {
    /// No measurement. Disables the channel.
    #[default]
    Skipped = 0,
    /// 1x oversampling.
    X1 = 1,
    /// 2x oversampling.
    X2 = 2,
    /// 4x oversampling.
    X4 = 3,
    /// 8x oversampling.
    X8 = 4,
    /// 16x oversampling. Highest precision, longest duration.
    X16 = 5,
}

impl Oversampling {
    /// Number of conversion cycles the sensor runs at this level.
    pub(crate) fn cycles(self) -> u32 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// Rejects codes above [`Oversampling::X16`]; the error carries the code.
impl TryFrom<u8> for Oversampling {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Oversampling::Skipped),
            1 => Ok(Oversampling::X1),
            2 => Ok(Oversampling::X2),
            3 => Ok(Oversampling::X4),
            4 => Ok(Oversampling::X8),
            5 => Ok(Oversampling::X16),
            _ => Err(value),
        }
    }
}

/// Infinite impulse response (IIR) filter size, in samples.
///
/// The filter smooths short-term disturbances in pressure and temperature
/// (slamming doors, drafts). It does not affect humidity or gas. The
/// discriminants are the register codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IIRFilter {
    /// Filter off.
    #[default]
    IIR0 = 0,
    IIR1 = 1,
    IIR3 = 2,
    IIR7 = 3,
    IIR15 = 4,
    IIR31 = 5,
    IIR63 = 6,
    IIR127 = 7,
}

/// Rejects codes above [`IIRFilter::IIR127`]; the error carries the code.
impl TryFrom<u8> for IIRFilter {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IIRFilter::IIR0),
            1 => Ok(IIRFilter::IIR1),
            2 => Ok(IIRFilter::IIR3),
            3 => Ok(IIRFilter::IIR7),
            4 => Ok(IIRFilter::IIR15),
            5 => Ok(IIRFilter::IIR31),
            6 => Ok(IIRFilter::IIR63),
            7 => Ok(IIRFilter::IIR127),
            _ => Err(value),
        }
    }
}

/// Target of the gas sensor heating plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GasHeater {
    /// Plate temperature in °C (typically 200 to 400).
    pub temperature_c: u16,
    /// Time the plate is held at temperature before the reading, in ms.
    pub duration_ms: u16,
}

/// Sensor power mode. Only the single-shot subset is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerMode {
    #[default]
    Sleep = 0,
    /// One measurement cycle, then back to sleep.
    Forced = 1,
}

/// Whether a setting value leaves its channel switched on.
///
/// Enable flags are never stored independently of their setting: each
/// setter derives its flag through this method.
pub trait ChannelSetting {
    /// Returns `true` if the channel is measured under this setting.
    fn enables_channel(&self) -> bool;
}

impl ChannelSetting for Oversampling {
    fn enables_channel(&self) -> bool {
        *self != Oversampling::Skipped
    }
}

impl ChannelSetting for IIRFilter {
    fn enables_channel(&self) -> bool {
        *self != IIRFilter::IIR0
    }
}

impl ChannelSetting for GasHeater {
    fn enables_channel(&self) -> bool {
        self.temperature_c != 0 && self.duration_ms != 0
    }
}

/// Complete sensor configuration owned by the driver.
///
/// Read once per acquisition cycle to build the settings request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorConfiguration {
    pub(crate) temperature_osrs: Oversampling,
    pub(crate) humidity_osrs: Oversampling,
    pub(crate) pressure_osrs: Oversampling,
    pub(crate) iir_filter: IIRFilter,
    pub(crate) gas_heater: GasHeater,
    pub(crate) power_mode: PowerMode,
    pub(crate) ambient_temp_c: i8,
}

impl Default for SensorConfiguration {
    /// The baseline applied by `initialize`:
    /// - Temperature oversampling: x8
    /// - Humidity oversampling: x2
    /// - Pressure oversampling: x4
    /// - IIR filter: 3 samples
    /// - Heater: 320 °C for 150 ms
    /// - Ambient temperature estimate: 25 °C
    fn default() -> Self {
        Self {
            temperature_osrs: Oversampling::X8,
            humidity_osrs: Oversampling::X2,
            pressure_osrs: Oversampling::X4,
            iir_filter: IIRFilter::IIR3,
            gas_heater: GasHeater {
                temperature_c: 320,
                duration_ms: 150,
            },
            power_mode: PowerMode::Sleep,
            ambient_temp_c: 25,
        }
    }
}

impl SensorConfiguration {
    /// Every channel switched off; the state of a driver before `initialize`.
    pub fn disabled() -> Self {
        Self {
            temperature_osrs: Oversampling::Skipped,
            humidity_osrs: Oversampling::Skipped,
            pressure_osrs: Oversampling::Skipped,
            iir_filter: IIRFilter::IIR0,
            gas_heater: GasHeater::default(),
            ..Self::default()
        }
    }

    /// Temperature oversampling.
    pub fn temperature_oversampling(&self) -> Oversampling {
        self.temperature_osrs
    }

    /// Humidity oversampling.
    pub fn humidity_oversampling(&self) -> Oversampling {
        self.humidity_osrs
    }

    /// Pressure oversampling.
    pub fn pressure_oversampling(&self) -> Oversampling {
        self.pressure_osrs
    }

    /// IIR filter size.
    pub fn iir_filter(&self) -> IIRFilter {
        self.iir_filter
    }

    /// Gas heater target.
    pub fn gas_heater(&self) -> GasHeater {
        self.gas_heater
    }

    /// Pending power mode.
    pub fn power_mode(&self) -> PowerMode {
        self.power_mode
    }

    /// Ambient temperature estimate used for the heater resistance, in °C.
    pub fn ambient_temperature(&self) -> i8 {
        self.ambient_temp_c
    }
}

/// Which of the five channels are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelEnableSet {
    pub(crate) temperature: bool,
    pub(crate) humidity: bool,
    pub(crate) pressure: bool,
    pub(crate) gas: bool,
    pub(crate) filter: bool,
}

impl ChannelEnableSet {
    pub fn temperature(&self) -> bool {
        self.temperature
    }

    pub fn humidity(&self) -> bool {
        self.humidity
    }

    pub fn pressure(&self) -> bool {
        self.pressure
    }

    pub fn gas(&self) -> bool {
        self.gas
    }

    pub fn filter(&self) -> bool {
        self.filter
    }

    /// Builds the settings request for the enabled channels.
    ///
    /// Disabled channels are left out of the request, not written as zero.
    pub fn settings_select(&self) -> SettingsSelect {
        let mut select = SettingsSelect::empty();
        if self.temperature {
            select |= SettingsSelect::OST;
        }
        if self.humidity {
            select |= SettingsSelect::OSH;
        }
        if self.pressure {
            select |= SettingsSelect::OSP;
        }
        if self.filter {
            select |= SettingsSelect::FILTER;
        }
        if self.gas {
            select |= SettingsSelect::GAS_SENSOR;
        }
        select
    }
}

impl From<&SensorConfiguration> for ChannelEnableSet {
    fn from(config: &SensorConfiguration) -> Self {
        Self {
            temperature: config.temperature_osrs.enables_channel(),
            humidity: config.humidity_osrs.enables_channel(),
            pressure: config.pressure_osrs.enables_channel(),
            gas: config.gas_heater.enables_channel(),
            filter: config.iir_filter.enables_channel(),
        }
    }
}

bitflags! {
    /// Register groups an engine should write when pushing settings.
    ///
    /// Values match the select bits of the Bosch sensor API.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SettingsSelect: u8 {
        /// Temperature oversampling.
        const OST = 0x01;
        /// Pressure oversampling.
        const OSP = 0x02;
        /// Humidity oversampling.
        const OSH = 0x04;
        /// Heater resistance and wait time.
        const GAS_MEAS = 0x08;
        /// IIR filter.
        const FILTER = 0x10;
        /// Heater current control.
        const HCNTRL = 0x20;
        /// run_gas bit.
        const RUN_GAS = 0x40;
        /// Number of heater profile conversions.
        const NBCONV = 0x80;
        /// Everything needed for a gas measurement.
        const GAS_SENSOR = Self::GAS_MEAS.bits() | Self::RUN_GAS.bits() | Self::NBCONV.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversampling_codes() {
        assert_eq!(Oversampling::try_from(0u8), Ok(Oversampling::Skipped));
        assert_eq!(Oversampling::try_from(5u8), Ok(Oversampling::X16));
        assert_eq!(Oversampling::try_from(6u8), Err(6));
        assert_eq!(Oversampling::try_from(0xFFu8), Err(0xFF));
        assert_eq!(Oversampling::X4 as u8, 3);
    }

    #[test]
    fn filter_codes() {
        assert_eq!(IIRFilter::try_from(0u8), Ok(IIRFilter::IIR0));
        assert_eq!(IIRFilter::try_from(7u8), Ok(IIRFilter::IIR127));
        assert_eq!(IIRFilter::try_from(8u8), Err(8));
    }

    #[test]
    fn oversampling_enables_unless_skipped() {
        assert!(!Oversampling::Skipped.enables_channel());
        for os in [
            Oversampling::X1,
            Oversampling::X2,
            Oversampling::X4,
            Oversampling::X8,
            Oversampling::X16,
        ] {
            assert!(os.enables_channel());
        }
    }

    #[test]
    fn filter_enables_unless_zero() {
        assert!(!IIRFilter::IIR0.enables_channel());
        for code in 1..=7u8 {
            assert!(IIRFilter::try_from(code).unwrap().enables_channel());
        }
    }

    #[test]
    fn heater_needs_temperature_and_duration() {
        let heater = |temperature_c, duration_ms| GasHeater {
            temperature_c,
            duration_ms,
        };
        assert!(!heater(0, 150).enables_channel());
        assert!(!heater(320, 0).enables_channel());
        assert!(!heater(0, 0).enables_channel());
        assert!(heater(1, 1).enables_channel());
        assert!(heater(u16::MAX, u16::MAX).enables_channel());
    }

    #[test]
    fn cycles_per_level() {
        let cycles: [u32; 6] = [0, 1, 2, 4, 8, 16];
        for code in 0..=5u8 {
            let os = Oversampling::try_from(code).unwrap();
            assert_eq!(os.cycles(), cycles[code as usize]);
        }
    }

    #[test]
    fn baseline_enables_everything() {
        let channels = ChannelEnableSet::from(&SensorConfiguration::default());
        assert!(channels.temperature());
        assert!(channels.humidity());
        assert!(channels.pressure());
        assert!(channels.gas());
        assert!(channels.filter());
        assert_eq!(
            channels.settings_select(),
            SettingsSelect::OST
                | SettingsSelect::OSP
                | SettingsSelect::OSH
                | SettingsSelect::FILTER
                | SettingsSelect::GAS_SENSOR
        );
        assert_eq!(channels.settings_select().bits(), 0xDF);
    }

    #[test]
    fn disabled_configuration_selects_nothing() {
        let channels = ChannelEnableSet::from(&SensorConfiguration::disabled());
        assert_eq!(channels, ChannelEnableSet::default());
        assert!(channels.settings_select().is_empty());
    }

    #[test]
    fn select_omits_disabled_channels() {
        let channels = ChannelEnableSet {
            temperature: false,
            humidity: true,
            pressure: true,
            gas: false,
            filter: true,
        };
        let select = channels.settings_select();
        assert!(!select.contains(SettingsSelect::OST));
        assert!(!select.intersects(SettingsSelect::GAS_SENSOR));
        assert_eq!(
            select,
            SettingsSelect::OSH | SettingsSelect::OSP | SettingsSelect::FILTER
        );
    }
}
