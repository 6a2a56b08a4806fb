//! Accessory identity and the air pressure characteristic exposed to the host.

/// Identity reported to the smart-home host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub serial_number: String,
    pub firmware_revision: &'static str,
}

impl AccessoryInfo {
    /// Serial number is `<hostname>-<device>`, where device is the last path
    /// component of the sensor's bus device (e.g. `spidev0.1`).
    pub fn new(name: &str, model: &'static str, hostname: &str, device_path: &str) -> Self {
        let device = device_path.rsplit('/').next().unwrap_or(device_path);

        Self {
            name: name.to_owned(),
            manufacturer: "Bosch",
            model,
            serial_number: format!("{hostname}-{device}"),
            firmware_revision: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Custom characteristic carrying atmospheric pressure.
pub struct AirPressureCharacteristic;

impl AirPressureCharacteristic {
    pub const NAME: &'static str = "Air Pressure";
    pub const UUID: &'static str = "E863F10F-079E-48FF-8F27-9C2605A29F52";
    pub const UNIT: &'static str = "mbar";
    pub const MIN_VALUE: f64 = 800.0;
    pub const MAX_VALUE: f64 = 1200.0;
    pub const MIN_STEP: f64 = 1.0;

    /// Clamp a value into the characteristic's accepted range.
    pub fn clamp(mbar: f64) -> f64 {
        mbar.clamp(Self::MIN_VALUE, Self::MAX_VALUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_number_uses_device_basename() {
        let info = AccessoryInfo::new("Weather", "BMP280", "pi", "/dev/spidev0.1");
        assert_eq!(info.serial_number, "pi-spidev0.1");
        assert_eq!(info.manufacturer, "Bosch");
        assert_eq!(info.firmware_revision, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_pressure_clamp() {
        assert_eq!(AirPressureCharacteristic::clamp(1013.2), 1013.2);
        assert_eq!(AirPressureCharacteristic::clamp(650.0), 800.0);
        assert_eq!(AirPressureCharacteristic::clamp(1500.0), 1200.0);
    }
}
