use std::io::Write;

use serde::Serialize;

use crate::backend::CameraBackend;
use crate::common::{DeviceInfo, Version};
use crate::device::Library;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct Listing {
    lib_version: Version,
    devices: Vec<DeviceInfo>,
}

/// Print the library version and every enumerated device.
pub fn run(backend: Box<dyn CameraBackend>, json: bool, out: &mut dyn Write) -> Result<Vec<DeviceInfo>> {
    let mut lib = Library::init(backend)?;
    let listing = Listing {
        lib_version: lib.version(),
        devices: lib.devices()?,
    };

    if json {
        serde_json::to_writer_pretty(&mut *out, &listing)?;
        writeln!(out)?;
    } else {
        writeln!(out, "lib version: {}", listing.lib_version)?;
        if listing.devices.is_empty() {
            writeln!(out, "No devices found.")?;
        }
        for (index, device) in listing.devices.iter().enumerate() {
            writeln!(out, "  [{}] {}", index, device)?;
            writeln!(
                out,
                "      hardware {} firmware {}",
                device.hardware_version, device.firmware_version
            )?;
        }
    }
    Ok(listing.devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBackend, SimConfig, SimDeviceSpec};

    #[test]
    fn lists_every_simulated_device() {
        let config = SimConfig {
            devices: vec![
                SimDeviceSpec {
                    id: "a".into(),
                    model: "M1".into(),
                    ip: None,
                },
                SimDeviceSpec {
                    id: "b".into(),
                    model: "M2".into(),
                    ip: Some("10.0.0.2".into()),
                },
            ],
            ..SimConfig::default()
        };
        let mut out = Vec::new();
        let devices = run(Box::new(SimBackend::new(config)), false, &mut out).unwrap();
        assert_eq!(devices.len(), 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("lib version:"));
        assert!(text.contains("[1]"));
        assert!(text.contains("10.0.0.2"));
    }

    #[test]
    fn json_listing_parses() {
        let mut out = Vec::new();
        run(Box::new(SimBackend::default()), true, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["devices"][0]["id"], "sim-0");
        assert!(value["lib_version"]["major"].is_number());
    }
}
