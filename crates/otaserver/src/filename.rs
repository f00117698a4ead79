use std::str::FromStr;

use crate::error::{Error, ErrorKind, Result};

/// Delimiter separating the fields of a firmware filename.
pub const DELIMITER: char = '_';

// Prefixes accepted in front of a hexadecimal version.
const HEX_PREFIXES: [&str; 2] = ["0x", "0X"];

/// A firmware version.
///
/// Versions are ordered numerically, so `0xa` is newer than `0x9`.
/// They are displayed as lowercase hexadecimal with a `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    /// Creates a [`Version`] from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = HEX_PREFIXES
            .iter()
            .find_map(|prefix| s.strip_prefix(prefix))
            .unwrap_or(s);

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::new(
                ErrorKind::InvalidFilename,
                format!("`{s}` is not a hexadecimal version"),
            ));
        }

        u64::from_str_radix(digits, 16).map(Self).map_err(|e| {
            Error::new(
                ErrorKind::InvalidFilename,
                format!("`{s}` is not a valid version: {e}"),
            )
        })
    }
}

/// Splits a firmware filename into its raw `(slot, application id, version)`
/// fields.
///
/// A filename follows the `{slot}_{appid}_{version}_{suffix}` convention,
/// where the suffix is opaque and optional. The version field is returned as
/// written in the filename.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidFilename`] error when a field is missing or
/// empty.
pub fn decode(filename: &str) -> Result<(&str, &str, &str)> {
    let mut fields = filename.splitn(4, DELIMITER);

    let mut next_field = |name: &str| {
        fields
            .next()
            .filter(|field| !field.is_empty())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidFilename,
                    format!("`{filename}` has no {name} field"),
                )
            })
    };

    let slot = next_field("slot")?;
    let application_id = next_field("application id")?;
    let version = next_field("version")?;

    Ok((slot, application_id, version))
}

/// Builds the filename of a firmware image.
///
/// This is the inverse of [`decode`]: decoding the returned filename gives
/// back the same slot, application id, and version.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidFilename`] error when the slot or the
/// application id is empty or contains the delimiter.
pub fn encode(slot: &str, application_id: &str, version: Version, suffix: &str) -> Result<String> {
    for (name, field) in [("slot", slot), ("application id", application_id)] {
        if field.is_empty() || field.contains(DELIMITER) {
            return Err(Error::new(
                ErrorKind::InvalidFilename,
                format!("invalid {name} `{field}`"),
            ));
        }
    }

    Ok(if suffix.is_empty() {
        format!("{slot}{DELIMITER}{application_id}{DELIMITER}{version}")
    } else {
        format!("{slot}{DELIMITER}{application_id}{DELIMITER}{version}{DELIMITER}{suffix}")
    })
}

/// A firmware image described by its filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDescriptor {
    /// Device slot targeted by the image.
    pub slot: String,
    /// Application the image belongs to.
    pub application_id: String,
    /// Image version.
    pub version: Version,
    /// Filename inside the firmware directory.
    pub filename: String,
}

impl FirmwareDescriptor {
    /// Creates a [`FirmwareDescriptor`] from a filename.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidFilename`] error when the filename
    /// does not follow the naming convention.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let (slot, application_id, version) = decode(filename)?;

        Ok(Self {
            slot: slot.into(),
            application_id: application_id.into(),
            version: version.parse()?,
            filename: filename.into(),
        })
    }

    /// Checks whether the image targets the given application and slot.
    #[must_use]
    pub fn matches(&self, application_id: &str, slot: &str) -> bool {
        self.application_id == application_id && self.slot == slot
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::{FirmwareDescriptor, Version, decode, encode};

    #[test]
    fn decode_fields() {
        assert_eq!(
            decode("slot0_app42_0x1_fw.bin").unwrap(),
            ("slot0", "app42", "0x1")
        );
        assert_eq!(decode("slot1_app42_ff").unwrap(), ("slot1", "app42", "ff"));
    }

    #[test]
    fn suffix_may_contain_delimiter() {
        let descriptor = FirmwareDescriptor::from_filename("slotA_app1_0x5_riot_fw.bin").unwrap();

        assert_eq!(descriptor.slot, "slotA");
        assert_eq!(descriptor.application_id, "app1");
        assert_eq!(descriptor.version, Version::new(5));
        assert_eq!(descriptor.filename, "slotA_app1_0x5_riot_fw.bin");
    }

    #[test]
    fn invalid_filenames() {
        for filename in [
            "",
            "README.md",
            "slot0_app42",
            "slot0__0x1_fw.bin",
            "_app42_0x1_fw.bin",
            "slot0_app42__fw.bin",
        ] {
            let error = decode(filename).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InvalidFilename, "{filename}");
        }

        for filename in [
            "slot0_app42_0xg1_fw.bin",
            "slot0_app42_0x_fw.bin",
            "slot0_app42_+1_fw.bin",
            "slot0_app42_10000000000000000_fw.bin",
        ] {
            assert!(
                FirmwareDescriptor::from_filename(filename).is_err(),
                "{filename}"
            );
        }
    }

    #[test]
    fn version_parsing() {
        assert_eq!("0x1".parse::<Version>().unwrap(), Version::new(1));
        assert_eq!("0XFF".parse::<Version>().unwrap(), Version::new(255));
        assert_eq!("aB".parse::<Version>().unwrap(), Version::new(0xab));
        assert!("0xa".parse::<Version>().unwrap() > "0x9".parse::<Version>().unwrap());
    }

    #[test]
    fn version_display() {
        assert_eq!(Version::new(2).to_string(), "0x2");
        assert_eq!(Version::new(0xabc).to_string(), "0xabc");
        assert_eq!(Version::new(0).to_string(), "0x0");
    }

    #[test]
    fn encode_then_decode() {
        for (slot, application_id, version, suffix) in [
            ("slot0", "app42", Version::new(1), "fw.bin"),
            ("B", "sensor-node", Version::new(u64::MAX), ""),
            ("slot1", "app", Version::new(0x1f), "with_more_fields.hex"),
        ] {
            let filename = encode(slot, application_id, version, suffix).unwrap();
            let descriptor = FirmwareDescriptor::from_filename(&filename).unwrap();

            assert_eq!(descriptor.slot, slot);
            assert_eq!(descriptor.application_id, application_id);
            assert_eq!(descriptor.version, version);
        }
    }

    #[test]
    fn encode_rejects_delimiter() {
        assert!(encode("slot_0", "app", Version::new(1), "fw.bin").is_err());
        assert!(encode("slot0", "", Version::new(1), "fw.bin").is_err());
    }

    #[test]
    fn matches_application_and_slot() {
        let descriptor = FirmwareDescriptor::from_filename("slotA_app1_0x5_x").unwrap();

        assert!(descriptor.matches("app1", "slotA"));
        assert!(!descriptor.matches("app2", "slotA"));
        assert!(!descriptor.matches("app1", "slotB"));
        assert!(!descriptor.matches("slotA", "app1"));
    }
}
