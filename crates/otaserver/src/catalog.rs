use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::filename::{FirmwareDescriptor, Version};

/// A catalog of the firmware images stored in a directory.
///
/// The catalog keeps no index: every query lists the directory again, so
/// images added or removed on disk are visible on the next query.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// Creates a [`Catalog`] for the given firmware directory.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the firmware directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the descriptors of all the images in the firmware directory,
    /// sorted by filename.
    ///
    /// Files which do not follow the naming convention are skipped.
    #[must_use]
    pub fn descriptors(&self) -> Vec<FirmwareDescriptor> {
        self.filenames()
            .iter()
            .filter_map(|filename| match FirmwareDescriptor::from_filename(filename) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    debug!("Skipping `{filename}`: {e}");
                    None
                }
            })
            .collect()
    }

    /// Returns the latest version for the given application and slot.
    #[must_use]
    pub fn latest_version(&self, application_id: &str, slot: &str) -> Option<Version> {
        let descriptors = self.descriptors();
        if descriptors.is_empty() {
            warn!("No firmware found in {}", self.path.display());
            return None;
        }

        let version = descriptors
            .iter()
            .filter(|descriptor| descriptor.matches(application_id, slot))
            .map(|descriptor| descriptor.version)
            .max();

        if version.is_none() {
            warn!("No latest version found for application ID `{application_id}` and slot `{slot}`");
        }

        version
    }

    /// Returns the filename of the latest image for the given application
    /// and slot.
    ///
    /// When more files decode to the same latest version, the first one in
    /// filename order is returned.
    #[must_use]
    pub fn latest_filename(&self, application_id: &str, slot: &str) -> Option<String> {
        let version = self.latest_version(application_id, slot)?;

        // The directory is listed again, so the latest image may have been
        // removed in the meantime.
        let filename = self
            .descriptors()
            .into_iter()
            .find(|descriptor| descriptor.matches(application_id, slot) && descriptor.version == version)
            .map(|descriptor| descriptor.filename);

        if filename.is_none() {
            warn!(
                "No firmware filename found for application ID `{application_id}`, slot `{slot}` and version {version}"
            );
        }

        filename
    }

    /// Returns the content of the latest image for the given application
    /// and slot.
    #[must_use]
    pub fn latest_binary(&self, application_id: &str, slot: &str) -> Option<Vec<u8>> {
        let Some(filename) = self.latest_filename(application_id, slot) else {
            warn!("No firmware filename found for application ID `{application_id}` and slot `{slot}`");
            return None;
        };

        self.read_firmware(&filename)
    }

    // Reads a firmware file which may have been removed since it was listed.
    fn read_firmware(&self, filename: &str) -> Option<Vec<u8>> {
        let path = self.path.join(filename);
        match fs::read(&path) {
            Ok(binary) => Some(binary),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                warn!("Firmware file doesn't exist: {}", path.display());
                None
            }
            Err(e) => {
                error!("Unable to read firmware file {}: {e}", path.display());
                None
            }
        }
    }

    // Lists the regular files of the firmware directory in filename order.
    // Symbolic links are followed.
    fn filenames(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Unable to list firmware directory {}: {e}", self.path.display());
                return Vec::new();
            }
        };

        let mut filenames = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                if !entry.path().is_file() {
                    return None;
                }
                entry.file_name().into_string().ok()
            })
            .collect::<Vec<String>>();

        filenames.sort_unstable();
        filenames
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::filename::{Version, encode};

    use super::Catalog;

    fn firmware_dir(files: &[(&str, &[u8])]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (filename, content) in files {
            fs::write(dir.path().join(filename), content).unwrap();
        }
        dir
    }

    #[test]
    fn empty_directory() {
        let dir = firmware_dir(&[]);
        let catalog = Catalog::new(dir.path());

        assert!(catalog.descriptors().is_empty());
        assert_eq!(catalog.latest_version("app42", "slot0"), None);
        assert_eq!(catalog.latest_filename("app42", "slot0"), None);
        assert_eq!(catalog.latest_binary("app42", "slot0"), None);
    }

    #[test]
    fn missing_directory() {
        let dir = firmware_dir(&[]);
        let catalog = Catalog::new(dir.path().join("missing"));

        assert_eq!(catalog.latest_version("app42", "slot0"), None);
        assert_eq!(catalog.latest_binary("app42", "slot0"), None);
    }

    #[test]
    fn latest_is_maximum() {
        let dir = firmware_dir(&[
            ("slot0_app42_0x9_fw.bin", b"nine"),
            ("slot0_app42_0xa_fw.bin", b"ten"),
            ("slot0_app42_0x2_fw.bin", b"two"),
        ]);
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.latest_version("app42", "slot0"), Some(Version::new(10)));
        assert_eq!(
            catalog.latest_filename("app42", "slot0").as_deref(),
            Some("slot0_app42_0xa_fw.bin")
        );
        assert_eq!(catalog.latest_binary("app42", "slot0").unwrap(), b"ten");
    }

    #[test]
    fn other_applications_and_slots_are_ignored() {
        let dir = firmware_dir(&[
            ("slotA_app1_0x5_x", b"app1"),
            ("slotA_app2_0x9_x", b"app2"),
            ("slotB_app1_0xf_x", b"slotB"),
        ]);
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.latest_version("app1", "slotA"), Some(Version::new(5)));
        assert_eq!(catalog.latest_version("app2", "slotA"), Some(Version::new(9)));
        assert_eq!(catalog.latest_version("app1", "slotB"), Some(Version::new(15)));
        assert_eq!(catalog.latest_version("app2", "slotB"), None);
        assert_eq!(catalog.latest_filename("app2", "slotB"), None);
        assert_eq!(catalog.latest_binary("app2", "slotB"), None);
    }

    #[test]
    fn malformed_files_are_skipped() {
        let dir = firmware_dir(&[
            ("README.md", b"docs"),
            ("slot0_app42_notahex_fw.bin", b"bad"),
            ("slot0_app42_0x3_fw.bin", b"good"),
        ]);
        fs::create_dir(dir.path().join("slot0_app42_0xff_dir")).unwrap();
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.descriptors().len(), 1);
        assert_eq!(catalog.latest_version("app42", "slot0"), Some(Version::new(3)));
        assert_eq!(catalog.latest_binary("app42", "slot0").unwrap(), b"good");
    }

    #[test]
    fn field_order_matters() {
        // Swapping slot and application id must not match.
        let dir = firmware_dir(&[("app42_slot0_0x7_fw.bin", b"swapped")]);
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.latest_filename("app42", "slot0"), None);
    }

    #[test]
    fn equal_versions_resolve_by_filename_order() {
        let dir = firmware_dir(&[
            ("slot0_app42_0x02_b.bin", b"b"),
            ("slot0_app42_0x2_a.bin", b"a"),
            ("slot0_app42_2_c.bin", b"c"),
        ]);
        let catalog = Catalog::new(dir.path());

        assert_eq!(
            catalog.latest_filename("app42", "slot0").as_deref(),
            Some("slot0_app42_0x02_b.bin")
        );
    }

    #[test]
    fn binary_fidelity() {
        let content: Vec<u8> = (0..=255).chain([0xff, 0xfe, 0x00, 0xc3, 0x28]).collect();
        let filename = encode("slot1", "app7", Version::new(0x10), "fw.bin").unwrap();
        let dir = firmware_dir(&[(&filename, &content)]);
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.latest_binary("app7", "slot1").unwrap(), content);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_firmware() {
        let images = firmware_dir(&[("build.bin", b"linked")]);
        let dir = firmware_dir(&[]);
        std::os::unix::fs::symlink(
            images.path().join("build.bin"),
            dir.path().join("slot0_app42_0x3_fw.bin"),
        )
        .unwrap();
        // A dangling link is not a firmware file.
        std::os::unix::fs::symlink(
            images.path().join("missing.bin"),
            dir.path().join("slot0_app42_0x9_fw.bin"),
        )
        .unwrap();
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.latest_version("app42", "slot0"), Some(Version::new(3)));
        assert_eq!(
            catalog.latest_filename("app42", "slot0").as_deref(),
            Some("slot0_app42_0x3_fw.bin")
        );
        assert_eq!(catalog.latest_binary("app42", "slot0").unwrap(), b"linked");
    }

    #[test]
    fn removed_firmware_reads_nothing() {
        let dir = firmware_dir(&[("slot0_app42_0x1_fw.bin", b"one")]);
        let catalog = Catalog::new(dir.path());

        // Removed after the filename has been resolved.
        let filename = catalog.latest_filename("app42", "slot0").unwrap();
        fs::remove_file(dir.path().join(&filename)).unwrap();

        assert_eq!(catalog.read_firmware(&filename), None);
    }

    #[test]
    fn unreadable_firmware_reads_nothing() {
        let dir = firmware_dir(&[]);
        fs::create_dir(dir.path().join("slot0_app42_0x1_fw.bin")).unwrap();
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.read_firmware("slot0_app42_0x1_fw.bin"), None);
        assert_eq!(catalog.latest_binary("app42", "slot0"), None);
    }

    #[test]
    fn directory_changes_are_visible() {
        let dir = firmware_dir(&[("slot0_app42_0x1_fw.bin", b"one")]);
        let catalog = Catalog::new(dir.path());

        assert_eq!(catalog.latest_version("app42", "slot0"), Some(Version::new(1)));

        fs::write(dir.path().join("slot0_app42_0x2_fw.bin"), b"two").unwrap();
        assert_eq!(catalog.latest_binary("app42", "slot0").unwrap(), b"two");

        fs::remove_file(dir.path().join("slot0_app42_0x2_fw.bin")).unwrap();
        assert_eq!(catalog.latest_binary("app42", "slot0").unwrap(), b"one");

        fs::remove_file(dir.path().join("slot0_app42_0x1_fw.bin")).unwrap();
        assert_eq!(catalog.latest_version("app42", "slot0"), None);
    }
}
