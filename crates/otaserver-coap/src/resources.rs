use otaserver::Catalog;

/// Format of a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// ASCII text.
    Text,
    /// Raw bytes.
    Binary,
    /// CoRE Link Format.
    LinkFormat,
}

impl PayloadFormat {
    /// Returns the `CoAP` content-format identifier.
    #[must_use]
    pub const fn id(self) -> u16 {
        match self {
            Self::Text => 0,
            Self::LinkFormat => 40,
            Self::Binary => 42,
        }
    }
}

/// The kind of firmware resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Latest firmware version as a hexadecimal string.
    Version,
    /// Latest firmware filename.
    Name,
    /// Latest firmware binary.
    Firmware,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.segment().fmt(f)
    }
}

impl ResourceKind {
    /// All resource kinds attached to an application slot.
    pub const ALL: [Self; 3] = [Self::Version, Self::Name, Self::Firmware];

    /// Returns the last path segment of the resource.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Name => "name",
            Self::Firmware => "firmware",
        }
    }

    /// Returns the format of the resource payload.
    #[must_use]
    pub const fn format(self) -> PayloadFormat {
        match self {
            Self::Version | Self::Name => PayloadFormat::Text,
            Self::Firmware => PayloadFormat::Binary,
        }
    }
}

/// A response to a `GET` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Vec<u8>,
    format: PayloadFormat,
}

impl Response {
    pub(crate) const fn new(payload: Vec<u8>, format: PayloadFormat) -> Self {
        Self { payload, format }
    }

    pub(crate) const fn empty(format: PayloadFormat) -> Self {
        Self::new(Vec::new(), format)
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload format.
    #[must_use]
    pub const fn format(&self) -> PayloadFormat {
        self.format
    }

    pub(crate) fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// A firmware resource bound to an application and a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    application_id: String,
    slot: String,
    kind: ResourceKind,
}

impl Resource {
    pub(crate) fn new(application_id: &str, slot: &str, kind: ResourceKind) -> Self {
        Self {
            application_id: application_id.into(),
            slot: slot.into(),
            kind,
        }
    }

    /// Returns the application id.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Returns the slot.
    #[must_use]
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Answers a `GET` request with the catalog content.
    ///
    /// A missing firmware produces an empty payload.
    #[must_use]
    pub fn render_get(&self, catalog: &Catalog) -> Response {
        let (application_id, slot) = (self.application_id.as_str(), self.slot.as_str());

        let payload = match self.kind {
            ResourceKind::Version => catalog
                .latest_version(application_id, slot)
                .map(|version| version.to_string().into_bytes()),
            ResourceKind::Name => catalog
                .latest_filename(application_id, slot)
                .map(String::into_bytes),
            ResourceKind::Firmware => catalog.latest_binary(application_id, slot),
        };

        Response::new(payload.unwrap_or_default(), self.kind.format())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use otaserver::Catalog;

    use super::{PayloadFormat, Resource, ResourceKind};

    #[test]
    fn render_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("slot0_app42_0x1_fw.bin"), b"\x00\xff").unwrap();
        fs::write(dir.path().join("slot0_app42_0x2_fw.bin"), b"\xde\xad\xbe\xef").unwrap();
        let catalog = Catalog::new(dir.path());

        let version = Resource::new("app42", "slot0", ResourceKind::Version).render_get(&catalog);
        assert_eq!(version.payload(), b"0x2");
        assert_eq!(version.format(), PayloadFormat::Text);

        let name = Resource::new("app42", "slot0", ResourceKind::Name).render_get(&catalog);
        assert_eq!(name.payload(), b"slot0_app42_0x2_fw.bin");
        assert_eq!(name.format(), PayloadFormat::Text);

        let firmware = Resource::new("app42", "slot0", ResourceKind::Firmware).render_get(&catalog);
        assert_eq!(firmware.payload(), b"\xde\xad\xbe\xef");
        assert_eq!(firmware.format(), PayloadFormat::Binary);
    }

    #[test]
    fn missing_firmware_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());

        for kind in ResourceKind::ALL {
            let response = Resource::new("app42", "slot0", kind).render_get(&catalog);
            assert!(response.payload().is_empty());
            assert_eq!(response.format(), kind.format());
        }
    }
}
