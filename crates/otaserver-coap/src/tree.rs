use std::net::SocketAddr;
use std::sync::Arc;

use otaserver::{Catalog, FirmwareDescriptor};

use indexmap::IndexMap;
use indexmap::map::Entry;

use tokio::sync::RwLock;
use tokio::task::spawn_blocking;

use tracing::{debug, error, info, warn};

use crate::resources::{PayloadFormat, Resource, ResourceKind, Response};

// Path of the resource discovery listing.
//
// https://www.rfc-editor.org/rfc/rfc6690#section-4
const WELL_KNOWN_CORE: &str = ".well-known/core";

fn slot_path(application_id: &str, slot: &str, kind: ResourceKind) -> String {
    format!("{application_id}/{slot}/{kind}")
}

// Version path without a slot segment. It is bound to the first slot
// registered for the application.
fn application_version_path(application_id: &str) -> String {
    format!("{application_id}/{}", ResourceKind::Version)
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/')
}

/// The tree of firmware resources.
///
/// Paths are stored without the leading slash, in registration order.
/// Registrations are serialized by a write lock, while requests to
/// registered resources only take a read lock.
#[derive(Debug)]
pub struct ResourceTree {
    catalog: Arc<Catalog>,
    resources: RwLock<IndexMap<String, Resource>>,
}

impl ResourceTree {
    /// Creates an empty [`ResourceTree`] backed by the given [`Catalog`].
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            resources: RwLock::new(IndexMap::new()),
        }
    }

    /// Returns the [`Catalog`] queried by the resources.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Registers the resources of an application slot.
    ///
    /// Registering an already known application slot leaves the tree
    /// untouched.
    ///
    /// Returns `true` when at least one resource has been added.
    pub async fn register(&self, application_id: &str, slot: &str) -> bool {
        if !is_valid_segment(application_id) || !is_valid_segment(slot) {
            warn!("Invalid resource segments: application ID `{application_id}`, slot `{slot}`");
            return false;
        }

        let mut resources = self.resources.write().await;

        let mut added = false;
        let paths = ResourceKind::ALL
            .into_iter()
            .map(|kind| (slot_path(application_id, slot, kind), kind))
            .chain(std::iter::once((
                application_version_path(application_id),
                ResourceKind::Version,
            )));

        for (path, kind) in paths {
            if let Entry::Vacant(entry) = resources.entry(path) {
                info!("Firmware resource: [GET, \"/{}\"]", entry.key());
                entry.insert(Resource::new(application_id, slot, kind));
                added = true;
            }
        }

        added
    }

    /// Registers the resources for the given firmware filename.
    ///
    /// Filenames which do not follow the naming convention are skipped.
    pub async fn register_filename(&self, filename: &str) -> bool {
        match FirmwareDescriptor::from_filename(filename) {
            Ok(descriptor) => {
                self.register(&descriptor.application_id, &descriptor.slot)
                    .await
            }
            Err(e) => {
                debug!("Skipping `{filename}`: {e}");
                false
            }
        }
    }

    /// Registers the resources for every firmware in the catalog directory.
    ///
    /// Returns the number of newly registered application slots.
    pub async fn register_all(&self) -> usize {
        let catalog = Arc::clone(&self.catalog);
        let descriptors = match spawn_blocking(move || catalog.descriptors()).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                error!("Unable to list firmware: {e}");
                return 0;
            }
        };

        let mut registered = 0;
        for descriptor in descriptors {
            if self
                .register(&descriptor.application_id, &descriptor.slot)
                .await
            {
                registered += 1;
            }
        }
        registered
    }

    /// Returns the registered paths, in registration order.
    pub async fn paths(&self) -> Vec<String> {
        self.resources
            .read()
            .await
            .keys()
            .map(|path| format!("/{path}"))
            .collect()
    }

    /// Answers a `GET` request for the given path.
    ///
    /// Returns `None` when no resource is registered at the path.
    pub async fn get(&self, path: &str, peer: SocketAddr) -> Option<Response> {
        let path = path.trim_matches('/');
        debug!("CoAP GET received from {peer} for \"/{path}\"");

        if path == WELL_KNOWN_CORE {
            return Some(self.link_format().await);
        }

        // The lock is released before touching the filesystem.
        let resource = self.resources.read().await.get(path).cloned()?;
        let format = resource.kind().format();

        let catalog = Arc::clone(&self.catalog);
        match spawn_blocking(move || resource.render_get(&catalog)).await {
            Ok(response) => Some(response),
            Err(e) => {
                error!("Unable to answer the request for \"/{path}\": {e}");
                Some(Response::empty(format))
            }
        }
    }

    // Describes all registered resources in the CoRE Link Format.
    async fn link_format(&self) -> Response {
        let links = self
            .resources
            .read()
            .await
            .iter()
            .map(|(path, resource)| format!("</{path}>;ct={}", resource.kind().format().id()))
            .collect::<Vec<String>>()
            .join(",");

        Response::new(links.into_bytes(), PayloadFormat::LinkFormat)
    }
}
