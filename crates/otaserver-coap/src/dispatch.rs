use std::net::SocketAddr;
use std::sync::Arc;

use coap_lite::{
    BlockHandler, BlockHandlerConfig, CoapRequest, ContentFormat, Packet, RequestType,
    ResponseType,
};

use tokio::sync::Mutex;

use tracing::{debug, error, warn};

use crate::resources::PayloadFormat;
use crate::tree::ResourceTree;

const fn content_format(format: PayloadFormat) -> ContentFormat {
    match format {
        PayloadFormat::Text => ContentFormat::TextPlain,
        PayloadFormat::Binary => ContentFormat::ApplicationOctetStream,
        PayloadFormat::LinkFormat => ContentFormat::ApplicationLinkFormat,
    }
}

/// Turns `CoAP` request datagrams into response datagrams.
///
/// Responses larger than a single message are split into blocks, which
/// are cached per peer and served with block-wise transfers.
pub struct Dispatcher {
    tree: Arc<ResourceTree>,
    block_handler: Mutex<BlockHandler<SocketAddr>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a [`Dispatcher`] serving the given [`ResourceTree`].
    #[must_use]
    pub fn new(tree: Arc<ResourceTree>) -> Self {
        Self {
            tree,
            block_handler: Mutex::new(BlockHandler::new(BlockHandlerConfig::default())),
        }
    }

    /// Handles a datagram received from `peer`.
    ///
    /// Returns the datagram to send back, if any. Malformed datagrams and
    /// messages which are not requests produce no answer.
    pub async fn handle(&self, datagram: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let packet = match Packet::from_bytes(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping malformed datagram from {peer}: {e}");
                return None;
            }
        };

        let mut request = CoapRequest::from_packet(packet, peer);
        if request.response.is_none() {
            debug!("Ignoring a message from {peer} which needs no response");
            return None;
        }

        // Subsequent blocks of a cached response.
        match self.block_handler.lock().await.intercept_request(&mut request) {
            Ok(true) => return encode(request, peer),
            Ok(false) => {}
            Err(e) => {
                warn!("Invalid block-wise request from {peer}: {e:?}");
                return respond_with_status(request, ResponseType::BadRequest, peer);
            }
        }

        self.respond(&mut request, peer).await;

        if let Err(e) = self
            .block_handler
            .lock()
            .await
            .intercept_response(&mut request)
        {
            error!("Unable to split the response for {peer}: {e:?}");
            return respond_with_status(request, ResponseType::InternalServerError, peer);
        }

        encode(request, peer)
    }

    async fn respond(&self, request: &mut CoapRequest<SocketAddr>, peer: SocketAddr) {
        let path = request.get_path();
        let is_get = matches!(request.get_method(), RequestType::Get);

        let Some(response) = request.response.as_mut() else {
            return;
        };

        if !is_get {
            debug!("Method not allowed from {peer} for \"/{path}\"");
            response.set_status(ResponseType::MethodNotAllowed);
            return;
        }

        match self.tree.get(&path, peer).await {
            Some(answer) => {
                response.set_status(ResponseType::Content);
                response
                    .message
                    .set_content_format(content_format(answer.format()));
                response.message.payload = answer.into_payload();
            }
            None => {
                debug!("No resource at \"/{path}\" for {peer}");
                response.set_status(ResponseType::NotFound);
            }
        }
    }
}

fn respond_with_status(
    mut request: CoapRequest<SocketAddr>,
    status: ResponseType,
    peer: SocketAddr,
) -> Option<Vec<u8>> {
    if let Some(response) = request.response.as_mut() {
        response.set_status(status);
        response.message.payload.clear();
    }
    encode(request, peer)
}

fn encode(request: CoapRequest<SocketAddr>, peer: SocketAddr) -> Option<Vec<u8>> {
    let response = request.response?;
    match response.message.to_bytes() {
        Ok(datagram) => Some(datagram),
        Err(e) => {
            error!("Unable to encode the response for {peer}: {e}");
            None
        }
    }
}
