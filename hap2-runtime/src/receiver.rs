use crate::dispatcher::DispatcherHandle;
use crate::error::HapError;
use crate::protocol::{parse_message, Procedure};
use crate::transporter::Transporter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the transporter's receive loop and feeds every decoded message to
/// the dispatcher, in arrival order.
pub struct Receiver {
    transporter: Arc<dyn Transporter>,
    allowed: Arc<HashSet<Procedure>>,
    dispatcher: DispatcherHandle,
}

impl Receiver {
    pub fn new(
        transporter: Arc<dyn Transporter>,
        allowed: HashSet<Procedure>,
        dispatcher: DispatcherHandle,
    ) -> Self {
        Self { transporter, allowed: Arc::new(allowed), dispatcher }
    }

    pub async fn run(self) -> Result<(), HapError> {
        let allowed = self.allowed.clone();
        let dispatcher = self.dispatcher.clone();
        self.transporter.set_receiver(Arc::new(move |raw: String| {
            let parsed = parse_message(&raw, &allowed);
            if let Some(code) = parsed.error_code() {
                warn!(
                    "[receiver] invalid message (code {}, id {:?}): {}",
                    code,
                    parsed.message_id,
                    parsed.error_message().unwrap_or_default()
                );
            }
            if dispatcher.dispatch(parsed).is_err() {
                warn!("[receiver] dispatcher is gone, message dropped");
            }
        }));
        info!("[receiver] started");
        self.transporter.run_receive_loop().await
    }
}
