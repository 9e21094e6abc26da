use delivery_tunnel_runner::prelude::UserValuesConstraint;

use crate::publisher::EventPublisher;
use crate::verifier::DeliveryVerifier;

/// Per-VU tallies, logged when the VU stops.
#[derive(Default, Debug)]
pub struct HarnessVuContext {
    pub published: u64,
    pub rejected: u64,
    pub verified: u64,
    pub unverified: u64,
    /// Iterations that found nothing to verify.
    pub idle: u64,
    /// Set on the first iteration of scenarios where every VU owns a tenant.
    pub tenant: Option<VuTenant>,
}

impl UserValuesConstraint for HarnessVuContext {}

/// A tenant provisioned by one VU, with a publisher and verifier bound to it.
#[derive(Debug)]
pub struct VuTenant {
    pub tenant_id: String,
    pub destination_id: String,
    pub publisher: EventPublisher,
    pub verifier: DeliveryVerifier,
}
