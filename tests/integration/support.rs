use std::sync::Arc;
use std::time::Duration;

use edge_provision::core::PollSchedule;
use edge_provision::distribution::{ComputeOrigin, Origin};
use edge_provision::dns::HostedZone;
use edge_provision::{ClientProvider, MemoryCloud, Pipeline, ProvisionRequest};

pub fn cloud() -> Arc<MemoryCloud> {
    Arc::new(MemoryCloud::new())
}

pub fn api_origin() -> Origin {
    Origin::Compute(ComputeOrigin {
        name: "api".into(),
        domain_name: "abc123.execute-api.eu-west-1.amazonaws.com".into(),
        path: "/prod".into(),
        secret_header: None,
    })
}

/// Short intervals for tests running on paused time.
pub fn fast_schedule() -> PollSchedule {
    PollSchedule {
        initial: Duration::from_secs(1),
        max_interval: Duration::from_secs(4),
        multiplier: 2,
        timeout: Duration::from_secs(60),
    }
}

pub fn request(primary: &str) -> ProvisionRequest {
    let mut request = ProvisionRequest::new(primary, vec![api_origin()]);
    request.schedule = fast_schedule();
    request
}

pub fn pipeline(cloud: &Arc<MemoryCloud>) -> Pipeline {
    Pipeline::new(ClientProvider::in_memory(cloud.clone()))
}

pub fn zone(cloud: &Arc<MemoryCloud>, name: &str) -> HostedZone {
    let id = cloud.add_zone(name);
    HostedZone::new(cloud.clone(), id, name)
}
