use crate::proto::health_service_server::HealthService;
use crate::proto::{HealthCheckRequest, HealthCheckResponse};
use crate::sampler::{ProcessSampler, SampleError, CPU_WINDOW};
use std::time::Duration;
use tonic::{Request, Response, Status};
use tracing::{debug, error};

impl From<SampleError> for Status {
    fn from(e: SampleError) -> Self {
        error!("health check failed: {}", e);
        Status::internal(e.to_string())
    }
}

/// Answers `Check` with this process's CPU and the host's memory usage.
///
/// Every call measures over its own `cpu_window` with a fresh sampler,
/// independent of the console ticker and of other calls.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    cpu_window: Duration,
}

impl HealthProbe {
    pub fn new() -> Self {
        Self::with_cpu_window(CPU_WINDOW)
    }

    pub fn with_cpu_window(cpu_window: Duration) -> Self {
        Self { cpu_window }
    }
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[tonic::async_trait]
impl HealthService for HealthProbe {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        debug!("health check from {:?}", request.remote_addr());

        let mut sampler = ProcessSampler::current()?;
        let cpu_usage_percent = sampler.cpu_over(self.cpu_window).await?;
        let memory_usage_percent = sampler.memory_percent()?;

        Ok(Response::new(HealthCheckResponse {
            cpu_usage_percent,
            memory_usage_percent,
        }))
    }
}
