use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    if METRICS_HANDLE.set(handle).is_err() {
        return Err(anyhow::anyhow!("Metrics recorder already initialized"));
    }

    describe_counter!(
        "provision_codes_issued_total",
        Unit::Count,
        "Setup codes handed out to operators"
    );
    describe_counter!(
        "provisioning_registrations_total",
        Unit::Count,
        "Setup-register attempts by outcome"
    );
    describe_counter!("logins_total", Unit::Count, "Password logins by outcome");

    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}
