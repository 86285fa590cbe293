//! PromQL query strings. Kept in one place so the shape of each query
//! (what it selects, what it excludes) is visible without chasing format
//! strings through `client.rs`.

/// Idle CPU-seconds rate across every non-control-plane node, scaled to
/// millicores available (spec.md §4.2: "idle CPU-seconds rate × 1000").
pub fn cluster_cpu_available_millicores(master_node_instance: &str, window: &str) -> String {
    format!(
        r#"sum(rate(node_cpu_seconds_total{{mode="idle", instance!="{master_node_instance}"}}[{window}])) * 1000"#
    )
}

/// Available memory in MiB across every non-control-plane node (spec.md
/// §4.2: "available bytes → MiB").
pub fn cluster_memory_available_mib(master_node_instance: &str) -> String {
    format!(
        r#"sum(node_memory_MemAvailable_bytes{{instance!="{master_node_instance}"}}) / 1048576"#
    )
}

/// Live disk read rate in MiB/s; subtracted from a benchmarked ceiling by
/// [`super::apply_benchmarks`] to get available capacity (spec.md §3, §4.2).
pub fn cluster_disk_read_mib_per_sec(master_node_instance: &str, window: &str) -> String {
    format!(
        r#"sum(rate(node_disk_read_bytes_total{{instance!="{master_node_instance}"}}[{window}])) / 1048576"#
    )
}

pub fn cluster_disk_write_mib_per_sec(master_node_instance: &str, window: &str) -> String {
    format!(
        r#"sum(rate(node_disk_written_bytes_total{{instance!="{master_node_instance}"}}[{window}])) / 1048576"#
    )
}

/// Excludes loopback/virtual interfaces the way a human operator would when
/// sizing real network headroom. Live rate in Mbps; subtracted from a
/// benchmarked ceiling by [`super::apply_benchmarks`].
pub fn cluster_network_receive_mbps(master_node_instance: &str, window: &str) -> String {
    format!(
        r#"sum(rate(node_network_receive_bytes_total{{instance!="{master_node_instance}", device!~"lo|veth.*|docker.*|cni.*"}}[{window}])) * 8 / 1000000"#
    )
}

pub fn cluster_network_transmit_mbps(master_node_instance: &str, window: &str) -> String {
    format!(
        r#"sum(rate(node_network_transmit_bytes_total{{instance!="{master_node_instance}", device!~"lo|veth.*|docker.*|cni.*"}}[{window}])) * 8 / 1000000"#
    )
}

/// `100 - max_over_time(gpu_utilization)` for nodes exposing accelerator
/// metrics (spec.md §4.2): the headroom percentage, already "available".
pub fn cluster_gpu_available_percent(master_node_instance: &str, window: &str) -> String {
    format!(
        r#"100 - avg(max_over_time(DCGM_FI_DEV_GPU_UTIL{{instance!="{master_node_instance}"}}[{window}]))"#
    )
}

/// Per-pod CPU seconds/sec for every pod of `service_name`'s revisions.
pub fn revision_cpu_usage(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (pod) (rate(container_cpu_usage_seconds_total{{pod=~"{service_name}.*", container!="POD"}}[{window}]))"#
    )
}

pub fn revision_memory_usage(service_name: &str) -> String {
    format!(
        r#"sum by (pod) (container_memory_working_set_bytes{{pod=~"{service_name}.*", container!="POD"}})"#
    )
}

pub fn revision_disk_read(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (pod) (rate(container_fs_reads_bytes_total{{pod=~"{service_name}.*"}}[{window}]))"#
    )
}

pub fn revision_disk_write(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (pod) (rate(container_fs_writes_bytes_total{{pod=~"{service_name}.*"}}[{window}]))"#
    )
}

pub fn revision_network_uplink(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (pod) (rate(container_network_transmit_bytes_total{{pod=~"{service_name}.*"}}[{window}]))"#
    )
}

pub fn revision_network_downlink(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (pod) (rate(container_network_receive_bytes_total{{pod=~"{service_name}.*"}}[{window}]))"#
    )
}

pub fn revision_gpu_usage(service_name: &str) -> String {
    format!(
        r#"sum by (pod) (DCGM_FI_DEV_GPU_UTIL{{pod=~"{service_name}.*"}})"#
    )
}

/// Successful request throughput, grouped by `configuration_name` where the
/// platform reports it (preferred, spec.md §9 Open Question (a)).
pub fn revision_throughput(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (configuration_name, revision_name) (rate(revision_request_count{{configuration_name=~"{service_name}", response_code_class="2xx"}}[{window}]))"#
    )
}

/// Total request rate regardless of response code, used only to derive the
/// display-only `success_rate` the Observer logs each tick.
pub fn revision_total_requests(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (configuration_name, revision_name) (rate(revision_request_count{{configuration_name=~"{service_name}"}}[{window}]))"#
    )
}

pub fn revision_latency_sum(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (configuration_name, revision_name) (rate(revision_request_latencies_sum{{configuration_name=~"{service_name}"}}[{window}]))"#
    )
}

/// Additional latency contributed by the activator (cold-start buffering
/// component) while a revision is scaling from zero.
pub fn revision_activator_latency_sum(service_name: &str, window: &str) -> String {
    format!(
        r#"sum by (configuration_name, revision_name) (rate(activator_request_latencies_sum{{configuration_name=~"{service_name}"}}[{window}]))"#
    )
}

pub fn revision_queued_requests(service_name: &str) -> String {
    format!(
        r#"sum by (configuration_name, revision_name) (revision_app_request_concurrency{{configuration_name=~"{service_name}"}})"#
    )
}

pub fn revision_target_concurrency(service_name: &str) -> String {
    format!(
        r#"max by (configuration_name, revision_name) (revision_container_concurrency{{configuration_name=~"{service_name}"}})"#
    )
}

/// Concurrent in-flight requests per revision.
pub fn revision_in_flight(service_name: &str) -> String {
    format!(
        r#"sum by (configuration_name, revision_name) (activator_request_concurrency{{configuration_name=~"{service_name}"}})"#
    )
}
