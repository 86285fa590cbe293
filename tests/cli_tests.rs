use clap::Parser;
use scalewave::cli::{Args, Commands};

#[test]
fn run_command_parses_required_flags() {
    let args = Args::parse_from([
        "scalewave",
        "run",
        "--target-concurrency-per-pod",
        "20",
        "--gpu-revision-marker",
        "-gpu",
        "--master-node-instance",
        "10.0.0.1:9100",
    ]);

    match args.command {
        Commands::Run { controller } => {
            let config = controller.into_app_config().unwrap();
            assert_eq!(config.observer_frequency, "1m");
            assert_eq!(config.panic_timer_secs, 6);
            assert_eq!(config.target_concurrency_per_pod, 20.0);
            assert_eq!(config.gpu_revision_marker, "-gpu");
        }
        Commands::Optimize { .. } => panic!("expected Run"),
    }
}

#[test]
fn optimize_command_carries_service_name() {
    let args = Args::parse_from([
        "scalewave",
        "optimize",
        "checkout",
        "--target-concurrency-per-pod",
        "20",
        "--gpu-revision-marker",
        "-gpu",
        "--master-node-instance",
        "10.0.0.1:9100",
    ]);

    match args.command {
        Commands::Optimize { service, .. } => assert_eq!(service, "checkout"),
        Commands::Run { .. } => panic!("expected Optimize"),
    }
}
