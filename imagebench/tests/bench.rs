use std::path::Path;
use std::time::Duration;

use imagebench::config::Config;
use imagebench::error::Error;
use imagebench::record::{Status, TestCategory};
use imagebench_test::fixtures::ImageTree;
use imagebench_test::server::{Behavior, TestServer};

/// Two folders with five images in total and short, deterministic phases.
fn config(tree: &ImageTree, server: &TestServer) -> Config {
    tree.folder("w512", 3, 64, 48);
    tree.folder("w1080", 2, 96, 64);

    let mut config = Config {
        endpoint: server.upload_url(),
        input_dir: tree.input_dir(),
        output_dir: tree.output_dir(),
        summary_dir: tree.summary_dir(),
        folders: vec!["w512".into(), "w1080".into(), "w3840".into()],
        ..Config::default()
    };
    config.request_timeout = Duration::from_secs(10);
    config.concurrent.ceiling = 3;
    config.concurrent.batch_pause = Duration::ZERO;
    config.random.sample_size = 2;
    config.random.seed = Some(7);
    config.stress.total_requests = 7;
    config.stress.concurrency = 2;
    config.stress.submit_delay = Duration::ZERO;
    config
}

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path).unwrap().lines().count()
}

#[tokio::test]
async fn full_run_writes_all_tables() {
    imagebench_test::tracing::init();
    let server = TestServer::new().await;
    let tree = ImageTree::new();
    let config = config(&tree, &server);

    let report = imagebench::run(config).await.unwrap();

    // 5 sequential, 5 concurrent, 2 random, 7 stress
    assert_eq!(report.records.len(), 19);
    assert_eq!(server.requests(), 19);
    assert!(report.records.iter().all(|r| r.status == Status::Success));

    let count = |category| {
        report
            .records
            .iter()
            .filter(|r| r.category == category)
            .count()
    };
    assert_eq!(count(TestCategory::Sequential), 5);
    assert_eq!(count(TestCategory::Concurrent), 5);
    assert_eq!(count(TestCategory::Random), 2);
    assert_eq!(count(TestCategory::Stress), 7);

    let groups: Vec<_> = report.by_folder.iter().map(|s| s.group.as_str()).collect();
    assert_eq!(groups, ["All", "w1080", "w512"]);
    assert_eq!(report.by_folder[0].total_images, 19);
    assert_eq!(report.by_folder[0].success_rate, 100.0);

    let groups: Vec<_> = report.by_category.iter().map(|s| s.group.as_str()).collect();
    assert_eq!(groups, ["All", "concurrent", "random", "sequential", "stress"]);

    let levels: Vec<_> = report
        .by_concurrency
        .iter()
        .map(|s| (s.group.as_str(), s.total_images))
        .collect();
    assert_eq!(levels, [("All", 5), ("2w", 4), ("3w", 1)]);

    let summary = tree.summary_dir();
    for name in [
        "all_results.csv",
        "sequential_results.csv",
        "concurrent_results.csv",
        "random_results.csv",
        "stress_results.csv",
        "concurrent_w1080_b0_w2.csv",
        "concurrent_w512_b0_w2.csv",
        "concurrent_w512_b1_w3.csv",
        "summary.csv",
        "summary_by_test.csv",
        "summary_by_concurrency.csv",
    ] {
        assert!(summary.join(name).is_file(), "missing {name}");
    }
    assert_eq!(line_count(&summary.join("all_results.csv")), 20);
    assert_eq!(line_count(&summary.join("stress_results.csv")), 8);
    assert_eq!(line_count(&summary.join("summary.csv")), 4);

    let output = tree.output_dir();
    assert!(output.join("w512/img0.png").is_file());
    assert!(output.join("w1080/img1.png").is_file());
    // the stress pool cycles w1080 before w512
    assert!(output.join("w512/img2-4.png").is_file());
    assert!(output.join("w1080/img0-5.png").is_file());
}

#[tokio::test]
async fn oversized_sample_skips_random_phase() {
    imagebench_test::tracing::init();
    let server = TestServer::new().await;
    let tree = ImageTree::new();
    let mut config = config(&tree, &server);
    config.random.sample_size = 50;

    let report = imagebench::run(config).await.unwrap();

    assert_eq!(report.records.len(), 17);
    assert!(
        report
            .records
            .iter()
            .all(|r| r.category != TestCategory::Random)
    );
    assert!(!tree.summary_dir().join("random_results.csv").exists());
    assert!(tree.summary_dir().join("stress_results.csv").is_file());
}

#[tokio::test]
async fn failing_endpoint_is_reported() {
    imagebench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Fail(503)).await;
    let tree = ImageTree::new();
    let mut config = config(&tree, &server);
    config.concurrent.enabled = false;
    config.random.enabled = false;
    config.stress.enabled = false;

    let report = imagebench::run(config).await.unwrap();

    assert_eq!(report.records.len(), 5);
    assert!(report.records.iter().all(|r| r.status == Status::Error));

    let overall = &report.by_folder[0];
    assert_eq!(overall.failed, 5);
    assert_eq!(overall.success_rate, 0.0);
    assert_eq!(overall.avg_time, None);
    assert_eq!(overall.median_time, None);
    assert!(report.by_concurrency.is_empty() || report.by_concurrency[0].total_images == 0);

    assert!(tree.summary_dir().join("summary.csv").is_file());
    assert!(!tree.summary_dir().join("summary_by_concurrency.csv").exists());
    assert!(!tree.output_dir().join("w512/img0.png").exists());
}

#[tokio::test]
async fn missing_input_dir_aborts() {
    imagebench_test::tracing::init();
    let server = TestServer::new().await;
    let tree = ImageTree::new();
    let config = Config {
        endpoint: server.upload_url(),
        input_dir: tree.root().join("does-not-exist"),
        output_dir: tree.output_dir(),
        summary_dir: tree.summary_dir(),
        ..Config::default()
    };

    let err = imagebench::run(config).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InputDirMissing(_))
    ));
    assert_eq!(server.requests(), 0);
    assert!(!tree.summary_dir().exists());
}
