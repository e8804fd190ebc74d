use std::sync::Arc;
use std::time::Duration;

use imagebench::dispatch::Dispatcher;
use imagebench::executor::{Executor, HttpRemote};
use imagebench::record::{Job, Resolution, Status, TestCategory, WorkItem};
use imagebench_test::fixtures::ImageTree;
use imagebench_test::server::{Behavior, TestServer};

fn job(tree: &ImageTree, folder: &str, file_name: &str) -> Job {
    let item = WorkItem {
        source: tree.input_dir().join(folder).join(file_name),
        group: folder.into(),
        file_name: file_name.into(),
        destination: tree
            .output_dir()
            .join(folder)
            .join(file_name)
            .with_extension("png"),
    };
    Job::new(item, TestCategory::Sequential)
}

#[tokio::test]
async fn successful_upload_stores_result() {
    imagebench_test::tracing::init();
    let server = TestServer::new().await;
    let tree = ImageTree::new();
    tree.folder("w512", 1, 64, 48);

    let remote = HttpRemote::builder(server.upload_url()).build().unwrap();
    let job = job(&tree, "w512", "img0.jpg");
    let record = remote.execute(&job).await;

    assert_eq!(record.status, Status::Success, "{:?}", record.error);
    assert_eq!(record.error, None);
    assert_eq!(record.category, TestCategory::Sequential);
    assert_eq!(record.folder, "w512");
    assert_eq!(record.filename, "img0.jpg");
    assert_eq!(
        record.resolution,
        Resolution::Known {
            width: 64,
            height: 48
        }
    );
    assert!(record.processing_time > 0.0);

    let input = std::fs::read(&job.item.source).unwrap();
    let output = std::fs::read(&job.item.destination).unwrap();
    assert_eq!(record.file_size, input.len() as u64);
    assert_eq!(output, input);

    assert_eq!(server.requests(), 1);
    assert_eq!(server.file_names(), ["img0.jpg"]);
    assert!(server.rotations().is_empty());
}

#[tokio::test]
async fn rotation_is_sent_as_query() {
    imagebench_test::tracing::init();
    let server = TestServer::new().await;
    let tree = ImageTree::new();
    tree.folder("w512", 1, 16, 16);

    let remote = HttpRemote::builder(server.upload_url())
        .rotation(Some(90))
        .build()
        .unwrap();
    let record = remote.execute(&job(&tree, "w512", "img0.jpg")).await;

    assert_eq!(record.status, Status::Success, "{:?}", record.error);
    assert_eq!(server.rotations(), [90]);
}

#[tokio::test]
async fn error_status_yields_error_record() {
    imagebench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Fail(500)).await;
    let tree = ImageTree::new();
    tree.folder("w512", 1, 16, 16);

    let remote = HttpRemote::builder(server.upload_url()).build().unwrap();
    let job = job(&tree, "w512", "img0.jpg");
    let record = remote.execute(&job).await;

    assert_eq!(record.status, Status::Error);
    assert!(record.error.as_deref().unwrap().contains("500"));
    assert!(record.file_size > 0);
    assert!(!job.item.destination.exists());
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    imagebench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Delay(Duration::from_secs(5))).await;
    let tree = ImageTree::new();
    tree.folder("w512", 1, 16, 16);

    let remote = HttpRemote::builder(server.upload_url())
        .request_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let record = remote.execute(&job(&tree, "w512", "img0.jpg")).await;

    assert_eq!(record.status, Status::Error);
    assert!(record.error.as_deref().unwrap().contains("timed out"));
    assert!(record.processing_time >= 0.2);
    assert!(record.processing_time < 5.0);
}

#[tokio::test]
async fn dispatcher_bounds_requests_in_flight() {
    imagebench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Delay(Duration::from_millis(150))).await;
    let tree = ImageTree::new();
    tree.folder("w512", 8, 16, 16);

    let remote = HttpRemote::builder(server.upload_url()).build().unwrap();
    let dispatcher = Dispatcher::new(Arc::new(remote));

    let jobs = (0..8)
        .map(|i| job(&tree, "w512", &format!("img{i}.jpg")).with_concurrency(3))
        .collect();
    let records = dispatcher.run(jobs, 3).await;

    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r.is_success()));
    assert!(records.iter().all(|r| r.concurrency == Some(3)));
    assert_eq!(server.requests(), 8);
    assert!(server.max_in_flight() <= 3);
    assert!(server.max_in_flight() > 1);
}
