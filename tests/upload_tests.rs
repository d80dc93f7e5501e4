mod common;

use common::{MockServer, Recorded, Reply, payload};
use sbgr::resources::File;
use sbgr::transfer::MIN_PART_SIZE;
use sbgr::{Api, Config, Error, TransferStatus, Upload, UploadOptions, UploadTarget};
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Storage plus the multipart session endpoints for upload id `up1`.
fn upload_service(request: &Recorded) -> Reply {
    let path = request.path.as_str();
    match request.method.as_str() {
        "POST" if path == "/upload/multipart" => {
            Reply::json(200, json!({"upload_id": "up1", "part_size": Value::Null}))
        }
        "GET" if path.starts_with("/upload/multipart/up1/part/") => {
            let number = path.rsplit('/').next().unwrap_or_default();
            Reply::json(
                200,
                json!({"url": format!("{}/storage/up1/{}", request.base(), number), "method": "PUT"}),
            )
        }
        "PUT" if path.starts_with("/storage/up1/") => {
            let number = path.rsplit('/').next().unwrap_or_default();
            Reply::empty(200).header("etag", format!("\"etag-{}\"", number))
        }
        "POST" if path == "/upload/multipart/up1/part" => Reply::json(200, json!({})),
        "POST" if path == "/upload/multipart/up1/complete" => {
            Reply::json(200, json!({"id": "new-file", "name": "reads.bam"}))
        }
        "DELETE" if path == "/upload/multipart/up1" => Reply::empty(204),
        _ => Reply::json(404, json!({"message": "not found"})),
    }
}

fn local_file(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&payload(len)).unwrap();
    file.flush().unwrap();
    file
}

fn options() -> UploadOptions {
    UploadOptions {
        file_name: Some("reads.bam".to_string()),
        part_size: MIN_PART_SIZE,
        ..Default::default()
    }
}

fn reports(server: &MockServer) -> Vec<Value> {
    server
        .requests()
        .iter()
        .filter(|r| r.is("POST", "/upload/multipart/up1/part"))
        .map(Recorded::json)
        .collect()
}

#[tokio::test]
async fn test_upload_with_transient_negotiation_failure() {
    let failed = Arc::new(AtomicBool::new(false));
    let flag = failed.clone();
    let server = MockServer::start(move |request| {
        if request.is("GET", "/upload/multipart/up1/part/2") && !flag.swap(true, Ordering::SeqCst) {
            return Reply::json(500, json!({"message": "try again"}));
        }
        upload_service(request)
    })
    .await;
    let size = 6 * 1024 * 1024;
    let local = local_file(size);

    let mut upload = File::upload(
        &server.api(),
        local.path(),
        UploadTarget::Project("me/proj".to_string()),
        options(),
    )
    .unwrap();
    upload.start().unwrap();
    let file = upload.wait().await.unwrap();

    assert_eq!(file.id(), Some("new-file"));
    assert_eq!(upload.status(), TransferStatus::Completed);
    assert!(failed.load(Ordering::SeqCst));

    let init = server
        .requests()
        .into_iter()
        .find(|r| r.is("POST", "/upload/multipart"))
        .unwrap();
    assert_eq!(init.query.as_deref(), Some("overwrite=false"));
    assert_eq!(
        init.json(),
        json!({"name": "reads.bam", "size": size, "part_size": MIN_PART_SIZE, "project": "me/proj"})
    );

    let mut reported = reports(&server);
    reported.sort_by_key(|r| r["part_number"].as_u64());
    assert_eq!(
        reported,
        vec![
            json!({"part_number": 1, "response": {"headers": {"ETag": "etag-1"}}}),
            json!({"part_number": 2, "response": {"headers": {"ETag": "etag-2"}}}),
        ]
    );
    assert_eq!(server.count("POST", "/upload/multipart/up1/complete"), 1);
    assert_eq!(server.count("DELETE", "/upload/multipart/up1"), 0);

    let stored: usize = server
        .requests()
        .iter()
        .filter(|r| r.method == "PUT" && r.path.starts_with("/storage/"))
        .map(|r| r.body.len())
        .sum();
    assert_eq!(stored, size);
    // storage requests are not signed with the platform token
    assert!(
        server
            .requests()
            .iter()
            .filter(|r| r.path.starts_with("/storage/"))
            .all(|r| r.header("x-sbg-auth-token").is_none())
    );

    let progress = upload.progress();
    assert_eq!(progress.parts_done, 2);
    assert_eq!(progress.bytes_done, size as u64);
}

#[tokio::test]
async fn test_stop_aborts_session() {
    let server = MockServer::start(|request| {
        let reply = upload_service(request);
        if request.is("GET", "/upload/multipart/up1/part/2") {
            return reply.delay(Duration::from_millis(500));
        }
        reply
    })
    .await;
    let config = Config {
        upload_max_workers: 1,
        ..server.config()
    };
    let api = Api::new(&config).unwrap();
    let local = local_file(3 * MIN_PART_SIZE as usize);

    let mut upload = Upload::new(
        &api,
        local.path(),
        UploadTarget::Parent("folder".to_string()),
        options(),
    )
    .unwrap();
    upload.start().unwrap();
    server
        .wait_for(|r| r.is("POST", "/upload/multipart/up1/part"))
        .await;
    upload.stop().await.unwrap();

    assert_eq!(upload.status(), TransferStatus::Stopped);
    assert_eq!(upload.status().to_string(), "STOPPED");
    assert!(matches!(upload.wait().await, Err(Error::TransferStopped)));
    assert_eq!(server.count("DELETE", "/upload/multipart/up1"), 1);
    assert_eq!(server.count("POST", "/upload/multipart/up1/complete"), 0);
    assert!(reports(&server).len() < 3);
}

#[tokio::test]
async fn test_failed_part_aborts_session() {
    let server = MockServer::start(|request| {
        if request.method == "PUT" && request.path.starts_with("/storage/") {
            return Reply::bytes(403, b"AccessDenied".to_vec());
        }
        upload_service(request)
    })
    .await;
    let local = local_file(1024);

    let mut upload = Upload::new(
        &server.api(),
        local.path(),
        UploadTarget::Project("me/proj".to_string()),
        options(),
    )
    .unwrap();
    let notified = Arc::new(AtomicBool::new(false));
    let flag = notified.clone();
    upload.on_error(move |_| flag.store(true, Ordering::SeqCst));
    upload.start().unwrap();

    assert!(matches!(upload.wait().await, Err(Error::Forbidden(_))));
    assert_eq!(upload.status(), TransferStatus::Failed);
    assert!(notified.load(Ordering::SeqCst));
    assert_eq!(server.count("DELETE", "/upload/multipart/up1"), 1);
    assert_eq!(server.count("POST", "/upload/multipart/up1/complete"), 0);
}

#[tokio::test]
async fn test_zero_byte_upload_sends_one_part() {
    let server = MockServer::start(upload_service).await;
    let local = local_file(0);

    let mut upload = Upload::new(
        &server.api(),
        local.path(),
        UploadTarget::Project("me/proj".to_string()),
        options(),
    )
    .unwrap();
    upload.start().unwrap();
    upload.wait().await.unwrap();

    assert_eq!(server.count("GET", "/upload/multipart/up1/part/1"), 1);
    assert_eq!(server.count("PUT", "/storage/up1/1"), 1);
    assert_eq!(reports(&server).len(), 1);
    assert_eq!(server.count("POST", "/upload/multipart/up1/complete"), 1);
}

#[tokio::test]
async fn test_server_part_size_is_honored() {
    let server = MockServer::start(|request| {
        if request.is("POST", "/upload/multipart") {
            return Reply::json(
                200,
                json!({"upload_id": "up1", "part_size": 2 * MIN_PART_SIZE}),
            );
        }
        upload_service(request)
    })
    .await;
    let local = local_file(3 * MIN_PART_SIZE as usize);

    let mut upload = Upload::new(
        &server.api(),
        local.path(),
        UploadTarget::Project("me/proj".to_string()),
        options(),
    )
    .unwrap();
    upload.start().unwrap();
    upload.wait().await.unwrap();

    assert_eq!(reports(&server).len(), 2);
    let first = server
        .requests()
        .into_iter()
        .find(|r| r.is("PUT", "/storage/up1/1"))
        .unwrap();
    assert_eq!(first.body.len() as u64, 2 * MIN_PART_SIZE);
}

#[tokio::test]
async fn test_code_package_init_body() {
    let server = MockServer::start(upload_service).await;
    let local = local_file(10);

    let options = UploadOptions {
        overwrite: true,
        ..options()
    };
    let mut upload = Upload::new(
        &server.api(),
        local.path(),
        UploadTarget::CodePackage {
            automation_id: "auto-1".to_string(),
        },
        options,
    )
    .unwrap();
    upload.start().unwrap();
    upload.wait().await.unwrap();

    let init = server
        .requests()
        .into_iter()
        .find(|r| r.is("POST", "/upload/multipart"))
        .unwrap();
    assert_eq!(init.query.as_deref(), Some("overwrite=true"));
    let body = init.json();
    assert_eq!(body["type"], "CODE_PACKAGE_FILE");
    assert_eq!(body["automation_id"], "auto-1");
    assert!(body.get("project").is_none());
}

#[tokio::test]
async fn test_init_failure_does_not_abort() {
    let server = MockServer::start(|request| {
        if request.is("POST", "/upload/multipart") {
            return Reply::json(409, json!({"message": "file already exists"}));
        }
        upload_service(request)
    })
    .await;
    let local = local_file(10);

    let mut upload = Upload::new(
        &server.api(),
        local.path(),
        UploadTarget::Project("me/proj".to_string()),
        options(),
    )
    .unwrap();
    upload.start().unwrap();
    assert!(matches!(upload.wait().await, Err(Error::Conflict(_))));
    assert_eq!(server.count("DELETE", "/upload/multipart/up1"), 0);
}

#[tokio::test]
async fn test_negotiation_uses_upload_retry_count() {
    let failures = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = failures.clone();
    let server = MockServer::start(move |request| {
        if request.is("GET", "/upload/multipart/up1/part/1")
            && counter.fetch_add(1, Ordering::SeqCst) < 3
        {
            return Reply::json(500, json!({"message": "again"}));
        }
        upload_service(request)
    })
    .await;
    let config = Config {
        retry_count: 1,
        ..server.config()
    };
    let api = Api::new(&config).unwrap();
    let local = local_file(10);

    let options = UploadOptions {
        retry_count: Some(5),
        ..options()
    };
    let mut upload = Upload::new(
        &api,
        local.path(),
        UploadTarget::Project("me/proj".to_string()),
        options,
    )
    .unwrap();
    upload.start().unwrap();
    upload.wait().await.unwrap();

    assert_eq!(upload.status(), TransferStatus::Completed);
    // three failures and the success, with no transport retries stacked on top
    assert_eq!(server.count("GET", "/upload/multipart/up1/part/1"), 4);
    assert_eq!(server.count("POST", "/upload/multipart/up1/complete"), 1);
}
