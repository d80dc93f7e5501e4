mod common;

use common::{MockServer, Recorded, Reply};
use sbgr::resources::{File, Project, Task, TaskDraft};
use sbgr::{Error, Record};
use serde_json::{Value, json};

const BILLING_GROUP: &str = "9c1ab3e2-5b3f-4e1a-9a2b-6f4d2c1e8a7b";

fn file_body(request: &Recorded) -> Value {
    json!({
        "href": format!("{}/files/f1", request.base()),
        "id": "f1",
        "name": "reads.bam",
        "size": 1024,
        "project": "me/proj",
        "type": "file",
        "metadata": {"sample": "A", "platform": "illumina"},
        "tags": ["raw"],
        "unexpected": "dropped",
    })
}

fn file_service(request: &Recorded) -> Reply {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/files/f1") => Reply::json(200, file_body(request)),
        ("PATCH", "/files/f1/metadata") | ("PUT", "/files/f1/metadata") => {
            Reply::json(200, request.json())
        }
        ("PUT", "/files/f1/tags") => Reply::json(200, request.json()),
        ("PATCH", "/files/f1") => {
            let mut body = file_body(request);
            body["name"] = request.json()["name"].clone();
            Reply::json(200, body)
        }
        _ => Reply::json(404, json!({"message": "not found"})),
    }
}

#[tokio::test]
async fn test_stub_hydrates_once() {
    let server = MockServer::start(file_service).await;
    let mut file: Record<File> = Record::with_id(server.api(), "f1");

    let name = file.field("name").await.unwrap().cloned();
    assert_eq!(name, Some(json!("reads.bam")));
    let size: Option<u64> = file.field_as("size").await.unwrap();
    assert_eq!(size, Some(1024));
    // a field the server did not send does not trigger another fetch
    assert!(file.field("modified_on").await.unwrap().is_none());

    assert_eq!(server.count("GET", "/files/f1"), 1);
    assert!(file.get("unexpected").is_none());
}

#[tokio::test]
async fn test_unknown_field_is_rejected() {
    let server = MockServer::start(file_service).await;
    let mut file: Record<File> = Record::with_id(server.api(), "f1");
    assert!(matches!(file.field("colour").await, Err(Error::Validation(_))));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_read_only_field_cannot_be_set() {
    let server = MockServer::start(file_service).await;
    let mut file = File::get(&server.api(), "f1").await.unwrap();
    assert!(matches!(file.set("size", 5), Err(Error::ReadOnly(_))));
    // the payload carries no origin, the field is still read-only
    assert!(matches!(
        file.set_nested("origin", "task", "forged"),
        Err(Error::ReadOnly(_))
    ));
    assert!(!file.is_dirty());
}

#[tokio::test]
async fn test_project_has_no_metadata_to_edit() {
    let server = MockServer::start(|request| {
        Reply::json(200, json!({"id": request.path.trim_start_matches("/projects/"), "name": "P"}))
    })
    .await;
    let mut project = Project::get(&server.api(), "me/proj").await.unwrap();
    assert!(matches!(project.metadata_mut(), Err(Error::Validation(_))));
    assert!(!project.is_dirty());
}

#[tokio::test]
async fn test_metadata_edit_is_patched_alone() {
    let server = MockServer::start(file_service).await;
    let mut file = File::get(&server.api(), "f1").await.unwrap();

    file.metadata_mut().unwrap().insert("sample", "B");
    assert!(file.is_dirty());
    file.save().await.unwrap();

    let patches: Vec<_> = server
        .requests()
        .into_iter()
        .filter(|r| r.method == "PATCH")
        .collect();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].path, "/files/f1/metadata");
    assert_eq!(patches[0].json(), json!({"sample": "B"}));
    assert_eq!(server.count("PUT", "/files/f1/tags"), 0);
    assert!(!file.is_dirty());
    assert_eq!(file.metadata_mut().unwrap().get("sample"), Some(&json!("B")));
}

#[tokio::test]
async fn test_replaced_metadata_is_put() {
    let server = MockServer::start(file_service).await;
    let mut file = File::get(&server.api(), "f1").await.unwrap();

    let mut metadata = serde_json::Map::new();
    metadata.insert("sample".to_string(), json!("C"));
    file.set_metadata(metadata).unwrap();
    assert!(file.metadata_overwrite());
    file.save().await.unwrap();

    let put = server
        .requests()
        .into_iter()
        .find(|r| r.is("PUT", "/files/f1/metadata"))
        .unwrap();
    assert_eq!(put.json(), json!({"sample": "C"}));
    assert!(!file.metadata_overwrite());
}

#[tokio::test]
async fn test_tags_and_fields_saved_separately() {
    let server = MockServer::start(file_service).await;
    let mut file = File::get(&server.api(), "f1").await.unwrap();

    file.set("tags", json!(["raw", "qc"])).unwrap();
    file.set("name", "renamed.bam").unwrap();
    file.save().await.unwrap();

    let put = server
        .requests()
        .into_iter()
        .find(|r| r.is("PUT", "/files/f1/tags"))
        .unwrap();
    assert_eq!(put.json(), json!(["raw", "qc"]));
    let patch = server
        .requests()
        .into_iter()
        .find(|r| r.is("PATCH", "/files/f1"))
        .unwrap();
    assert_eq!(patch.json(), json!({"name": "renamed.bam"}));

    assert!(!file.is_dirty());
    assert_eq!(file.get_str("name"), Some("renamed.bam"));
}

#[tokio::test]
async fn test_save_without_edits() {
    let server = MockServer::start(file_service).await;
    let mut file = File::get(&server.api(), "f1").await.unwrap();
    assert!(matches!(file.save().await, Err(Error::NotModified)));
}

#[tokio::test]
async fn test_reload_discards_edits() {
    let server = MockServer::start(file_service).await;
    let mut file = File::get(&server.api(), "f1").await.unwrap();
    file.set("name", "local.bam").unwrap();
    file.reload().await.unwrap();
    assert_eq!(file.get_str("name"), Some("reads.bam"));
    assert!(!file.is_dirty());
}

#[tokio::test]
async fn test_reload_of_vanished_record() {
    let server = MockServer::start(|_| Reply::json(404, json!({"message": "not found"}))).await;
    let mut stale: Record<File> = Record::from_value(
        server.api(),
        json!({"id": "gone", "href": format!("{}/files/gone", server.url)}),
    )
    .unwrap();
    assert!(matches!(stale.reload().await, Err(Error::UnableToRefresh(_))));
    // href first, then the id endpoint
    assert_eq!(server.count("GET", "/files/gone"), 2);
}

#[tokio::test]
async fn test_project_create_and_members() {
    let server = MockServer::start(|request| match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/projects") => {
            let mut body = request.json();
            body["id"] = json!("me/new-project");
            body["href"] = json!(format!("{}/projects/me/new-project", request.base()));
            Reply::json(201, body)
        }
        ("POST", "/projects/me/new-project/members") => {
            let mut body = request.json();
            body["href"] = json!(format!(
                "{}/projects/me/new-project/members/{}",
                request.base(),
                body["username"].as_str().unwrap_or_default()
            ));
            Reply::json(200, body)
        }
        ("DELETE", "/projects/me/new-project/members/bob") => Reply::empty(204),
        _ => Reply::json(404, json!({"message": "not found"})),
    })
    .await;
    let api = server.api();

    let project = Project::create(&api, "New project", BILLING_GROUP, Some("desc"))
        .await
        .unwrap();
    assert_eq!(project.id(), Some("me/new-project"));
    let create = server
        .requests()
        .into_iter()
        .find(|r| r.is("POST", "/projects"))
        .unwrap();
    assert_eq!(create.json()["billing_group"], BILLING_GROUP);

    let mut permissions = serde_json::Map::new();
    permissions.insert("read".to_string(), json!(true));
    permissions.insert("write".to_string(), json!(true));
    let member = project
        .add_member("bob", permissions)
        .await
        .unwrap();
    assert_eq!(member.id(), Some("bob"));
    assert!(member.permission("write"));
    assert!(!member.permission("admin"));

    project.remove_member("bob").await.unwrap();
    assert_eq!(
        server.count("DELETE", "/projects/me/new-project/members/bob"),
        1
    );
}

#[tokio::test]
async fn test_task_run_with_errors() {
    let server = MockServer::start(|request| {
        let mut body = request.json();
        body["id"] = json!("t1");
        body["status"] = json!("DRAFT");
        body["errors"] = json!([{"code": 9100, "message": "input 'reads' is required"}]);
        Reply::json(201, body)
    })
    .await;
    let draft = TaskDraft {
        name: "align".to_string(),
        project: "me/proj".to_string(),
        app: "me/proj/bwa".to_string(),
        ..Default::default()
    };

    let err = Task::create(&server.api(), &draft, true).await.unwrap_err();
    match err {
        Error::TaskValidation { errors, .. } => {
            assert_eq!(errors[0]["code"], 9100);
        }
        other => panic!("unexpected error {:?}", other),
    }
    let request = &server.requests()[0];
    assert!(request.is("POST", "/tasks"));
    assert_eq!(request.query.as_deref(), Some("action=run"));
    assert_eq!(request.json()["app"], "me/proj/bwa");
}

#[tokio::test]
async fn test_task_draft_ignores_errors() {
    let server = MockServer::start(|request| {
        let mut body = request.json();
        body["id"] = json!("t2");
        body["status"] = json!("DRAFT");
        body["errors"] = json!([{"code": 9100, "message": "input 'reads' is required"}]);
        Reply::json(201, body)
    })
    .await;
    let draft = TaskDraft {
        name: "align".to_string(),
        project: "me/proj".to_string(),
        app: "me/proj/bwa".to_string(),
        ..Default::default()
    };
    let task = Task::create(&server.api(), &draft, false).await.unwrap();
    assert_eq!(task.id(), Some("t2"));
    assert!(server.requests()[0].query.is_none());
}
