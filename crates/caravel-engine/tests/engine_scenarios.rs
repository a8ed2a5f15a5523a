//! End-to-end planning and execution against an in-memory daemon.

use std::sync::Arc;

use caravel_client::{ClientConfiguration, ClientFeatures, DEFAULT_CLIENT_NAME};
use caravel_engine::testing::FakeDocker;
use caravel_engine::{
    ActionOptions, Engine, EngineError, Intent, Operation, ScriptSpec,
};
use caravel_map::ContainerMap;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn engine_with(
    docker: Arc<FakeDocker>,
    features: ClientFeatures,
    document: serde_json::Value,
) -> Engine {
    init_tracing();
    let map = ContainerMap::from_document(None, document).unwrap();
    Engine::builder()
        .map(map)
        .client(
            DEFAULT_CLIENT_NAME,
            ClientConfiguration {
                features: Some(features),
                ..Default::default()
            },
            docker,
        )
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn minimal_create_emits_exactly_one_container() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "containers": {"a": {"image": "ubuntu"}}}),
    )
    .await;

    engine.create(&["a"], &ActionOptions::default()).await.unwrap();

    assert_eq!(docker.operations(), vec!["create-container m.a".to_string()]);
    let state = docker.state.lock().unwrap();
    let created = state.containers.get("m.a").unwrap();
    assert_eq!(created.body.image.as_deref(), Some("ubuntu:latest"));
}

#[tokio::test]
async fn attached_volume_preparation_order_on_legacy_daemon() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("app-img:latest")
            .with_image(caravel_engine::BASE_IMAGE)
            .with_image(caravel_engine::CORE_IMAGE),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::for_api_version("1.20"),
        json!({
            "name": "m",
            "volumes": {"sock": "/var/run/app"},
            "app": {
                "image": "app-img",
                "attaches": ["sock"],
                "user": 2000,
                "permissions": "u=rwX,g=rX,o=",
            },
        }),
    )
    .await;

    engine
        .startup(&["app"], &ActionOptions::default())
        .await
        .unwrap();

    assert_eq!(
        docker.operations(),
        vec![
            "create-container m.sock".to_string(),
            "start-container m.sock".to_string(),
            "create-container m.sock.prepare".to_string(),
            "start-container m.sock.prepare".to_string(),
            "remove-container m.sock.prepare".to_string(),
            "create-container m.app".to_string(),
            "start-container m.app".to_string(),
        ]
    );

    let state = docker.state.lock().unwrap();
    let holder = state.containers.get("m.sock").unwrap();
    assert_eq!(
        holder.body.image.as_deref(),
        Some(caravel_engine::BASE_IMAGE)
    );
    let app = state.containers.get("m.app").unwrap();
    assert_eq!(app.body.user.as_deref(), Some("2000"));
    let volumes_from = app
        .body
        .host_config
        .as_ref()
        .and_then(|hc| hc.volumes_from.clone())
        .unwrap();
    assert_eq!(volumes_from, vec!["m.sock".to_string()]);
}

#[tokio::test]
async fn transient_preparation_runs_chown_and_chmod() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("app-img:latest")
            .with_image(caravel_engine::CORE_IMAGE),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "volumes": {"sock": "/var/run/app"},
            "app": {
                "image": "app-img",
                "attaches": ["sock"],
                "user": 2000,
                "permissions": "u=rwX,g=rX,o=",
            },
        }),
    )
    .await;

    engine
        .startup(&["app"], &ActionOptions::default())
        .await
        .unwrap();

    let state = docker.state.lock().unwrap();
    assert!(state.volumes.contains_key("m.sock"));
    // The transient container was created and removed again; its command is
    // visible in the log through create/start/remove entries.
    drop(state);
    let ops = docker.operations();
    assert!(ops.contains(&"create-volume m.sock".to_string()));
    assert!(ops.contains(&"create-container m.sock.prepare".to_string()));
    assert!(ops.contains(&"remove-container m.sock.prepare".to_string()));
}

#[tokio::test]
async fn dependencies_are_created_first_and_stopped_last() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("app-img:latest")
            .with_image("web-img:latest"),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "volumes": {"sock": "/var/run/app"},
            "app": {"image": "app-img", "attaches": ["sock"]},
            "web": {"image": "web-img", "uses": ["sock"]},
        }),
    )
    .await;

    engine
        .startup(&["web"], &ActionOptions::default())
        .await
        .unwrap();

    let ops = docker.operations();
    let create_app = ops
        .iter()
        .position(|op| op == "create-container m.app")
        .unwrap();
    let create_web = ops
        .iter()
        .position(|op| op == "create-container m.web")
        .unwrap();
    assert!(create_app < create_web, "app must be created before web");

    // Stopping the dependency stops its dependents first.
    engine.stop(&["app"], &ActionOptions::default()).await.unwrap();
    let ops = docker.operations();
    let stop_web = ops
        .iter()
        .position(|op| op == "stop-container m.web")
        .unwrap();
    let stop_app = ops
        .iter()
        .position(|op| op == "stop-container m.app")
        .unwrap();
    assert!(stop_web < stop_app, "web must be stopped before app");
}

#[tokio::test]
async fn update_resets_container_on_image_change() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions::default();

    engine.startup(&["a"], &options).await.unwrap();
    assert!(docker.container_running("m.a"));

    // A new image version is tagged; the running container still uses the
    // old id.
    docker
        .state
        .lock()
        .unwrap()
        .images
        .insert("ubuntu:latest".to_string(), "sha256:ubuntu-new".to_string());
    engine.refresh_names();

    engine.update(&["a"], &options).await.unwrap();
    let ops = docker.operations();
    let tail: Vec<&String> = ops.iter().rev().take(4).collect();
    assert_eq!(
        tail.into_iter().rev().collect::<Vec<_>>(),
        vec![
            &"stop-container m.a".to_string(),
            &"remove-container m.a".to_string(),
            &"create-container m.a".to_string(),
            &"start-container m.a".to_string(),
        ]
    );
}

#[tokio::test]
async fn update_on_steady_state_is_a_no_op() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions::default();

    engine.startup(&["a"], &options).await.unwrap();
    let ops_before = docker.operations().len();

    engine.refresh_names();
    let outputs = engine.update(&["a"], &options).await.unwrap();
    assert!(outputs.is_empty());
    assert_eq!(docker.operations().len(), ops_before);
}

#[tokio::test]
async fn startup_is_idempotent() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions::default();

    engine.startup(&["a"], &options).await.unwrap();
    let ops_before = docker.operations().len();
    engine.startup(&["a"], &options).await.unwrap();
    assert_eq!(docker.operations().len(), ops_before);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_create_remove_round_trips() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions::default();

    engine.startup(&["a"], &options).await.unwrap();
    engine.shutdown(&["a"], &options).await.unwrap();
    assert!(docker.state.lock().unwrap().containers.is_empty());

    let ops_before = docker.operations().len();
    engine.shutdown(&["a"], &options).await.unwrap();
    assert_eq!(docker.operations().len(), ops_before);

    engine.create(&["a"], &options).await.unwrap();
    assert!(docker.state.lock().unwrap().containers.contains_key("m.a"));
    engine.remove(&["a"], &options).await.unwrap();
    assert!(docker.state.lock().unwrap().containers.is_empty());
}

#[tokio::test]
async fn per_instance_host_paths_resolve_against_root() {
    let docker = Arc::new(FakeDocker::new().with_image("app-img:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "volumes": {"cfg": "/etc/app"},
            "host": {"root": "/srv", "cfg": {"i1": "cfg/a", "i2": "cfg/b"}},
            "app": {
                "image": "app-img",
                "instances": ["i1", "i2"],
                "binds": ["cfg"],
            },
        }),
    )
    .await;

    engine
        .create(&["app"], &ActionOptions::default())
        .await
        .unwrap();

    let state = docker.state.lock().unwrap();
    let binds_of = |name: &str| {
        state
            .containers
            .get(name)
            .unwrap()
            .body
            .host_config
            .as_ref()
            .and_then(|hc| hc.binds.clone())
            .unwrap()
    };
    assert_eq!(binds_of("m.app.i1"), vec!["/srv/cfg/a:/etc/app".to_string()]);
    assert_eq!(binds_of("m.app.i2"), vec!["/srv/cfg/b:/etc/app".to_string()]);
}

#[tokio::test]
async fn partial_failure_preserves_completed_results() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("db-img:latest")
            .with_image("app-img:latest")
            .with_image("web-img:latest"),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "db": {"image": "db-img"},
            "app": {"image": "app-img", "links": ["db"]},
            "web": {"image": "web-img", "links": ["app"]},
        }),
    )
    .await;

    docker.set_fail_on("start-container m.app");
    let error = engine
        .startup(&["web"], &ActionOptions::default())
        .await
        .unwrap_err();

    let EngineError::Runner(error) = error else {
        panic!("expected a runner error, got {:?}", error);
    };
    assert_eq!(error.config_id.config_name, "app");
    assert_eq!(error.operation, Operation::Start);
    // db completed fully, app only up to create; web was never touched.
    assert!(error
        .results
        .iter()
        .any(|r| r.config_id.config_name == "db" && r.operation == Operation::Start));
    assert!(error
        .results
        .iter()
        .any(|r| r.config_id.config_name == "app" && r.operation == Operation::Create));
    assert!(!error.results.iter().any(|r| r.config_id.config_name == "web"));
    assert!(!docker
        .operations()
        .iter()
        .any(|op| op.contains("m.web")));
    // The original client error is still available.
    assert!(error.into_source().to_string().contains("injected failure"));
}

#[tokio::test]
async fn dependency_cycles_fail_before_any_daemon_call() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("a-img:latest")
            .with_image("b-img:latest"),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "a": {"image": "a-img", "links": ["b"]},
            "b": {"image": "b-img", "links": ["a"]},
        }),
    )
    .await;

    let error = engine
        .plan(Intent::Create, &["a"], &ActionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::CircularDependency(_)));
    assert!(docker.operations().is_empty());
}

#[tokio::test]
async fn script_runs_one_shot_container_and_cleans_up() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "task": {"image": "ubuntu"}}),
    )
    .await;

    let outputs = engine
        .run_script(
            "task",
            ScriptSpec {
                command_format: Some(vec!["echo".to_string(), "done".to_string()]),
                ..Default::default()
            },
            &ActionOptions::default(),
        )
        .await
        .unwrap();

    let result = outputs
        .iter()
        .find_map(|o| o.result.as_ref())
        .expect("script output");
    assert_eq!(result["exit_code"], json!(0));
    assert!(docker.state.lock().unwrap().containers.is_empty());
}

#[tokio::test]
async fn script_path_is_mounted_and_substituted() {
    let script_dir = tempfile::tempdir().unwrap();
    let script_path = script_dir.path().join("run.sh");
    std::fs::write(&script_path, "#!/bin/sh\necho done\n").unwrap();

    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "task": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions {
        remove_existing_after: false,
        ..Default::default()
    };

    engine
        .run_script(
            "task",
            ScriptSpec {
                script_path: Some(script_path.to_string_lossy().to_string()),
                entrypoint: Some("/bin/sh".to_string()),
                command_format: Some(vec!["-c".to_string(), "{script_path}".to_string()]),
                ..Default::default()
            },
            &options,
        )
        .await
        .unwrap();

    let state = docker.state.lock().unwrap();
    let task = state.containers.get("m.task").unwrap();
    assert_eq!(
        task.body.entrypoint.clone().unwrap(),
        vec!["/bin/sh".to_string()]
    );
    assert_eq!(
        task.body.cmd.clone().unwrap(),
        vec!["-c".to_string(), "/tmp/script_run/run.sh".to_string()]
    );
    let binds = task
        .body
        .host_config
        .as_ref()
        .and_then(|hc| hc.binds.clone())
        .unwrap();
    assert_eq!(
        binds,
        vec![format!("{}:/tmp/script_run", script_dir.path().display())]
    );
}

#[tokio::test]
async fn script_refuses_pre_existing_container() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("ubuntu:latest")
            .with_container("m.task", "sha256:ubuntu-latest"),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "task": {"image": "ubuntu"}}),
    )
    .await;

    let error = engine
        .run_script("task", ScriptSpec::default(), &ActionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::ScriptAction(_)));
}

#[tokio::test]
async fn nonrecoverable_exit_forces_recreate_on_startup() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions::default();

    engine.startup(&["a"], &options).await.unwrap();
    docker.set_exit_code("m.a", -127);
    engine.refresh_names();

    engine.startup(&["a"], &options).await.unwrap();
    let ops = docker.operations();
    assert!(ops.contains(&"remove-container m.a".to_string()));
    assert!(docker.container_running("m.a"));
}

#[tokio::test]
async fn recreated_attached_volume_resets_its_owner() {
    let docker = Arc::new(FakeDocker::new().with_image("app-img:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "volumes": {"sock": "/var/run/app"},
            "app": {"image": "app-img", "attaches": ["sock"]},
        }),
    )
    .await;
    let options = ActionOptions::default();

    engine.startup(&["app"], &options).await.unwrap();
    assert!(docker.container_running("m.app"));

    // The volume vanished out-of-band; the owning container must be
    // recreated so it mounts the new one.
    docker.state.lock().unwrap().volumes.remove("m.sock");
    engine.refresh_names();

    engine.startup(&["app"], &options).await.unwrap();
    let ops = docker.operations();
    assert!(ops.contains(&"create-volume m.sock".to_string()));
    let recreate_tail: Vec<&str> = ops
        .iter()
        .rev()
        .take(4)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    assert_eq!(
        recreate_tail,
        vec![
            "stop-container m.app",
            "remove-container m.app",
            "create-container m.app",
            "start-container m.app",
        ]
    );
}

#[tokio::test]
async fn pull_fetches_configured_images() {
    let docker = Arc::new(FakeDocker::new());
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}}),
    )
    .await;

    engine.pull(&["a"], &ActionOptions::default()).await.unwrap();
    assert!(docker
        .operations()
        .contains(&"pull ubuntu:latest".to_string()));
}

#[tokio::test]
async fn groups_expand_to_members() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("a-img:latest")
            .with_image("b-img:latest"),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "groups": {"web_stack": ["a", "b"]},
            "a": {"image": "a-img"},
            "b": {"image": "b-img"},
        }),
    )
    .await;

    engine
        .create(&["web_stack"], &ActionOptions::default())
        .await
        .unwrap();
    let state = docker.state.lock().unwrap();
    assert!(state.containers.contains_key("m.a"));
    assert!(state.containers.contains_key("m.b"));
}

#[tokio::test]
async fn batch_cleanup_removes_stopped_containers_only() {
    let docker = Arc::new(FakeDocker::new().with_image("ubuntu:latest"));
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({"name": "m", "a": {"image": "ubuntu"}, "b": {"image": "ubuntu"}}),
    )
    .await;
    let options = ActionOptions::default();
    engine.startup(&["a", "b"], &options).await.unwrap();
    docker.set_exit_code("m.b", 0);

    let removed = caravel_client::utility::cleanup_containers(docker.as_ref(), false, &[])
        .await
        .unwrap();
    assert_eq!(removed, vec!["m.b".to_string()]);
    assert!(docker.container_running("m.a"));
}

#[tokio::test]
async fn batch_removal_keeps_partial_results_on_failure() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_container("m.one", "sha256:img")
            .with_container("m.two", "sha256:img"),
    );
    docker.set_exit_code("m.one", 0);
    docker.set_exit_code("m.two", 0);
    docker.set_fail_on("remove-container m.two");

    let error = caravel_client::utility::remove_all_containers(docker.as_ref(), 5)
        .await
        .unwrap_err();
    // Whatever was removed before the failure is reported; the failing
    // container itself is not.
    assert!(!error.results.contains(&"m.two".to_string()));
    assert!(error.results.len() <= 1);
    assert!(error.source.to_string().contains("injected failure"));
}

#[tokio::test]
async fn all_group_covers_every_configuration() {
    let docker = Arc::new(
        FakeDocker::new()
            .with_image("a-img:latest")
            .with_image("b-img:latest"),
    );
    let engine = engine_with(
        docker.clone(),
        ClientFeatures::default(),
        json!({
            "name": "m",
            "a": {"image": "a-img"},
            "b": {"image": "b-img"},
        }),
    )
    .await;

    engine
        .create(&["__all__"], &ActionOptions::default())
        .await
        .unwrap();
    assert_eq!(docker.state.lock().unwrap().containers.len(), 2);
}
