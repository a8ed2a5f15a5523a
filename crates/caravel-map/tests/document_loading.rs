//! Loading complete map documents with mixed shorthand shapes.

use caravel_map::{ContainerMap, HostBind, MapError, NetworkMode, UsedVolume};
use serde_json::json;

fn web_stack() -> ContainerMap {
    ContainerMap::from_document(
        None,
        json!({
            "name": "stack",
            "repository": "registry.example.com",
            "default_tag": "stable",
            "clients": ["alpha"],
            "volumes": {
                "app_sock": "/var/run/app",
                "web_config": {"default_path": "/etc/nginx", "driver": "local"},
            },
            "host": {
                "root": "/srv/stack",
                "web_config": {"i1": "web/a", "i2": "web/b"},
            },
            "networks": {"backend": {"internal": true}},
            "groups": {"frontends": ["web.i1", "web.i2"]},
            "base": {
                "abstract": true,
                "exec_commands": [["/usr/bin/agent", "root", "initial"]],
                "stop_timeout": 20,
            },
            "app": {
                "extends": ["base"],
                "image": "app-server",
                "attaches": ["app_sock"],
                "user": "2000",
                "permissions": "u=rwX,g=rX,o=",
                "networks": [{"backend": {"aliases": ["app"]}}],
            },
            "web": {
                "extends": ["base"],
                "image": "/nginx",
                "instances": ["i1", "i2"],
                "binds": ["web_config"],
                "uses": ["app_sock"],
                "links": [["app", "backend-app"]],
                "exposes": [[443, 8443]],
                "networks": ["backend"],
            },
        }),
    )
    .unwrap()
}

#[test]
fn full_document_loads_and_passes_integrity() {
    let map = web_stack();
    map.check_integrity().unwrap();
    assert_eq!(map.containers.len(), 3);
    assert_eq!(map.clients, vec!["alpha".to_string()]);
}

#[test]
fn extends_carries_exec_commands_and_scalars() {
    let map = web_stack();
    let web = map.extended_config("web").unwrap();
    assert_eq!(web.stop_timeout, Some(20));
    assert_eq!(web.exec_commands.len(), 1);
    assert_eq!(web.links[0].alias.as_deref(), Some("backend-app"));
}

#[test]
fn image_resolution_honors_leading_slash_and_default_tag() {
    let map = web_stack();
    let app = map.extended_config("app").unwrap();
    let web = map.extended_config("web").unwrap();
    assert_eq!(
        map.image_for("app", &app),
        "registry.example.com/app-server:stable"
    );
    assert_eq!(map.image_for("web", &web), "nginx:stable");
}

#[test]
fn loose_shapes_convert_to_canonical_records() {
    let map = web_stack();
    let web = map.extended_config("web").unwrap();
    assert!(matches!(&web.binds[0], HostBind::Alias { alias, .. } if alias == "web_config"));
    assert!(matches!(&web.uses[0], UsedVolume::Alias { alias, .. } if alias == "app_sock"));
    assert_eq!(web.exposes[0].exposed_port, "443");
    assert_eq!(web.exposes[0].host_port.as_ref().unwrap().resolve(), "8443");
}

#[test]
fn host_paths_resolve_per_instance() {
    let map = web_stack();
    assert_eq!(
        map.host.path("web_config", Some("i1")).unwrap(),
        "/srv/stack/web/a"
    );
    assert_eq!(
        map.host.path("web_config", Some("i2")).unwrap(),
        "/srv/stack/web/b"
    );
}

#[test]
fn group_members_resolve_against_instances() {
    let map = web_stack();
    let members = map.group_members("frontends").unwrap();
    assert_eq!(members, vec!["web.i1".to_string(), "web.i2".to_string()]);
}

#[test]
fn dangling_references_fail_integrity() {
    let broken = ContainerMap::from_document(
        None,
        json!({
            "name": "broken",
            "web": {"links": ["missing"]},
        }),
    )
    .unwrap();
    assert!(matches!(
        broken.check_integrity(),
        Err(MapError::Integrity(_))
    ));

    let bad_network = ContainerMap::from_document(
        None,
        json!({
            "name": "broken",
            "web": {"networks": ["ghost"]},
        }),
    )
    .unwrap();
    assert!(bad_network.check_integrity().is_err());
}

#[test]
fn network_mode_references_round_trip_through_serialization() {
    let map = web_stack();
    let document = serde_json::to_value(&map).unwrap();
    let reloaded = ContainerMap::from_document(None, document).unwrap();
    reloaded.check_integrity().unwrap();
    assert_eq!(
        reloaded.extended_config("web").unwrap(),
        map.extended_config("web").unwrap()
    );
}

#[test]
fn disabled_network_mode_parses_from_aliases() {
    let map = ContainerMap::from_document(
        None,
        json!({
            "name": "m",
            "batch": {"network_mode": "disabled"},
            "attached_net": {"network_mode": "batch"},
        }),
    )
    .unwrap();
    let batch = map.get("batch").unwrap();
    assert_eq!(batch.network_mode, Some(NetworkMode::Disabled));
    let attached = map.get("attached_net").unwrap();
    assert_eq!(
        attached.network_mode,
        Some(NetworkMode::ConfigRef {
            config: "batch".to_string(),
            instance: None
        })
    );
}
