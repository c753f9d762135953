//! Discovery, validation and registration run end to end.

use std::sync::Arc;

use hostbridge_config::{BridgeConfig, ConfigStore, EndpointMap, ModuleConfigMap};
use hostbridge_core::{
    CapabilitySet, Category, DiscoveryError, EndpointKey, FnHandler, HandlerDescriptor,
    HandlerModule, HandlerRegistry, HandlerRequest, ModuleCatalog, ModuleContext, ValidationError,
};
use http::Method;
use serde_json::json;

struct Cam;

impl HandlerModule for Cam {
    fn name(&self) -> &str {
        "cam"
    }

    fn load(&self, ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
        let machine = ctx.setting("machine").unwrap_or("generic").to_string();
        Ok(vec![
            HandlerDescriptor::builder(
                Category::Manufacture,
                "get_setup",
                FnHandler::new(|req: HandlerRequest| {
                    let id = req.require_param("id")?;
                    Ok(json!({ "id": id, "machine": req.module_config["machine"] }))
                }),
            )
            .method(Method::GET)
            .endpoint(EndpointKey::new(Category::Manufacture, "cam", "setup"))
            .host_thread()
            .module("cam")
            .build(),
            HandlerDescriptor::builder(
                Category::Manufacture,
                "list_tools",
                FnHandler::new(move |_req| Ok(json!({ "machine": machine }))),
            )
            .method(Method::GET)
            // Not in the endpoint map
            .endpoint(EndpointKey::new(Category::Manufacture, "cam", "tools"))
            .build(),
        ])
    }
}

fn endpoints() -> EndpointMap {
    EndpointMap::new().with(
        EndpointKey::new(Category::Manufacture, "cam", "setup"),
        "/cam/setups/{id}",
    )
}

#[test]
fn test_register_only_valid_descriptors() {
    let mut modules = ModuleConfigMap::new();
    modules.insert("cam".to_string(), json!({"machine": "haas"}));

    let mut registry = HandlerRegistry::new(&modules);
    let report = registry.discover(&ModuleCatalog::new().with(Cam));
    assert_eq!(report.descriptors.len(), 2);

    let mut rejected = Vec::new();
    for descriptor in report.descriptors {
        match HandlerRegistry::validate(&descriptor, CapabilitySet::all(), &endpoints()) {
            Ok(()) => {
                registry.register(descriptor).unwrap();
            }
            Err(e) => rejected.push(e),
        }
    }

    assert_eq!(registry.len(), 1);
    assert!(matches!(rejected[0], ValidationError::UnknownEndpoint { .. }));

    let setup = registry.get(Category::Manufacture, "get_setup").unwrap();
    let request = HandlerRequest {
        module_config: registry.module_config_for(setup),
        ..HandlerRequest::default().with_param("id", "42")
    };
    let response = setup.handler().call(request).unwrap();
    assert_eq!(response, json!({"id": "42", "machine": "haas"}));
}

#[test]
fn test_registry_follows_module_config_changes() {
    let config = BridgeConfig::builder()
        .endpoint(
            EndpointKey::new(Category::Manufacture, "cam", "setup"),
            "/cam/setups/{id}",
        )
        .module_config("cam", json!({"machine": "haas"}))
        .build();

    let store = ConfigStore::new(config).unwrap();
    let registry = Arc::new(HandlerRegistry::new(&store.snapshot().module_config));
    store.add_listener(registry.clone());

    store
        .update(|current| {
            let mut next = current.config().clone();
            next.module_config
                .insert("cam".to_string(), json!({"machine": "dmg"}));
            Ok::<_, hostbridge_config::ConfigError>(next)
        })
        .unwrap();

    assert_eq!(registry.module_config("cam")["machine"], "dmg");
}
