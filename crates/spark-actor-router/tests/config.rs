//! 路由器配置：构建期校验与 TOML 文档加载。

use spark_actor_router::{ConfigError, DispatcherId, RouterConfig, RouterKind, SupervisorStrategyRef};

#[test]
fn min_above_max_fails_at_build_time() {
    let outcome = RouterConfig::builder(RouterKind::RoundRobin)
        .with_min_routees(5)
        .with_max_routees(3)
        .build();
    assert_eq!(outcome, Err(ConfigError::MinExceedsMax { min: 5, max: 3 }));
}

#[test]
fn ordered_cardinality_builds() {
    let config = RouterConfig::builder(RouterKind::SmallestMailbox)
        .with_min_routees(1)
        .with_initial_routees(2)
        .with_max_routees(10)
        .with_supervisor_strategy(SupervisorStrategyRef::new("all-for-one"))
        .with_dispatcher(DispatcherId::new("pinned"))
        .build()
        .expect("1 ≤ 1 ≤ 2 ≤ 10");

    assert_eq!(config.kind(), RouterKind::SmallestMailbox);
    assert_eq!(config.initial_routees(), 2);
    assert_eq!(config.supervisor_strategy().as_str(), "all-for-one");
    assert_eq!(config.dispatcher().as_str(), "pinned");
}

#[test]
fn toml_document_is_validated_through_the_builder() {
    let config = RouterConfig::from_toml_str(
        r#"
        kind = "consistent-hash"
        min-routees = 2
        initial-routees = 4
        max-routees = 16
        auto-scaling = true
        scale-up-threshold = 0
        dispatcher = "game-loop"
        "#,
    )
    .expect("合法文档");

    assert_eq!(config.kind(), RouterKind::ConsistentHash);
    assert_eq!(config.min_routees(), 2);
    assert_eq!(config.initial_routees(), 4);
    assert_eq!(config.max_routees(), 16);
    assert!(config.auto_scaling());
    assert_eq!(config.scale_up_threshold(), 1);
    assert_eq!(config.scale_down_threshold(), 300);
    assert_eq!(config.dispatcher().as_str(), "game-loop");
    assert_eq!(config.supervisor_strategy(), &SupervisorStrategyRef::one_for_one());
}

#[test]
fn toml_document_cannot_bypass_cardinality_rules() {
    let outcome = RouterConfig::from_toml_str(
        r#"
        kind = "scatter-gather"
        min-routees = 5
        max-routees = 3
        initial-routees = 4
        "#,
    );
    assert_eq!(outcome, Err(ConfigError::MinExceedsMax { min: 5, max: 3 }));
}

#[test]
fn malformed_documents_surface_parse_errors() {
    for document in [
        "kind = \"teleport\"",
        "min-routees = 2",
        "kind = \"random\"\nunknown-key = 1",
    ] {
        let outcome = RouterConfig::from_toml_str(document);
        assert!(
            matches!(outcome, Err(ConfigError::Parse { .. })),
            "文档应解析失败: {document}"
        );
    }
}
