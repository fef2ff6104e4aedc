use anyhow::Result;
use brix::{
    property_value, property_values, DeprecationWarningMode, Engine, ErrorKind, MergeType,
    ProjectData, ResolvedProject, SetupParameters, Value,
};

use std::path::PathBuf;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn test_project(name: &str) -> PathBuf {
    data_dir().join(name)
}

fn default_params(name: &str) -> SetupParameters {
    SetupParameters::new(test_project(name)).with_search_paths([data_dir()])
}

fn resolve(name: &str) -> Result<ResolvedProject> {
    init_logging();
    let mut engine = Engine::new();
    Ok(engine.resolve(&default_params(name))?)
}

fn resolve_err(name: &str) -> brix::Error {
    let mut engine = Engine::new();
    engine
        .resolve(&default_params(name))
        .expect_err("expected resolution to fail")
}

#[test]
fn minimal_product_round_trip() -> Result<()> {
    let project = resolve("minimal.brix")?;
    assert_eq!(project.products.len(), 1);

    let product = &project.products[0];
    assert_eq!(product.name, "app");
    assert_eq!(product.target_name, "app");
    assert_eq!(product.product_type, vec!["application".to_string()]);
    assert!(product.enabled);

    assert_eq!(product.groups.len(), 1);
    let group = &product.groups[0];
    assert_eq!(group.name, "sources");
    assert_eq!(group.files.len(), 1);
    assert!(group.files[0].file_path.ends_with("main.c"));
    assert_eq!(group.files[0].file_tags, vec!["c".to_string()]);
    Ok(())
}

#[test]
fn resolution_is_idempotent() -> Result<()> {
    let first = serde_json::to_string(&resolve("minimal.brix")?).unwrap();
    let second = serde_json::to_string(&resolve("minimal.brix")?).unwrap();
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn profile_values_and_overridden_values() -> Result<()> {
    let params = default_params("profilevalues.brix")
        .with_profile_value("dummy.defines", Value::from("IN_PROFILE"))
        .with_profile_value("dummy.cFlags", Value::from("IN_PROFILE"))
        .with_profile_value("dummy.cxxFlags", Value::from("IN_PROFILE"))
        .with_overridden_value("dummy.cFlags", Value::from("OVERRIDDEN"));

    let mut engine = Engine::new();
    let project = engine.resolve(&params)?;
    let product = &project.products[0];
    assert_eq!(product.name, "product1");
    let map = &product.module_properties;

    // Profile only.
    let values = property_values(map, "dummy", "cxxFlags", MergeType::MergeLists);
    assert_eq!(values, vec![Value::from("IN_PROFILE")]);

    // In-file value first, profile value appended.
    let values = property_values(map, "dummy", "defines", MergeType::MergeLists);
    assert_eq!(
        values,
        vec![Value::from("IN_FILE"), Value::from("IN_PROFILE")]
    );

    // Override wins outright.
    let values = property_values(map, "dummy", "cFlags", MergeType::MergeLists);
    assert_eq!(values, vec![Value::from("OVERRIDDEN")]);

    // The module file's own default is still visible.
    assert_eq!(
        property_value(map, "dummy", "someString"),
        Value::from("default")
    );
    Ok(())
}

#[test]
fn transitive_modules_surface_on_the_product() -> Result<()> {
    let project = resolve("nested.brix")?;
    let product = &project.products[0];
    let map = &product.module_properties;

    // The indirect dependency is visible at the top level and nested under
    // its requester; the finder merges both contributions.
    assert_eq!(
        property_value(map, "dummy", "defines"),
        Value::from(vec![Value::from("TOP")])
    );
    assert!(!map["modules"]["toolchain"]["modules"]["dummy"].is_undefined());

    let values = property_values(map, "dummy", "defines", MergeType::MergeLists);
    assert_eq!(values, vec![Value::from("TOP")]);

    assert!(product.dependencies.contains(&"toolchain".to_string()));
    assert!(product.dependencies.contains(&"dummy".to_string()));
    Ok(())
}

#[test]
fn file_prototype_inheritance() -> Result<()> {
    let project = resolve("inheritance/app.brix")?;
    let product = &project.products[0];

    assert_eq!(product.name, "derived");
    assert_eq!(product.product_type, vec!["application".to_string()]);
    // The prototype's binding evaluates against the derived instance.
    assert_eq!(product.target_name, "derived-base");
    assert_eq!(product.product_properties["greeting"], Value::from("hi"));

    // The prototype's children are part of the derived product.
    assert_eq!(product.groups.len(), 1);
    assert_eq!(product.groups[0].name, "common");
    Ok(())
}

#[test]
fn self_import_cycle_is_detected() {
    let err = resolve_err("cycle/Selfish.brix");
    assert_eq!(err.kind, ErrorKind::CyclicImport);
    assert!(err.message.contains("Selfish.brix"));
}

#[test]
fn transitive_import_cycle_is_detected() {
    let err = resolve_err("cycle/CycleA.brix");
    assert_eq!(err.kind, ErrorKind::CyclicImport);
}

#[test]
fn reserved_extension_alias_is_rejected() {
    let err = resolve_err("badimports/reserved.brix");
    assert_eq!(err.kind, ErrorKind::ReservedNameCollision);
    let location = err.location.expect("collision errors carry the alias location");
    assert!(location.file_path.ends_with("reserved.brix"));
}

#[test]
fn duplicate_alias_is_rejected() {
    let err = resolve_err("badimports/duplicatealias.brix");
    assert_eq!(err.kind, ErrorKind::DuplicateAlias);
}

#[test]
fn missing_file_import_is_rejected() {
    let err = resolve_err("badimports/notfound.brix");
    assert_eq!(err.kind, ErrorKind::ImportNotFound);
}

#[test]
fn incompatible_language_version_is_rejected() {
    let err = resolve_err("badversion.brix");
    assert_eq!(err.kind, ErrorKind::VersionIncompatibility);
    assert!(err.message.contains("2.0"));
}

#[test]
fn unknown_item_type_is_rejected() {
    let err = resolve_err("unknowntype.brix");
    assert_eq!(err.kind, ErrorKind::UnknownItemType);
    assert!(err.message.contains("Widget"));
}

#[test]
fn unknown_property_type_is_rejected() {
    let err = resolve_err("badpropertytype.brix");
    assert_eq!(err.kind, ErrorKind::UnknownPropertyType);
}

#[test]
fn duplicate_binding_is_rejected() {
    let err = resolve_err("duplicatebinding.brix");
    assert_eq!(err.kind, ErrorKind::DuplicateBinding);
}

#[test]
fn properties_blocks_overlay_conditionally() -> Result<()> {
    let project = resolve("properties.brix")?;
    assert_eq!(project.products.len(), 2);

    let rel = project.products.iter().find(|p| p.name == "rel").unwrap();
    assert_eq!(
        rel.product_properties["flags"],
        Value::from(vec![Value::from("base")])
    );

    let dbg = project.products.iter().find(|p| p.name == "dbg").unwrap();
    assert_eq!(
        dbg.product_properties["flags"],
        Value::from(vec![Value::from("base"), Value::from("dbg")])
    );
    Ok(())
}

#[test]
fn export_items_provide_modules() -> Result<()> {
    let project = resolve("exports.brix")?;
    let app = project.products.iter().find(|p| p.name == "app").unwrap();

    assert_eq!(
        property_value(&app.module_properties, "lib", "includePaths"),
        Value::from(vec![Value::from("include")])
    );
    assert!(app.dependencies.contains(&"lib".to_string()));
    Ok(())
}

#[test]
fn group_overrides_append_to_product_level_values() -> Result<()> {
    let project = resolve("groupoverride.brix")?;
    let product = &project.products[0];

    assert_eq!(
        property_value(&product.module_properties, "dummy", "defines"),
        Value::from(vec![Value::from("BASE")])
    );

    let group = product.groups.iter().find(|g| g.name == "special").unwrap();
    assert_eq!(
        property_value(&group.module_properties, "dummy", "defines"),
        Value::from(vec![Value::from("BASE"), Value::from("EXTRA")])
    );
    Ok(())
}

#[test]
fn extensions_are_callable_from_expressions() -> Result<()> {
    std::env::set_var("BRIX_LANGUAGE_TEST", "from-env");
    let project = resolve("extensions.brix")?;
    let product = &project.products[0];

    assert_eq!(product.product_properties["stem"], Value::from("foo"));
    assert_eq!(product.product_properties["fromEnv"], Value::from("from-env"));
    Ok(())
}

#[test]
fn deprecation_mode_controls_diagnostics() -> Result<()> {
    // Warning mode resolves; error mode fails on the deprecated property.
    let mut engine = Engine::new();
    engine.resolve(
        &default_params("deprecated.brix").with_deprecation_mode(DeprecationWarningMode::On),
    )?;

    let err = engine
        .resolve(
            &default_params("deprecated.brix")
                .with_deprecation_mode(DeprecationWarningMode::Error),
        )
        .expect_err("deprecated property should fail in Error mode");
    assert_eq!(err.kind, ErrorKind::Deprecation);
    assert!(err.message.contains("usings"));

    engine.resolve(
        &default_params("deprecated.brix").with_deprecation_mode(DeprecationWarningMode::Off),
    )?;
    Ok(())
}

#[test]
fn project_scope_is_visible_to_products() -> Result<()> {
    let project = resolve("scopes.brix")?;
    let product = &project.products[0];
    assert_eq!(product.target_name, "acme-p");
    Ok(())
}

#[test]
fn product_conditions() -> Result<()> {
    let project = resolve("conditions.brix")?;
    assert_eq!(project.products.len(), 3);

    let by_name = |name: &str| {
        project
            .products
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("missing product {name}"))
    };
    assert!(by_name("product_no_condition").enabled);
    assert!(by_name("product_true_condition").enabled);
    assert!(!by_name("product_false_condition").enabled);
    Ok(())
}

#[test]
fn configurations_reduce_when_compatible() -> Result<()> {
    let debug = ProjectData::from(&resolve("minimal.brix")?);
    let release = ProjectData::from(&resolve("minimal.brix")?);
    let reduced = brix::reduce_configurations(&[
        ("debug".to_string(), debug.clone()),
        ("release".to_string(), release),
    ])?;
    assert_eq!(reduced, debug);
    Ok(())
}

#[test]
fn incompatible_configurations_fail_to_reduce() -> Result<()> {
    let debug = ProjectData::from(&resolve("minimal.brix")?);
    let mut release = debug.clone();
    release.products[0].product_type = vec!["library".to_string()];

    let err = brix::reduce_configurations(&[
        ("debug".to_string(), debug),
        ("release".to_string(), release),
    ])
    .expect_err("mismatched product types must not reduce");
    assert!(err.message.contains("differs between configurations"));
    Ok(())
}
