use geogpt::registry;

#[test]
fn registry_includes_conversion_tools() {
    let registry = registry();
    assert_eq!(registry.get_functions_by_tag("conversion").len(), 8);
    assert!(registry.get_function("gpkg_to_csv").is_some());
    assert!(registry.get_function("unknown_tool").is_none());
}

#[tokio::test]
async fn unknown_tools_fail_cleanly() {
    let err = registry()
        .invoke("reproject", serde_json::json!({}))
        .await
        .expect_err("not registered");
    assert!(matches!(err, geogpt::tools::ToolError::UnknownTool { .. }));
}
