use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

const POINTS: &str = r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","geometry":{"type":"Point","coordinates":[18.95,69.65]},"properties":{"name":"Tromsø"}}
]}"#;

fn geogpt(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("geogpt").expect("binary");
    cmd.current_dir(dir.path())
        .env_remove("GEOGPT_WORKING_DIR")
        .env_remove("GEOGPT_LOG_LEVEL")
        .env_remove("GEOGPT_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_shows_conversion_tools() {
    let dir = tempfile::tempdir().unwrap();
    geogpt(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("kml_to_gpkg"))
        .stdout(predicate::str::contains("gpkg_to_csv"));
}

#[test]
fn list_filters_by_tag_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = geogpt(&dir)
        .args(["list", "--tag", "geojson", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let descriptors: Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = descriptors
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["geojson_to_gpkg", "gpkg_to_geojson"]);
}

#[test]
fn describe_unknown_tool_fails() {
    let dir = tempfile::tempdir().unwrap();
    geogpt(&dir)
        .args(["describe", "buffer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));
}

#[test]
fn call_uses_configured_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("points.geojson"), POINTS).unwrap();
    fs::write(dir.path().join("geogpt.toml"), "working_dir = \"data\"\n").unwrap();

    let output = geogpt(&dir)
        .args(["call", "geojson_to_gpkg", "--args", r#"{"input_file":"points.geojson"}"#])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    let path = result["output_path"].as_str().unwrap();
    assert!(path.ends_with("points.gpkg"));
    assert!(data.join("points.gpkg").exists());
}

#[test]
fn call_reports_tool_failures() {
    let dir = tempfile::tempdir().unwrap();
    geogpt(&dir)
        .args(["call", "gpkg_to_kml", "--args", r#"{"input_file":"absent.gpkg"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn drivers_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    geogpt(&dir)
        .arg("drivers")
        .assert()
        .success()
        .stdout(predicate::str::contains("GPKG"))
        .stdout(predicate::str::contains(".geojson"));
}

#[test]
fn call_takes_csv_defaults_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("wells.csv"), "name,lon,lat\nA,5.1,60.2\nB,5.3,60.4\n").unwrap();
    fs::write(
        dir.path().join("geogpt.toml"),
        "[conversion]\nx_column = \"lon\"\ny_column = \"lat\"\ndefault_crs = \"EPSG:4258\"\n",
    )
    .unwrap();

    let output = geogpt(&dir)
        .args(["call", "csv_to_gpkg", "--args", r#"{"input_file":"wells.csv"}"#])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let table = geogpt::conversion::read_file(&dir.path().join("wells.gpkg")).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.crs(), Some("EPSG:4258"));
    assert!(table.features().iter().all(|feature| feature.geometry.is_some()));

    let output = geogpt(&dir)
        .args([
            "call",
            "csv_to_gpkg",
            "--args",
            r#"{"input_file":"wells.csv","output_file":"etrs.gpkg","crs":"EPSG:3035"}"#,
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let table = geogpt::conversion::read_file(&dir.path().join("etrs.gpkg")).unwrap();
    assert_eq!(table.crs(), Some("EPSG:3035"));
}

#[test]
fn drivers_can_be_looked_up_by_name() {
    let dir = tempfile::tempdir().unwrap();
    geogpt(&dir)
        .args(["drivers", "--name", "esri shapefile"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 total)"))
        .stdout(predicate::str::contains(".shp"));

    geogpt(&dir)
        .args(["drivers", "--name", "GML"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Driver 'GML' not found"));
}
