//! Build settings the panic guards depend on.

use std::path::Path;

fn workspace_manifest() -> toml::Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../Cargo.toml");
    let raw = std::fs::read_to_string(&path).unwrap();
    raw.parse::<toml::Value>().unwrap()
}

#[test]
fn test_no_profile_aborts_on_panic() {
    let manifest = workspace_manifest();
    let profiles = manifest["profile"].as_table().unwrap();
    assert!(profiles.contains_key("release"));
    for (name, profile) in profiles {
        let panic = profile.get("panic").and_then(toml::Value::as_str);
        assert_ne!(panic, Some("abort"), "profile {name} must unwind on panic");
    }
}

#[test]
fn test_release_build_still_optimised() {
    let manifest = workspace_manifest();
    let release = &manifest["profile"]["release"];
    assert_eq!(release["opt-level"].as_integer(), Some(3));
    assert_eq!(release["lto"].as_str(), Some("thin"));
}
