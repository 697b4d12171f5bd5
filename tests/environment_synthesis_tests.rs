use app_warden::template::parse_template;
use app_warden::{synthesize, Environment, EnvironmentTemplate, SynthesisError, SynthesisParameters};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

fn logs_template() -> EnvironmentTemplate {
    EnvironmentTemplate {
        env_directories: BTreeMap::from([("LOGS".to_string(), "{root}/logs".to_string())]),
        seed_directories: Vec::new(),
        override_variables: BTreeMap::from([("USER".to_string(), "{username}".to_string())]),
        pass_through_variables: vec!["PATH".to_string()],
    }
}

#[test]
fn logs_directory_user_and_path() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("alice");
    let params = SynthesisParameters::new(root.to_string_lossy(), "alice");
    let parent: Environment = [("PATH", "/usr/bin"), ("HOME", "/home/someone")]
        .into_iter()
        .collect();

    let env = synthesize(&parent, &logs_template(), &params).unwrap();

    let logs = root.join("logs");
    let entries: Vec<(String, String)> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(
        entries,
        vec![
            ("LOGS".to_string(), logs.to_string_lossy().into_owned()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("USER".to_string(), "alice".to_string()),
        ]
    );
    assert!(logs.is_dir());
    assert!(!env.contains("HOME"));
}

#[test]
fn synthesis_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let params = SynthesisParameters::new(dir.path().join("bob").to_string_lossy(), "bob");
    let parent: Environment = [("PATH", "/bin")].into_iter().collect();

    let first = synthesize(&parent, &logs_template(), &params).unwrap();
    let second = synthesize(&parent, &logs_template(), &params).unwrap();
    assert_eq!(first, second);
}

#[test]
fn absent_pass_through_variable_is_skipped() {
    let dir = TempDir::new().unwrap();
    let params = SynthesisParameters::new(dir.path().join("carol").to_string_lossy(), "carol");

    let env = synthesize(&Environment::new(), &logs_template(), &params).unwrap();
    assert!(!env.contains("PATH"));
    assert_eq!(env.len(), 2);
}

#[test]
fn overrides_win_over_directories_and_pass_through_wins_over_both() {
    let dir = TempDir::new().unwrap();
    let params = SynthesisParameters::new(dir.path().join("dave").to_string_lossy(), "dave");
    let template = EnvironmentTemplate {
        env_directories: BTreeMap::from([("SHARED".to_string(), "{root}/dir".to_string())]),
        override_variables: BTreeMap::from([("SHARED".to_string(), "override".to_string())]),
        ..EnvironmentTemplate::default()
    };
    let env = synthesize(&Environment::new(), &template, &params).unwrap();
    assert_eq!(env.get("SHARED"), Some("override"));

    let template = EnvironmentTemplate {
        pass_through_variables: vec!["SHARED".to_string()],
        ..template
    };
    let parent: Environment = [("SHARED", "from-parent")].into_iter().collect();
    let env = synthesize(&parent, &template, &params).unwrap();
    assert_eq!(env.get("SHARED"), Some("from-parent"));
}

#[test]
fn pass_through_values_are_rendered() {
    let dir = TempDir::new().unwrap();
    let params = SynthesisParameters::new(dir.path().join("erin").to_string_lossy(), "erin");
    let template = EnvironmentTemplate {
        pass_through_variables: vec!["GREETING".to_string()],
        ..EnvironmentTemplate::default()
    };
    let parent: Environment = [("GREETING", "hi {username}")].into_iter().collect();

    let env = synthesize(&parent, &template, &params).unwrap();
    assert_eq!(env.get("GREETING"), Some("hi erin"));
}

#[test]
fn unresolved_placeholder_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("frank");
    let params = SynthesisParameters::new(root.to_string_lossy(), "frank");
    let template = EnvironmentTemplate {
        env_directories: BTreeMap::from([("CACHE".to_string(), "{root}/cache".to_string())]),
        seed_directories: vec!["{root}/{unknown}".to_string()],
        ..EnvironmentTemplate::default()
    };

    let err = synthesize(&Environment::new(), &template, &params).unwrap_err();
    assert_eq!(
        err,
        SynthesisError::UnresolvedPlaceholder {
            template: "{root}/{unknown}".to_string(),
            placeholder: "unknown".to_string(),
        }
    );
    assert!(!root.exists());
}

#[test]
fn seed_directories_are_created_but_not_exported() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("grace");
    let params = SynthesisParameters::new(root.to_string_lossy(), "grace");
    let template = EnvironmentTemplate {
        seed_directories: vec!["{root}/AppData/Local".to_string()],
        ..EnvironmentTemplate::default()
    };

    let env = synthesize(&Environment::new(), &template, &params).unwrap();
    assert!(env.is_empty());
    assert!(root.join("AppData").join("Local").is_dir());
}

#[test]
fn template_document_drives_synthesis() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("heidi");
    let template = parse_template(
        Path::new("inline.json"),
        r#"{
            "directories": { "APPDATA": "{root}/AppData/Roaming" },
            "override_variables": { "BRACES": "{{literal}}" }
        }"#,
    )
    .unwrap();

    let env = synthesize(
        &Environment::new(),
        &template,
        &SynthesisParameters::new(root.to_string_lossy(), "heidi"),
    )
    .unwrap();
    assert_eq!(env.get("BRACES"), Some("{literal}"));
    assert_eq!(
        env.get("APPDATA"),
        Some(root.join("AppData/Roaming").to_string_lossy().as_ref())
    );
}
