//! Startup failure specs: bad configuration exits non-zero, fast.

use crate::prelude::*;

#[test]
fn missing_manifest_fails_startup() {
    let supervisor = Supervisor::new("");
    std::fs::remove_file(supervisor.dir().join("repos-to-convert.yaml")).unwrap();

    supervisor.run().fails().stderr_has("failed to start");
}

#[test]
fn malformed_yaml_fails_startup() {
    Supervisor::new("corp:\n  code-host-name: [\n")
        .run()
        .fails()
        .stderr_has("failed to start");
}

#[test]
fn repo_without_url_fails_startup() {
    let manifest = r#"
corp:
  code-host-name: svn.example.com
  repos:
    widget:
      type: svn
"#;
    Supervisor::new(manifest)
        .run()
        .fails()
        .stderr_has("widget");
}

#[test]
fn unwritable_serve_root_fails_startup() {
    let supervisor = Supervisor::new("");
    // A file where the serve root directory should be.
    std::fs::write(supervisor.dir().join("serve-root"), "in the way").unwrap();

    supervisor.run().fails().stderr_has("serve root");
}
