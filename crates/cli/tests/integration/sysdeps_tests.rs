//! System dependency probing.

use predicates::prelude::*;

use super::common::TestEnv;

const SYSDEPS: &str = r#"
<moduleset>
  <systemmodule id="shell">
    <systemdependencies><dep type="path" name="sh"/></systemdependencies>
  </systemmodule>
  <systemmodule id="imaginary">
    <systemdependencies>
      <dep type="path" name="modbuild-no-such-tool">
        <altdep type="path" name="modbuild-no-such-tool-either"/>
      </dep>
    </systemdependencies>
  </systemmodule>
</moduleset>
"#;

#[cfg(unix)]
#[test]
fn present_dependency_passes() {
  let env = TestEnv::new(SYSDEPS);

  env
    .cmd()
    .args(["sysdeps", "shell"])
    .assert()
    .success()
    .stdout(predicate::str::contains("path:sh"));
}

#[test]
fn missing_dependency_fails_with_its_users() {
  let env = TestEnv::new(SYSDEPS);

  env
    .cmd()
    .arg("sysdeps")
    .assert()
    .failure()
    .stderr(predicate::str::contains(
      "path:modbuild-no-such-tool | path:modbuild-no-such-tool-either (required by imaginary)",
    ));
}

#[test]
fn systemmodule_build_fails_when_missing() {
  let env = TestEnv::new(SYSDEPS);

  env
    .cmd()
    .args(["build", "imaginary"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("imaginary failed during phase sysdeps"));
}
