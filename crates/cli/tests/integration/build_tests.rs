//! Builds driven through the shell executor.

use predicates::prelude::*;

use super::common::TestEnv;

/// A waf stand-in: remembers the prefix at configure time, builds one file
/// and installs it under `--destdir`.
const FAKE_WAF: &str = r#"#!/bin/sh
set -e
case "$1" in
  configure) echo "$3" > .prefix ;;
  build) echo "hello" > hello ;;
  install)
    dest="${2#--destdir=}"
    prefix=$(cat .prefix)
    mkdir -p "$dest$prefix/bin"
    cp hello "$dest$prefix/bin/hello"
    ;;
esac
"#;

const HELLO: &str = r#"
<moduleset>
  <waf id="hello" waf-command="sh ./waf.sh">
    <branch revision="1.0"/>
  </waf>
  <metamodule id="world">
    <dependencies><dep package="hello"/></dependencies>
  </metamodule>
</moduleset>
"#;

fn hello_env() -> TestEnv {
  let env = TestEnv::new(HELLO);
  env.write_file("state/checkout/hello/waf.sh", FAKE_WAF);
  env
}

#[cfg(unix)]
#[test]
fn build_installs_and_records() {
  let env = hello_env();

  env
    .cmd()
    .args(["build", "world"])
    .assert()
    .success()
    .stdout(predicate::str::contains("2 module(s) built"));

  assert_eq!(std::fs::read_to_string(env.prefix_path("bin/hello")).unwrap(), "hello\n");
  assert!(env.checkout_path("hello/.prefix").is_file());

  env
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0 (installed 1.0)"));

  env
    .cmd()
    .args(["info", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Files: 1"))
    .stdout(predicate::str::contains("configure --prefix"));
}

#[cfg(unix)]
#[test]
fn state_dir_with_spaces_builds() {
  let env = TestEnv::with_state_dir(HELLO, "my builds; $HOME");
  env.write_file("my builds; $HOME/checkout/hello/waf.sh", FAKE_WAF);

  env.cmd().args(["build", "hello"]).assert().success();

  assert_eq!(std::fs::read_to_string(env.prefix_path("bin/hello")).unwrap(), "hello\n");
  let recorded = std::fs::read_to_string(env.checkout_path("hello/.prefix")).unwrap();
  assert_eq!(recorded.trim_end(), env.prefix_path("").display().to_string().trim_end_matches('/'));
}

#[cfg(unix)]
#[test]
fn updated_policy_skips_installed_module() {
  let env = hello_env();
  env.cmd().args(["build", "hello"]).assert().success();
  std::fs::remove_file(env.checkout_path("hello/hello")).unwrap();

  env
    .cmd()
    .args(["build", "--policy", "updated", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("0 module(s) built, 1 up to date"))
    .stdout(predicate::str::contains("hello: up to date, skipped"));

  assert!(!env.checkout_path("hello/hello").exists());
}

#[cfg(unix)]
#[test]
fn uninstall_removes_installed_files() {
  let env = hello_env();
  env.cmd().args(["build", "hello"]).assert().success();
  assert!(env.prefix_path("bin/hello").is_file());

  env
    .cmd()
    .args(["uninstall", "--force", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uninstalled hello"));

  assert!(!env.prefix_path("bin/hello").exists());
  env
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0 (not installed)"));
}

#[cfg(unix)]
#[test]
fn failed_module_poisons_dependents() {
  let env = TestEnv::new(HELLO);
  env.write_file("state/checkout/hello/waf.sh", "#!/bin/sh\nexit 3\n");

  env
    .cmd()
    .args(["build", "world"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("2 of 2 module(s) could not be built"));

  assert!(!env.prefix_path("bin/hello").exists());
}

#[test]
fn missing_source_tree_without_network_fails() {
  let env = TestEnv::new(HELLO);

  env
    .cmd()
    .args(["build", "--nonetwork", "hello"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("network access is disabled"));
}
