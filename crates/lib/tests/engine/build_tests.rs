//! End-to-end driver runs.

use modbuild_lib::build::exec::RecordingExecutor;
use modbuild_lib::config::BuildPolicy;

use super::common::{TestEnv, single};

const CHAIN: &str = r#"
<moduleset>
  <scripted id="c" revision="r1" files="c">
    <dependencies><dep package="b"/></dependencies>
  </scripted>
  <scripted id="b" revision="r1" files="b">
    <dependencies><dep package="a"/></dependencies>
  </scripted>
  <scripted id="a" revision="r1" files="a"/>
</moduleset>
"#;

#[test]
fn chain_builds_in_dependency_order() {
  let env = TestEnv::new();
  let set = env.load(CHAIN).unwrap();

  let (summary, ctx, log) = env.build(&set, &["c"]);

  assert!(summary.is_success());
  assert_eq!(summary.built, vec!["a", "b", "c"]);
  let installs: Vec<String> = log.commands().into_iter().filter(|c| c.starts_with("scripted install")).collect();
  assert_eq!(installs, vec!["scripted install a", "scripted install b", "scripted install c"]);
  for name in ["a", "b", "c"] {
    assert!(env.prefix_path(name).is_file(), "{} not installed", name);
    assert_eq!(ctx.packagedb.get(name).unwrap().manifest.as_deref(), Some(&[name.to_string()][..]));
  }
  assert_eq!(env.packagedb().entries().count(), 3);
}

#[test]
fn failure_poisons_dependents_only() {
  let env = TestEnv::new();
  let set = env
    .load(
      r#"<moduleset>
           <scripted id="a" files="a"/>
           <scripted id="b" files="b"><dependencies><dep package="a"/></dependencies></scripted>
           <scripted id="c" files="c"/>
         </moduleset>"#,
    )
    .unwrap();
  let (executor, log) = RecordingExecutor::new();
  let executor = executor.fail_on("scripted configure a");

  let (summary, ctx) = env.build_with(&set, &["b", "c"], executor);

  assert!(!summary.is_success());
  assert_eq!(summary.failed.len(), 1);
  assert_eq!(summary.failed[0].module, "a");
  assert_eq!(summary.failed[0].phase, "configure");
  assert_eq!(summary.poisoned, vec![("b".to_string(), "a".to_string())]);
  assert_eq!(summary.built, vec!["c"]);
  assert!(!log.contains("scripted checkout b"));
  assert!(ctx.packagedb.get("a").is_none());
  assert!(ctx.packagedb.get("b").is_none());
  assert!(env.prefix_path("c").is_file());
}

#[test]
fn reinstall_removes_orphaned_files() {
  let env = TestEnv::new();
  let first = env.load(&single("m", "r1", "bin/x bin/y")).unwrap();
  let (summary, _, _) = env.build(&first, &["m"]);
  assert!(summary.is_success());
  assert!(env.prefix_path("bin/y").is_file());

  let second = env.load(&single("m", "r2", "bin/x bin/z")).unwrap();
  let (summary, ctx, _) = env.build(&second, &["m"]);

  assert!(summary.is_success());
  assert!(env.prefix_path("bin/x").is_file());
  assert!(env.prefix_path("bin/z").is_file());
  assert!(!env.prefix_path("bin/y").exists());
  let entry = ctx.packagedb.get("m").unwrap();
  assert_eq!(entry.revision, "r2");
  assert_eq!(entry.manifest.clone().unwrap(), vec!["bin/x", "bin/z"]);
}

#[test]
fn updated_policy_stops_after_checkout() {
  let mut env = TestEnv::new();
  let set = env.load(&single("m", "r1", "share/m")).unwrap();
  let (summary, _, _) = env.build(&set, &["m"]);
  assert!(summary.is_success());
  let before = env.packagedb().get("m").cloned().unwrap();

  env.config.build_policy = BuildPolicy::Updated;
  let (summary, ctx, log) = env.build(&set, &["m"]);

  assert!(summary.is_success());
  assert_eq!(summary.skipped, vec!["m"]);
  assert_eq!(log.commands(), vec!["scripted checkout m"]);
  let after = ctx.packagedb.get("m").unwrap();
  assert_eq!(after.revision, before.revision);
  assert_eq!(after.manifest, before.manifest);
}

#[test]
fn updated_policy_without_network_runs_nothing() {
  let mut env = TestEnv::new();
  let set = env.load(&single("m", "r1", "share/m")).unwrap();
  env.build(&set, &["m"]);

  env.config.build_policy = BuildPolicy::Updated;
  env.config.nonetwork = true;
  let (summary, _, log) = env.build(&set, &["m"]);

  assert_eq!(summary.skipped, vec!["m"]);
  assert!(log.commands().is_empty());
}

#[test]
fn new_revision_is_rebuilt_under_updated_policy() {
  let mut env = TestEnv::new();
  env.build(&env.load(&single("m", "r1", "share/m")).unwrap(), &["m"]);

  env.config.build_policy = BuildPolicy::Updated;
  let set = env.load(&single("m", "r2", "share/m")).unwrap();
  let (summary, ctx, log) = env.build(&set, &["m"]);

  assert_eq!(summary.built, vec!["m"]);
  assert!(log.contains("scripted install m"));
  assert_eq!(ctx.packagedb.get("m").unwrap().revision, "r2");
}

#[test]
fn uninstall_then_rebuild_matches_fresh_build() {
  let env = TestEnv::new();
  let set = env.load(&single("m", "r1", "bin/m share/m/data")).unwrap();
  env.build(&set, &["m"]);
  let fresh = env.packagedb().get("m").cloned().unwrap().manifest;

  let mut db = env.packagedb();
  db.uninstall("m").unwrap();
  assert!(!env.prefix_path("bin/m").exists());
  assert!(!env.prefix_path("share/m/data").exists());
  assert!(db.get("m").is_none());

  env.build(&set, &["m"]);

  assert_eq!(env.packagedb().get("m").unwrap().manifest, fresh);
  assert!(env.prefix_path("bin/m").is_file());
  assert!(env.prefix_path("share/m/data").is_file());
}

#[test]
fn metamodules_group_without_running_anything() {
  let env = TestEnv::new();
  let set = env
    .load(
      r#"<moduleset>
           <metamodule id="desktop"><dependencies><dep package="a"/></dependencies></metamodule>
           <scripted id="a" revision="r1" files="a"/>
         </moduleset>"#,
    )
    .unwrap();

  let (summary, ctx, log) = env.build(&set, &["desktop"]);

  assert!(summary.is_success());
  assert_eq!(summary.total(), 2);
  assert!(log.commands().iter().all(|c| c.ends_with(" a")));
  assert!(ctx.packagedb.get("desktop").is_none());
}
