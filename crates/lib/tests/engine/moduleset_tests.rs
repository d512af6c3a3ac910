//! Loading and ordering modulesets.

use modbuild_lib::moduleset::{ModuleSetError, SelectOptions};

use super::common::TestEnv;

#[test]
fn dependency_cycle_is_fatal() {
  let env = TestEnv::new();
  let err = env
    .load(
      r#"<moduleset>
           <scripted id="a"><dependencies><dep package="b"/></dependencies></scripted>
           <scripted id="b"><dependencies><dep package="a"/></dependencies></scripted>
         </moduleset>"#,
    )
    .unwrap_err();

  let ModuleSetError::Cycle { path } = &err else {
    panic!("expected a cycle, got {}", err);
  };
  assert!(path.contains(&"a".to_string()) && path.contains(&"b".to_string()));
  assert!(err.to_string().contains("a -> b"));
}

#[test]
fn unknown_type_is_fatal() {
  let env = TestEnv::new();
  let err = env.load(r#"<moduleset><scons id="x"/></moduleset>"#).unwrap_err();
  assert!(matches!(err, ModuleSetError::UnknownType { .. }));
}

#[test]
fn soft_edges_order_without_pulling_in() {
  let env = TestEnv::new();
  let set = env
    .load(
      r#"<moduleset>
           <scripted id="app">
             <dependencies><dep package="lib"/></dependencies>
             <suggests><dep package="docs"/><dep package="missing"/></suggests>
             <after><dep package="fonts"/><dep package="gone"/></after>
           </scripted>
           <scripted id="lib"/>
           <scripted id="docs"/>
           <scripted id="fonts"/>
         </moduleset>"#,
    )
    .unwrap();

  let names = |options: &SelectOptions, seeds: &[&str]| -> Vec<String> {
    set
      .get_module_list(seeds, options)
      .unwrap()
      .iter()
      .map(|m| m.name.clone())
      .collect()
  };

  assert_eq!(names(&SelectOptions::default(), &["app"]), ["docs", "lib", "app"]);
  let no_suggests = SelectOptions {
    include_suggests: false,
    ..Default::default()
  };
  assert_eq!(names(&no_suggests, &["app"]), ["lib", "app"]);
  assert_eq!(names(&SelectOptions::default(), &["app", "fonts"]), ["docs", "fonts", "lib", "app"]);
  let skipping = SelectOptions {
    skip: vec!["lib".into()],
    ..Default::default()
  };
  assert_eq!(names(&skipping, &["app"]), ["docs", "app"]);
}

#[test]
fn includes_resolve_against_the_including_document() {
  let env = TestEnv::new();
  let dir = env.temp.path().join("sets");
  std::fs::create_dir_all(&dir).unwrap();
  std::fs::write(
    dir.join("base.modules"),
    r#"<moduleset><scripted id="glib"/><include href="base.modules"/></moduleset>"#,
  )
  .unwrap();
  std::fs::write(
    dir.join("desktop.modules"),
    r#"<moduleset>
         <include href="base.modules"/>
         <scripted id="gtk"><dependencies><dep package="glib"/></dependencies></scripted>
       </moduleset>"#,
  )
  .unwrap();

  let registry = super::common::registry();
  let set = modbuild_lib::moduleset::ModuleSetLoader::new(&registry, &env.config)
    .load(&dir.join("desktop.modules"))
    .unwrap();

  assert_eq!(set.len(), 2);
  assert_eq!(set.reverse_dependencies("glib").unwrap(), vec!["gtk"]);
  let mut dot = Vec::new();
  set.write_dot(&["gtk"], &mut dot).unwrap();
  let dot = String::from_utf8(dot).unwrap();
  assert!(dot.starts_with("digraph"));
  assert!(dot.contains("\"gtk\" -> \"glib\""));
}
