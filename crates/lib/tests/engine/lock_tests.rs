//! Package database writers sharing one lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use modbuild_lib::consts::PACKAGEDB_LOCK_FILENAME;
use modbuild_lib::lock::{LockWait, SymlinkLock};
use modbuild_lib::packagedb::PackageDb;

use super::common::TestEnv;

#[test]
fn writer_waits_for_the_lock_holder() {
  let env = TestEnv::new();
  let state_dir = env.config.state_dir.clone();
  let prefix = env.config.prefix.clone();
  let held = SymlinkLock::acquire(&state_dir.join(PACKAGEDB_LOCK_FILENAME), LockWait::NoWait).unwrap();

  let done = Arc::new(AtomicBool::new(false));
  let finished = Arc::clone(&done);
  let writer = thread::spawn(move || {
    let mut db = PackageDb::open(&state_dir, &prefix, LockWait::Forever).unwrap();
    db.add("second", "r2", Some(vec!["bin/second".into()]), None).unwrap();
    finished.store(true, Ordering::SeqCst);
  });

  thread::sleep(Duration::from_millis(300));
  assert!(!done.load(Ordering::SeqCst), "writer did not wait for the lock");

  let mut first = env.packagedb();
  drop(held);
  first.add("first", "r1", Some(vec!["bin/first".into()]), None).unwrap();
  writer.join().unwrap();

  let db = env.packagedb();
  assert_eq!(db.get("first").unwrap().revision, "r1");
  assert_eq!(db.get("second").unwrap().revision, "r2");
}

#[test]
fn concurrent_writers_keep_every_entry() {
  let env = TestEnv::new();
  let writers: Vec<_> = (0..4)
    .map(|i| {
      let state_dir = env.config.state_dir.clone();
      let prefix = env.config.prefix.clone();
      thread::spawn(move || {
        let mut db = PackageDb::open(&state_dir, &prefix, LockWait::Forever).unwrap();
        db.add(&format!("m{}", i), "r1", Some(vec![format!("share/m{}", i)]), None).unwrap();
      })
    })
    .collect();
  for writer in writers {
    writer.join().unwrap();
  }

  let db = env.packagedb();
  let names: Vec<&String> = db.entries().map(|(name, _)| name).collect();
  assert_eq!(names, ["m0", "m1", "m2", "m3"]);
}

#[test]
fn held_lock_times_out_without_waiting() {
  let env = TestEnv::new();
  let _held = SymlinkLock::acquire(&env.config.state_dir.join(PACKAGEDB_LOCK_FILENAME), LockWait::NoWait).unwrap();

  let mut db = PackageDb::open(&env.config.state_dir, &env.config.prefix, LockWait::NoWait).unwrap();
  assert!(db.add("m", "r1", None, None).is_err());
}
