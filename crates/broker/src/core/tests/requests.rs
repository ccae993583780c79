//! Tests for the plain store operations, no callbacks involved.

use stash_proto::types::ErrorCode;
use tempfile::tempdir;

use super::helpers::test_core;

#[tokio::test]
async fn set_then_get_round_trips() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	core.set("/entity/zones/private/name", b"private\0".to_vec())
		.await
		.unwrap();
	assert_eq!(
		core.get("/entity/zones/private/name").await.unwrap(),
		b"private\0"
	);
}

#[tokio::test]
async fn overwrite_returns_the_second_value() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	core.set("/a/b", b"1".to_vec()).await.unwrap();
	core.set("/a/b", b"2".to_vec()).await.unwrap();
	assert_eq!(core.get("/a/b").await.unwrap(), b"2");
}

#[tokio::test]
async fn get_of_an_absent_path_is_empty() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	assert!(core.get("/nothing/here").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_set_deletes_and_cleans_the_tree() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	core.set("/entity/zones/private/name", b"x".to_vec())
		.await
		.unwrap();
	core.set("/entity/zones/private/name", Vec::new())
		.await
		.unwrap();

	assert!(core.get("/entity/zones/private/name").await.unwrap().is_empty());
	assert!(core.search("/").unwrap().is_empty());
}

#[tokio::test]
async fn search_is_set_equal_to_the_stored_children() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	core.set("/a/b", b"1\0".to_vec()).await.unwrap();
	core.set("/a/c", b"2\0".to_vec()).await.unwrap();

	let mut paths = core.search("/a/").unwrap();
	paths.sort();
	assert_eq!(paths, vec!["/a/b".to_string(), "/a/c".to_string()]);
}

#[tokio::test]
async fn prune_removes_the_subtree_without_errors() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	core.set("/a/b/c", b"1".to_vec()).await.unwrap();
	core.set("/a/b/d", b"2".to_vec()).await.unwrap();
	core.prune("/a/b").unwrap();

	assert!(core.get("/a/b/c").await.unwrap().is_empty());
	assert!(core.get("/a/b/d").await.unwrap().is_empty());
	// Pruning a path that no longer exists still succeeds.
	core.prune("/a/b").unwrap();
}

#[tokio::test]
async fn malformed_paths_are_rejected() {
	let dir = tempdir().unwrap();
	let core = test_core(dir.path());

	assert_eq!(
		core.set("no-slash", b"x".to_vec()).await,
		Err(ErrorCode::InvalidPath)
	);
	assert_eq!(core.get("/a//b").await, Err(ErrorCode::InvalidPath));
	assert_eq!(core.search("/a").unwrap_err(), ErrorCode::InvalidPath);
	assert_eq!(core.prune("/a/").unwrap_err(), ErrorCode::InvalidPath);
}
